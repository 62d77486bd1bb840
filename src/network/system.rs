//! Connectivity service backed by the host's network interfaces.
//!
//! Desktop and server operating systems have no "request a network" API, so
//! this service approximates one:
//!
//! - the active network is the interface owning the source address the
//!   kernel picks for an outbound route (a connected UDP socket, no packets sent)
//! - interfaces are classified as Wi-Fi or cellular by driver naming
//!   conventions (`wlan0`, `wlp2s0`, `rmnet_data0`, `wwan0`, ...)
//! - a network "supports internet" when it holds a routable address
//! - availability listeners are watcher tasks that poll the interface list
//!   until a matching interface comes up
//!
//! A listener for a medium the host has no interface for at all is answered
//! with `on_unavailable` on the watcher's first pass. Interface enumeration
//! and the route lookup run on tokio's blocking pool, never on the caller.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use sysinfo::Networks;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::connectivity::{ConnectivityService, ListenerId, NetworkCallback, PlatformError};
use super::handle::NetworkHandle;
use super::transport::{NetworkFilter, TransportClass, TransportMedium};

/// How often watcher tasks re-read the interface list.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Public resolvers used only to let the kernel pick a route; nothing is sent.
const ROUTE_PROBE_V4: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);
const ROUTE_PROBE_V6: SocketAddr = SocketAddr::new(
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888)),
    53,
);

const WIFI_PREFIXES: &[&str] = &["wlan", "wlp", "wlx", "wifi", "ath", "wl"];
const CELLULAR_PREFIXES: &[&str] = &["rmnet", "ccmni", "wwan", "wwp", "pdp_ip", "ppp", "seth_lte"];

/// Connectivity service for the machine this process runs on.
#[derive(Debug)]
pub struct SystemConnectivity {
    next_id: AtomicU64,
    watchers: DashMap<ListenerId, CancellationToken>,
    poll_interval: Duration,
}

impl Default for SystemConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemConnectivity {
    /// Creates a service polling interfaces every 250ms while listeners wait.
    #[must_use]
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Creates a service with a custom watcher poll interval.
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            watchers: DashMap::new(),
            poll_interval,
        }
    }

    /// Number of listeners registered and not yet unregistered.
    #[must_use]
    pub fn active_listeners(&self) -> usize {
        self.watchers.len()
    }
}

impl ConnectivityService for SystemConnectivity {
    fn active_network(&self) -> Result<Option<NetworkHandle>, PlatformError> {
        let Some(source) = probe_route_source() else {
            debug!("no outbound route");
            return Ok(None);
        };
        let interface = snapshot_interfaces()
            .into_iter()
            .find(|candidate| candidate.addresses.contains(&source))
            .map(|candidate| candidate.name);
        Ok(Some(NetworkHandle::new(
            TransportClass::Default,
            interface,
            Some(source),
        )))
    }

    fn request_network(
        &self,
        filter: NetworkFilter,
        callback: Arc<dyn NetworkCallback>,
    ) -> Result<ListenerId, PlatformError> {
        let runtime = Handle::try_current()
            .map_err(|_| PlatformError::new("no async runtime available to watch interfaces"))?;
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = CancellationToken::new();
        self.watchers.insert(id, token.clone());
        runtime.spawn(watch_interfaces(
            id,
            filter,
            callback,
            token,
            self.poll_interval,
        ));
        Ok(id)
    }

    fn unregister_network_callback(&self, listener: ListenerId) {
        if let Some((_, token)) = self.watchers.remove(&listener) {
            token.cancel();
        }
        trace!(%listener, "listener removed");
    }
}

/// Answers one listener: unavailable when the host has no interface of the
/// medium at all, available as soon as a matching interface is up.
async fn watch_interfaces(
    id: ListenerId,
    filter: NetworkFilter,
    callback: Arc<dyn NetworkCallback>,
    token: CancellationToken,
    poll_interval: Duration,
) {
    let mut first = true;
    loop {
        let snapshot = tokio::select! {
            biased;
            () = token.cancelled() => {
                trace!(%id, "watcher cancelled");
                return;
            }
            snapshot = refreshed_snapshot() => snapshot,
        };

        if first
            && !snapshot
                .iter()
                .any(|candidate| candidate.medium == Some(filter.medium))
        {
            debug!(%id, medium = ?filter.medium, "no interface of requested medium");
            callback.on_unavailable();
            return;
        }
        first = false;

        if let Some(handle) = find_match(&snapshot, filter) {
            debug!(%id, interface = ?handle.interface(), "matching interface is up");
            callback.on_available(handle);
            return;
        }

        tokio::select! {
            biased;
            () = token.cancelled() => {
                trace!(%id, "watcher cancelled");
                return;
            }
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}

/// Enumerates interfaces on the blocking pool.
async fn refreshed_snapshot() -> Vec<InterfaceSnapshot> {
    tokio::task::spawn_blocking(snapshot_interfaces)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "interface enumeration did not complete");
            Vec::new()
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InterfaceSnapshot {
    name: String,
    medium: Option<TransportMedium>,
    addresses: Vec<IpAddr>,
}

fn snapshot_interfaces() -> Vec<InterfaceSnapshot> {
    let networks = Networks::new_with_refreshed_list();
    networks
        .list()
        .iter()
        .map(|(name, data)| InterfaceSnapshot {
            name: name.clone(),
            medium: classify_interface(name),
            addresses: data.ip_networks().iter().map(|network| network.addr).collect(),
        })
        .collect()
}

fn find_match(snapshot: &[InterfaceSnapshot], filter: NetworkFilter) -> Option<NetworkHandle> {
    snapshot
        .iter()
        .filter(|candidate| candidate.medium == Some(filter.medium))
        .find_map(|candidate| {
            let address = routable_address(&candidate.addresses);
            if filter.require_internet && address.is_none() {
                return None;
            }
            Some(NetworkHandle::new(
                filter.medium.into(),
                Some(candidate.name.clone()),
                address,
            ))
        })
}

/// Classifies an interface name as Wi-Fi or cellular.
///
/// Returns `None` for wired, virtual and loopback interfaces.
#[must_use]
pub fn classify_interface(name: &str) -> Option<TransportMedium> {
    let name = name.to_ascii_lowercase();
    if CELLULAR_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        Some(TransportMedium::Cellular)
    } else if WIFI_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        Some(TransportMedium::Wifi)
    } else {
        None
    }
}

/// Picks the address connections should originate from, preferring IPv4.
fn routable_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    let routable = |addr: &&IpAddr| match addr {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
        IpAddr::V6(v6) => {
            !v6.is_loopback() && !v6.is_unspecified() && (v6.segments()[0] & 0xffc0) != 0xfe80
        }
    };
    addresses
        .iter()
        .filter(routable)
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.iter().find(routable))
        .copied()
}

fn probe_route_source() -> Option<IpAddr> {
    [
        (SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)), ROUTE_PROBE_V4),
        (SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)), ROUTE_PROBE_V6),
    ]
    .into_iter()
    .find_map(|(bind, target)| {
        let socket = UdpSocket::bind(bind).ok()?;
        socket.connect(target).ok()?;
        let local = socket.local_addr().ok()?.ip();
        (!local.is_unspecified()).then_some(local)
    })
}
