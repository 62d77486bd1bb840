//! Connectivity service double driven through the public API only.
//!
//! Each medium is either present (answered on registration with a handle
//! bound to loopback so wiremock stays reachable), absent (answered with
//! `on_unavailable`), or pending (never answered).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use netbound_http::{
    ConnectivityService, ListenerId, NetworkCallback, NetworkFilter, NetworkHandle, PlatformError,
    TransportClass, TransportMedium,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumState {
    Present,
    Absent,
    Pending,
}

pub struct ScriptedConnectivity {
    active: bool,
    media: Mutex<HashMap<TransportMedium, MediumState>>,
    next_id: AtomicU64,
    registered: AtomicUsize,
    unregistered: AtomicUsize,
}

impl ScriptedConnectivity {
    /// No active network and every medium pending.
    pub fn offline() -> Self {
        Self {
            active: false,
            media: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            registered: AtomicUsize::new(0),
            unregistered: AtomicUsize::new(0),
        }
    }

    pub fn online() -> Self {
        Self {
            active: true,
            ..Self::offline()
        }
    }

    pub fn with_medium(self, medium: TransportMedium, state: MediumState) -> Self {
        self.media.lock().unwrap().insert(medium, state);
        self
    }

    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn unregistered(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }

    fn state(&self, medium: TransportMedium) -> MediumState {
        self.media
            .lock()
            .unwrap()
            .get(&medium)
            .copied()
            .unwrap_or(MediumState::Pending)
    }
}

fn loopback() -> Option<IpAddr> {
    Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

impl ConnectivityService for ScriptedConnectivity {
    fn active_network(&self) -> Result<Option<NetworkHandle>, PlatformError> {
        Ok(self
            .active
            .then(|| NetworkHandle::new(TransportClass::Default, Some("lo".into()), loopback())))
    }

    fn request_network(
        &self,
        filter: NetworkFilter,
        callback: Arc<dyn NetworkCallback>,
    ) -> Result<ListenerId, PlatformError> {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.registered.fetch_add(1, Ordering::SeqCst);
        match self.state(filter.medium) {
            MediumState::Present => {
                callback.on_available(NetworkHandle::new(filter.medium.into(), None, loopback()));
            }
            MediumState::Absent => callback.on_unavailable(),
            MediumState::Pending => {}
        }
        Ok(id)
    }

    fn unregister_network_callback(&self, _listener: ListenerId) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }
}
