//! Per-request HTTP clients pinned to a network handle.
//!
//! A fresh client is built for every request so its sockets can be bound to
//! the handle's source address and interface. Idle connections are never
//! kept, so nothing carries over between requests.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, RequestBuilder};
use tracing::{debug, trace, warn};

use super::error::RequestError;
use crate::network::NetworkHandle;
use crate::request::RequestDescriptor;
use crate::user_agent;

/// Builds a client whose connections leave through `handle`.
///
/// A borrowed (DEFAULT) handle is not pinned; the OS routes as usual.
///
/// # Errors
///
/// Returns [`RequestError::InvalidConfiguration`] if the client cannot be
/// built with the handle's settings.
pub(crate) fn build_pinned_client(
    handle: &NetworkHandle,
    timeout: Duration,
) -> Result<Client, RequestError> {
    match try_build(handle, timeout, false) {
        Ok(result) => result,
        Err(()) => {
            // System proxy discovery can panic in sandboxed environments.
            warn!("HTTP client builder panicked while loading system proxy settings; retrying without proxy");
            try_build(handle, timeout, true).map_err(|()| {
                RequestError::invalid_configuration("HTTP client builder panicked")
            })?
        }
    }
}

fn try_build(
    handle: &NetworkHandle,
    timeout: Duration,
    no_proxy: bool,
) -> Result<Result<Client, RequestError>, ()> {
    catch_unwind_silent(AssertUnwindSafe(|| {
        let mut builder = base_builder(timeout);
        if no_proxy {
            builder = builder.no_proxy();
        }
        if !handle.is_borrowed() {
            builder = pin(builder, handle);
        }
        builder
            .build()
            .map_err(|e| RequestError::invalid_configuration(format!("cannot build HTTP client: {e}")))
    }))
    .map_err(|_| ())
}

static CLIENT_BUILD_PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn catch_unwind_silent<F, T>(operation: F) -> std::thread::Result<T>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    let _guard = CLIENT_BUILD_PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(operation);
    set_hook(previous_hook);
    outcome
}

fn base_builder(timeout: Duration) -> ClientBuilder {
    Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .pool_max_idle_per_host(0)
        .user_agent(user_agent::default_user_agent())
}

/// Whether this target can bind sockets to a named interface
/// (`SO_BINDTODEVICE` on Linux, `IP_BOUND_IF` on Apple platforms).
pub(crate) const INTERFACE_PINNING: bool = cfg!(any(
    target_os = "android",
    target_os = "fuchsia",
    target_os = "illumos",
    target_os = "ios",
    target_os = "linux",
    target_os = "macos",
    target_os = "solaris",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
));

fn pin(mut builder: ClientBuilder, handle: &NetworkHandle) -> ClientBuilder {
    if let Some(address) = handle.local_address() {
        trace!(%address, "binding source address");
        builder = builder.local_address(address);
    }
    if !INTERFACE_PINNING && let Some(interface) = handle.interface() {
        debug!(interface, "interface binding unsupported on this target; pinning source address only");
    }
    bind_interface(builder, handle)
}

#[cfg(any(
    target_os = "android",
    target_os = "fuchsia",
    target_os = "illumos",
    target_os = "ios",
    target_os = "linux",
    target_os = "macos",
    target_os = "solaris",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
))]
fn bind_interface(builder: ClientBuilder, handle: &NetworkHandle) -> ClientBuilder {
    match handle.interface() {
        Some(interface) => {
            trace!(interface, "binding interface");
            builder.interface(interface)
        }
        None => builder,
    }
}

#[cfg(not(any(
    target_os = "android",
    target_os = "fuchsia",
    target_os = "illumos",
    target_os = "ios",
    target_os = "linux",
    target_os = "macos",
    target_os = "solaris",
    target_os = "tvos",
    target_os = "visionos",
    target_os = "watchos",
)))]
fn bind_interface(builder: ClientBuilder, _handle: &NetworkHandle) -> ClientBuilder {
    builder
}

/// Applies method, headers and body from `request` to a new request builder.
///
/// Headers are validated when the descriptor is built; this re-checks them
/// so a hand-built descriptor can never reach the network malformed.
///
/// # Errors
///
/// Returns [`RequestError::InvalidConfiguration`] for an invalid header.
pub(crate) fn prepare(client: &Client, request: &RequestDescriptor) -> Result<RequestBuilder, RequestError> {
    let mut builder = client.request(request.method().clone(), request.uri().clone());
    for (name, value) in request.headers().iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RequestError::invalid_configuration(format!("header `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RequestError::invalid_configuration(format!("header `{name}`: {e}")))?;
        builder = builder.header(name, value);
    }
    if let Some(body) = request.body() {
        builder = builder.body(body.to_vec());
    }
    Ok(builder)
}
