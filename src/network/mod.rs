//! Network acquisition for interface-constrained requests.
//!
//! This module turns a requested [`TransportClass`] into a [`NetworkHandle`]
//! that the executor can pin connections to.
//!
//! # Overview
//!
//! - [`TransportClass::Default`] borrows whatever network the platform
//!   currently considers active. Nothing is registered and nothing is awaited.
//! - [`TransportClass::Wifi`] and [`TransportClass::Cellular`] register an
//!   availability listener with the [`ConnectivityService`] and wait for the
//!   first of: available, unavailable, or timeout.
//!
//! The platform listener is always deregistered before [`NetworkSelector::acquire`]
//! returns, including when the acquiring future is dropped mid-wait.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use netbound_http::network::{NetworkSelector, SystemConnectivity, TransportClass};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let selector = NetworkSelector::new(Arc::new(SystemConnectivity::new()));
//! let handle = selector
//!     .acquire(TransportClass::Wifi, Duration::from_secs(5))
//!     .await?;
//! println!("acquired {:?}", handle.interface());
//! # Ok(())
//! # }
//! ```

mod connectivity;
mod error;
mod handle;
mod selector;
mod system;
mod transport;

pub use connectivity::{ConnectivityService, ListenerId, NetworkCallback, PlatformError};
pub use error::AcquisitionError;
pub use handle::NetworkHandle;
pub use selector::NetworkSelector;
pub use system::{SystemConnectivity, classify_interface};
pub use transport::{NetworkFilter, TransportClass, TransportMedium, UnknownTransport};
