//! Host-facing service that wires acquisition and execution together.
//!
//! [`NetworkBoundHttp`] is what a host process talks to. It keeps the single
//! event subscriber, turns `sendRequest` calls into background tasks, and
//! tracks in-flight requests so they can be cancelled individually or all at
//! once.
//!
//! # Method surface
//!
//! | method          | arguments          | result                          |
//! |-----------------|--------------------|---------------------------------|
//! | `sendRequest`   | request map        | `null`, events follow           |
//! | `cancelRequest` | `{"id": "..."}`    | `true` if a request was running |
//!
//! Anything else fails with `NOT_IMPLEMENTED`.

mod error;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

pub use error::PluginError;

use crate::events::{Canceller, EventSink, RequestEmitter};
use crate::executor::{ExecutorOptions, RequestExecutor};
use crate::network::{ConnectivityService, NetworkSelector};
use crate::request::{DescriptorError, RequestDefaults, RequestDescriptor};

const SEND_REQUEST: &str = "sendRequest";
const CANCEL_REQUEST: &str = "cancelRequest";

struct InFlight {
    generation: u64,
    cancel: Canceller,
}

type InFlightMap = DashMap<String, InFlight>;

/// Network-bound HTTP service for one host.
pub struct NetworkBoundHttp {
    selector: NetworkSelector,
    executor: RequestExecutor,
    defaults: RequestDefaults,
    listener: Mutex<Option<Arc<dyn EventSink>>>,
    in_flight: Arc<InFlightMap>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for NetworkBoundHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkBoundHttp")
            .field("executor", &self.executor)
            .field("defaults", &self.defaults)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl NetworkBoundHttp {
    /// Creates a service using `service` for network acquisition.
    #[must_use]
    pub fn new(service: Arc<dyn ConnectivityService>) -> Self {
        Self {
            selector: NetworkSelector::new(service),
            executor: RequestExecutor::default(),
            defaults: RequestDefaults::default(),
            listener: Mutex::new(None),
            in_flight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_executor_options(mut self, options: ExecutorOptions) -> Self {
        self.executor = RequestExecutor::new(options);
        self
    }

    /// Values used for `timeoutMs` and `network` when a call leaves them out.
    #[must_use]
    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn defaults(&self) -> &RequestDefaults {
        &self.defaults
    }

    /// Attaches the subscriber that receives every event.
    pub fn on_listen(&self, sink: Arc<dyn EventSink>) {
        debug!("event listener attached");
        *self.lock_listener() = Some(sink);
    }

    /// Detaches the subscriber and cancels everything still running.
    pub fn on_cancel(&self) {
        debug!("event listener detached");
        self.lock_listener().take();
        self.shutdown();
    }

    /// Dispatches a host method call.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the call is rejected; see
    /// [`send_request`](Self::send_request).
    pub fn handle_method_call(&self, method: &str, arguments: &Value) -> Result<Value, PluginError> {
        match method {
            SEND_REQUEST => self.send_request(arguments).map(|_| Value::Null),
            CANCEL_REQUEST => {
                let id = arguments
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or(DescriptorError::missing("id"))?;
                Ok(Value::Bool(self.cancel_request(id)))
            }
            other => Err(PluginError::not_implemented(other)),
        }
    }

    /// Parses `arguments` and starts the request in the background.
    ///
    /// Returns as soon as the task is spawned; progress and the outcome are
    /// delivered through the subscriber.
    ///
    /// # Errors
    ///
    /// - [`PluginError::InvalidArguments`] when the map is not a valid request
    /// - [`PluginError::NoListener`] when no subscriber is attached
    /// - [`PluginError::DuplicateRequest`] when the id is already running
    /// - [`PluginError::NoRuntime`] outside a tokio runtime
    pub fn send_request(&self, arguments: &Value) -> Result<JoinHandle<()>, PluginError> {
        let descriptor = RequestDescriptor::from_arguments(arguments, &self.defaults)?;
        self.submit(descriptor)
    }

    /// Starts an already-built request in the background.
    ///
    /// # Errors
    ///
    /// Same as [`send_request`](Self::send_request), minus argument parsing.
    pub fn submit(&self, descriptor: RequestDescriptor) -> Result<JoinHandle<()>, PluginError> {
        let sink = self
            .lock_listener()
            .as_ref()
            .map(Arc::clone)
            .ok_or(PluginError::NoListener)?;
        let runtime = Handle::try_current().map_err(|_| PluginError::NoRuntime)?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = Canceller::new();
        match self.in_flight.entry(descriptor.id().to_string()) {
            Entry::Occupied(_) => return Err(PluginError::duplicate(descriptor.id())),
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    generation,
                    cancel: cancel.clone(),
                });
            }
        }

        info!(
            id = descriptor.id(),
            uri = %descriptor.uri(),
            method = %descriptor.method(),
            transport = %descriptor.transport(),
            "request accepted"
        );

        let span = info_span!("request", id = descriptor.id());
        let guard = InFlightGuard {
            map: Arc::clone(&self.in_flight),
            id: descriptor.id().to_string(),
            generation,
        };
        let emitter = RequestEmitter::with_canceller(descriptor.id(), sink, cancel);
        let selector = self.selector.clone();
        let executor = self.executor.clone();

        Ok(runtime.spawn(
            async move {
                let _guard = guard;
                run_request(&selector, &executor, &descriptor, emitter).await;
            }
            .instrument(span),
        ))
    }

    /// Cancels one in-flight request. Returns whether it was running.
    pub fn cancel_request(&self, id: &str) -> bool {
        match self.in_flight.remove(id) {
            Some((_, entry)) => {
                info!(id, "cancelling request");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every in-flight request.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.in_flight.iter().map(|entry| entry.key().clone()).collect();
        if !ids.is_empty() {
            info!(count = ids.len(), "cancelling in-flight requests");
        }
        for id in ids {
            self.cancel_request(&id);
        }
    }

    /// Number of requests that have not finished yet.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn EventSink>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Acquire, then execute; cancellation wins over both.
async fn run_request(
    selector: &NetworkSelector,
    executor: &RequestExecutor,
    descriptor: &RequestDescriptor,
    emitter: RequestEmitter,
) {
    let cancel = emitter.cancellation().clone();
    let acquired = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = selector.acquire(descriptor.transport(), descriptor.timeout()) => Some(result),
    };

    match acquired {
        None => debug!("cancelled during network acquisition"),
        Some(Err(error)) => {
            warn!(kind = %error.kind(), error = %error, "network acquisition failed");
            emitter.error(error.kind(), error.to_string());
        }
        Some(Ok(handle)) => executor.execute(handle, descriptor, emitter).await,
    }
}

/// Removes the request's in-flight entry when its task ends, however it ends.
struct InFlightGuard {
    map: Arc<InFlightMap>,
    id: String,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // A cancelled id may already be reused by a newer request.
        self.map
            .remove_if(&self.id, |_, entry| entry.generation == self.generation);
    }
}
