//! Events streamed to the subscriber while a request runs.
//!
//! Every request produces zero or more [`RequestEvent::Status`] and
//! [`RequestEvent::Progress`] events followed by exactly one terminal event,
//! [`RequestEvent::Complete`] or [`RequestEvent::Error`]. A cancelled request
//! produces no terminal event at all.
//!
//! The [`RequestEmitter`] enforces those rules for one request id: terminal
//! methods consume the emitter, and nothing is delivered once the request's
//! cancellation token fires. Cancelling through a [`Canceller`] waits for an
//! event that is being delivered, so no event follows a returned `cancel()`.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::request::Headers;

/// Stable tag describing why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed descriptor fields or unknown transport class.
    InvalidConfiguration,
    /// DEFAULT was requested but the platform has no active network.
    NoActiveNetwork,
    /// The requested transport class cannot be obtained.
    NetworkUnavailable,
    /// No availability signal arrived within the timeout.
    AcquisitionTimeout,
    /// DNS, TCP/TLS or read failure during the exchange.
    ConnectionError,
    /// The output destination could not be written.
    SinkError,
}

impl ErrorKind {
    /// Returns the wire tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "InvalidConfiguration",
            Self::NoActiveNetwork => "NoActiveNetwork",
            Self::NetworkUnavailable => "NetworkUnavailable",
            Self::AcquisitionTimeout => "AcquisitionTimeout",
            Self::ConnectionError => "ConnectionError",
            Self::SinkError => "SinkError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event delivered to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RequestEvent {
    /// Bytes written so far.
    #[serde(rename_all = "camelCase")]
    Progress {
        id: String,
        bytes_downloaded: u64,
        #[serde(serialize_with = "serialize_total_bytes")]
        total_bytes: Option<u64>,
    },
    /// Response status and headers, sent before any body bytes.
    #[serde(rename_all = "camelCase")]
    Status {
        id: String,
        status_code: u16,
        headers: Headers,
        #[serde(serialize_with = "serialize_total_bytes")]
        total_bytes: Option<u64>,
    },
    /// The body was fully written to the output destination.
    #[serde(rename_all = "camelCase")]
    Complete {
        id: String,
        status_code: u16,
        headers: Headers,
        output_destination: PathBuf,
        bytes_downloaded: u64,
    },
    /// The request failed.
    #[serde(rename_all = "camelCase")]
    Error {
        id: String,
        error_kind: ErrorKind,
        message: String,
    },
}

impl RequestEvent {
    /// Returns the request id the event belongs to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Progress { id, .. }
            | Self::Status { id, .. }
            | Self::Complete { id, .. }
            | Self::Error { id, .. } => id,
        }
    }

    /// Returns the wire value of the `type` tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Status { .. } => "status",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// True for `Complete` and `Error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

// Unknown length goes over the wire as -1.
#[allow(clippy::ref_option)]
fn serialize_total_bytes<S: Serializer>(
    total: &Option<u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let value = total.map_or(-1, |bytes| i64::try_from(bytes).unwrap_or(i64::MAX));
    serializer.serialize_i64(value)
}

/// The subscriber went away and can no longer receive events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event subscriber is gone")]
pub struct SubscriberGone;

/// Ordered delivery channel to the host.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    ///
    /// Runs while the request's cancellation is held off, so it must return
    /// promptly and must not cancel that request itself.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriberGone`] once the subscriber has detached.
    fn emit(&self, event: RequestEvent) -> Result<(), SubscriberGone>;
}

/// [`EventSink`] backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<RequestEvent>,
}

impl ChannelEventSink {
    /// Wraps an existing sender.
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<RequestEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: RequestEvent) -> Result<(), SubscriberGone> {
        self.sender.send(event).map_err(|_| SubscriberGone)
    }
}

/// Creates a sink and the receiver the subscriber reads events from.
#[must_use]
pub fn event_channel() -> (ChannelEventSink, mpsc::UnboundedReceiver<RequestEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelEventSink::new(sender), receiver)
}

/// The request was cancelled; stop work and emit nothing further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request cancelled")]
pub struct Cancelled;

/// Cancels one request, serialized against its event delivery.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl Canceller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            gate: Arc::default(),
        }
    }

    /// Cancels the request. Once this returns, no further event for it is delivered.
    pub fn cancel(&self) {
        let _delivery = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.token.cancel();
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Emits events for a single request id.
pub struct RequestEmitter {
    id: String,
    sink: Arc<dyn EventSink>,
    cancel: Canceller,
    terminated: bool,
}

impl fmt::Debug for RequestEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEmitter")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl RequestEmitter {
    /// Creates an emitter for `id` delivering into `sink`.
    ///
    /// Cancelling `cancel` suppresses every later event.
    pub fn new(id: impl Into<String>, sink: Arc<dyn EventSink>, cancel: CancellationToken) -> Self {
        Self::with_canceller(id, sink, Canceller::from_token(cancel))
    }

    /// Creates an emitter whose delivery is serialized with `canceller`.
    pub fn with_canceller(
        id: impl Into<String>,
        sink: Arc<dyn EventSink>,
        canceller: Canceller,
    ) -> Self {
        Self {
            id: id.into(),
            sink,
            cancel: canceller,
            terminated: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token that fires when the request is cancelled or the subscriber leaves.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel.token()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emits the response status event.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the request was cancelled or the subscriber left.
    pub fn status(
        &mut self,
        status_code: u16,
        headers: Headers,
        total_bytes: Option<u64>,
    ) -> Result<(), Cancelled> {
        let event = RequestEvent::Status {
            id: self.id.clone(),
            status_code,
            headers,
            total_bytes,
        };
        self.send(event)
    }

    /// Emits a progress event.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the request was cancelled or the subscriber left.
    pub fn progress(&mut self, bytes_downloaded: u64, total_bytes: Option<u64>) -> Result<(), Cancelled> {
        let event = RequestEvent::Progress {
            id: self.id.clone(),
            bytes_downloaded,
            total_bytes,
        };
        self.send(event)
    }

    /// Emits the terminal success event. Dropped silently when cancelled.
    pub fn complete(
        mut self,
        status_code: u16,
        headers: Headers,
        output_destination: PathBuf,
        bytes_downloaded: u64,
    ) {
        let event = RequestEvent::Complete {
            id: self.id.clone(),
            status_code,
            headers,
            output_destination,
            bytes_downloaded,
        };
        self.terminate(event);
    }

    /// Emits the terminal failure event. Dropped silently when cancelled.
    pub fn error(mut self, error_kind: ErrorKind, message: impl Into<String>) {
        let event = RequestEvent::Error {
            id: self.id.clone(),
            error_kind,
            message: message.into(),
        };
        self.terminate(event);
    }

    fn terminate(&mut self, event: RequestEvent) {
        self.terminated = true;
        if self.send(event).is_err() {
            trace!(id = %self.id, "terminal event suppressed");
        }
    }

    fn send(&mut self, event: RequestEvent) -> Result<(), Cancelled> {
        // Held across check and emit so a concurrent cancel() cannot slip between them.
        let _delivery = self
            .cancel
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if self.sink.emit(event).is_err() {
            warn!(id = %self.id, "subscriber detached; cancelling request");
            self.cancel.token.cancel();
            return Err(Cancelled);
        }
        Ok(())
    }
}

impl Drop for RequestEmitter {
    fn drop(&mut self) {
        if !self.terminated && !self.cancel.is_cancelled() {
            warn!(id = %self.id, "request ended without a terminal event");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn headers() -> Headers {
        let mut headers = Headers::new();
        headers.insert("content-type", "application/octet-stream");
        headers.insert("content-length", "1024");
        headers
    }

    fn emitter() -> (
        RequestEmitter,
        mpsc::UnboundedReceiver<RequestEvent>,
        CancellationToken,
    ) {
        let (sink, receiver) = event_channel();
        let token = CancellationToken::new();
        let emitter = RequestEmitter::new("r1", Arc::new(sink), token.clone());
        (emitter, receiver, token)
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<RequestEvent>) -> Vec<RequestEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_progress_serializes_tagged_camel_case() {
        let event = RequestEvent::Progress {
            id: "r1".into(),
            bytes_downloaded: 512,
            total_bytes: Some(1024),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "progress", "id": "r1", "bytesDownloaded": 512, "totalBytes": 1024})
        );
    }

    #[test]
    fn test_unknown_total_serializes_as_minus_one() {
        let event = RequestEvent::Status {
            id: "r1".into(),
            status_code: 200,
            headers: Headers::new(),
            total_bytes: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["totalBytes"], -1);
        assert_eq!(value["headers"], json!({}));
    }

    #[test]
    fn test_complete_and_error_serialize_expected_fields() {
        let complete = RequestEvent::Complete {
            id: "r1".into(),
            status_code: 404,
            headers: headers(),
            output_destination: PathBuf::from("/tmp/out.bin"),
            bytes_downloaded: 9,
        };
        let value = serde_json::to_value(&complete).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["outputDestination"], "/tmp/out.bin");
        assert_eq!(value["bytesDownloaded"], 9);
        assert_eq!(value["headers"]["content-length"], "1024");

        let error = RequestEvent::Error {
            id: "r1".into(),
            error_kind: ErrorKind::AcquisitionTimeout,
            message: "timed out".into(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "error", "id": "r1", "errorKind": "AcquisitionTimeout", "message": "timed out"})
        );
    }

    #[test]
    fn test_error_kind_tags_are_stable() {
        for kind in [
            ErrorKind::InvalidConfiguration,
            ErrorKind::NoActiveNetwork,
            ErrorKind::NetworkUnavailable,
            ErrorKind::AcquisitionTimeout,
            ErrorKind::ConnectionError,
            ErrorKind::SinkError,
        ] {
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.to_string())
            );
        }
    }

    #[test]
    fn test_emitter_delivers_in_order_with_single_terminal() {
        let (mut emitter, mut receiver, _token) = emitter();
        emitter.status(200, headers(), Some(1024)).unwrap();
        emitter.progress(512, Some(1024)).unwrap();
        emitter.progress(1024, Some(1024)).unwrap();
        emitter.complete(200, headers(), PathBuf::from("out.bin"), 1024);

        let events = drain(&mut receiver);
        let types: Vec<_> = events.iter().map(RequestEvent::event_type).collect();
        assert_eq!(types, ["status", "progress", "progress", "complete"]);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.iter().all(|e| e.id() == "r1"));
    }

    #[test]
    fn test_cancelled_emitter_suppresses_everything() {
        let (mut emitter, mut receiver, token) = emitter();
        emitter.progress(10, None).unwrap();
        token.cancel();

        assert_eq!(emitter.progress(20, None), Err(Cancelled));
        emitter.error(ErrorKind::ConnectionError, "reset");

        let events = drain(&mut receiver);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "progress");
    }

    #[test]
    fn test_cancel_waits_for_in_flight_delivery() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::mpsc as std_mpsc;

        struct HeldSink {
            entered: std_mpsc::SyncSender<()>,
            release: Mutex<std_mpsc::Receiver<()>>,
            delivered: Mutex<Vec<RequestEvent>>,
        }

        impl EventSink for HeldSink {
            fn emit(&self, event: RequestEvent) -> Result<(), SubscriberGone> {
                self.entered.send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
                self.delivered.lock().unwrap().push(event);
                Ok(())
            }
        }

        let (entered_tx, entered_rx) = std_mpsc::sync_channel(1);
        let (release_tx, release_rx) = std_mpsc::channel();
        let sink = Arc::new(HeldSink {
            entered: entered_tx,
            release: Mutex::new(release_rx),
            delivered: Mutex::new(Vec::new()),
        });
        let canceller = Canceller::new();
        let mut emitter = RequestEmitter::with_canceller("r1", sink.clone(), canceller.clone());

        let delivering = std::thread::spawn(move || {
            emitter.progress(10, None).unwrap();
            emitter
        });
        entered_rx.recv().unwrap();

        let cancel_returned = Arc::new(AtomicBool::new(false));
        let cancelling = {
            let cancel_returned = Arc::clone(&cancel_returned);
            std::thread::spawn(move || {
                canceller.cancel();
                cancel_returned.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(
            !cancel_returned.load(Ordering::SeqCst),
            "cancel must wait for the delivery in progress"
        );

        release_tx.send(()).unwrap();
        let mut emitter = delivering.join().unwrap();
        cancelling.join().unwrap();

        assert!(cancel_returned.load(Ordering::SeqCst));
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(emitter.progress(20, None), Err(Cancelled));
        emitter.complete(200, Headers::new(), PathBuf::from("out.bin"), 20);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_subscriber_gone_cancels_request() {
        let (mut emitter, receiver, token) = emitter();
        drop(receiver);

        assert_eq!(emitter.progress(1, None), Err(Cancelled));
        assert!(token.is_cancelled());
        assert!(emitter.is_cancelled());
    }
}
