//! Errors returned synchronously to the host.

use thiserror::Error;

use crate::request::DescriptorError;

/// A host method call was rejected before any background work started.
#[derive(Debug, Error)]
pub enum PluginError {
    /// `sendRequest` was called with no subscriber attached.
    #[error("no event listener attached")]
    NoListener,

    /// The call arguments could not be turned into a request.
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] DescriptorError),

    /// A request with the same id is still running.
    #[error("request {id} is already in flight")]
    DuplicateRequest {
        /// The conflicting request id.
        id: String,
    },

    /// The host called a method this service does not provide.
    #[error("method {method} is not implemented")]
    NotImplemented {
        /// The unknown method name.
        method: String,
    },

    /// Called outside a tokio runtime, so the request cannot be spawned.
    #[error("no async runtime available to run the request")]
    NoRuntime,
}

impl PluginError {
    pub fn duplicate(id: impl Into<String>) -> Self {
        Self::DuplicateRequest { id: id.into() }
    }

    pub fn not_implemented(method: impl Into<String>) -> Self {
        Self::NotImplemented {
            method: method.into(),
        }
    }

    /// Stable error code reported to the host.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoListener => "NO_LISTENER",
            Self::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Self::DuplicateRequest { .. } => "DUPLICATE_REQUEST",
            Self::NotImplemented { .. } => "NOT_IMPLEMENTED",
            Self::NoRuntime => "NO_RUNTIME",
        }
    }
}
