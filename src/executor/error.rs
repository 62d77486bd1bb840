//! Error types for request execution.
//!
//! Every variant maps to one stable [`ErrorKind`] so the executor can fold
//! any failure into a single Error event.

use std::error::Error as _;
use std::path::PathBuf;

use thiserror::Error;

use crate::events::ErrorKind;
use crate::network::AcquisitionError;
use crate::request::DescriptorError;

/// Errors that can occur while running one request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request could not be prepared (bad descriptor, unusable client settings).
    #[error("invalid request configuration: {message}")]
    InvalidConfiguration {
        /// What was wrong.
        message: String,
    },

    /// No network handle could be acquired.
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// DNS, TCP/TLS or read failure.
    #[error("connection error requesting {uri}: {detail}")]
    Connection {
        /// The URI being requested.
        uri: String,
        /// Flattened cause chain.
        detail: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read did not finish within the request timeout.
    #[error("timed out requesting {uri}")]
    Timeout {
        /// The URI being requested.
        uri: String,
    },

    /// The output destination could not be created or written.
    #[error("IO error writing to {path}: {source}")]
    Sink {
        /// The output file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl RequestError {
    /// Creates a configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Classifies a client error as a timeout or a connection failure.
    pub fn connection(uri: impl Into<String>, source: reqwest::Error) -> Self {
        let uri = uri.into();
        if source.is_timeout() {
            return Self::timeout(uri);
        }
        Self::Connection {
            uri,
            detail: cause_chain(&source),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(uri: impl Into<String>) -> Self {
        Self::Timeout { uri: uri.into() }
    }

    /// Creates an output error.
    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Sink {
            path: path.into(),
            source,
        }
    }

    /// Stable kind tag reported to subscribers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            Self::Acquisition(inner) => inner.kind(),
            Self::Connection { .. } | Self::Timeout { .. } => ErrorKind::ConnectionError,
            Self::Sink { .. } => ErrorKind::SinkError,
        }
    }
}

impl From<DescriptorError> for RequestError {
    fn from(error: DescriptorError) -> Self {
        Self::invalid_configuration(error.to_string())
    }
}

// reqwest's top-level message hides the root cause ("error sending request").
fn cause_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
