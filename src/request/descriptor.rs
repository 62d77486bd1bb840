//! Immutable description of one HTTP exchange.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use super::headers::Headers;
use crate::events::ErrorKind;
use crate::network::{TransportClass, UnknownTransport};

/// Timeout applied when a request does not specify one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Values filled in for optional fields the caller leaves out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDefaults {
    pub timeout: Duration,
    pub transport: TransportClass,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            transport: TransportClass::Default,
        }
    }
}

/// A request description could not be built.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error(transparent)]
    UnknownTransport(#[from] UnknownTransport),
}

impl DescriptorError {
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Every descriptor failure is a configuration problem.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfiguration
    }
}

/// One validated HTTP exchange.
///
/// Construct with [`RequestDescriptor::builder`] or
/// [`RequestDescriptor::from_arguments`]; fields cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    id: String,
    uri: Url,
    method: Method,
    transport: TransportClass,
    headers: Headers,
    body: Option<Vec<u8>>,
    timeout: Duration,
    output_destination: PathBuf,
}

impl RequestDescriptor {
    /// Starts a builder with the three required identity fields.
    pub fn builder(
        id: impl Into<String>,
        uri: impl Into<String>,
        method: impl Into<String>,
    ) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder {
            id: id.into(),
            uri: uri.into(),
            method: method.into(),
            transport: TransportClass::Default,
            headers: Headers::new(),
            body: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            output_destination: None,
        }
    }

    /// Builds a descriptor from a host argument map.
    ///
    /// Recognized keys: `id`, `uri`, `method`, `outputDestination` (or
    /// `outputPath`), `headers`, `body` (string or byte array), `timeoutMs`
    /// (or `timeout`) and `network`.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] for missing required keys or values of
    /// the wrong shape.
    pub fn from_arguments(
        arguments: &Value,
        defaults: &RequestDefaults,
    ) -> Result<Self, DescriptorError> {
        let map = arguments
            .as_object()
            .ok_or_else(|| DescriptorError::invalid("arguments", "expected an object"))?;

        let mut builder = Self::builder(
            required_str(map, "id", &["id"])?,
            required_str(map, "uri", &["uri"])?,
            required_str(map, "method", &["method"])?,
        )
        .output_destination(required_str(
            map,
            "outputDestination",
            &["outputDestination", "outputPath"],
        )?)
        .timeout(defaults.timeout)
        .transport(defaults.transport);

        if let Some(headers) = present(map, &["headers"]) {
            let headers = headers
                .as_object()
                .ok_or_else(|| DescriptorError::invalid("headers", "expected an object"))?;
            for (name, value) in headers {
                let value = value.as_str().ok_or_else(|| {
                    DescriptorError::invalid("headers", format!("value of `{name}` is not a string"))
                })?;
                builder = builder.header(name.as_str(), value);
            }
        }

        if let Some(body) = present(map, &["body"]) {
            builder = builder.body(body_bytes(body)?);
        }

        if let Some(timeout) = present(map, &["timeoutMs", "timeout"]) {
            let millis = timeout
                .as_u64()
                .filter(|millis| *millis > 0)
                .ok_or_else(|| DescriptorError::invalid("timeoutMs", "expected a positive integer"))?;
            builder = builder.timeout(Duration::from_millis(millis));
        }

        if let Some(network) = present(map, &["network"]) {
            let network = network
                .as_str()
                .ok_or_else(|| DescriptorError::invalid("network", "expected a string"))?;
            builder = builder.transport(network.parse()?);
        }

        builder.build()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn transport(&self) -> TransportClass {
        self.transport
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Applies to acquisition, connect and each read.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn output_destination(&self) -> &Path {
        &self.output_destination
    }
}

/// Builder for [`RequestDescriptor`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RequestDescriptorBuilder {
    id: String,
    uri: String,
    method: String,
    transport: TransportClass,
    headers: Headers,
    body: Option<Vec<u8>>,
    timeout: Duration,
    output_destination: Option<PathBuf>,
}

impl RequestDescriptorBuilder {
    #[must_use]
    pub fn transport(mut self, transport: TransportClass) -> Self {
        self.transport = transport;
        self
    }

    /// Adds a header; a repeated name replaces the earlier value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn output_destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_destination = Some(path.into());
        self
    }

    /// Validates every field and produces the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] when a field is empty or malformed.
    pub fn build(self) -> Result<RequestDescriptor, DescriptorError> {
        if self.id.trim().is_empty() {
            return Err(DescriptorError::invalid("id", "must not be empty"));
        }

        let uri = parse_uri(&self.uri)?;
        let method = parse_method(&self.method)?;

        for (name, value) in self.headers.iter() {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| DescriptorError::invalid("headers", format!("bad header name `{name}`")))?;
            HeaderValue::from_str(value).map_err(|_| {
                DescriptorError::invalid("headers", format!("bad value for header `{name}`"))
            })?;
        }

        if self.timeout.is_zero() {
            return Err(DescriptorError::invalid("timeoutMs", "must be greater than zero"));
        }

        let output_destination = self
            .output_destination
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(DescriptorError::missing("outputDestination"))?;

        Ok(RequestDescriptor {
            id: self.id,
            uri,
            method,
            transport: self.transport,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
            output_destination,
        })
    }
}

fn parse_uri(raw: &str) -> Result<Url, DescriptorError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DescriptorError::invalid("uri", "must not be empty"));
    }
    let uri = Url::parse(raw).map_err(|e| DescriptorError::invalid("uri", format!("{raw}: {e}")))?;
    if !matches!(uri.scheme(), "http" | "https") {
        return Err(DescriptorError::invalid(
            "uri",
            format!("unsupported scheme `{}`", uri.scheme()),
        ));
    }
    if uri.host_str().is_none_or(str::is_empty) {
        return Err(DescriptorError::invalid("uri", format!("{raw}: missing host")));
    }
    Ok(uri)
}

fn parse_method(raw: &str) -> Result<Method, DescriptorError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DescriptorError::invalid("method", "must not be empty"));
    }
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| DescriptorError::invalid("method", format!("`{raw}` is not an HTTP method token")))
}

fn present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

fn required_str<'a>(
    map: &'a Map<String, Value>,
    field: &'static str,
    keys: &[&str],
) -> Result<&'a str, DescriptorError> {
    present(map, keys)
        .ok_or(DescriptorError::missing(field))?
        .as_str()
        .ok_or_else(|| DescriptorError::invalid(field, "expected a string"))
}

fn body_bytes(body: &Value) -> Result<Vec<u8>, DescriptorError> {
    match body {
        Value::String(text) => Ok(text.clone().into_bytes()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| DescriptorError::invalid("body", "byte values must be 0..=255"))
            })
            .collect(),
        _ => Err(DescriptorError::invalid(
            "body",
            "expected a string or an array of bytes",
        )),
    }
}
