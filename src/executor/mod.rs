//! Request execution over an acquired network handle.
//!
//! [`RequestExecutor::execute`] performs one HTTP exchange and reports the
//! outcome only through events: an optional Status event, one Progress
//! event per written chunk, and exactly one Complete or Error event. It
//! never returns an error to its caller.
//!
//! # Streaming
//!
//! The response body is written to the descriptor's output destination as it
//! arrives. Network chunks larger than [`ExecutorOptions::max_chunk_size`]
//! are split so progress granularity stays bounded. An HTTP error status is
//! still a response: its body is written and the request completes with it.
//!
//! # Cancellation
//!
//! Cancelling the emitter's token aborts connect or read at the next await
//! point, removes the partial output file and suppresses every further event.

mod client;
mod error;

use std::path::Path;

use futures_util::{Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

pub use error::RequestError;

use crate::events::{Cancelled, RequestEmitter};
use crate::network::NetworkHandle;
use crate::request::{Headers, RequestDescriptor};

/// Largest slice of body reported in a single Progress event (64 KiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Tunables for [`RequestExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Emit a Status event before the first body byte.
    pub emit_status: bool,
    /// Network chunks above this size are reported in several Progress events.
    pub max_chunk_size: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            emit_status: true,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

/// Performs HTTP exchanges and streams their bodies to disk.
#[derive(Debug, Clone, Default)]
pub struct RequestExecutor {
    options: ExecutorOptions,
}

/// Why an exchange stopped before completing.
enum Interrupted {
    Cancelled,
    Failed(RequestError),
}

impl From<Cancelled> for Interrupted {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<RequestError> for Interrupted {
    fn from(error: RequestError) -> Self {
        Self::Failed(error)
    }
}

struct Completion {
    status_code: u16,
    headers: Headers,
    bytes_downloaded: u64,
}

impl RequestExecutor {
    #[must_use]
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Runs `request` over `handle`, reporting everything through `emitter`.
    ///
    /// Consumes the handle; handles are never reused across requests.
    #[instrument(skip_all, fields(id = %request.id(), uri = %request.uri(), transport = %handle.transport()))]
    pub async fn execute(
        &self,
        handle: NetworkHandle,
        request: &RequestDescriptor,
        mut emitter: RequestEmitter,
    ) {
        match self.exchange(&handle, request, &mut emitter).await {
            Ok(done) => {
                info!(
                    status = done.status_code,
                    bytes = done.bytes_downloaded,
                    "request complete"
                );
                emitter.complete(
                    done.status_code,
                    done.headers,
                    request.output_destination().to_path_buf(),
                    done.bytes_downloaded,
                );
            }
            Err(Interrupted::Cancelled) => debug!("request cancelled"),
            Err(Interrupted::Failed(error)) => {
                warn!(kind = %error.kind(), error = %error, "request failed");
                emitter.error(error.kind(), error.to_string());
            }
        }
    }

    async fn exchange(
        &self,
        handle: &NetworkHandle,
        request: &RequestDescriptor,
        emitter: &mut RequestEmitter,
    ) -> Result<Completion, Interrupted> {
        let uri = request.uri().as_str();
        let client = client::build_pinned_client(handle, request.timeout())?;
        let pending = client::prepare(&client, request)?.send();
        let cancel = emitter.cancellation().clone();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Interrupted::Cancelled),
            result = pending => result.map_err(|e| RequestError::connection(uri, e))?,
        };

        let status_code = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let total_bytes = content_length(response.headers());
        debug!(status = status_code, total_bytes = ?total_bytes, "response received");

        if self.options.emit_status {
            emitter.status(status_code, headers.clone(), total_bytes)?;
        }

        let path = request.output_destination();
        let file = File::create(path)
            .await
            .map_err(|e| RequestError::sink(path, e))?;
        let body = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| RequestError::connection(uri, e))),
        );

        match stream_body(body, file, path, total_bytes, self.options.max_chunk_size, emitter).await
        {
            Ok(bytes_downloaded) => Ok(Completion {
                status_code,
                headers,
                bytes_downloaded,
            }),
            Err(interrupted) => {
                remove_partial(path).await;
                Err(interrupted)
            }
        }
    }
}

/// Writes every chunk of `body` to `file`, emitting progress as it goes.
///
/// Returns the number of bytes written. The file is flushed and closed
/// before this returns on every path.
async fn stream_body<S, B>(
    mut body: S,
    file: File,
    path: &Path,
    total_bytes: Option<u64>,
    max_chunk_size: usize,
    emitter: &mut RequestEmitter,
) -> Result<u64, Interrupted>
where
    S: Stream<Item = Result<B, RequestError>> + Unpin,
    B: AsRef<[u8]>,
{
    let cancel = emitter.cancellation().clone();
    let mut writer = BufWriter::new(file);
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Interrupted::Cancelled),
            next = body.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;

        for piece in chunk.as_ref().chunks(max_chunk_size.max(1)) {
            writer
                .write_all(piece)
                .await
                .map_err(|e| RequestError::sink(path, e))?;
            bytes_written += piece.len() as u64;
            emitter.progress(bytes_written, total_bytes)?;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| RequestError::sink(path, e))?;
    Ok(bytes_written)
}

async fn remove_partial(path: &Path) {
    debug!(path = %path.display(), "removing partial output");
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove partial output");
    }
}

/// Flattens multi-valued headers into one `", "`-joined value per name.
fn flatten_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers.append(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }
    headers
}

fn content_length(map: &HeaderMap) -> Option<u64> {
    map.get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
