//! Byte-range file serving for `/file/{path}`.
//!
//! Each request goes `admit` (guard + existence) → range validation → a full (200) or
//! partial (206) body. The body is a [`SpanStream`], which owns the open file and records
//! whether the span was delivered, the client went away, or the read failed.

use std::io;
use std::path::{Path as FsPath, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use http_range_header::parse_range_header;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use crate::http::state::AppState;
use crate::library::Library;
use crate::media::mime::content_type;
use crate::media::title::format_size;

/// How a span body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every requested byte was yielded.
    Completed,
    /// The body was dropped early: the client closed or aborted the connection.
    Cancelled { sent: u64, expected: u64 },
    /// Reading the file failed or it ended before the span did.
    Failed { sent: u64, expected: u64 },
}

/// Why a Range header was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("range not satisfiable")]
pub struct Unsatisfiable;

/// Body stream over exactly `expected` bytes of a reader.
///
/// The reader is dropped as soon as the span ends, fails, or the stream itself is dropped,
/// so a cancelled transfer never keeps the file open.
pub struct SpanStream<R> {
    inner: Option<ReaderStream<Take<R>>>,
    sent: u64,
    expected: u64,
    label: String,
    outcome: Arc<OnceLock<StreamOutcome>>,
}

impl<R: AsyncRead + Unpin> SpanStream<R> {
    /// `reader` must already be positioned at the first byte of the span.
    pub fn new(reader: R, expected: u64, label: impl Into<String>) -> Self {
        Self {
            inner: Some(ReaderStream::new(reader.take(expected))),
            sent: 0,
            expected,
            label: label.into(),
            outcome: Arc::new(OnceLock::new()),
        }
    }

    /// Observe the outcome after the body has been consumed or dropped.
    pub fn outcome_handle(&self) -> Arc<OnceLock<StreamOutcome>> {
        Arc::clone(&self.outcome)
    }
}

impl<R> SpanStream<R> {
    fn finish(&mut self, outcome: StreamOutcome) {
        self.inner = None;
        if self.outcome.set(outcome).is_err() {
            return;
        }
        match outcome {
            StreamOutcome::Completed => {
                tracing::debug!("Finished sending {} ({} bytes)", self.label, self.sent)
            }
            StreamOutcome::Cancelled { sent, expected } => tracing::info!(
                "Client closed {} after {} of {} bytes",
                self.label,
                sent,
                expected
            ),
            StreamOutcome::Failed { sent, expected } => tracing::warn!(
                "Stopped sending {} after {} of {} bytes",
                self.label,
                sent,
                expected
            ),
        }
    }
}

impl<R: AsyncRead + Unpin> Stream for SpanStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                // The transport stops polling once Content-Length bytes are out, so the
                // span is complete here, not at the trailing `None`.
                if this.sent >= this.expected {
                    this.finish(StreamOutcome::Completed);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!("Read error on {}: {}", this.label, e);
                let (sent, expected) = (this.sent, this.expected);
                this.finish(StreamOutcome::Failed { sent, expected });
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) if this.sent < this.expected => {
                // File shrank under us; fail the body so the transport aborts instead of
                // waiting for bytes that will never come.
                let (sent, expected) = (this.sent, this.expected);
                this.finish(StreamOutcome::Failed { sent, expected });
                Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file ended before the requested span",
                ))))
            }
            Poll::Ready(None) => {
                this.finish(StreamOutcome::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> Drop for SpanStream<R> {
    fn drop(&mut self) {
        if self.outcome.get().is_none() {
            let (sent, expected) = (self.sent, self.expected);
            if sent >= expected {
                self.finish(StreamOutcome::Completed);
            } else {
                self.finish(StreamOutcome::Cancelled { sent, expected });
            }
        }
    }
}

/// Resolve a `Range` header against `file_size` into an inclusive `(start, end)` span.
///
/// Only the first range of a multi-range header is honoured. The suffix form
/// (`bytes=-500`) is refused, as is any span with `start > end` or `end >= file_size`.
pub fn requested_span(range: &str, file_size: u64) -> Result<(u64, u64), Unsatisfiable> {
    let first = range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|set| set.split(',').next())
        .map(str::trim)
        .ok_or(Unsatisfiable)?;
    let (raw_start, raw_end) = first.split_once('-').ok_or(Unsatisfiable)?;
    if raw_start.trim().is_empty() {
        return Err(Unsatisfiable);
    }

    let ranges = parse_range_header(range.trim())
        .and_then(|parsed| parsed.validate(file_size))
        .map_err(|_| Unsatisfiable)?;
    let span = ranges.into_iter().next().ok_or(Unsatisfiable)?;
    let (start, mut end) = (*span.start(), *span.end());

    // An explicit end past the file is an error here, not something to clamp.
    if let Ok(explicit_end) = raw_end.trim().parse::<u64>() {
        end = explicit_end;
    }
    if start > end || end >= file_size {
        return Err(Unsatisfiable);
    }
    Ok((start, end))
}

/// Guard and existence checks. Returns the resolved path and its size, or the terminal
/// 403/404 response.
fn admit(library: &Library, raw: &str) -> Result<(PathBuf, u64), Response> {
    let requested = FsPath::new(raw);
    let Some(path) = library.guard().permit(requested) else {
        tracing::warn!(
            target: "security",
            "Refused access outside media roots: {}",
            raw
        );
        return Err((StatusCode::FORBIDDEN, "Access denied.").into_response());
    };

    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Ok((path, meta.len())),
        _ => Err((StatusCode::NOT_FOUND, "File not found.").into_response()),
    }
}

fn base_headers(path: &FsPath, content_length: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(path)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers
}

fn unsatisfiable(file_size: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE, format!("bytes */{}", file_size))],
    )
        .into_response()
}

fn display_name(path: &FsPath) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// HEAD /file/{path}: status and headers of a full GET, without opening the file.
pub async fn serve_file_head(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    match admit(state.library(), &raw) {
        Ok((path, size)) => (StatusCode::OK, base_headers(&path, size)).into_response(),
        Err(rejection) => rejection,
    }
}

/// GET /file/{path}: full body, or a single byte range per the `Range` header.
pub async fn serve_file_get(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    req_headers: HeaderMap,
) -> Response {
    let (path, file_size) = match admit(state.library(), &raw) {
        Ok(admitted) => admitted,
        Err(rejection) => return rejection,
    };
    let name = display_name(&path);

    let span = match req_headers.get(header::RANGE) {
        None => None,
        Some(value) => {
            let parsed = value
                .to_str()
                .map_err(|_| Unsatisfiable)
                .and_then(|range| requested_span(range, file_size));
            match parsed {
                Ok(span) => Some(span),
                Err(_) => {
                    tracing::info!("Unsatisfiable range {:?} for {} ({} bytes)", value, name, file_size);
                    return unsatisfiable(file_size);
                }
            }
        }
    };

    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("Failed to open file {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some((start, end)) = span else {
        tracing::info!("Serving full file: {} ({})", name, format_size(file_size));
        let body = Body::from_stream(SpanStream::new(file, file_size, format!("{name} (full)")));
        return (StatusCode::OK, base_headers(&path, file_size), body).into_response();
    };

    let length = end - start + 1;
    tracing::info!(
        "Client requested chunk {} [{}-{}] ({})",
        name,
        start,
        end,
        format_size(length)
    );

    if let Err(e) = file.seek(io::SeekFrom::Start(start)).await {
        tracing::error!("Failed to seek in file {}: {}", path.display(), e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut headers = base_headers(&path, length);
    let content_range = format!("bytes {}-{}/{}", start, end, file_size);
    match HeaderValue::from_str(&content_range) {
        Ok(value) => {
            headers.insert(header::CONTENT_RANGE, value);
        }
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }

    let label = format!("{name} [{start}-{end}]");
    let body = Body::from_stream(SpanStream::new(file, length, label));
    (StatusCode::PARTIAL_CONTENT, headers, body).into_response()
}
