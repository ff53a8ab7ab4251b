//! Response streaming for pack exchanges.
//!
//! Turns a [`PackStream`] into an HTTP response whose body is forwarded
//! chunk by chunk as the pack process produces it. A spawned task drives the
//! pack stream into a bounded channel under one deadline, so the budget holds
//! even while the client has stopped reading. When it passes, the pack
//! stream is dropped, which kills the process, and the body ends with an
//! error so the connection is aborted instead of looking like a complete
//! response.

use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::Response,
};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use gitweb_git::{GitError, PackService, PackStream};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Chunks buffered between the pack process and a slow client.
const FORWARD_BUFFER: usize = 8;

/// What a response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// `GET info/refs`.
    Advertisement,
    /// `POST <service>`.
    Result,
}

impl ResponseKind {
    /// Content type of this kind of response for `service`.
    pub fn content_type(self, service: PackService) -> &'static str {
        match self {
            ResponseKind::Advertisement => service.advertisement_content_type(),
            ResponseKind::Result => service.result_content_type(),
        }
    }
}

/// Wraps the output of a pack process as a streaming HTTP response.
pub fn stream_response(
    service: PackService,
    kind: ResponseKind,
    output: PackStream,
    timeout: Duration,
) -> Response {
    let deadline = Instant::now() + timeout;
    let body = Body::from_stream(with_deadline(output, deadline, timeout));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(kind.content_type(service)),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

/// Receiving end of a forwarding task. Dropping it aborts the task.
struct Forwarder {
    chunks: mpsc::Receiver<Bytes>,
    task: JoinHandle<Option<GitError>>,
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Ends `output` with [`GitError::ExchangeTimeout`] once `deadline` passes.
///
/// `output` is driven by a spawned task, so the deadline is enforced whether
/// or not the returned stream is being polled. `output` is dropped as soon
/// as it ends, fails, runs out of time or the returned stream is dropped.
/// Must be called from within a tokio runtime.
pub fn with_deadline<S>(
    output: S,
    deadline: Instant,
    budget: Duration,
) -> impl Stream<Item = Result<Bytes, GitError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, GitError>> + Send + Unpin + 'static,
{
    let (tx, chunks) = mpsc::channel(FORWARD_BUFFER);

    let task = tokio::spawn(async move {
        let forward = async move {
            let mut output = output;
            while let Some(item) = output.next().await {
                match item {
                    Ok(chunk) => {
                        if tx.send(chunk).await.is_err() {
                            return None;
                        }
                    }
                    Err(e) => return Some(e),
                }
            }
            None
        };

        match tokio::time::timeout_at(deadline, forward).await {
            Ok(Some(e)) => {
                if !matches!(e, GitError::PackProcess { .. }) {
                    tracing::error!(error = %e, "Pack exchange failed mid-response");
                }
                Some(e)
            }
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = budget.as_secs(),
                    "Pack exchange timed out, process terminated"
                );
                Some(GitError::ExchangeTimeout(budget))
            }
        }
    });

    stream::unfold(Some(Forwarder { chunks, task }), |forwarder| async move {
        let mut forwarder = forwarder?;

        if let Some(chunk) = forwarder.chunks.recv().await {
            return Some((Ok(chunk), Some(forwarder)));
        }
        match (&mut forwarder.task).await {
            Ok(Some(e)) => Some((Err(e), None)),
            Ok(None) => None,
            Err(e) => Some((Err(GitError::Io(io::Error::other(e))), None)),
        }
    })
}
