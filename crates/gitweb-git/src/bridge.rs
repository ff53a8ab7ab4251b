//! Pack process bridge.
//!
//! Runs one stateless-RPC exchange with `git upload-pack` or
//! `git receive-pack`: the client payload is written to the process stdin
//! while its stdout is handed back as a lazy stream of chunks. The exit
//! status is only known once stdout is exhausted, so a failing process
//! surfaces as an error at the very end of the stream.
//!
//! ```text
//!  request body ──► [writer task] ──► stdin ┐
//!                                           git <service> --stateless-rpc <repo>
//!  PackStream  ◄── announcement? ◄── stdout ┘        │
//!                                   stderr ──► [drain task]
//! ```
//!
//! Dropping a [`PackStream`] before it completes kills the process.

use crate::advertisement::encode_advertisement;
use crate::payload::ClientPayload;
use crate::service::PackService;
use crate::{GitError, Result};
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;

/// Read size for pack process output.
const OUTPUT_CHUNK_SIZE: usize = 64 * 1024;

/// How long a finished exchange waits for the payload writer to report.
const WRITER_GRACE: Duration = Duration::from_millis(250);

/// One request to be served by a pack process.
#[derive(Debug)]
pub struct PackExchangeRequest {
    repository_path: PathBuf,
    service: PackService,
    advertise_only: bool,
    client_payload: ClientPayload,
}

impl PackExchangeRequest {
    /// A ref advertisement (`GET info/refs`), which never carries a body.
    pub fn advertise(repository_path: impl Into<PathBuf>, service: PackService) -> Self {
        Self {
            repository_path: repository_path.into(),
            service,
            advertise_only: true,
            client_payload: ClientPayload::Empty,
        }
    }

    /// A pack exchange (`POST <service>`) forwarding the client body.
    pub fn exchange(
        repository_path: impl Into<PathBuf>,
        service: PackService,
        client_payload: ClientPayload,
    ) -> Self {
        Self {
            repository_path: repository_path.into(),
            service,
            advertise_only: false,
            client_payload,
        }
    }

    /// Path of the bare repository.
    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    /// Requested service.
    pub fn service(&self) -> PackService {
        self.service
    }

    /// Whether only the refs are advertised.
    pub fn advertise_only(&self) -> bool {
        self.advertise_only
    }
}

/// How a pack process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Everything written to stderr.
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    fn new(status: ExitStatus, stderr: Vec<u8>) -> Self {
        Self {
            exit_code: status.code(),
            stderr,
        }
    }

    /// Returns true if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Converts a failed outcome into [`GitError::PackProcess`].
    pub fn into_result(self) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            Err(GitError::PackProcess {
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// The git executable used to run pack processes.
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: PathBuf,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCommand {
    /// Uses the given git executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Argument vector for an exchange, excluding the program itself.
    pub fn args(request: &PackExchangeRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            request.service.subcommand().into(),
            "--stateless-rpc".into(),
        ];
        if request.advertise_only {
            args.push("--http-backend-info-refs".into());
            args.push("--advertise-refs".into());
        }
        args.push(request.repository_path.clone().into_os_string());
        args
    }

    /// Spawns the pack process and returns its output stream.
    ///
    /// The process is already running when this returns; the payload is
    /// written concurrently with reading the returned stream.
    pub fn spawn(&self, request: PackExchangeRequest) -> Result<PackStream> {
        let announcement = request
            .advertise_only
            .then(|| encode_advertisement(request.service))
            .transpose()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(&request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(GitError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GitError::Spawn(io::Error::other("unable to open stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GitError::Spawn(io::Error::other("unable to open stdout")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| GitError::Spawn(io::Error::other("unable to open stderr")))?;

        tracing::debug!(
            service = %request.service,
            repo = %request.repository_path.display(),
            advertise_only = request.advertise_only,
            pid = ?child.id(),
            "Spawned pack process"
        );

        let writer = tokio::spawn(write_payload(stdin, request.client_payload));
        let stderr = tokio::spawn(async move {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await?;
            Ok::<_, io::Error>(buf)
        });

        let exchange = Exchange {
            service: request.service,
            repository_path: request.repository_path,
            child,
            stdout: ReaderStream::with_capacity(stdout, OUTPUT_CHUNK_SIZE),
            stderr,
            writer,
            bytes_out: 0,
            started: Instant::now(),
            reaped: false,
        };

        Ok(PackStream::new(announcement, exchange))
    }
}

/// Writes the whole payload, then closes stdin so the process sees EOF.
async fn write_payload(mut stdin: ChildStdin, payload: ClientPayload) -> Result<u64> {
    let mut body = payload.into_stream();
    let mut written = 0u64;

    while let Some(chunk) = body.try_next().await? {
        stdin.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    stdin.shutdown().await?;
    drop(stdin);
    Ok(written)
}

/// A running pack process.
struct Exchange {
    service: PackService,
    repository_path: PathBuf,
    child: Child,
    stdout: ReaderStream<ChildStdout>,
    stderr: JoinHandle<io::Result<Vec<u8>>>,
    writer: JoinHandle<Result<u64>>,
    bytes_out: u64,
    started: Instant,
    reaped: bool,
}

impl Exchange {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.stdout.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                self.bytes_out += chunk.len() as u64;
                Ok(Some(chunk))
            }
            None => Ok(None),
        }
    }

    /// Waits for the process to exit once its output is exhausted.
    async fn finish(&mut self) -> Result<()> {
        let status = self.child.wait().await?;
        self.reaped = true;

        let stderr = match (&mut self.stderr).await {
            Ok(result) => result?,
            Err(e) => return Err(io::Error::other(e).into()),
        };
        let outcome = ProcessOutcome::new(status, stderr);

        // A process may exit without consuming all of its input; the writer
        // then fails on a closed pipe or sits on a slow client body.
        let written = match tokio::time::timeout(WRITER_GRACE, &mut self.writer).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(e)) => Some(Err(io::Error::other(e).into())),
            Err(_) => {
                self.writer.abort();
                None
            }
        };

        if !outcome.success() {
            tracing::error!(
                service = %self.service,
                repo = %self.repository_path.display(),
                exit_code = ?outcome.exit_code,
                stderr = %String::from_utf8_lossy(&outcome.stderr).trim_end(),
                "Pack process failed"
            );
            return outcome.into_result();
        }

        let bytes_in = match &written {
            Some(Ok(n)) => Some(*n),
            _ => None,
        };

        match written {
            Some(Err(GitError::Io(e))) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Some(Err(e)) => {
                tracing::warn!(
                    service = %self.service,
                    repo = %self.repository_path.display(),
                    error = %e,
                    "Failed to forward request body"
                );
                return Err(e);
            }
            Some(Ok(_)) | None => {}
        }

        tracing::debug!(
            service = %self.service,
            repo = %self.repository_path.display(),
            bytes_in = ?bytes_in,
            bytes_out = self.bytes_out,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Pack exchange completed"
        );

        Ok(())
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.reaped {
            tracing::debug!(
                service = %self.service,
                repo = %self.repository_path.display(),
                pid = ?self.child.id(),
                "Terminating unfinished pack process"
            );
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(error = %e, "Pack process already gone");
            }
        }
        self.writer.abort();
        self.stderr.abort();
    }
}

/// The output of a pack process as a lazy, non-restartable byte stream.
///
/// Yields the service announcement first for ref advertisements, then the
/// process output in arrival order. Ends with `Ok` only if the process exits
/// successfully; otherwise the final item is the error.
pub struct PackStream {
    inner: BoxStream<'static, Result<Bytes>>,
}

impl PackStream {
    fn new(announcement: Option<Bytes>, exchange: Exchange) -> Self {
        let inner = stream::try_unfold(
            (announcement, exchange),
            |(mut announcement, mut exchange)| async move {
                if let Some(bytes) = announcement.take() {
                    return Ok(Some((bytes, (None, exchange))));
                }

                match exchange.next_chunk().await? {
                    Some(chunk) => Ok(Some((chunk, (None, exchange)))),
                    None => {
                        exchange.finish().await?;
                        Ok(None)
                    }
                }
            },
        )
        .boxed();

        Self { inner }
    }
}

impl Stream for PackStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for PackStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackStream").finish_non_exhaustive()
    }
}
