//! Git pack exchange error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during a smart HTTP pack exchange.
#[derive(Debug, Error)]
pub enum GitError {
    /// The requested service is not one of the pack services.
    #[error("unsupported service: {0}")]
    UnsupportedService(String),

    /// The request body uses a content encoding we cannot decode.
    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// The gzip-encoded request body could not be decoded.
    #[error("invalid gzip request body: {0}")]
    InvalidGzip(#[source] std::io::Error),

    /// The pack process could not be started.
    #[error("failed to spawn pack process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The pack process terminated unsuccessfully.
    #[error("pack process failed with {}", exit_description(.exit_code))]
    PackProcess {
        /// Exit code, `None` when the process was killed by a signal.
        exit_code: Option<i32>,
        /// Everything the process wrote to stderr.
        stderr: Vec<u8>,
    },

    /// The exchange did not complete within its time budget.
    #[error("pack exchange exceeded {0:?}")]
    ExchangeTimeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_description(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}
