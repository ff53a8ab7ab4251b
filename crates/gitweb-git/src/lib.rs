//! Git smart HTTP pack exchange for gitweb.
//!
//! This crate bridges HTTP requests to git's own pack protocol processes.
//! Pack negotiation and the pack format itself are left entirely to
//! `git upload-pack` and `git receive-pack` running in stateless-RPC mode;
//! this crate spawns them, feeds them the request body and streams their
//! output back.
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use gitweb_git::{GitCommand, PackExchangeRequest, PackService};
//!
//! # async fn run() -> gitweb_git::Result<()> {
//! let service = PackService::resolve("git-upload-pack")?;
//! let request = PackExchangeRequest::advertise("/srv/repos/team/app.git", service);
//! let mut output = GitCommand::default().spawn(request)?;
//! while let Some(chunk) = output.try_next().await? {
//!     // forward chunk to the client
//!     let _ = chunk;
//! }
//! # Ok(())
//! # }
//! ```

mod advertisement;
mod bridge;
mod error;
mod payload;
mod pktline;
mod service;

pub use advertisement::encode_advertisement;
pub use bridge::{GitCommand, PackExchangeRequest, PackStream, ProcessOutcome};
pub use error::GitError;
pub use payload::{decode_gzip, ClientPayload, ContentEncoding, PayloadStream, MAX_DECODED_CHUNK};
pub use pktline::{PktLine, PktLineReader, MAX_PKT_PAYLOAD};
pub use service::PackService;

/// Result type for pack exchange operations.
pub type Result<T> = std::result::Result<T, GitError>;
