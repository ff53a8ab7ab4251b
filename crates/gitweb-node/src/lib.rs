//! # Gitweb Node
//!
//! HTTP server exposing bare git repositories over the smart HTTP protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      HTTP API Layer                      │
//! │  request id ─► feature flag ─► basic auth ─► handler     │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!              repository path resolution (repo)
//!                              │
//! ┌──────────────────────────────────────────────────────────┐
//! │                   gitweb-git pack bridge                 │
//! │  git upload-pack / receive-pack --stateless-rpc <repo>   │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!              streamed response with deadline (streamer)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin gitweb-node -- --repos-path /srv/repos --listen-addr 0.0.0.0:8000
//! git clone http://localhost:8000/team/app.git
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Router, handlers and error responses
//! - [`auth`] - HTTP Basic auth gate
//! - [`config`] - Layered configuration
//! - [`observability`] - Structured logging and request IDs
//! - [`repo`] - Repository path resolution
//! - [`streamer`] - Streaming pack responses under a deadline
//!
//! ## Example: Serving a repository root
//!
//! ```rust,no_run
//! use gitweb_node::api::{create_router, AppState};
//! use gitweb_node::config::Config;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config {
//!     repos_path: "/srv/repos".into(),
//!     ..Config::default()
//! };
//! let app = create_router(AppState::from_config(&config));
//! let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod observability;
pub mod repo;
pub mod streamer;
