//! # Observability
//!
//! - **Structured Logging**: pretty or JSON output filtered by level
//! - **Request Tracing**: a request ID span around every request
//!
//! ```rust,no_run
//! use gitweb_node::observability::{init_logging, request_id_layer, LogFormat};
//! use axum::{routing::get, Router};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let app: Router = Router::new()
//!     .route("/health", get(|| async { "ok" }))
//!     .layer(request_id_layer());
//! ```

mod logging;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use middleware::{request_id_layer, RequestId, REQUEST_ID_HEADER};
