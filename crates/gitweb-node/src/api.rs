//! HTTP API for the gitweb server.
//!
//! Implements the git smart HTTP protocol endpoints for clone, fetch and
//! push. Each request is gated, in order, by the feature flag and the auth
//! gate, then resolved to a repository on disk and handed to a pack process.

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use gitweb_git::{
    ClientPayload, ContentEncoding, GitCommand, GitError, PackExchangeRequest, PackService,
};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::auth::{require_basic_auth, BasicAuth, AUTH_REALM};
use crate::config::Config;
use crate::observability::request_id_layer;
use crate::repo::RepoResolver;
use crate::streamer::{stream_response, ResponseKind};

/// Application state shared across handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Maps URL segments to repositories on disk.
    pub resolver: Arc<RepoResolver>,
    /// Credentials required on git routes, if any.
    pub auth: Option<Arc<BasicAuth>>,
    /// Git executable running the pack processes.
    pub git: GitCommand,
    /// Upper bound on one pack exchange.
    pub exchange_timeout: Duration,
    /// Whether the git routes are served.
    pub git_http_enabled: bool,
}

impl AppState {
    /// Builds the state described by `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            resolver: Arc::new(RepoResolver::new(
                config.repos_path.clone(),
                config.disallowed_dirs.iter().cloned(),
            )),
            auth: config
                .login_password
                .as_ref()
                .map(|password| Arc::new(BasicAuth::new(&config.login_username, password))),
            git: GitCommand::new(&config.git_binary),
            exchange_timeout: config.exchange_timeout(),
            git_http_enabled: config.http_git_enabled,
        }
    }

    /// Returns true if the git smart HTTP routes are served.
    pub fn is_git_http_enabled(&self) -> bool {
        self.git_http_enabled
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("repository not found: {0}")]
    RepoNotFound(String),
    #[error("The service 'Git Smart HTTP' has been disabled")]
    Disabled,
    #[error("authentication required")]
    Unauthorized,
    #[error(transparent)]
    Git(#[from] GitError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::RepoNotFound(_) | ApiError::Disabled => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Git(GitError::UnsupportedService(_)) => StatusCode::NOT_FOUND,
            ApiError::Git(GitError::UnsupportedEncoding(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ApiError::Git(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Git request failed");
        }

        let mut response = (status, Json(ErrorResponse { error: self.to_string() })).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        if matches!(self, ApiError::Unauthorized) {
            if let Ok(challenge) = HeaderValue::from_str(&format!("Basic realm=\"{AUTH_REALM}\"")) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, challenge);
            }
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Query of a ref advertisement request.
#[derive(Debug, Deserialize)]
pub struct InfoRefsQuery {
    /// Requested service, e.g. `git-upload-pack`.
    pub service: Option<String>,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    let mut git_routes = Router::new()
        .route("/{dir}/{repo}/info/refs", get(git_info_refs))
        .route("/{dir}/{repo}/{service}", post(git_service_rpc));

    if let Some(auth) = state.auth.clone() {
        git_routes = git_routes.route_layer(middleware::from_fn_with_state(auth, require_basic_auth));
    }

    // Added last so it runs before the auth gate.
    let git_routes = git_routes.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_git_http_enabled,
    ));

    Router::new()
        .route("/health", get(health_check))
        .merge(git_routes)
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}

/// Answers 404 on every git route while smart HTTP is disabled.
async fn require_git_http_enabled(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.is_git_http_enabled() {
        return Err(ApiError::Disabled);
    }
    Ok(next.run(request).await)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Strips the `.git` suffix every repository URL carries.
fn repo_name(segment: &str) -> Result<&str, ApiError> {
    segment
        .strip_suffix(".git")
        .ok_or_else(|| ApiError::RepoNotFound(segment.to_string()))
}

/// Git info/refs endpoint - advertises references.
async fn git_info_refs(
    State(state): State<AppState>,
    Path((dir, repo)): Path<(String, String)>,
    Query(query): Query<InfoRefsQuery>,
) -> Result<Response, ApiError> {
    let service = PackService::resolve(query.service.as_deref().unwrap_or_default())?;
    let name = repo_name(&repo)?;
    let path = state.resolver.repository_path_for(&dir, name).await?;

    tracing::info!(dir = %dir, name = %name, service = %service, "Advertising refs");

    let output = state.git.spawn(PackExchangeRequest::advertise(path, service))?;
    Ok(stream_response(
        service,
        ResponseKind::Advertisement,
        output,
        state.exchange_timeout,
    ))
}

/// Git upload-pack and receive-pack endpoint - handles fetch, clone and push.
async fn git_service_rpc(
    State(state): State<AppState>,
    Path((dir, repo, service)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let service = PackService::resolve(&service)?;
    let name = repo_name(&repo)?;
    let path = state.resolver.repository_path_for(&dir, name).await?;

    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
    let encoding = ContentEncoding::from_header(encoding.as_deref())?;

    tracing::info!(
        dir = %dir,
        name = %name,
        service = %service,
        encoding = ?encoding,
        "Starting pack exchange"
    );

    let body = body
        .into_data_stream()
        .map_err(|e| GitError::Io(io::Error::other(e)));
    let payload = ClientPayload::from_stream(body, encoding);

    let output = state
        .git
        .spawn(PackExchangeRequest::exchange(path, service, payload))?;
    Ok(stream_response(
        service,
        ResponseKind::Result,
        output,
        state.exchange_timeout,
    ))
}
