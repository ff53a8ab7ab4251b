//! Gitweb Node - git smart HTTP server.

use anyhow::Context;
use clap::Parser;
use gitweb_node::{
    api::{create_router, AppState},
    config::{Config, DEFAULT_CONFIG_FILE},
    observability::{init_logging, LogFormat},
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Gitweb Node - serve bare git repositories over smart HTTP
#[derive(Parser, Debug)]
#[command(name = "gitweb-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// HTTP listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Root directory holding <dir>/<name>.git repositories
    #[arg(long)]
    repos_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, value_enum, ignore_case = true)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(path) = self.repos_path {
            config.repos_path = path;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);

    init_logging(&config.log_level, config.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting gitweb node");
    tracing::info!(
        listen_addr = %config.listen_addr,
        repos_path = %config.repos_path.display(),
        git_binary = %config.git_binary.display(),
        http_git_enabled = config.http_git_enabled,
        exchange_timeout_secs = config.exchange_timeout_secs,
        "Node configuration"
    );

    if config.login_password.is_none() {
        tracing::warn!("No login_password configured, git routes are served without authentication");
    }
    if !config.repos_path.is_dir() {
        tracing::warn!(
            repos_path = %config.repos_path.display(),
            "Repository root does not exist, every repository will be reported missing"
        );
    }

    let app = create_router(AppState::from_config(&config));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Gitweb node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
