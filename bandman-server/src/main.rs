//! bandman-server - BandManager catalog service
//!
//! Serves the line-oriented BandManager protocol over TCP: bands log in (or
//! guests browse) and list, add and remove the songs and events of a
//! performer's catalog.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bandman_common::config::{QuitPolicy, ServerConfig};
use bandman_common::credentials::StaticCredentials;
use bandman_common::db::init_database;
use bandman_common::repository::{MemoryRepository, Repository, SqliteRepository};
use bandman_server::logging::init_logging;
use bandman_server::Server;

/// Command-line arguments for bandman-server
#[derive(Parser, Debug)]
#[command(name = "bandman-server")]
#[command(about = "BandManager catalog server")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BANDMAN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "BANDMAN_BIND")]
    bind: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long, env = "BANDMAN_PORT")]
    port: Option<u16>,

    /// SQLite catalog database (created if missing)
    #[arg(short, long, env = "BANDMAN_DATABASE", conflicts_with = "in_memory")]
    database: Option<PathBuf>,

    /// Keep the catalog in memory even if a database is configured
    #[arg(long)]
    in_memory: bool,

    /// Accounts file, one `username password` pair per line
    #[arg(short, long, env = "BANDMAN_ACCOUNTS")]
    accounts: Option<PathBuf>,

    /// Who may stop the service: anyone, authenticated, operators, disabled
    #[arg(long)]
    quit_policy: Option<QuitPolicy>,

    /// Per-connection idle timeout in seconds (0 disables)
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BANDMAN_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Command line values win over the configuration file
    fn apply(self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.in_memory {
            config.database = None;
        } else if let Some(database) = self.database {
            config.database = Some(database);
        }
        if let Some(accounts) = self.accounts {
            config.accounts_file = Some(accounts);
        }
        if let Some(policy) = self.quit_policy {
            config.quit_policy = policy;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_secs = secs;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone();
    let mut config = ServerConfig::resolve(config_path.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_logging(&config.logging.level, config.logging.file.as_deref())?;

    info!(
        "Starting BandManager server (bandman-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: defaults and default config file if present"),
    }

    let credentials = load_credentials(&config)?;
    let repository = open_repository(&config).await?;

    let server = Server::bind(&config, repository, Arc::new(credentials))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.bind, config.port))?;
    info!(
        "Listening on {} (quit policy: {:?})",
        server.local_addr()?,
        config.quit_policy
    );

    tokio::spawn(shutdown_on_signal(server.shutdown_token()));

    server.run().await.context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn load_credentials(config: &ServerConfig) -> Result<StaticCredentials> {
    let mut credentials = match &config.accounts_file {
        Some(path) => StaticCredentials::load(path)?,
        None => StaticCredentials::new(),
    };
    credentials.merge(config.accounts.clone());

    if credentials.is_empty() {
        warn!("No accounts configured, only guest sessions can be served");
    } else {
        info!("{} account(s) available", credentials.len());
    }
    Ok(credentials)
}

async fn open_repository(config: &ServerConfig) -> Result<Arc<dyn Repository>> {
    match &config.database {
        Some(path) => {
            let pool = init_database(path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            info!("✓ Catalog database: {}", path.display());
            Ok(Arc::new(SqliteRepository::new(pool)))
        }
        None => {
            warn!("No database configured, catalog is kept in memory and lost on exit");
            Ok(Arc::new(MemoryRepository::new()))
        }
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
