//! Connection acceptor
//!
//! Owns the listening socket and runs one task per accepted connection.
//! Shutdown (a permitted `quit`, a signal, or [`Server::shutdown_token`])
//! stops accepting at once, drops the listener so new connection attempts are
//! refused, closes every active session and waits for them up to the grace
//! period.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use bandman_common::config::ServerConfig;
use bandman_common::credentials::CredentialStore;
use bandman_common::repository::Repository;
use bandman_common::Result;

use crate::session::{Session, SessionContext, SessionEnd, SessionPolicy};

/// Pause after a failed `accept` (e.g. file descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    grace: Duration,
}

impl Server {
    /// Bind the configured address; port 0 picks a free port
    pub async fn bind(
        config: &ServerConfig,
        repository: Arc<dyn Repository>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let addr = SocketAddr::new(config.bind, config.port);
        let listener = TcpListener::bind(addr).await?;
        let ctx = SessionContext::new(repository, credentials, SessionPolicy::from_config(config));
        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
            grace: config.shutdown_grace(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the service when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.ctx.shutdown.clone()
    }

    /// Accept connections until shutdown, then drain the sessions
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            ctx,
            grace,
        } = self;
        let shutdown = ctx.shutdown.clone();
        let mut sessions: JoinSet<SessionEnd> = JoinSet::new();

        info!(addr = %listener.local_addr()?, "Accepting connections");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%peer, "Could not set TCP_NODELAY: {}", e);
                        }
                        let session = Session::new(stream, ctx.clone());
                        let span = info_span!("session", session_id = %session.id(), %peer);
                        span.in_scope(|| info!(active = sessions.len() + 1, "Connected"));
                        sessions.spawn(session.run().instrument(span));
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_end(joined);
                }
            }
        }

        drop(listener);
        info!(active = sessions.len(), "Shutting down, no longer accepting connections");

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = sessions.join_next().await {
                log_session_end(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = sessions.len(),
                "Sessions still running after {:?}, aborting",
                grace
            );
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        }

        info!("Service stopped");
        Ok(())
    }
}

fn log_session_end(joined: std::result::Result<SessionEnd, JoinError>) {
    match joined {
        Ok(end) => debug!(?end, "Session task finished"),
        Err(e) if e.is_cancelled() => debug!("Session task aborted"),
        Err(e) => error!("Session task panicked: {}", e),
    }
}
