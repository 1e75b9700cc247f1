//! TCP accept loop and shared server context.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::auth;
use crate::config::Config;
use crate::connection;
use crate::errors::ServerError;
use crate::registry::SessionRegistry;
use crate::store::EntityStore;

/// Everything a command handler needs, shared across connection tasks.
/// Constructed once; no global state anywhere in the server.
pub struct ServerContext {
    pub config: Config,
    pub store: Arc<dyn EntityStore>,
    pub registry: SessionRegistry,
}

/// A bound listener plus its context. `bind` and `serve` are separate so
/// tests can bind to port 0 and read the assigned address before serving.
pub struct Server {
    ctx: Arc<ServerContext>,
    listener: TcpListener,
}

impl Server {
    /// Binds the listener and creates the bootstrap admin account if the
    /// store has no admin yet.
    pub async fn bind(config: Config, store: Arc<dyn EntityStore>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        let ctx = Arc::new(ServerContext {
            config,
            store,
            registry: SessionRegistry::new(),
        });
        auth::ensure_bootstrap_admin(&ctx)
            .await
            .map_err(|e| ServerError::Bootstrap(e.to_string()))?;
        Ok(Self { ctx, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the token is cancelled. Each connection
    /// runs in its own task; the semaphore caps how many run at once, and
    /// accepting pauses while the server is full.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let limit = Arc::new(Semaphore::new(self.ctx.config.max_connections));
        info!(
            target: "parley_server::server",
            addr = %self.local_addr()?,
            max_connections = self.ctx.config.max_connections,
            "listening"
        );

        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // The semaphore is never closed while we hold it.
                    Err(_) => break,
                },
            };
            let (stream, peer) = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(
                            target: "parley_server::server",
                            error = %err,
                            "accept failed"
                        );
                        continue;
                    }
                },
            };

            let ctx = Arc::clone(&self.ctx);
            let child = shutdown.child_token();
            tokio::spawn(async move {
                connection::serve_connection(ctx, stream, peer, child).await;
                drop(permit);
            });
        }

        info!(target: "parley_server::server", "accept loop stopped");
        Ok(())
    }
}
