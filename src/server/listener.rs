use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{Config, UpstreamConfig};
use crate::proxy::connection::ClientConnection;
use crate::proxy::table::TranslationTable;

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Listener {
    inner: TcpListener,
    table: TranslationTable,
    upstream: Arc<UpstreamConfig>,
}

impl Listener {
    pub async fn bind(cfg: &Config) -> Result<Self> {
        let inner = TcpListener::bind(&cfg.server.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", cfg.server.listen_addr))?;

        info!("Listening on {}", inner.local_addr()?);
        info!("Forwarding to upstream at {}", cfg.upstream.addr);

        Ok(Self {
            inner,
            table: TranslationTable::new(),
            upstream: Arc::new(cfg.upstream.clone()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Handle on the table shared by every connection of this listener
    pub fn table(&self) -> TranslationTable {
        self.table.clone()
    }

    /// Accept clients forever, one task per connection.
    pub async fn run(self) -> Result<()> {
        loop {
            let (socket, peer) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            info!("Accepted connection from {}", peer);

            let table = self.table.clone();
            let upstream = self.upstream.clone();
            tokio::spawn(async move {
                let mut conn = ClientConnection::new(socket, peer, table, upstream);
                if let Err(e) = conn.run().await {
                    error!("Connection error from {}: {:#}", peer, e);
                }
            });
        }
    }
}

pub async fn run(cfg: &Config) -> Result<()> {
    Listener::bind(cfg).await?.run().await
}
