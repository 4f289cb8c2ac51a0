//! Upstream connection per request
//!
//! Every request gets a fresh TCP connection to the file server. The local
//! port the OS assigns to that connection doubles as the NAT key, which is
//! only unique because connections are never pooled.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use crate::config::UpstreamConfig;
use crate::protocol::framer::LineReader;
use crate::proxy::table::NatKey;

pub struct UpstreamSession {
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    key: NatKey,
    peer: SocketAddr,
}

impl UpstreamSession {
    /// Dial the upstream and derive the NAT key from the local port.
    pub async fn open(config: &UpstreamConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout(), TcpStream::connect(&config.addr))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to upstream {}", config.addr))?;

        let key = stream
            .local_addr()
            .context("Failed to read local address of upstream connection")?
            .port();
        let peer = stream
            .peer_addr()
            .context("Failed to read upstream peer address")?;

        tracing::trace!(nat_port = key, upstream = %peer, "Connected to upstream");

        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: LineReader::new(read_half),
            writer,
            key,
            peer,
        })
    }

    pub fn key(&self) -> NatKey {
        self.key
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one already-normalized request line.
    pub async fn send_request(&mut self, request: &str) -> Result<()> {
        self.writer
            .write_all(request.as_bytes())
            .await
            .context("Failed to send request upstream")?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn reader(&mut self) -> &mut LineReader<OwnedReadHalf> {
        &mut self.reader
    }

    /// Half-close towards the upstream; the socket is released on drop.
    pub async fn close(mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .context("Failed to close upstream connection")
    }
}
