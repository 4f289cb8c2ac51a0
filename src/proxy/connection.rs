use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::protocol::command::normalize_request;
use crate::protocol::framer::LineReader;
use crate::protocol::response;
use crate::proxy::relay::{RelayOutcome, relay_response};
use crate::proxy::table::{ClientHandle, NatKey, TranslationTable};
use crate::proxy::upstream::UpstreamSession;

/// One accepted client, processed one request at a time.
pub struct ClientConnection<R> {
    reader: LineReader<R>,
    handle: ClientHandle,
    peer: SocketAddr,
    table: TranslationTable,
    upstream: Arc<UpstreamConfig>,
    state: ConnectionState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequest,
    Processing(String),
    Closed,
}

impl ClientConnection<OwnedReadHalf> {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        table: TranslationTable,
        upstream: Arc<UpstreamConfig>,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::from_parts(read_half, write_half, peer, table, upstream)
    }
}

impl<R: AsyncRead + Unpin> ClientConnection<R> {
    pub fn from_parts<W>(
        reader: R,
        writer: W,
        peer: SocketAddr,
        table: TranslationTable,
        upstream: Arc<UpstreamConfig>,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: LineReader::new(reader),
            handle: ClientHandle::new(writer),
            peer,
            table,
            upstream,
            state: ConnectionState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Serve requests until the client disconnects.
    ///
    /// Whatever ends the loop, every mapping left for this client is purged
    /// before returning.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;
        self.state = ConnectionState::Closed;
        self.close().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::AwaitingRequest => {
                    self.state = match self.reader.read_line().await?.into_line() {
                        Some(line) if line.trim().is_empty() => ConnectionState::AwaitingRequest,
                        Some(line) => ConnectionState::Processing(line.trim().to_string()),
                        None => ConnectionState::Closed,
                    };
                }

                ConnectionState::Processing(request_line) => {
                    self.process(&request_line).await;
                    self.state = ConnectionState::AwaitingRequest;
                }

                ConnectionState::Closed => {
                    return Ok(());
                }
            }
        }
    }

    /// Forward one request and relay its response. Never fails: errors become
    /// an `ERR proxy error: ...` line for the client.
    async fn process(&self, request_line: &str) {
        let mut registered = None;

        if let Err(e) = self.forward(request_line, &mut registered).await {
            warn!(
                client = %self.peer,
                nat_port = ?registered,
                cmd = %request_line,
                error = %format!("{e:#}"),
                "Failed to proxy request"
            );
            self.report_error(registered, &format!("proxy error: {e:#}")).await;
        }

        if let Some(key) = registered {
            self.table.remove(key).await;
        }
    }

    async fn forward(
        &self,
        request_line: &str,
        registered: &mut Option<NatKey>,
    ) -> Result<RelayOutcome> {
        let mut session = UpstreamSession::open(&self.upstream).await?;
        let key = session.key();

        self.table.register(key, self.handle.clone(), self.peer).await;
        *registered = Some(key);

        info!(
            client = %self.peer,
            nat_port = key,
            upstream = %session.peer_addr(),
            cmd = %request_line,
            "NAT mapping registered"
        );

        session.send_request(&normalize_request(request_line)).await?;
        let outcome = relay_response(session.reader(), key, request_line, &self.table).await?;

        if let Err(e) = session.close().await {
            debug!(nat_port = key, error = %e, "Upstream close failed");
        }

        Ok(outcome)
    }

    async fn report_error(&self, registered: Option<NatKey>, message: &str) {
        let delivered = match registered {
            Some(key) => self.table.send_err(key, message).await.map(|_| ()),
            None => self.handle.write_all(&response::err_line(message)).await,
        };

        if let Err(e) = delivered {
            debug!(client = %self.peer, error = %e, "Could not deliver error to client");
        }
    }

    async fn close(&self) {
        let purged = self.table.remove_by_client(self.peer).await;
        info!(client = %self.peer, purged, "Client disconnected");

        if let Err(e) = self.handle.shutdown().await {
            debug!(client = %self.peer, error = %e, "Client shutdown failed");
        }
    }
}
