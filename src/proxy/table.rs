//! NAT translation table
//!
//! Maps the local port of each in-flight upstream connection to the client
//! that should receive its response. Every write to a client during a relay
//! goes through [`TranslationTable::send_to`], so output for a mapping that
//! has already been removed is dropped instead of reaching a stale socket.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};

use crate::protocol::response;

/// Local (ephemeral) port of an outbound upstream connection
pub type NatKey = u16;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared write half of an accepted client connection.
///
/// Only the connection that accepted the client reads from or closes it;
/// the table only ever writes through it.
#[derive(Clone)]
pub struct ClientHandle {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl ClientHandle {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub async fn write_all(&self, payload: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(payload)
            .await
            .context("Failed to write to client")?;
        writer.flush().await.context("Failed to flush client")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.context("Failed to shut down client")?;
        Ok(())
    }

    /// Whether both handles refer to the same client connection
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.writer, &other.writer)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("writer", &Arc::as_ptr(&self.writer))
            .finish()
    }
}

/// Where responses for one upstream connection are delivered
#[derive(Debug, Clone)]
pub struct TranslationEntry {
    pub destination: ClientHandle,
    pub client_addr: SocketAddr,
}

/// Concurrency-safe map from [`NatKey`] to [`TranslationEntry`].
///
/// The lock is held for one map operation at a time, never across I/O.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    entries: Arc<RwLock<HashMap<NatKey, TranslationEntry>>>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping, replacing any previous one for the same key.
    pub async fn register(&self, key: NatKey, destination: ClientHandle, client_addr: SocketAddr) {
        let entry = TranslationEntry {
            destination,
            client_addr,
        };

        let previous = self.entries.write().await.insert(key, entry);

        if let Some(previous) = previous {
            tracing::warn!(
                nat_port = key,
                previous_client = %previous.client_addr,
                client = %client_addr,
                "NAT key reused while still mapped"
            );
        }
    }

    /// Remove a mapping. Returns whether one was present.
    pub async fn remove(&self, key: NatKey) -> bool {
        self.entries.write().await.remove(&key).is_some()
    }

    /// Remove every mapping that delivers to `client_addr`. Returns how many were removed.
    pub async fn remove_by_client(&self, client_addr: SocketAddr) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.client_addr != client_addr);
        before - entries.len()
    }

    pub async fn lookup(&self, key: NatKey) -> Option<ClientHandle> {
        self.entries
            .read()
            .await
            .get(&key)
            .map(|entry| entry.destination.clone())
    }

    pub async fn entry(&self, key: NatKey) -> Option<TranslationEntry> {
        self.entries.read().await.get(&key).cloned()
    }

    /// Keys currently mapped to `client_addr`
    pub async fn keys_for(&self, client_addr: SocketAddr) -> Vec<NatKey> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.client_addr == client_addr)
            .map(|(key, _)| *key)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Write `payload` to the client mapped to `key`.
    ///
    /// Returns `Ok(false)` and writes nothing when the key is not mapped.
    pub async fn send_to(&self, key: NatKey, payload: &[u8]) -> Result<bool> {
        let Some(destination) = self.lookup(key).await else {
            tracing::trace!(nat_port = key, bytes = payload.len(), "Dropping orphaned response");
            return Ok(false);
        };

        destination.write_all(payload).await?;
        Ok(true)
    }

    /// Send one line, newline-terminated.
    pub async fn send_line(&self, key: NatKey, text: &str) -> Result<bool> {
        self.send_to(key, &response::line(text)).await
    }

    /// Send an `ERR <message>` line.
    pub async fn send_err(&self, key: NatKey, message: &str) -> Result<bool> {
        self.send_to(key, &response::err_line(message)).await
    }
}
