//! Upstream file server
//!
//! Serves the regular files of one directory. Each connection carries a
//! single request line and is closed after the response.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::FileServerConfig;
use crate::protocol::command::Request;
use crate::protocol::framer::LineReader;
use crate::protocol::response::{self, END_MARKER};

const CHUNK_SIZE: usize = 4096;

pub struct FileServer {
    inner: TcpListener,
    root: Arc<PathBuf>,
}

impl FileServer {
    /// Bind the listener, creating the served directory if needed.
    pub async fn bind(cfg: &FileServerConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&cfg.root)
            .await
            .with_context(|| format!("Failed to create {}", cfg.root.display()))?;

        let inner = TcpListener::bind(&cfg.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;

        info!(
            "File server listening on {}, serving files from {}",
            inner.local_addr()?,
            cfg.root.display()
        );

        Ok(Self {
            inner,
            root: Arc::new(cfg.root.clone()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        loop {
            let (socket, peer) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };
            debug!("Accepted connection from {}", peer);

            let root = self.root.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, &root).await {
                    error!("Request error from {}: {:#}", peer, e);
                }
            });
        }
    }
}

/// Answer the single request carried by `stream`.
pub async fn handle_connection<S>(stream: S, root: &Path) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = LineReader::new(read_half);

    let Some(line) = reader.read_line().await?.into_line() else {
        return Ok(());
    };
    let Some(request) = Request::parse(&line) else {
        return Ok(());
    };

    debug!(?request, "File server request");

    match request {
        Request::List => send_listing(&mut writer, root).await?,
        Request::Download(name) => send_file(&mut writer, root, &name).await?,
        Request::Unknown => writer.write_all(&response::err_line("unknown command")).await?,
    }

    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// Names of the regular files directly under `root`, sorted.
pub async fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut dir = tokio::fs::read_dir(root)
        .await
        .with_context(|| format!("Failed to read {}", root.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let is_file = tokio::fs::metadata(entry.path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if is_file {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    names.sort();
    Ok(names)
}

/// Map a requested name to a file under `root`.
///
/// Only a single plain path component is accepted, so requests cannot
/// escape the served directory.
pub fn resolve(root: &Path, name: &str) -> Option<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Some(root.join(file)),
        _ => None,
    }
}

async fn send_listing<W>(writer: &mut W, root: &Path) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut body = response::line("OK");
    for name in list_files(root).await? {
        body.extend_from_slice(&response::line(&name));
    }
    body.extend_from_slice(&response::line(END_MARKER));

    writer.write_all(&body).await?;
    Ok(())
}

async fn send_file<W>(writer: &mut W, root: &Path, name: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let file = match resolve(root, name) {
        Some(path) => open_regular(&path).await,
        None => None,
    };

    let Some((mut file, size)) = file else {
        writer.write_all(&response::err_line("file not found")).await?;
        return Ok(());
    };

    writer.write_all(&response::sized_header(size)).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await.context("Failed to read file")?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
    }

    Ok(())
}

async fn open_regular(path: &Path) -> Option<(File, u64)> {
    let file = File::open(path).await.ok()?;
    let meta = file.metadata().await.ok()?;
    meta.is_file().then(|| (file, meta.len()))
}
