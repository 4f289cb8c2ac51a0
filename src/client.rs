//! Client for the proxy (or the file server directly)
//!
//! Sends one request at a time and fully consumes its response before
//! returning, as the protocol requires.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::protocol::command::normalize_request;
use crate::protocol::framer::LineReader;
use crate::protocol::response::{END_MARKER, ResponseHeader};

const CHUNK_SIZE: usize = 4096;

pub struct ProxyClient {
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ProxyClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("Failed to connect to proxy")?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: LineReader::new(read_half),
            writer,
        })
    }

    /// Send a raw request line and return the first response line.
    ///
    /// Only suitable for requests whose response is a single line.
    pub async fn command(&mut self, request: &str) -> Result<Option<String>> {
        self.send(request).await?;
        self.reader.read_line().await.map(|frame| frame.into_line())
    }

    /// `LIST`: names in the order the server sent them.
    ///
    /// A listing cut short before `END` yields the names read so far.
    pub async fn list(&mut self) -> Result<Vec<String>> {
        self.send("LIST").await?;

        let header = self.read_header().await?;
        if ResponseHeader::parse(&header) != ResponseHeader::Listing {
            bail!("Unexpected response: {}", header);
        }

        let mut names = Vec::new();
        while let Some(line) = self.reader.read_line().await?.into_line() {
            if line == END_MARKER {
                break;
            }
            names.push(line);
        }
        Ok(names)
    }

    /// `DOWNLOAD <name>`: the whole file content.
    pub async fn download(&mut self, name: &str) -> Result<Vec<u8>> {
        self.send(&format!("DOWNLOAD {}", name)).await?;

        let header = self.read_header().await?;
        let expected = match ResponseHeader::parse(&header) {
            ResponseHeader::Sized(n) => n,
            _ => bail!("Unexpected response: {}", header),
        };

        let mut content = Vec::new();
        while (content.len() as u64) < expected {
            let want = (expected - content.len() as u64).min(CHUNK_SIZE as u64) as usize;
            let chunk = self.reader.read_chunk(want).await?;
            if chunk.is_empty() {
                bail!("Download incomplete: {} of {} bytes", content.len(), expected);
            }
            content.extend_from_slice(&chunk);
        }
        Ok(content)
    }

    /// Download `name` into `dest`, creating parent directories. Returns the size written.
    pub async fn download_to(&mut self, name: &str, dest: &Path) -> Result<u64> {
        let content = self.download(name).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &content)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        Ok(content.len() as u64)
    }

    async fn send(&mut self, request: &str) -> Result<()> {
        self.writer
            .write_all(normalize_request(request).as_bytes())
            .await
            .context("Failed to send request")?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_header(&mut self) -> Result<String> {
        self.reader
            .read_line()
            .await?
            .into_line()
            .context("Connection closed before response")
    }
}
