//! Newline framing over an arbitrary byte stream.
//!
//! `LineReader` keeps whatever it has read past the current line in its own
//! buffer, so raw payload that arrives in the same segment as a header line
//! is served by [`LineReader::read_chunk`] before the socket is touched again.

use anyhow::{Context, Result, bail};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Longest line accepted before the stream is considered broken
pub const MAX_LINE_LEN: usize = 64 * 1024;

const READ_CAPACITY: usize = 4096;

/// Result of reading one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, newline stripped
    Line(String),
    /// Bytes left over when the source closed before a newline
    Unterminated(String),
    /// The source closed between lines
    Eof,
}

impl Frame {
    /// Collapse the two line variants; unterminated trailing lines are
    /// accepted as ordinary lines.
    pub fn into_line(self) -> Option<String> {
        match self {
            Frame::Line(line) | Frame::Unterminated(line) => Some(line),
            Frame::Eof => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Frame::Eof)
    }
}

pub struct LineReader<R> {
    inner: R,
    buffer: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CAPACITY),
            eof: false,
        }
    }

    /// Read the next newline-terminated line.
    pub async fn read_line(&mut self) -> Result<Frame> {
        let mut scanned = 0;

        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|b| *b == b'\n') {
                let end = scanned + pos;
                let mut line = self.buffer.split_to(end + 1);
                line.truncate(end);
                return Ok(Frame::Line(decode(line)?));
            }

            scanned = self.buffer.len();
            if scanned > MAX_LINE_LEN {
                bail!("Line exceeds {} bytes without a newline", MAX_LINE_LEN);
            }

            if self.eof || self.fill().await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(Frame::Eof);
                }
                let rest = self.buffer.split();
                return Ok(Frame::Unterminated(decode(rest)?));
            }
        }
    }

    /// Read up to `max` raw bytes, draining buffered bytes first.
    ///
    /// Returns an empty chunk once the source is exhausted.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Bytes> {
        if self.buffer.is_empty() && !self.eof {
            self.fill().await?;
        }
        let n = self.buffer.len().min(max);
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Bytes read from the source but not yet handed out
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    async fn fill(&mut self) -> Result<usize> {
        self.buffer.reserve(READ_CAPACITY);
        let n = self
            .inner
            .read_buf(&mut self.buffer)
            .await
            .context("Failed to read from stream")?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }
}

fn decode(bytes: BytesMut) -> Result<String> {
    String::from_utf8(bytes.to_vec()).context("Line is not valid UTF-8")
}
