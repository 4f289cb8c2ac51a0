//! Response relay from upstream to client
//!
//! The first response line is always forwarded. What follows depends on the
//! header and on the request verb:
//!
//! - `OK <n>` for `DOWNLOAD`: exactly `n` raw bytes (counted-byte relay)
//! - `OK` for `LIST`: lines up to and including `END` (sentinel-line relay)
//! - anything else: nothing more
//!
//! All client writes go through the translation table. Short transfers and
//! a missing `END` are not reported to the client; the outcome records them.

use anyhow::Result;
use tokio::io::AsyncRead;

use crate::protocol::command::Command;
use crate::protocol::framer::LineReader;
use crate::protocol::response::{END_MARKER, ResponseHeader};
use crate::proxy::table::{NatKey, TranslationTable};

/// Size of each raw read during a counted relay
pub const CHUNK_SIZE: usize = 4096;

/// What a relay did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream sent nothing usable; an `ERR` line was sent instead
    Empty,
    /// Only the header line was relayed
    Single,
    /// Header was `OK <garbage>` for a download
    InvalidSize,
    Counted { expected: u64, relayed: u64 },
    Lines { lines: usize, terminated: bool },
}

/// Relay one response for `request_line` from `upstream` to whoever `key` maps to.
pub async fn relay_response<R>(
    upstream: &mut LineReader<R>,
    key: NatKey,
    request_line: &str,
    table: &TranslationTable,
) -> Result<RelayOutcome>
where
    R: AsyncRead + Unpin,
{
    let header = match upstream.read_line().await?.into_line() {
        Some(line) if !line.is_empty() => line,
        _ => {
            table.send_err(key, "empty response from server").await?;
            return Ok(RelayOutcome::Empty);
        }
    };

    table.send_line(key, &header).await?;

    let outcome = match (ResponseHeader::parse(&header), Command::classify(request_line)) {
        (ResponseHeader::Sized(expected), Command::Download) => {
            relay_bytes(upstream, key, expected, table).await?
        }
        (ResponseHeader::InvalidSize, Command::Download) => {
            table.send_err(key, "invalid size from server").await?;
            RelayOutcome::InvalidSize
        }
        (ResponseHeader::Listing, Command::List) => relay_until_end(upstream, key, table).await?,
        _ => RelayOutcome::Single,
    };

    tracing::debug!(nat_port = key, ?outcome, "Response relayed");
    Ok(outcome)
}

async fn relay_bytes<R>(
    upstream: &mut LineReader<R>,
    key: NatKey,
    expected: u64,
    table: &TranslationTable,
) -> Result<RelayOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut relayed = 0u64;

    while relayed < expected {
        let want = (expected - relayed).min(CHUNK_SIZE as u64) as usize;
        let chunk = upstream.read_chunk(want).await?;
        if chunk.is_empty() {
            tracing::debug!(nat_port = key, expected, relayed, "Upstream closed before full payload");
            break;
        }
        relayed += chunk.len() as u64;
        table.send_to(key, &chunk).await?;
    }

    Ok(RelayOutcome::Counted { expected, relayed })
}

async fn relay_until_end<R>(
    upstream: &mut LineReader<R>,
    key: NatKey,
    table: &TranslationTable,
) -> Result<RelayOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut lines = 0;

    while let Some(line) = upstream.read_line().await?.into_line() {
        table.send_line(key, &line).await?;
        if line == END_MARKER {
            return Ok(RelayOutcome::Lines {
                lines,
                terminated: true,
            });
        }
        lines += 1;
    }

    Ok(RelayOutcome::Lines {
        lines,
        terminated: false,
    })
}
