/// Marker line closing a LIST response
pub const END_MARKER: &str = "END";

/// Shape of a response, as announced by its first line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseHeader {
    /// Exactly `OK`: a listing follows
    Listing,
    /// `OK <size>`: exactly `size` raw bytes follow
    Sized(u64),
    /// `OK <something>` where the size is not a non-negative integer
    InvalidSize,
    /// `ERR <message>`
    Error(String),
    /// Anything else
    Other,
}

impl ResponseHeader {
    /// Classify a response line (newline already stripped).
    ///
    /// ```
    /// # use natproxy::protocol::response::ResponseHeader;
    /// assert_eq!(ResponseHeader::parse("OK"), ResponseHeader::Listing);
    /// assert_eq!(ResponseHeader::parse("OK 5"), ResponseHeader::Sized(5));
    /// assert_eq!(
    ///     ResponseHeader::parse("ERR file not found"),
    ///     ResponseHeader::Error("file not found".to_string())
    /// );
    /// ```
    pub fn parse(line: &str) -> Self {
        if line == "OK" {
            return ResponseHeader::Listing;
        }

        if let Some(size) = line.strip_prefix("OK ") {
            return match size.trim().parse::<u64>() {
                Ok(n) => ResponseHeader::Sized(n),
                Err(_) => ResponseHeader::InvalidSize,
            };
        }

        if let Some(message) = line.strip_prefix("ERR ") {
            return ResponseHeader::Error(message.to_string());
        }

        ResponseHeader::Other
    }
}

/// Encode a line, adding the newline if it is missing.
pub fn line(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    if !text.ends_with('\n') {
        buf.push(b'\n');
    }
    buf
}

/// Encode an `ERR <message>` line.
pub fn err_line(message: &str) -> Vec<u8> {
    line(&format!("ERR {}", message))
}

/// Encode the header of a counted-byte response.
pub fn sized_header(size: u64) -> Vec<u8> {
    line(&format!("OK {}", size))
}
