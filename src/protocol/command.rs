/// Relay strategy implied by a request line, as seen by the proxy.
///
/// The proxy never validates requests; it only needs to know which response
/// shape to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `LIST`: sentinel-terminated line stream
    List,
    /// `DOWNLOAD ...`: counted byte stream
    Download,
    /// Anything else; only the first response line is relayed
    Other,
}

impl Command {
    /// Classify a raw request line (case-insensitive, surrounding whitespace ignored).
    ///
    /// ```
    /// # use natproxy::protocol::command::Command;
    /// assert_eq!(Command::classify("list\n"), Command::List);
    /// assert_eq!(Command::classify("DOWNLOAD a.txt"), Command::Download);
    /// assert_eq!(Command::classify("FOOBAR"), Command::Other);
    /// ```
    pub fn classify(request_line: &str) -> Self {
        let upper = request_line.trim().to_ascii_uppercase();
        if upper == "LIST" {
            Command::List
        } else if upper.starts_with("DOWNLOAD") {
            Command::Download
        } else {
            Command::Other
        }
    }
}

/// A request as understood by the file server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Download(String),
    Unknown,
}

impl Request {
    /// Parse a request line. The verb is case-insensitive; a `DOWNLOAD`
    /// without a filename is unknown. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim_start()),
            None => (line, ""),
        };

        let request = match verb.to_ascii_uppercase().as_str() {
            "LIST" => Request::List,
            "DOWNLOAD" if !rest.is_empty() => Request::Download(rest.to_string()),
            _ => Request::Unknown,
        };
        Some(request)
    }
}

/// Trim a request line and terminate it with exactly one newline.
pub fn normalize_request(request_line: &str) -> String {
    format!("{}\n", request_line.trim())
}
