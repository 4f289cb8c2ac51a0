//! Line protocol shared by clients, the proxy and the file server.
//!
//! Requests are single lines (`LIST`, `DOWNLOAD <filename>`). Responses start
//! with one header line and take one of two shapes:
//!
//! ```text
//! LIST      ->  OK\n <name>\n ... END\n
//! DOWNLOAD  ->  OK <size>\n <size raw bytes>
//! error     ->  ERR <message>\n
//! ```
//!
//! - **`framer`**: newline framing with clean-EOF / mid-line-EOF distinction
//! - **`command`**: request classification
//! - **`response`**: header classification and line encoding

pub mod command;
pub mod framer;
pub mod response;

pub use command::{Command, Request};
pub use framer::{Frame, LineReader};
pub use response::ResponseHeader;
