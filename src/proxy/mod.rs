//! NAT-style reverse proxy
//!
//! Each client request is sent upstream over a fresh connection. The local
//! port of that connection is registered in the translation table, and the
//! relay looks the client up through the table for every write.
//!
//! # Request lifecycle
//!
//! ```text
//!   client line ──► ClientConnection ──► UpstreamSession::open   (new socket, nat_port)
//!                                         │
//!                                         ├─ table.register(nat_port → client)
//!                                         ├─ send request line
//!                                         ├─ relay_response       (writes via table.send_to)
//!                                         └─ table.remove(nat_port)
//!   client EOF  ──► table.remove_by_client(client addr)
//! ```

pub mod connection;
pub mod relay;
pub mod table;
pub mod upstream;

pub use connection::{ClientConnection, ConnectionState};
pub use relay::{RelayOutcome, relay_response};
pub use table::{ClientHandle, NatKey, TranslationEntry, TranslationTable};
pub use upstream::UpstreamSession;
