//! Natproxy - NAT-style line protocol proxy
//!
//! Core library for the proxy, its upstream file server and a small client.

pub mod client;
pub mod config;
pub mod fileserver;
pub mod logging;
pub mod protocol;
pub mod proxy;
pub mod server;
