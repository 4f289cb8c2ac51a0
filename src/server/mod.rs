//! Accept loop for the proxy.

pub mod listener;

pub use listener::Listener;
