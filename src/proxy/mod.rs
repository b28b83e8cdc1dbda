//! HTTP surface: admin routes and the forwarding path

pub mod forwarder;
pub mod handler;
pub mod server;

pub use server::{AppState, ProxyServer};
