//! RTMP server implementation
//!
//! - TCP listener and accept loop
//! - Per-connection supervisor (handshake, read loop, stream dispatch)
//! - Handler trait for application callbacks

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionHandle};
pub use handler::{HandlerResult, LoggingHandler, RtmpHandler, SessionContext};
pub use listener::RtmpServer;
