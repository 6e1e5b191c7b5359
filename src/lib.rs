//! rtmp-core: server-side RTMP library
//!
//! Implements the core of an RTMP server:
//! - The chunk transport that multiplexes message streams over one TCP
//!   connection, with per-chunk-stream header compression and flow control
//! - The C0/C1/C2 handshake
//! - The command state machine (`connect`, `createStream`, `publish`, `play`,
//!   `deleteStream`) that drives lifecycle callbacks on an application handler
//!
//! Media payloads pass through opaquely; FLV tag parsing, relaying, and
//! client-side RTMP are out of scope.
//!
//! # Example: Simple Server
//!
//! ```no_run
//! use rtmp_core::{HandlerResult, RtmpHandler, RtmpServer, ServerConfig, SessionContext};
//! use rtmp_core::protocol::command::NetStreamPublish;
//!
//! struct MyHandler;
//!
//! #[async_trait::async_trait]
//! impl RtmpHandler for MyHandler {
//!     async fn on_publish(
//!         &self,
//!         ctx: &SessionContext,
//!         _timestamp: u32,
//!         cmd: &NetStreamPublish,
//!     ) -> HandlerResult {
//!         println!("{} publishing {}", ctx.peer_addr, cmd.publishing_name);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = RtmpServer::new(ServerConfig::default(), || MyHandler);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod error;
pub mod protocol;
pub mod server;

mod stream;

// Re-export main types for convenience
pub use amf::Amf0Value;
pub use error::{Error, HandlerError, Result};
pub use protocol::message::RtmpMessage;
pub use server::config::ServerConfig;
pub use server::connection::{Connection, ConnectionHandle};
pub use server::handler::{HandlerResult, LoggingHandler, RtmpHandler, SessionContext};
pub use server::listener::RtmpServer;
