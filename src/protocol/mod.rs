//! RTMP wire protocol implementation
//!
//! This module handles the byte-level protocol:
//! - Handshake (C0/C1/C2 against S0/S1/S2)
//! - Chunk stream multiplexing, reassembly, and fragmentation
//! - Message payload encoding/decoding and typed commands
//! - Flow-control bookkeeping (window acknowledgement, peer bandwidth)

pub mod chunk;
pub mod command;
pub mod constants;
pub mod flow;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
pub use command::{AmfEncoding, CommandMessage, NetCommand};
pub use flow::FlowController;
pub use handshake::ServerHandshake;
pub use message::{BandwidthLimit, DataMessage, RtmpMessage, UserControlEvent};
