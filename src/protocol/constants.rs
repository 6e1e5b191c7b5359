//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)

/// RTMP version number (always 3 for standard RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default RTMP port
pub const RTMP_PORT: u16 = 1935;

/// Handshake packet size (C1/C2/S1/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// Default chunk size (per RTMP spec)
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Maximum negotiable chunk size (top bit of the SetChunkSize field is reserved)
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Maximum message size: payload length is a 24-bit field
pub const MAX_MESSAGE_SIZE: u32 = 0xFF_FFFF;

/// Timestamps at or above this value move to the extended timestamp field
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFF_FFFF;

// ============================================================================
// Chunk Stream IDs (CSID)
// RTMP spec section 5.3.1.1; 4/6 for audio/video are convention, not mandate
// ============================================================================

/// Lowest valid chunk stream id (0 and 1 select extended basic headers)
pub const MIN_CHUNK_STREAM_ID: u32 = 2;

/// Highest encodable chunk stream id (3-byte basic header)
pub const MAX_CHUNK_STREAM_ID: u32 = 65599;

/// Protocol control messages (Set Chunk Size, Abort, Ack, ...)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, createStream, ...)
pub const CSID_COMMAND: u32 = 3;

/// Audio and data messages
pub const CSID_AUDIO: u32 = 4;

/// Video messages
pub const CSID_VIDEO: u32 = 6;

// ============================================================================
// Message Type IDs
// RTMP spec section 5.4
// ============================================================================

pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACK: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_SHARED_OBJECT_AMF3: u8 = 16;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_SHARED_OBJECT_AMF0: u8 = 19;
pub const MSG_COMMAND_AMF0: u8 = 20;
pub const MSG_AGGREGATE: u8 = 22;

// ============================================================================
// User Control Event Types
// RTMP spec section 7.1.7
// ============================================================================

pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_STREAM_EOF: u16 = 1;
pub const UC_STREAM_DRY: u16 = 2;
pub const UC_SET_BUFFER_LENGTH: u16 = 3;
pub const UC_STREAM_IS_RECORDED: u16 = 4;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// ============================================================================
// Command Names
// ============================================================================

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_CLOSE_STREAM: &str = "closeStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_PLAY: &str = "play";

/// Reserved response command names
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";

/// Status notification
pub const CMD_ON_STATUS: &str = "onStatus";

/// Data message carrying stream metadata
pub const CMD_SET_DATA_FRAME: &str = "@setDataFrame";

// ============================================================================
// Status Codes
// ============================================================================

pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NC_CONNECT_REJECTED: &str = "NetConnection.Connect.Rejected";
pub const NC_CREATE_STREAM_FAILED: &str = "NetConnection.CreateStream.Failed";

pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";
pub const NS_PLAY_START: &str = "NetStream.Play.Start";
pub const NS_PLAY_STREAM_NOT_FOUND: &str = "NetStream.Play.StreamNotFound";

// ============================================================================
// Connect Reply Fields
// ============================================================================

/// Server version string reported in the connect `_result`
pub const FMS_VERSION: &str = "FMS/3,5,7,7009";

/// Capability flags reported in the connect `_result`
pub const SERVER_CAPABILITIES: f64 = 250.0;

/// Peer bandwidth granted in the connect reply (1 MiB, soft limit)
pub const CONNECT_PEER_BANDWIDTH: u32 = 1024 * 1024;

// ============================================================================
// Default Server Settings
// ============================================================================

/// Default window acknowledgement size (2.5 MB)
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Default maximum number of live message streams per connection
pub const DEFAULT_MAX_MESSAGE_STREAMS: u32 = 8;
