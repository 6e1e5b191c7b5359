//! RTMP chunk stream codec
//!
//! Messages are split into chunks so that several message streams can share
//! one TCP connection. Each chunk opens with a basic header naming the chunk
//! stream and a format, then a message header whose size shrinks as fields
//! repeat previous chunks on the same chunk stream.
//!
//! ```text
//! Chunk Format:
//! +--------------+-----------------+-------------------+
//! | Basic Header | Message Header  | Chunk Data        |
//! | (1-3 bytes)  | (0,3,7,11 bytes)| (variable)        |
//! +--------------+-----------------+-------------------+
//!
//! Basic Header:
//! - 1 byte:  fmt(2) + csid(6)        for csid 2-63
//! - 2 bytes: fmt(2) + 0 + csid(8)    for csid 64-319
//! - 3 bytes: fmt(2) + 1 + csid(16)   for csid 64-65599
//!
//! Message Header (by fmt):
//! - Type 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4 LE)
//! - Type 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - Type 2 (3 bytes):  timestamp_delta(3)
//! - Type 3 (0 bytes):  inherit everything
//!
//! A timestamp field of 0xFFFFFF moves the real value into a 4-byte extended
//! timestamp that follows the message header, repeated on every chunk of the
//! message.
//! ```
//!
//! Reference: RTMP Specification Section 5.3

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// A complete message as carried by the chunk layer: the envelope fields from
/// the chunk headers plus the reassembled payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Chunk stream the message arrived on / should leave on
    pub chunk_stream_id: u32,
    /// Absolute timestamp (milliseconds, wrapping)
    pub timestamp: u32,
    /// Message type id
    pub type_id: u8,
    /// Message stream id
    pub message_stream_id: u32,
    pub payload: Bytes,
}

/// Per-chunk-stream header state, one per direction per chunk stream id
#[derive(Debug, Clone, Default)]
struct ChunkStreamState {
    timestamp: u32,
    timestamp_delta: u32,
    message_length: u32,
    message_type: u8,
    message_stream_id: u32,
    has_extended_timestamp: bool,
    /// A type-0 or type-1 header has been seen; type-2/3 are illegal before
    initialized: bool,
    /// Partial message being reassembled
    buffer: BytesMut,
}

/// Chunk stream decoder: demultiplexes chunks and reassembles messages.
pub struct ChunkDecoder {
    /// Peer's chunk size (their SetChunkSize governs inbound chunks)
    chunk_size: u32,
    streams: HashMap<u32, ChunkStreamState>,
    max_message_size: u32,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Override the reassembly bound (default: the 24-bit length maximum)
    pub fn with_max_message_size(mut self, max: u32) -> Self {
        self.max_message_size = max;
        self
    }

    /// Apply the peer's SetChunkSize. The caller validates the range.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.min(MAX_CHUNK_SIZE);
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Discard the partial message on a chunk stream (Abort message)
    pub fn abort(&mut self, chunk_stream_id: u32) {
        if let Some(state) = self.streams.get_mut(&chunk_stream_id) {
            state.buffer.clear();
        }
    }

    /// Try to decode one complete message from the buffer.
    ///
    /// Returns `Ok(Some(..))` when a message completed, `Ok(None)` when more
    /// bytes are needed. Input is only consumed once an entire chunk (headers,
    /// extended timestamp, body slice) is present, so a stream split at any
    /// byte boundary decodes identically.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RawMessage>> {
        loop {
            match self.decode_chunk(buf)? {
                ChunkProgress::Message(msg) => return Ok(Some(msg)),
                // A mid-message chunk was consumed; the next one may already
                // be buffered, so keep going.
                ChunkProgress::Consumed => continue,
                ChunkProgress::NeedMore => return Ok(None),
            }
        }
    }

    fn decode_chunk(&mut self, buf: &mut BytesMut) -> Result<ChunkProgress> {
        let (fmt, csid, mut pos) = match parse_basic_header(buf)? {
            Some(v) => v,
            None => return Ok(ChunkProgress::NeedMore),
        };

        let state = self.streams.entry(csid).or_default();

        // A type-3 chunk with a partial message pending continues that message.
        if fmt == 3 && !state.buffer.is_empty() {
            let ext_len = if state.has_extended_timestamp { 4 } else { 0 };
            let body_len =
                (state.message_length as usize - state.buffer.len()).min(self.chunk_size as usize);

            if buf.len() < pos + ext_len + body_len {
                return Ok(ChunkProgress::NeedMore);
            }

            pos += ext_len;
            state.buffer.extend_from_slice(&buf[pos..pos + body_len]);
            let _ = buf.split_to(pos + body_len);

            return Ok(Self::take_if_complete(csid, state));
        }

        if fmt >= 2 && !state.initialized {
            return Err(ProtocolError::InvalidChunkHeader.into());
        }

        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if buf.len() < pos + header_len {
            return Ok(ChunkProgress::NeedMore);
        }
        let header = &buf[pos..pos + header_len];

        let (timestamp_field, message_length, message_type, message_stream_id) = match fmt {
            0 => (
                read_u24(&header[0..3]),
                read_u24(&header[3..6]),
                header[6],
                u32::from_le_bytes([header[7], header[8], header[9], header[10]]),
            ),
            1 => (
                read_u24(&header[0..3]),
                read_u24(&header[3..6]),
                header[6],
                state.message_stream_id,
            ),
            2 => (
                read_u24(&header[0..3]),
                state.message_length,
                state.message_type,
                state.message_stream_id,
            ),
            _ => (
                state.timestamp_delta,
                state.message_length,
                state.message_type,
                state.message_stream_id,
            ),
        };
        pos += header_len;

        if message_length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: message_length,
                max: self.max_message_size,
            }
            .into());
        }

        let has_extended = if fmt == 3 {
            state.has_extended_timestamp
        } else {
            timestamp_field == EXTENDED_TIMESTAMP_THRESHOLD
        };

        let body_len = (message_length as usize).min(self.chunk_size as usize);
        let ext_len = if has_extended { 4 } else { 0 };
        if buf.len() < pos + ext_len + body_len {
            return Ok(ChunkProgress::NeedMore);
        }

        let ts_value = if has_extended {
            let ext = &buf[pos..pos + 4];
            pos += 4;
            u32::from_be_bytes([ext[0], ext[1], ext[2], ext[3]])
        } else {
            timestamp_field
        };

        // Commit: update header state and start the reassembly buffer.
        state.timestamp = if fmt == 0 {
            ts_value
        } else {
            state.timestamp.wrapping_add(ts_value)
        };
        state.timestamp_delta = ts_value;
        state.message_length = message_length;
        state.message_type = message_type;
        state.message_stream_id = message_stream_id;
        state.has_extended_timestamp = has_extended;
        state.initialized = true;

        state.buffer.reserve(message_length as usize);
        state.buffer.extend_from_slice(&buf[pos..pos + body_len]);
        let _ = buf.split_to(pos + body_len);

        Ok(Self::take_if_complete(csid, state))
    }

    fn take_if_complete(csid: u32, state: &mut ChunkStreamState) -> ChunkProgress {
        if state.buffer.len() as u32 >= state.message_length {
            ChunkProgress::Message(RawMessage {
                chunk_stream_id: csid,
                timestamp: state.timestamp,
                type_id: state.message_type,
                message_stream_id: state.message_stream_id,
                payload: state.buffer.split().freeze(),
            })
        } else {
            ChunkProgress::Consumed
        }
    }
}

/// Outcome of consuming (at most) one chunk from the input
enum ChunkProgress {
    /// A chunk completed a message
    Message(RawMessage),
    /// A mid-message chunk was consumed
    Consumed,
    /// Not enough input for the next chunk
    NeedMore,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a basic header; returns (fmt, csid, header length)
fn parse_basic_header(buf: &[u8]) -> Result<Option<(u8, u32, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let first = buf[0];
    let fmt = first >> 6;
    let csid_low = first & 0x3F;

    match csid_low {
        0 => {
            if buf.len() < 2 {
                return Ok(None);
            }
            Ok(Some((fmt, 64 + buf[1] as u32, 2)))
        }
        1 => {
            if buf.len() < 3 {
                return Ok(None);
            }
            Ok(Some((fmt, 64 + buf[1] as u32 + (buf[2] as u32) * 256, 3)))
        }
        _ => Ok(Some((fmt, csid_low as u32, 1))),
    }
}

/// Chunk stream encoder: fragments messages into chunks, compressing headers
/// against the previous chunk on the same chunk stream.
pub struct ChunkEncoder {
    /// Our chunk size (our SetChunkSize governs outbound chunks)
    chunk_size: u32,
    streams: HashMap<u32, ChunkStreamState>,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    /// Apply our own SetChunkSize. The caller validates the range.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.min(MAX_CHUNK_SIZE);
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Encode a message as one or more chunks appended to `buf`
    pub fn encode(&mut self, msg: &RawMessage, buf: &mut BytesMut) -> Result<()> {
        let csid = msg.chunk_stream_id;
        if !(MIN_CHUNK_STREAM_ID..=MAX_CHUNK_STREAM_ID).contains(&csid) {
            return Err(ProtocolError::ChunkStreamIdOutOfRange(csid).into());
        }
        let payload_len = msg.payload.len();
        if payload_len as u64 > MAX_MESSAGE_SIZE as u64 {
            return Err(ProtocolError::MessageTooLarge {
                size: payload_len as u32,
                max: MAX_MESSAGE_SIZE,
            }
            .into());
        }

        let chunk_size = self.chunk_size as usize;
        let state = self.streams.entry(csid).or_default();

        let fmt = select_format(msg, state);
        let delta = msg.timestamp.wrapping_sub(state.timestamp);

        // fmt 0 carries the absolute timestamp; fmt 1/2 the delta; fmt 3 nothing
        let ts_value = if fmt == 0 { msg.timestamp } else { delta };
        let has_extended = if fmt == 3 {
            state.has_extended_timestamp
        } else {
            ts_value >= EXTENDED_TIMESTAMP_THRESHOLD
        };
        let ts_field = if has_extended {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            ts_value
        };

        state.timestamp = msg.timestamp;
        state.timestamp_delta = ts_value;
        state.message_length = payload_len as u32;
        state.message_type = msg.type_id;
        state.message_stream_id = msg.message_stream_id;
        state.has_extended_timestamp = has_extended;
        state.initialized = true;

        let mut offset = 0;
        let mut first = true;
        loop {
            let body_len = (payload_len - offset).min(chunk_size);

            write_basic_header(buf, if first { fmt } else { 3 }, csid);

            if first {
                match fmt {
                    0 => {
                        write_u24(buf, ts_field);
                        write_u24(buf, payload_len as u32);
                        buf.put_u8(msg.type_id);
                        buf.put_u32_le(msg.message_stream_id);
                    }
                    1 => {
                        write_u24(buf, ts_field);
                        write_u24(buf, payload_len as u32);
                        buf.put_u8(msg.type_id);
                    }
                    2 => {
                        write_u24(buf, ts_field);
                    }
                    _ => {}
                }
            }

            // The extended timestamp repeats on every chunk of the message
            if has_extended {
                buf.put_u32(ts_value);
            }

            buf.put_slice(&msg.payload[offset..offset + body_len]);
            offset += body_len;
            first = false;

            if offset >= payload_len {
                break;
            }
        }

        Ok(())
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the most compressed header format valid against the previous chunk
fn select_format(msg: &RawMessage, state: &ChunkStreamState) -> u8 {
    if !state.initialized || msg.message_stream_id != state.message_stream_id {
        return 0;
    }

    if msg.type_id != state.message_type || msg.payload.len() as u32 != state.message_length {
        return 1;
    }

    let delta = msg.timestamp.wrapping_sub(state.timestamp);
    if delta == state.timestamp_delta {
        return 3;
    }

    2
}

fn write_basic_header(buf: &mut BytesMut, fmt: u8, csid: u32) {
    if csid >= 64 + 256 {
        buf.put_u8((fmt << 6) | 1);
        let offset = csid - 64;
        buf.put_u8((offset & 0xFF) as u8);
        buf.put_u8((offset >> 8) as u8);
    } else if csid >= 64 {
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        buf.put_u8((fmt << 6) | csid as u8);
    }
}

fn read_u24(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
}

fn write_u24(buf: &mut BytesMut, value: u32) {
    buf.put_u8((value >> 16) as u8);
    buf.put_u8((value >> 8) as u8);
    buf.put_u8(value as u8);
}
