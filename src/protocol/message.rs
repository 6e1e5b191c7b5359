//! RTMP message types and payload codec
//!
//! Messages are classified into:
//! - Protocol control (types 1-6): chunk and flow control
//! - Media (types 8, 9): opaque audio/video payloads
//! - Command messages (types 17, 20): AMF-encoded RPC
//! - Data messages (types 15, 18): metadata
//!
//! This layer translates between typed messages and payload bytes only;
//! chunking is the chunk streamer's job.
//!
//! Reference: RTMP Specification Section 5.4

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, Amf0Value};
use crate::error::{ProtocolError, Result};
use crate::protocol::command::{AmfEncoding, CommandMessage};
use crate::protocol::constants::*;

/// A typed RTMP message
#[derive(Debug, Clone, PartialEq)]
pub enum RtmpMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// Abort Message (type 2): discard a partially received message
    Abort { chunk_stream_id: u32 },

    /// Acknowledgement (type 3)
    Ack { sequence_number: u32 },

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit: BandwidthLimit },

    /// Audio data (type 8), payload opaque
    Audio { data: Bytes },

    /// Video data (type 9), payload opaque
    Video { data: Bytes },

    /// Command message (type 20 AMF0, type 17 AMF3)
    Command {
        encoding: AmfEncoding,
        message: CommandMessage,
    },

    /// Data message (type 18 AMF0, type 15 AMF3)
    Data {
        encoding: AmfEncoding,
        message: DataMessage,
    },

    /// Shared object message (type 19 AMF0, type 16 AMF3); body not decoded
    SharedObject { encoding: AmfEncoding, data: Bytes },

    /// Aggregate message (type 22); body format reserved, not decoded
    Aggregate { data: Bytes },

    /// Unrecognized message type, payload preserved
    Unknown { type_id: u8, data: Bytes },
}

/// User Control event (RTMP spec 7.1.7)
#[derive(Debug, Clone, PartialEq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown { event_type: u16, data: Bytes },
}

/// Peer bandwidth limit type (RTMP spec 5.4.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthLimit {
    /// Peer must limit output to the given window
    Hard,
    /// Peer may keep a previously lower window
    Soft,
    /// Hard if the previous limit was hard, otherwise soft
    Dynamic,
}

impl BandwidthLimit {
    pub fn as_u8(self) -> u8 {
        match self {
            BandwidthLimit::Hard => 0,
            BandwidthLimit::Soft => 1,
            BandwidthLimit::Dynamic => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BandwidthLimit::Hard),
            1 => Some(BandwidthLimit::Soft),
            2 => Some(BandwidthLimit::Dynamic),
            _ => None,
        }
    }
}

/// Data message (@setDataFrame, onMetaData, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    /// Handler name, e.g. "@setDataFrame"
    pub name: String,
    /// Payload values following the name
    pub values: Vec<Amf0Value>,
}

impl RtmpMessage {
    /// Message type id this variant encodes to
    pub fn type_id(&self) -> u8 {
        match self {
            RtmpMessage::SetChunkSize(_) => MSG_SET_CHUNK_SIZE,
            RtmpMessage::Abort { .. } => MSG_ABORT,
            RtmpMessage::Ack { .. } => MSG_ACK,
            RtmpMessage::UserControl(_) => MSG_USER_CONTROL,
            RtmpMessage::WindowAckSize(_) => MSG_WINDOW_ACK_SIZE,
            RtmpMessage::SetPeerBandwidth { .. } => MSG_SET_PEER_BANDWIDTH,
            RtmpMessage::Audio { .. } => MSG_AUDIO,
            RtmpMessage::Video { .. } => MSG_VIDEO,
            RtmpMessage::Command { encoding, .. } => match encoding {
                AmfEncoding::Amf0 => MSG_COMMAND_AMF0,
                AmfEncoding::Amf3 => MSG_COMMAND_AMF3,
            },
            RtmpMessage::Data { encoding, .. } => match encoding {
                AmfEncoding::Amf0 => MSG_DATA_AMF0,
                AmfEncoding::Amf3 => MSG_DATA_AMF3,
            },
            RtmpMessage::SharedObject { encoding, .. } => match encoding {
                AmfEncoding::Amf0 => MSG_SHARED_OBJECT_AMF0,
                AmfEncoding::Amf3 => MSG_SHARED_OBJECT_AMF3,
            },
            RtmpMessage::Aggregate { .. } => MSG_AGGREGATE,
            RtmpMessage::Unknown { type_id, .. } => *type_id,
        }
    }

    /// Decode a message payload for the given type id
    pub fn decode(type_id: u8, mut payload: Bytes) -> Result<Self> {
        match type_id {
            MSG_SET_CHUNK_SIZE => {
                if payload.len() < 4 {
                    return Err(ProtocolError::MalformedMessage("SetChunkSize").into());
                }
                // Top bit is reserved and must be ignored
                let size = payload.get_u32() & 0x7FFF_FFFF;
                if size == 0 {
                    return Err(ProtocolError::ChunkSizeOutOfRange(size).into());
                }
                Ok(RtmpMessage::SetChunkSize(size))
            }

            MSG_ABORT => {
                if payload.len() < 4 {
                    return Err(ProtocolError::MalformedMessage("Abort").into());
                }
                Ok(RtmpMessage::Abort {
                    chunk_stream_id: payload.get_u32(),
                })
            }

            MSG_ACK => {
                if payload.len() < 4 {
                    return Err(ProtocolError::MalformedMessage("Ack").into());
                }
                Ok(RtmpMessage::Ack {
                    sequence_number: payload.get_u32(),
                })
            }

            MSG_USER_CONTROL => Self::decode_user_control(&mut payload),

            MSG_WINDOW_ACK_SIZE => {
                if payload.len() < 4 {
                    return Err(ProtocolError::MalformedMessage("WindowAckSize").into());
                }
                Ok(RtmpMessage::WindowAckSize(payload.get_u32()))
            }

            MSG_SET_PEER_BANDWIDTH => {
                if payload.len() < 5 {
                    return Err(ProtocolError::MalformedMessage("SetPeerBandwidth").into());
                }
                let size = payload.get_u32();
                let limit = BandwidthLimit::from_u8(payload.get_u8())
                    .ok_or(ProtocolError::MalformedMessage("SetPeerBandwidth limit type"))?;
                Ok(RtmpMessage::SetPeerBandwidth { size, limit })
            }

            MSG_AUDIO => Ok(RtmpMessage::Audio { data: payload }),

            MSG_VIDEO => Ok(RtmpMessage::Video { data: payload }),

            MSG_COMMAND_AMF0 => Ok(RtmpMessage::Command {
                encoding: AmfEncoding::Amf0,
                message: CommandMessage::decode(&mut payload)?,
            }),

            MSG_COMMAND_AMF3 => {
                strip_amf3_marker(&mut payload);
                Ok(RtmpMessage::Command {
                    encoding: AmfEncoding::Amf3,
                    message: CommandMessage::decode(&mut payload)?,
                })
            }

            MSG_DATA_AMF0 => Ok(RtmpMessage::Data {
                encoding: AmfEncoding::Amf0,
                message: DataMessage::decode(&mut payload)?,
            }),

            MSG_DATA_AMF3 => {
                strip_amf3_marker(&mut payload);
                Ok(RtmpMessage::Data {
                    encoding: AmfEncoding::Amf3,
                    message: DataMessage::decode(&mut payload)?,
                })
            }

            MSG_SHARED_OBJECT_AMF0 => Ok(RtmpMessage::SharedObject {
                encoding: AmfEncoding::Amf0,
                data: payload,
            }),

            MSG_SHARED_OBJECT_AMF3 => Ok(RtmpMessage::SharedObject {
                encoding: AmfEncoding::Amf3,
                data: payload,
            }),

            MSG_AGGREGATE => Ok(RtmpMessage::Aggregate { data: payload }),

            _ => Ok(RtmpMessage::Unknown {
                type_id,
                data: payload,
            }),
        }
    }

    fn decode_user_control(payload: &mut Bytes) -> Result<Self> {
        if payload.len() < 2 {
            return Err(ProtocolError::MalformedMessage("UserControl").into());
        }

        let event_type = payload.get_u16();
        let event = match event_type {
            UC_STREAM_BEGIN => UserControlEvent::StreamBegin(read_event_u32(payload)?),
            UC_STREAM_EOF => UserControlEvent::StreamEof(read_event_u32(payload)?),
            UC_STREAM_DRY => UserControlEvent::StreamDry(read_event_u32(payload)?),
            UC_SET_BUFFER_LENGTH => {
                if payload.len() < 8 {
                    return Err(ProtocolError::MalformedMessage("SetBufferLength").into());
                }
                UserControlEvent::SetBufferLength {
                    stream_id: payload.get_u32(),
                    buffer_ms: payload.get_u32(),
                }
            }
            UC_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(read_event_u32(payload)?),
            UC_PING_REQUEST => UserControlEvent::PingRequest(read_event_u32(payload)?),
            UC_PING_RESPONSE => UserControlEvent::PingResponse(read_event_u32(payload)?),
            _ => UserControlEvent::Unknown {
                event_type,
                data: payload.clone(),
            },
        };

        Ok(RtmpMessage::UserControl(event))
    }

    /// Encode this message's payload; pairs with [`RtmpMessage::type_id`]
    pub fn encode_payload(&self) -> Result<Bytes> {
        match self {
            RtmpMessage::SetChunkSize(size) => {
                if *size == 0 || *size > MAX_CHUNK_SIZE {
                    return Err(ProtocolError::ChunkSizeOutOfRange(*size).into());
                }
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                Ok(buf.freeze())
            }

            RtmpMessage::Abort { chunk_stream_id } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*chunk_stream_id);
                Ok(buf.freeze())
            }

            RtmpMessage::Ack { sequence_number } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*sequence_number);
                Ok(buf.freeze())
            }

            RtmpMessage::WindowAckSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                Ok(buf.freeze())
            }

            RtmpMessage::SetPeerBandwidth { size, limit } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(limit.as_u8());
                Ok(buf.freeze())
            }

            RtmpMessage::UserControl(event) => {
                let mut buf = BytesMut::with_capacity(10);
                match event {
                    UserControlEvent::StreamBegin(id) => {
                        buf.put_u16(UC_STREAM_BEGIN);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamEof(id) => {
                        buf.put_u16(UC_STREAM_EOF);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamDry(id) => {
                        buf.put_u16(UC_STREAM_DRY);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::SetBufferLength {
                        stream_id,
                        buffer_ms,
                    } => {
                        buf.put_u16(UC_SET_BUFFER_LENGTH);
                        buf.put_u32(*stream_id);
                        buf.put_u32(*buffer_ms);
                    }
                    UserControlEvent::StreamIsRecorded(id) => {
                        buf.put_u16(UC_STREAM_IS_RECORDED);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::PingRequest(ts) => {
                        buf.put_u16(UC_PING_REQUEST);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::PingResponse(ts) => {
                        buf.put_u16(UC_PING_RESPONSE);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::Unknown { event_type, data } => {
                        buf.put_u16(*event_type);
                        buf.put_slice(data);
                    }
                }
                Ok(buf.freeze())
            }

            RtmpMessage::Audio { data } => Ok(data.clone()),

            RtmpMessage::Video { data } => Ok(data.clone()),

            RtmpMessage::Command { encoding, message } => {
                let mut buf = BytesMut::new();
                if *encoding == AmfEncoding::Amf3 {
                    buf.put_u8(0x00);
                }
                message.encode(&mut buf);
                Ok(buf.freeze())
            }

            RtmpMessage::Data { encoding, message } => {
                let mut buf = BytesMut::new();
                if *encoding == AmfEncoding::Amf3 {
                    buf.put_u8(0x00);
                }
                message.encode(&mut buf);
                Ok(buf.freeze())
            }

            RtmpMessage::SharedObject { .. } => {
                Err(ProtocolError::NotImplemented("shared object message").into())
            }

            RtmpMessage::Aggregate { data } => Ok(data.clone()),

            RtmpMessage::Unknown { data, .. } => Ok(data.clone()),
        }
    }
}

impl DataMessage {
    fn decode(payload: &mut Bytes) -> Result<Self> {
        // Lenient on the name: some encoders emit data without a leading string
        let name = match amf0::decode(payload) {
            Ok(Amf0Value::String(s)) => s,
            _ => String::new(),
        };

        let mut values = Vec::new();
        while !payload.is_empty() {
            match amf0::decode(payload) {
                Ok(v) => values.push(v),
                Err(_) => break,
            }
        }

        Ok(DataMessage { name, values })
    }

    fn encode(&self, buf: &mut BytesMut) {
        amf0::encode(buf, &Amf0Value::String(self.name.clone()));
        amf0::encode_all(buf, &self.values);
    }
}

/// AMF3 command/data bodies are AMF0 behind a single 0x00 marker
fn strip_amf3_marker(payload: &mut Bytes) {
    if !payload.is_empty() && payload[0] == 0x00 {
        payload.advance(1);
    }
}

fn read_event_u32(payload: &mut Bytes) -> Result<u32> {
    if payload.len() < 4 {
        return Err(ProtocolError::MalformedMessage("UserControl event body").into());
    }
    Ok(payload.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{NetCommand, NetStreamPublish};

    fn roundtrip(msg: RtmpMessage) -> RtmpMessage {
        let type_id = msg.type_id();
        let payload = msg.encode_payload().expect("encode");
        RtmpMessage::decode(type_id, payload).expect("decode")
    }

    #[test]
    fn test_control_message_roundtrips() {
        assert_eq!(
            roundtrip(RtmpMessage::SetChunkSize(4096)),
            RtmpMessage::SetChunkSize(4096)
        );
        assert_eq!(
            roundtrip(RtmpMessage::Abort { chunk_stream_id: 3 }),
            RtmpMessage::Abort { chunk_stream_id: 3 }
        );
        assert_eq!(
            roundtrip(RtmpMessage::Ack {
                sequence_number: 123456
            }),
            RtmpMessage::Ack {
                sequence_number: 123456
            }
        );
        assert_eq!(
            roundtrip(RtmpMessage::WindowAckSize(2_500_000)),
            RtmpMessage::WindowAckSize(2_500_000)
        );
        assert_eq!(
            roundtrip(RtmpMessage::SetPeerBandwidth {
                size: 1024 * 1024,
                limit: BandwidthLimit::Soft
            }),
            RtmpMessage::SetPeerBandwidth {
                size: 1024 * 1024,
                limit: BandwidthLimit::Soft
            }
        );
    }

    #[test]
    fn test_set_chunk_size_rejects_out_of_range() {
        assert!(RtmpMessage::SetChunkSize(0).encode_payload().is_err());
        assert!(RtmpMessage::SetChunkSize(0x8000_0000)
            .encode_payload()
            .is_err());
        assert!(RtmpMessage::SetChunkSize(1).encode_payload().is_ok());
        assert!(RtmpMessage::SetChunkSize(0x7FFF_FFFF)
            .encode_payload()
            .is_ok());
    }

    #[test]
    fn test_set_chunk_size_decode_masks_top_bit() {
        let payload = Bytes::from_static(&[0x80, 0x00, 0x10, 0x00]);
        let msg = RtmpMessage::decode(MSG_SET_CHUNK_SIZE, payload).expect("decode");
        assert_eq!(msg, RtmpMessage::SetChunkSize(0x1000));
    }

    #[test]
    fn test_set_chunk_size_decode_rejects_zero() {
        let payload = Bytes::from_static(&[0x00, 0x00, 0x00, 0x00]);
        assert!(RtmpMessage::decode(MSG_SET_CHUNK_SIZE, payload).is_err());
    }

    #[test]
    fn test_bad_bandwidth_limit_type() {
        let payload = Bytes::from_static(&[0x00, 0x10, 0x00, 0x00, 0x03]);
        assert!(RtmpMessage::decode(MSG_SET_PEER_BANDWIDTH, payload).is_err());
    }

    #[test]
    fn test_media_passthrough() {
        let data = Bytes::from_static(b"\x17\x00opaque video payload");
        assert_eq!(
            roundtrip(RtmpMessage::Video { data: data.clone() }),
            RtmpMessage::Video { data }
        );

        let data = Bytes::from_static(b"\xAF\x01opaque audio payload");
        assert_eq!(
            roundtrip(RtmpMessage::Audio { data: data.clone() }),
            RtmpMessage::Audio { data }
        );
    }

    #[test]
    fn test_user_control_roundtrips() {
        for event in [
            UserControlEvent::StreamBegin(1),
            UserControlEvent::StreamEof(2),
            UserControlEvent::StreamDry(3),
            UserControlEvent::SetBufferLength {
                stream_id: 1,
                buffer_ms: 3000,
            },
            UserControlEvent::StreamIsRecorded(1),
            UserControlEvent::PingRequest(99),
            UserControlEvent::PingResponse(99),
        ] {
            assert_eq!(
                roundtrip(RtmpMessage::UserControl(event.clone())),
                RtmpMessage::UserControl(event)
            );
        }
    }

    #[test]
    fn test_command_amf0_roundtrip() {
        let msg = RtmpMessage::Command {
            encoding: AmfEncoding::Amf0,
            message: CommandMessage {
                transaction_id: 3.0,
                command: NetCommand::Publish(NetStreamPublish {
                    publishing_name: "cam".to_string(),
                    publishing_type: "live".to_string(),
                }),
            },
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_command_amf3_marker_shim() {
        let msg = RtmpMessage::Command {
            encoding: AmfEncoding::Amf3,
            message: CommandMessage {
                transaction_id: 2.0,
                command: NetCommand::CreateStream(
                    crate::protocol::command::NetConnectionCreateStream,
                ),
            },
        };
        let payload = msg.encode_payload().expect("encode");
        assert_eq!(payload[0], 0x00, "AMF3 body must start with the 0x00 shim");
        assert_eq!(
            RtmpMessage::decode(MSG_COMMAND_AMF3, payload).expect("decode"),
            msg
        );
    }

    #[test]
    fn test_data_message_roundtrip() {
        let msg = RtmpMessage::Data {
            encoding: AmfEncoding::Amf0,
            message: DataMessage {
                name: "@setDataFrame".to_string(),
                values: vec![
                    Amf0Value::String("onMetaData".into()),
                    Amf0Value::EcmaArray(vec![
                        ("width".to_string(), Amf0Value::Number(1920.0)),
                        ("height".to_string(), Amf0Value::Number(1080.0)),
                    ]),
                ],
            },
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn test_shared_object_decode_keeps_payload_encode_fails() {
        let payload = Bytes::from_static(b"anything");
        let msg = RtmpMessage::decode(MSG_SHARED_OBJECT_AMF0, payload.clone()).expect("decode");
        assert_eq!(
            msg,
            RtmpMessage::SharedObject {
                encoding: AmfEncoding::Amf0,
                data: payload
            }
        );
        assert!(msg.encode_payload().is_err());
    }

    #[test]
    fn test_aggregate_passthrough() {
        let data = Bytes::from_static(b"aggregate body");
        assert_eq!(
            roundtrip(RtmpMessage::Aggregate { data: data.clone() }),
            RtmpMessage::Aggregate { data }
        );
    }

    #[test]
    fn test_unknown_type_preserved() {
        let payload = Bytes::from_static(b"??");
        let msg = RtmpMessage::decode(99, payload.clone()).expect("decode");
        assert_eq!(
            msg,
            RtmpMessage::Unknown {
                type_id: 99,
                data: payload
            }
        );
        assert_eq!(msg.type_id(), 99);
    }

    #[test]
    fn test_short_payloads_error() {
        assert!(RtmpMessage::decode(MSG_SET_CHUNK_SIZE, Bytes::from_static(&[0, 0])).is_err());
        assert!(RtmpMessage::decode(MSG_ACK, Bytes::new()).is_err());
        assert!(RtmpMessage::decode(MSG_USER_CONTROL, Bytes::from_static(&[0])).is_err());
        assert!(
            RtmpMessage::decode(MSG_SET_PEER_BANDWIDTH, Bytes::from_static(&[0, 0, 0, 0]))
                .is_err()
        );
    }
}
