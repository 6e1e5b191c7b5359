//! RTMP command messages
//!
//! Commands are AMF-encoded RPC calls: a command name, a numeric transaction
//! id, and a name-dependent body. The body of a known command decodes into a
//! typed variant; an unknown name keeps its raw argument list so dispatch can
//! log and ignore it instead of failing the connection.

use bytes::{Bytes, BytesMut};

use crate::amf::{amf0, Amf0Value};
use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// AMF encoding of a command or data message on the wire.
///
/// AMF3-tagged messages (type 17/15) carry an AMF0 body behind a single 0x00
/// marker byte; responses are always re-encoded as AMF0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmfEncoding {
    Amf0,
    Amf3,
}

/// A decoded command message
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    /// Transaction id mirrored into `_result`/`_error` replies
    pub transaction_id: f64,
    /// Name-keyed command body
    pub command: NetCommand,
}

/// Command body, keyed by command name
#[derive(Debug, Clone, PartialEq)]
pub enum NetCommand {
    Connect(NetConnectionConnect),
    ConnectResult(NetConnectionConnectResult),
    CreateStream(NetConnectionCreateStream),
    CreateStreamResult(NetConnectionCreateStreamResult),
    Publish(NetStreamPublish),
    Play(NetStreamPlay),
    DeleteStream(NetStreamDeleteStream),
    OnStatus(StatusInfo),
    Error(StatusInfo),
    /// Any command this library does not interpret
    Raw { name: String, values: Vec<Amf0Value> },
}

impl NetCommand {
    /// The wire command name for this body
    pub fn name(&self) -> &str {
        match self {
            NetCommand::Connect(_) => CMD_CONNECT,
            NetCommand::ConnectResult(_) => CMD_RESULT,
            NetCommand::CreateStream(_) => CMD_CREATE_STREAM,
            NetCommand::CreateStreamResult(_) => CMD_RESULT,
            NetCommand::Publish(_) => CMD_PUBLISH,
            NetCommand::Play(_) => CMD_PLAY,
            NetCommand::DeleteStream(_) => CMD_DELETE_STREAM,
            NetCommand::OnStatus(_) => CMD_ON_STATUS,
            NetCommand::Error(_) => CMD_ERROR,
            NetCommand::Raw { name, .. } => name,
        }
    }
}

/// `connect` request body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetConnectionConnect {
    pub params: ConnectParams,
    /// Optional user arguments after the command object
    pub args: Vec<Amf0Value>,
}

/// Typed view of the `connect` command object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectParams {
    /// Application name
    pub app: String,
    pub flash_ver: Option<String>,
    pub swf_url: Option<String>,
    /// Full RTMP URL the client dialed
    pub tc_url: Option<String>,
    pub page_url: Option<String>,
    pub object_encoding: Option<f64>,
    /// Unrecognized command-object properties, in wire order
    pub extra: Vec<(String, Amf0Value)>,
}

impl ConnectParams {
    /// Parse from the AMF command object. Lenient: missing or oddly typed
    /// fields are skipped, unknown keys are preserved.
    pub fn from_amf(obj: &Amf0Value) -> Self {
        let mut params = ConnectParams::default();

        if let Some(pairs) = obj.pairs() {
            for (key, value) in pairs {
                match key.as_str() {
                    "app" => {
                        if let Some(s) = value.as_str() {
                            params.app = s.to_string();
                        }
                    }
                    "flashVer" | "flashver" => {
                        params.flash_ver = value.as_str().map(|s| s.to_string());
                    }
                    "swfUrl" | "swfurl" => {
                        params.swf_url = value.as_str().map(|s| s.to_string());
                    }
                    "tcUrl" | "tcurl" => {
                        params.tc_url = value.as_str().map(|s| s.to_string());
                    }
                    "pageUrl" | "pageurl" => {
                        params.page_url = value.as_str().map(|s| s.to_string());
                    }
                    "objectEncoding" | "objectencoding" => {
                        params.object_encoding = value.as_number();
                    }
                    _ => {
                        params.extra.push((key.clone(), value.clone()));
                    }
                }
            }
        }

        params
    }

    /// Rebuild the AMF command object
    pub fn to_amf(&self) -> Amf0Value {
        let mut pairs = Vec::new();
        pairs.push(("app".to_string(), Amf0Value::String(self.app.clone())));
        if let Some(ref v) = self.flash_ver {
            pairs.push(("flashVer".to_string(), Amf0Value::String(v.clone())));
        }
        if let Some(ref v) = self.swf_url {
            pairs.push(("swfUrl".to_string(), Amf0Value::String(v.clone())));
        }
        if let Some(ref v) = self.tc_url {
            pairs.push(("tcUrl".to_string(), Amf0Value::String(v.clone())));
        }
        if let Some(ref v) = self.page_url {
            pairs.push(("pageUrl".to_string(), Amf0Value::String(v.clone())));
        }
        if let Some(v) = self.object_encoding {
            pairs.push(("objectEncoding".to_string(), Amf0Value::Number(v)));
        }
        pairs.extend(self.extra.iter().cloned());
        Amf0Value::Object(pairs)
    }
}

/// `_result` body for a successful `connect`
#[derive(Debug, Clone, PartialEq)]
pub struct NetConnectionConnectResult {
    pub properties: ConnectResultProperties,
    pub information: StatusInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectResultProperties {
    pub fms_ver: String,
    pub capabilities: f64,
    pub mode: f64,
}

impl Default for ConnectResultProperties {
    fn default() -> Self {
        Self {
            fms_ver: FMS_VERSION.to_string(),
            capabilities: SERVER_CAPABILITIES,
            mode: 1.0,
        }
    }
}

/// `createStream` request body (command object is always null)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetConnectionCreateStream;

/// `_result` body for `createStream`
#[derive(Debug, Clone, PartialEq)]
pub struct NetConnectionCreateStreamResult {
    pub stream_id: u32,
}

/// `publish` request body
#[derive(Debug, Clone, PartialEq)]
pub struct NetStreamPublish {
    /// Stream key
    pub publishing_name: String,
    /// "live", "record" or "append"
    pub publishing_type: String,
}

/// `play` request body
#[derive(Debug, Clone, PartialEq)]
pub struct NetStreamPlay {
    pub stream_name: String,
    /// Start position; -2 = live, -1 = live or recorded, >= 0 seek offset
    pub start: Option<f64>,
}

/// `deleteStream` request body
#[derive(Debug, Clone, PartialEq)]
pub struct NetStreamDeleteStream {
    pub stream_id: u32,
}

/// Status triple used in `onStatus`, `_error`, and the connect `_result`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub level: String,
    pub code: String,
    pub description: Option<String>,
}

impl StatusInfo {
    pub fn status(code: &str, description: impl Into<String>) -> Self {
        Self {
            level: "status".to_string(),
            code: code.to_string(),
            description: Some(description.into()),
        }
    }

    pub fn error(code: &str, description: impl Into<String>) -> Self {
        Self {
            level: "error".to_string(),
            code: code.to_string(),
            description: Some(description.into()),
        }
    }

    fn to_amf(&self) -> Amf0Value {
        let mut pairs = vec![
            ("level".to_string(), Amf0Value::String(self.level.clone())),
            ("code".to_string(), Amf0Value::String(self.code.clone())),
        ];
        if let Some(ref d) = self.description {
            pairs.push(("description".to_string(), Amf0Value::String(d.clone())));
        }
        Amf0Value::Object(pairs)
    }
}

impl CommandMessage {
    /// Decode a command payload: name, transaction id, then the body
    pub fn decode(payload: &mut Bytes) -> Result<Self> {
        let name = match amf0::decode(payload) {
            Ok(Amf0Value::String(s)) => s,
            _ => {
                return Err(ProtocolError::InvalidCommand("missing command name".into()).into());
            }
        };

        // Transaction id; lenient on odd encoders that omit it
        let transaction_id = match amf0::decode(payload) {
            Ok(Amf0Value::Number(n)) => n,
            _ => 0.0,
        };

        let command = NetCommand::decode_body(name, payload)?;

        Ok(CommandMessage {
            transaction_id,
            command,
        })
    }

    /// Encode name, transaction id, and the body as AMF0
    pub fn encode(&self, buf: &mut BytesMut) {
        amf0::encode(buf, &Amf0Value::String(self.command.name().to_string()));
        amf0::encode(buf, &Amf0Value::Number(self.transaction_id));
        self.command.encode_body(buf);
    }

    /// Build the `_result` for a successful connect (transaction id 1 per
    /// spec 7.2.1.2)
    pub fn connect_result(information: StatusInfo) -> Self {
        CommandMessage {
            transaction_id: 1.0,
            command: NetCommand::ConnectResult(NetConnectionConnectResult {
                properties: ConnectResultProperties::default(),
                information,
            }),
        }
    }

    /// Build the `_result` for createStream
    pub fn create_stream_result(transaction_id: f64, stream_id: u32) -> Self {
        CommandMessage {
            transaction_id,
            command: NetCommand::CreateStreamResult(NetConnectionCreateStreamResult { stream_id }),
        }
    }

    /// Build an `_error` reply
    pub fn error(transaction_id: f64, info: StatusInfo) -> Self {
        CommandMessage {
            transaction_id,
            command: NetCommand::Error(info),
        }
    }

    /// Build an `onStatus` notification (transaction id 0 by convention)
    pub fn on_status(info: StatusInfo) -> Self {
        CommandMessage {
            transaction_id: 0.0,
            command: NetCommand::OnStatus(info),
        }
    }
}

impl NetCommand {
    fn decode_body(name: String, payload: &mut Bytes) -> Result<Self> {
        match name.as_str() {
            CMD_CONNECT => {
                let obj = amf0::decode(payload)
                    .map_err(|_| ProtocolError::InvalidCommand(name.clone()))?;
                let args = decode_remaining(payload);
                Ok(NetCommand::Connect(NetConnectionConnect {
                    params: ConnectParams::from_amf(&obj),
                    args,
                }))
            }

            CMD_CREATE_STREAM => {
                // Command object, null in practice
                let _ = decode_remaining(payload);
                Ok(NetCommand::CreateStream(NetConnectionCreateStream))
            }

            CMD_PUBLISH => {
                let _obj = amf0::decode(payload)
                    .map_err(|_| ProtocolError::InvalidCommand(name.clone()))?;
                let publishing_name = decode_string(payload)
                    .ok_or_else(|| ProtocolError::InvalidCommand(name.clone()))?;
                let publishing_type =
                    decode_string(payload).unwrap_or_else(|| "live".to_string());
                Ok(NetCommand::Publish(NetStreamPublish {
                    publishing_name,
                    publishing_type,
                }))
            }

            CMD_PLAY => {
                let _obj = amf0::decode(payload)
                    .map_err(|_| ProtocolError::InvalidCommand(name.clone()))?;
                let stream_name = decode_string(payload)
                    .ok_or_else(|| ProtocolError::InvalidCommand(name.clone()))?;
                let start = amf0::decode(payload).ok().and_then(|v| v.as_number());
                Ok(NetCommand::Play(NetStreamPlay { stream_name, start }))
            }

            CMD_DELETE_STREAM => {
                let _obj = amf0::decode(payload)
                    .map_err(|_| ProtocolError::InvalidCommand(name.clone()))?;
                let stream_id = amf0::decode(payload)
                    .ok()
                    .and_then(|v| v.as_number())
                    .ok_or_else(|| ProtocolError::InvalidCommand(name.clone()))?;
                Ok(NetCommand::DeleteStream(NetStreamDeleteStream {
                    stream_id: stream_id as u32,
                }))
            }

            _ => Ok(NetCommand::Raw {
                name,
                values: decode_remaining(payload),
            }),
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            NetCommand::Connect(cmd) => {
                amf0::encode(buf, &cmd.params.to_amf());
                amf0::encode_all(buf, &cmd.args);
            }

            NetCommand::ConnectResult(result) => {
                let props = Amf0Value::Object(vec![
                    (
                        "fmsVer".to_string(),
                        Amf0Value::String(result.properties.fms_ver.clone()),
                    ),
                    (
                        "capabilities".to_string(),
                        Amf0Value::Number(result.properties.capabilities),
                    ),
                    ("mode".to_string(), Amf0Value::Number(result.properties.mode)),
                ]);
                amf0::encode(buf, &props);
                amf0::encode(buf, &result.information.to_amf());
            }

            NetCommand::CreateStream(_) => {
                amf0::encode(buf, &Amf0Value::Null);
            }

            NetCommand::CreateStreamResult(result) => {
                amf0::encode(buf, &Amf0Value::Null);
                amf0::encode(buf, &Amf0Value::Number(result.stream_id as f64));
            }

            NetCommand::Publish(cmd) => {
                amf0::encode(buf, &Amf0Value::Null);
                amf0::encode(buf, &Amf0Value::String(cmd.publishing_name.clone()));
                amf0::encode(buf, &Amf0Value::String(cmd.publishing_type.clone()));
            }

            NetCommand::Play(cmd) => {
                amf0::encode(buf, &Amf0Value::Null);
                amf0::encode(buf, &Amf0Value::String(cmd.stream_name.clone()));
                if let Some(start) = cmd.start {
                    amf0::encode(buf, &Amf0Value::Number(start));
                }
            }

            NetCommand::DeleteStream(cmd) => {
                amf0::encode(buf, &Amf0Value::Null);
                amf0::encode(buf, &Amf0Value::Number(cmd.stream_id as f64));
            }

            NetCommand::OnStatus(info) | NetCommand::Error(info) => {
                amf0::encode(buf, &Amf0Value::Null);
                amf0::encode(buf, &info.to_amf());
            }

            NetCommand::Raw { values, .. } => {
                amf0::encode_all(buf, values);
            }
        }
    }
}

/// Decode trailing values, stopping (not failing) on malformed bytes so that
/// unknown commands never abort the connection.
fn decode_remaining(payload: &mut Bytes) -> Vec<Amf0Value> {
    let mut values = Vec::new();
    while !payload.is_empty() {
        match amf0::decode(payload) {
            Ok(v) => values.push(v),
            Err(_) => break,
        }
    }
    values
}

fn decode_string(payload: &mut Bytes) -> Option<String> {
    match amf0::decode(payload) {
        Ok(Amf0Value::String(s)) => Some(s),
        _ => None,
    }
}
