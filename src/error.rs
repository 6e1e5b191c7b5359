//! Unified error types for rtmp-core

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all RTMP operations
#[derive(Debug)]
pub enum Error {
    /// I/O error during network operations
    Io(io::Error),
    /// RTMP protocol violation
    Protocol(ProtocolError),
    /// AMF encoding/decoding error
    Amf(AmfError),
    /// Handshake failure
    Handshake(HandshakeError),
    /// Application handler returned an error
    Handler(HandlerError),
    /// Operation timed out
    Timeout,
    /// Connection was closed
    ConnectionClosed,
    /// Invalid configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Handler(e) => write!(f, "Handler error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Error::Amf(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

impl From<HandlerError> for Error {
    fn from(err: HandlerError) -> Self {
        Error::Handler(err)
    }
}

/// Protocol-level errors. All of these are fatal to the connection.
#[derive(Debug)]
pub enum ProtocolError {
    /// Ran out of bytes inside a fixed-width field
    UnexpectedEof,
    /// Malformed chunk basic/message header
    InvalidChunkHeader,
    /// Chunk stream id outside [2, 65599]
    ChunkStreamIdOutOfRange(u32),
    /// Chunk size outside [1, 0x7FFFFFFF]
    ChunkSizeOutOfRange(u32),
    MessageTooLarge { size: u32, max: u32 },
    /// Message payload shorter than, or inconsistent with, its wire format
    MalformedMessage(&'static str),
    /// Known command with a malformed body
    InvalidCommand(String),
    /// Message addressed to a stream that was never created
    StreamNotFound(u32),
    /// No free message-stream ids left
    StreamsExhausted,
    /// Reserved message kind with no wire support
    NotImplemented(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedEof => write!(f, "Unexpected end of input"),
            ProtocolError::InvalidChunkHeader => write!(f, "Invalid chunk header"),
            ProtocolError::ChunkStreamIdOutOfRange(id) => {
                write!(f, "Chunk stream id out of range: {}", id)
            }
            ProtocolError::ChunkSizeOutOfRange(size) => {
                write!(f, "Chunk size out of range: {}", size)
            }
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::MalformedMessage(what) => write!(f, "Malformed message: {}", what),
            ProtocolError::InvalidCommand(cmd) => write!(f, "Invalid command: {}", cmd),
            ProtocolError::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
            ProtocolError::StreamsExhausted => write!(f, "No message-stream ids available"),
            ProtocolError::NotImplemented(what) => write!(f, "Not implemented: {}", what),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF encoding/decoding errors
#[derive(Debug)]
pub enum AmfError {
    UnknownMarker(u8),
    UnexpectedEof,
    InvalidUtf8,
    NestingTooDeep,
    InvalidObjectEnd,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnknownMarker(m) => write!(f, "Unknown AMF marker: 0x{:02x}", m),
            AmfError::UnexpectedEof => write!(f, "Unexpected end of AMF data"),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            AmfError::InvalidObjectEnd => write!(f, "Invalid object end marker"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Handshake-specific errors
#[derive(Debug)]
pub enum HandshakeError {
    /// C0 carried a version other than 3
    UnsupportedVersion(u8),
    /// Peer hung up mid-handshake
    Failed,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::UnsupportedVersion(v) => {
                write!(f, "Unsupported RTMP version: {}", v)
            }
            HandshakeError::Failed => write!(f, "Handshake failed"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Error returned by application handler callbacks.
///
/// A `Fatal` error tears the connection down; an `Ignorable` error is logged
/// and the connection keeps running.
#[derive(Debug, Clone)]
pub enum HandlerError {
    Fatal(String),
    Ignorable(String),
}

impl HandlerError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        HandlerError::Fatal(msg.into())
    }

    pub fn ignorable(msg: impl Into<String>) -> Self {
        HandlerError::Ignorable(msg.into())
    }

    pub fn is_ignorable(&self) -> bool {
        matches!(self, HandlerError::Ignorable(_))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Fatal(msg) => write!(f, "{}", msg),
            HandlerError::Ignorable(msg) => write!(f, "{} (ignorable)", msg),
        }
    }
}

impl std::error::Error for HandlerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;
    use std::io;

    #[test]
    fn test_error_display() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error"));

        let err = Error::Protocol(ProtocolError::InvalidChunkHeader);
        assert!(err.to_string().contains("Protocol error"));
        assert!(err.to_string().contains("Invalid chunk header"));

        let err = Error::Amf(AmfError::UnknownMarker(0xFF));
        assert!(err.to_string().contains("AMF error"));
        assert!(err.to_string().contains("0xff"));

        let err = Error::Handshake(HandshakeError::UnsupportedVersion(5));
        assert!(err.to_string().contains("Handshake error"));
        assert!(err.to_string().contains("5"));

        let err = Error::Handler(HandlerError::fatal("no such app"));
        assert!(err.to_string().contains("no such app"));

        assert!(Error::Timeout.to_string().contains("timed out"));
        assert!(Error::ConnectionClosed.to_string().contains("closed"));
    }

    #[test]
    fn test_error_source() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = Error::Io(io_err);
        assert!(StdError::source(&err).is_some());

        let err = Error::Protocol(ProtocolError::StreamsExhausted);
        assert!(StdError::source(&err).is_none());
    }

    #[test]
    fn test_from_conversions() {
        let err: Error = ProtocolError::ChunkSizeOutOfRange(0).into();
        assert!(matches!(err, Error::Protocol(_)));

        let err: Error = AmfError::UnexpectedEof.into();
        assert!(matches!(err, Error::Amf(_)));

        let err: Error = HandshakeError::Failed.into();
        assert!(matches!(err, Error::Handshake(_)));

        let err: Error = HandlerError::ignorable("meh").into();
        assert!(matches!(err, Error::Handler(_)));
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MessageTooLarge {
            size: 20_000_000,
            max: 0xFFFFFF,
        };
        assert!(err.to_string().contains("20000000"));

        assert!(ProtocolError::ChunkStreamIdOutOfRange(70000)
            .to_string()
            .contains("70000"));

        assert!(ProtocolError::ChunkSizeOutOfRange(0x8000_0000)
            .to_string()
            .contains(&0x8000_0000u32.to_string()));

        assert!(ProtocolError::StreamNotFound(5).to_string().contains("5"));
        assert!(ProtocolError::NotImplemented("shared object")
            .to_string()
            .contains("shared object"));
    }

    #[test]
    fn test_handler_error_ignorable() {
        assert!(HandlerError::ignorable("x").is_ignorable());
        assert!(!HandlerError::fatal("x").is_ignorable());
    }
}
