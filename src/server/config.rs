//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum number of data message streams per connection
    pub max_message_streams: u32,

    /// Outbound chunk size. Announced to the peer after the handshake when it
    /// differs from the protocol default of 128.
    pub chunk_size: u32,

    /// Window acknowledgement size advertised on connect
    pub window_ack_size: u32,

    /// Reassembly bound for a single message
    pub max_message_size: u32,

    /// Handshake must complete within this time
    pub connection_timeout: Duration,

    /// Close the connection when no data arrives for this long
    pub read_timeout: Duration,

    /// A single write must complete within this time
    pub write_timeout: Duration,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,

    /// Application-level read buffer size
    pub read_buffer_size: usize,

    /// Application-level write buffer size
    pub write_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1935".parse().expect("static address"),
            max_message_streams: DEFAULT_MAX_MESSAGE_STREAMS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            connection_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            read_buffer_size: 64 * 1024,
            write_buffer_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a config bound to the given address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_message_streams(mut self, max: u32) -> Self {
        self.max_message_streams = max;
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn window_ack_size(mut self, size: u32) -> Self {
        self.window_ack_size = size;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), RTMP_PORT);
        assert_eq!(config.max_message_streams, 8);
        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.window_ack_size, 2_500_000);
        assert_eq!(config.max_message_size, 0xFF_FFFF);
    }

    #[test]
    fn test_chunk_size_clamped() {
        let config = ServerConfig::default().chunk_size(0xFFFF_FFFF);
        assert_eq!(config.chunk_size, MAX_CHUNK_SIZE);

        let config = ServerConfig::default().chunk_size(0);
        assert_eq!(config.chunk_size, 1);
    }

    #[test]
    fn test_builder_chain() {
        let config = ServerConfig::default()
            .max_message_streams(4)
            .window_ack_size(1000)
            .read_timeout(Duration::from_secs(5));
        assert_eq!(config.max_message_streams, 4);
        assert_eq!(config.window_ack_size, 1000);
        assert_eq!(config.read_timeout, Duration::from_secs(5));
    }
}
