//! RTMP server-side handshake
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version 3) ------->|
//!   |<------ S0 (1 byte: version 3) --------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |<------ S2 (1536 bytes: echo of C1) ---|
//!   |------- C2 (1536 bytes: echo of S1) -->|
//!   |          [handshake complete]         |
//! ```
//!
//! This is the "simple" handshake without the HMAC digest variant. C2 is
//! consumed but never verified; many clients send zeros there and strictness
//! buys nothing.
//!
//! Reference: RTMP Specification Section 5.2

use bytes::{Buf, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Server handshake state machine, fed from the connection's read buffer
#[derive(Debug)]
pub struct ServerHandshake {
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for C0 (version byte); responds with S0 + S1
    WaitingC0,
    /// Waiting for C1; responds with S2
    WaitingC1,
    /// Waiting for C2; no response
    WaitingC2,
    Done,
}

impl ServerHandshake {
    pub fn new() -> Self {
        Self {
            state: State::WaitingC0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Bytes required before [`ServerHandshake::consume`] can advance
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            State::WaitingC0 => 1,
            State::WaitingC1 | State::WaitingC2 => HANDSHAKE_SIZE,
            State::Done => 0,
        }
    }

    /// Consume buffered input, returning bytes to write to the peer.
    ///
    /// Returns `Ok(None)` when more input is needed and nothing is owed.
    pub fn consume(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingC0 => {
                if buf.is_empty() {
                    return Ok(None);
                }
                let version = buf.get_u8();
                if version != RTMP_VERSION {
                    return Err(HandshakeError::UnsupportedVersion(version).into());
                }

                let mut response = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
                response.extend_from_slice(&[RTMP_VERSION]);
                response.extend_from_slice(&generate_packet());

                self.state = State::WaitingC1;
                Ok(Some(response.freeze()))
            }

            State::WaitingC1 => {
                if buf.len() < HANDSHAKE_SIZE {
                    return Ok(None);
                }
                let c1 = buf.split_to(HANDSHAKE_SIZE);
                let s2 = generate_echo(&c1);

                self.state = State::WaitingC2;
                Ok(Some(Bytes::copy_from_slice(&s2)))
            }

            State::WaitingC2 => {
                if buf.len() < HANDSHAKE_SIZE {
                    return Ok(None);
                }
                // Contents intentionally unverified
                let _ = buf.split_to(HANDSHAKE_SIZE);

                self.state = State::Done;
                Ok(None)
            }

            State::Done => Ok(None),
        }
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate an S1 packet: 4-byte time, 4 zero bytes, 1528 random bytes.
///
/// The random tail uses a time-seeded LCG; the simple handshake carries no
/// cryptographic requirement.
fn generate_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];

    let timestamp = now_millis();
    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());
    // packet[4..8] stays zero for the simple handshake

    let mut seed = timestamp as u64 | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }

    packet
}

/// Generate S2: C1's time, our time, then C1's random tail
fn generate_echo(c1: &[u8]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = [0u8; HANDSHAKE_SIZE];
    echo.copy_from_slice(&c1[..HANDSHAKE_SIZE]);
    echo[4..8].copy_from_slice(&now_millis().to_be_bytes());
    echo
}

fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}
