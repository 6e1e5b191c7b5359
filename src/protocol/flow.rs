//! Flow-control bookkeeping for a connection
//!
//! Tracks how many bytes have crossed the socket in each direction and when
//! an `Ack` is owed to the peer. The read loop feeds byte counts in; when the
//! un-acknowledged total reaches the window size, an acknowledgement sequence
//! number comes back out and must be written before reading on.

use crate::protocol::message::BandwidthLimit;

/// Per-connection flow-control state
#[derive(Debug)]
pub struct FlowController {
    /// Bytes we may receive between acks (peer's WinAckSize governs this)
    ack_window: u32,
    /// Send-direction window granted by the peer (SetPeerBandwidth)
    peer_window: u32,
    /// A hard limit has been seen at some point
    seen_hard_limit: bool,
    /// Total bytes read from the socket
    total_read: u64,
    /// total_read value covered by the last Ack we sent
    last_acked_to: u64,
    /// Last Ack sequence number the peer reported back
    peer_acked: u32,
}

impl FlowController {
    pub fn new(window: u32) -> Self {
        Self {
            ack_window: window,
            peer_window: window,
            seen_hard_limit: false,
            total_read: 0,
            last_acked_to: 0,
            peer_acked: 0,
        }
    }

    /// Record `n` bytes read from the socket. Returns the sequence number of
    /// an `Ack` that must be sent before producing further reads, if the
    /// window boundary was crossed.
    pub fn on_bytes_read(&mut self, n: usize) -> Option<u32> {
        self.total_read += n as u64;
        if self.total_read - self.last_acked_to >= self.ack_window as u64 {
            self.last_acked_to = self.total_read;
            Some(self.total_read as u32)
        } else {
            None
        }
    }

    /// Peer announced its window via WinAckSize
    pub fn set_ack_window(&mut self, window: u32) {
        self.ack_window = window;
    }

    /// Peer acknowledged our output
    pub fn on_peer_ack(&mut self, sequence_number: u32) {
        self.peer_acked = sequence_number;
    }

    /// Apply a SetPeerBandwidth to the send-direction window.
    ///
    /// hard replaces, soft keeps the smaller window, dynamic replaces only if
    /// a hard limit was seen before and otherwise behaves like soft.
    pub fn apply_peer_bandwidth(&mut self, size: u32, limit: BandwidthLimit) {
        match limit {
            BandwidthLimit::Hard => {
                self.peer_window = size;
                self.seen_hard_limit = true;
            }
            BandwidthLimit::Soft => {
                self.peer_window = self.peer_window.min(size);
            }
            BandwidthLimit::Dynamic => {
                if self.seen_hard_limit {
                    self.peer_window = size;
                } else {
                    self.peer_window = self.peer_window.min(size);
                }
            }
        }
    }

    pub fn ack_window(&self) -> u32 {
        self.ack_window
    }

    pub fn peer_window(&self) -> u32 {
        self.peer_window
    }

    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    pub fn peer_acked(&self) -> u32 {
        self.peer_acked
    }
}
