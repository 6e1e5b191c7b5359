//! Logical message streams
//!
//! A connection multiplexes numbered message streams. Stream 0 is the control
//! stream and always exists; data streams are created by `createStream` and
//! torn down by `deleteStream`. Each stream is bound to a handler that owns
//! the semantic dispatch for messages addressed to it.

pub(crate) mod control;
pub(crate) mod data;

use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::message::RtmpMessage;
use crate::server::connection::ConnectionHandle;
use crate::server::handler::{RtmpHandler, SessionContext};

pub(crate) use control::ControlStreamHandler;
pub(crate) use data::DataStreamHandler;

/// Everything a stream handler may touch while processing one message.
///
/// The handler itself is detached from the registry for the duration of the
/// call, so creating and deleting other streams through `registry` is safe.
pub(crate) struct DispatchContext<'a, H: RtmpHandler> {
    pub registry: &'a mut StreamRegistry,
    pub conn: &'a ConnectionHandle,
    pub session: &'a mut SessionContext,
    pub handler: &'a H,
    /// Window advertised in the connect reply
    pub window_ack_size: u32,
}

/// Per-stream handler: control semantics on stream 0, data semantics elsewhere
pub(crate) enum StreamHandler {
    Control(ControlStreamHandler),
    Data(DataStreamHandler),
}

impl StreamHandler {
    pub(crate) async fn handle<H: RtmpHandler>(
        &mut self,
        ctx: &mut DispatchContext<'_, H>,
        chunk_stream_id: u32,
        stream_id: u32,
        timestamp: u32,
        message: RtmpMessage,
    ) -> Result<()> {
        match self {
            StreamHandler::Control(h) => h.handle(ctx, chunk_stream_id, timestamp, message).await,
            StreamHandler::Data(h) => {
                h.handle(ctx, chunk_stream_id, stream_id, timestamp, message).await
            }
        }
    }
}

/// Maps message-stream ids to their handlers
pub(crate) struct StreamRegistry {
    streams: HashMap<u32, Option<StreamHandler>>,
    max_streams: u32,
}

impl StreamRegistry {
    /// Create a registry with the control stream pre-installed on id 0
    pub(crate) fn new(max_streams: u32) -> Self {
        let mut streams = HashMap::new();
        streams.insert(0, Some(StreamHandler::Control(ControlStreamHandler::new())));
        Self {
            streams,
            max_streams,
        }
    }

    /// Allocate the smallest unused id in [1, max_streams] for a data stream
    pub(crate) fn create_data_stream(&mut self) -> Result<u32> {
        for id in 1..=self.max_streams {
            if !self.streams.contains_key(&id) {
                self.streams
                    .insert(id, Some(StreamHandler::Data(DataStreamHandler::new())));
                return Ok(id);
            }
        }
        Err(ProtocolError::StreamsExhausted.into())
    }

    /// Free a data stream id. The control stream cannot be deleted.
    pub(crate) fn delete_stream(&mut self, stream_id: u32) -> Result<()> {
        if stream_id == 0 {
            return Err(
                ProtocolError::InvalidCommand("deleteStream of the control stream".into()).into(),
            );
        }
        if self.streams.remove(&stream_id).is_none() {
            return Err(ProtocolError::StreamNotFound(stream_id).into());
        }
        Ok(())
    }

    /// Move a stream's handler out for dispatch
    pub(crate) fn detach(&mut self, stream_id: u32) -> Result<StreamHandler> {
        self.streams
            .get_mut(&stream_id)
            .and_then(Option::take)
            .ok_or_else(|| ProtocolError::StreamNotFound(stream_id).into())
    }

    /// Put a handler back after dispatch. A stream deleted while its handler
    /// was detached stays deleted.
    pub(crate) fn attach(&mut self, stream_id: u32, handler: StreamHandler) {
        if let Some(slot) = self.streams.get_mut(&stream_id) {
            *slot = Some(handler);
        }
    }

    pub(crate) fn contains(&self, stream_id: u32) -> bool {
        self.streams.contains_key(&stream_id)
    }

    /// Number of live streams, control stream included
    pub(crate) fn len(&self) -> usize {
        self.streams.len()
    }
}
