//! RTMP handler trait
//!
//! The main extension point for RTMP applications. Implement this trait to
//! receive connection and stream lifecycle callbacks. All methods have
//! default implementations that accept everything, so a handler only spells
//! out what it cares about.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

use crate::error::{Error, HandlerError};
use crate::protocol::command::{NetConnectionConnect, NetStreamPlay, NetStreamPublish};
use crate::protocol::message::DataMessage;
use crate::server::connection::ConnectionHandle;

/// Result of a handler callback; an error closes the connection unless it is
/// [`HandlerError::Ignorable`].
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Context passed to handler callbacks.
///
/// Carries session identity plus a [`ConnectionHandle`] for handlers that
/// need to write messages or close the connection themselves.
#[derive(Clone)]
pub struct SessionContext {
    /// Unique session id
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Application name, set once `connect` succeeds
    pub app: String,

    pub(crate) connection: ConnectionHandle,
}

impl SessionContext {
    pub(crate) fn new(session_id: u64, peer_addr: SocketAddr, connection: ConnectionHandle) -> Self {
        Self {
            session_id,
            peer_addr,
            app: String::new(),
            connection,
        }
    }

    /// Write access to the connection (thread-safe, serialized internally)
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("peer_addr", &self.peer_addr)
            .field("app", &self.app)
            .finish()
    }
}

/// Handler trait for RTMP applications
///
/// # Example
///
/// ```ignore
/// use rtmp_core::{RtmpHandler, HandlerResult, SessionContext};
/// use rtmp_core::protocol::command::{NetConnectionConnect, NetStreamPublish};
///
/// struct MyHandler;
///
/// #[async_trait::async_trait]
/// impl RtmpHandler for MyHandler {
///     async fn on_publish(
///         &self,
///         _ctx: &SessionContext,
///         _timestamp: u32,
///         cmd: &NetStreamPublish,
///     ) -> HandlerResult {
///         if cmd.publishing_name.is_empty() {
///             return Err(rtmp_core::HandlerError::fatal("empty stream key"));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RtmpHandler: Send + Sync + 'static {
    /// Called on the RTMP `connect` command.
    ///
    /// Rejecting with a fatal error closes the connection before any reply.
    async fn on_connect(
        &self,
        _ctx: &SessionContext,
        _timestamp: u32,
        _cmd: &NetConnectionConnect,
    ) -> HandlerResult {
        Ok(())
    }

    /// Called on `publish`. The main authentication point for publishers.
    async fn on_publish(
        &self,
        _ctx: &SessionContext,
        _timestamp: u32,
        _cmd: &NetStreamPublish,
    ) -> HandlerResult {
        Ok(())
    }

    /// Called on `play`.
    async fn on_play(
        &self,
        _ctx: &SessionContext,
        _timestamp: u32,
        _cmd: &NetStreamPlay,
    ) -> HandlerResult {
        Ok(())
    }

    /// Called for each audio message; the payload is the raw FLV audio tag body.
    async fn on_audio(&self, _ctx: &SessionContext, _timestamp: u32, _payload: Bytes) -> HandlerResult {
        Ok(())
    }

    /// Called for each video message; the payload is the raw FLV video tag body.
    async fn on_video(&self, _ctx: &SessionContext, _timestamp: u32, _payload: Bytes) -> HandlerResult {
        Ok(())
    }

    /// Called on an `@setDataFrame` data message (stream metadata).
    async fn on_set_data_frame(&self, _ctx: &SessionContext, _timestamp: u32, _data: &DataMessage) {}

    /// Called once when the connection ends. `error` carries the terminating
    /// failure, or `None` on a clean close.
    async fn on_disconnect(&self, _ctx: &SessionContext, _error: Option<&Error>) {}
}

/// A handler that accepts everything and logs lifecycle events
pub struct LoggingHandler;

#[async_trait]
impl RtmpHandler for LoggingHandler {
    async fn on_connect(
        &self,
        ctx: &SessionContext,
        _timestamp: u32,
        cmd: &NetConnectionConnect,
    ) -> HandlerResult {
        tracing::info!(
            session_id = ctx.session_id,
            app = %cmd.params.app,
            tc_url = ?cmd.params.tc_url,
            "Connect request"
        );
        Ok(())
    }

    async fn on_publish(
        &self,
        ctx: &SessionContext,
        _timestamp: u32,
        cmd: &NetStreamPublish,
    ) -> HandlerResult {
        tracing::info!(
            session_id = ctx.session_id,
            stream_key = %cmd.publishing_name,
            publish_type = %cmd.publishing_type,
            "Publish request"
        );
        Ok(())
    }

    async fn on_play(
        &self,
        ctx: &SessionContext,
        _timestamp: u32,
        cmd: &NetStreamPlay,
    ) -> HandlerResult {
        tracing::info!(
            session_id = ctx.session_id,
            stream_name = %cmd.stream_name,
            "Play request"
        );
        Ok(())
    }

    async fn on_audio(&self, ctx: &SessionContext, timestamp: u32, payload: Bytes) -> HandlerResult {
        tracing::trace!(
            session_id = ctx.session_id,
            timestamp = timestamp,
            len = payload.len(),
            "Audio"
        );
        Ok(())
    }

    async fn on_video(&self, ctx: &SessionContext, timestamp: u32, payload: Bytes) -> HandlerResult {
        tracing::trace!(
            session_id = ctx.session_id,
            timestamp = timestamp,
            len = payload.len(),
            "Video"
        );
        Ok(())
    }

    async fn on_set_data_frame(&self, ctx: &SessionContext, _timestamp: u32, data: &DataMessage) {
        tracing::debug!(
            session_id = ctx.session_id,
            values = data.values.len(),
            "Stream metadata"
        );
    }

    async fn on_disconnect(&self, ctx: &SessionContext, error: Option<&Error>) {
        match error {
            Some(e) => tracing::info!(session_id = ctx.session_id, error = %e, "Connection closed"),
            None => tracing::info!(session_id = ctx.session_id, "Connection closed"),
        }
    }
}
