//! Control stream handler
//!
//! Runs on message stream 0 and owns the connection-level command state
//! machine:
//!
//! ```text
//! NotConnected ──"connect"──────▶ Connected ──"createStream"──▶ (stays)
//!                                           ──"deleteStream"──▶ (stays)
//! ```
//!
//! Anything that is not a command, and any command not expected in the
//! current state, is logged and discarded.

use crate::error::Result;
use crate::protocol::command::{AmfEncoding, CommandMessage, NetCommand, StatusInfo};
use crate::protocol::constants::*;
use crate::protocol::message::{BandwidthLimit, RtmpMessage};
use crate::server::handler::RtmpHandler;
use crate::stream::DispatchContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlState {
    NotConnected,
    Connected,
}

pub(crate) struct ControlStreamHandler {
    state: ControlState,
}

impl ControlStreamHandler {
    pub(crate) fn new() -> Self {
        Self {
            state: ControlState::NotConnected,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ControlState {
        self.state
    }

    pub(crate) async fn handle<H: RtmpHandler>(
        &mut self,
        ctx: &mut DispatchContext<'_, H>,
        chunk_stream_id: u32,
        timestamp: u32,
        message: RtmpMessage,
    ) -> Result<()> {
        let command = match message {
            RtmpMessage::Command { message, .. } => message,
            other => {
                tracing::debug!(
                    session_id = ctx.session.session_id,
                    message = ?other.type_id(),
                    "Message unhandled on control stream"
                );
                return Ok(());
            }
        };

        match self.state {
            ControlState::NotConnected => {
                self.handle_connect(ctx, chunk_stream_id, timestamp, command)
                    .await
            }
            ControlState::Connected => {
                self.handle_connected(ctx, chunk_stream_id, timestamp, command)
                    .await
            }
        }
    }

    async fn handle_connect<H: RtmpHandler>(
        &mut self,
        ctx: &mut DispatchContext<'_, H>,
        chunk_stream_id: u32,
        timestamp: u32,
        command: CommandMessage,
    ) -> Result<()> {
        match command.command {
            NetCommand::Connect(cmd) => {
                tracing::info!(
                    session_id = ctx.session.session_id,
                    app = %cmd.params.app,
                    "Connect"
                );

                match ctx.handler.on_connect(&*ctx.session, timestamp, &cmd).await {
                    Ok(()) => {}
                    Err(e) if e.is_ignorable() => {
                        tracing::warn!(
                            session_id = ctx.session.session_id,
                            error = %e,
                            "Connect declined"
                        );
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }

                ctx.session.app = cmd.params.app.clone();

                ctx.conn
                    .write(
                        0,
                        chunk_stream_id,
                        timestamp,
                        &RtmpMessage::WindowAckSize(ctx.window_ack_size),
                    )
                    .await?;

                ctx.conn
                    .write(
                        0,
                        chunk_stream_id,
                        timestamp,
                        &RtmpMessage::SetPeerBandwidth {
                            size: CONNECT_PEER_BANDWIDTH,
                            limit: BandwidthLimit::Soft,
                        },
                    )
                    .await?;

                let result = CommandMessage::connect_result(StatusInfo::status(
                    NC_CONNECT_SUCCESS,
                    "Connection succeeded.",
                ));
                ctx.conn
                    .write(
                        0,
                        chunk_stream_id,
                        timestamp,
                        &RtmpMessage::Command {
                            encoding: AmfEncoding::Amf0,
                            message: result,
                        },
                    )
                    .await?;

                self.state = ControlState::Connected;
                tracing::info!(session_id = ctx.session.session_id, "Connected");
                Ok(())
            }

            other => {
                tracing::info!(
                    session_id = ctx.session.session_id,
                    command = other.name(),
                    "Unexpected command before connect"
                );
                Ok(())
            }
        }
    }

    async fn handle_connected<H: RtmpHandler>(
        &mut self,
        ctx: &mut DispatchContext<'_, H>,
        chunk_stream_id: u32,
        timestamp: u32,
        command: CommandMessage,
    ) -> Result<()> {
        match command.command {
            NetCommand::CreateStream(_) => {
                match ctx.registry.create_data_stream() {
                    Ok(stream_id) => {
                        let reply =
                            CommandMessage::create_stream_result(command.transaction_id, stream_id);
                        if let Err(e) = ctx
                            .conn
                            .write(
                                0,
                                chunk_stream_id,
                                timestamp,
                                &RtmpMessage::Command {
                                    encoding: AmfEncoding::Amf0,
                                    message: reply,
                                },
                            )
                            .await
                        {
                            // The peer never learned about the stream; free it
                            let _ = ctx.registry.delete_stream(stream_id);
                            return Err(e);
                        }
                        tracing::info!(
                            session_id = ctx.session.session_id,
                            stream_id = stream_id,
                            "Stream created"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            session_id = ctx.session.session_id,
                            error = %e,
                            "Stream creation failed"
                        );
                        let reply = CommandMessage::error(
                            command.transaction_id,
                            StatusInfo::error(NC_CREATE_STREAM_FAILED, "No stream ids available."),
                        );
                        ctx.conn
                            .write(
                                0,
                                chunk_stream_id,
                                timestamp,
                                &RtmpMessage::Command {
                                    encoding: AmfEncoding::Amf0,
                                    message: reply,
                                },
                            )
                            .await?;
                    }
                }
                Ok(())
            }

            NetCommand::DeleteStream(cmd) => {
                // The server sends no response (spec 7.2.2.3)
                match ctx.registry.delete_stream(cmd.stream_id) {
                    Ok(()) => {
                        tracing::info!(
                            session_id = ctx.session.session_id,
                            stream_id = cmd.stream_id,
                            "Stream deleted"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_id = ctx.session.session_id,
                            stream_id = cmd.stream_id,
                            error = %e,
                            "deleteStream ignored"
                        );
                    }
                }
                Ok(())
            }

            other => {
                tracing::info!(
                    session_id = ctx.session.session_id,
                    command = other.name(),
                    "Unexpected command"
                );
                Ok(())
            }
        }
    }
}
