//! Data stream handler
//!
//! Runs on every non-zero message stream. Routes `publish`/`play` commands
//! and audio/video/metadata messages to the application handler; everything
//! else is logged and dropped.

use crate::error::Result;
use crate::protocol::command::{AmfEncoding, CommandMessage, NetCommand, StatusInfo};
use crate::protocol::constants::*;
use crate::protocol::message::{RtmpMessage, UserControlEvent};
use crate::server::handler::RtmpHandler;
use crate::stream::DispatchContext;

pub(crate) struct DataStreamHandler;

impl DataStreamHandler {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn handle<H: RtmpHandler>(
        &mut self,
        ctx: &mut DispatchContext<'_, H>,
        chunk_stream_id: u32,
        stream_id: u32,
        timestamp: u32,
        message: RtmpMessage,
    ) -> Result<()> {
        match message {
            RtmpMessage::Command { message, .. } => {
                self.handle_command(ctx, chunk_stream_id, stream_id, timestamp, message)
                    .await
            }

            RtmpMessage::Audio { data } => {
                match ctx.handler.on_audio(&*ctx.session, timestamp, data).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_ignorable() => {
                        tracing::warn!(
                            session_id = ctx.session.session_id,
                            error = %e,
                            "Audio handler error ignored"
                        );
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }

            RtmpMessage::Video { data } => {
                match ctx.handler.on_video(&*ctx.session, timestamp, data).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_ignorable() => {
                        tracing::warn!(
                            session_id = ctx.session.session_id,
                            error = %e,
                            "Video handler error ignored"
                        );
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }

            RtmpMessage::Data { message, .. } => {
                if message.name == CMD_SET_DATA_FRAME {
                    ctx.handler
                        .on_set_data_frame(&*ctx.session, timestamp, &message)
                        .await;
                } else {
                    tracing::debug!(
                        session_id = ctx.session.session_id,
                        name = %message.name,
                        "Data message ignored"
                    );
                }
                Ok(())
            }

            other => {
                tracing::debug!(
                    session_id = ctx.session.session_id,
                    stream_id = stream_id,
                    type_id = other.type_id(),
                    "Message unhandled on data stream"
                );
                Ok(())
            }
        }
    }

    async fn handle_command<H: RtmpHandler>(
        &mut self,
        ctx: &mut DispatchContext<'_, H>,
        chunk_stream_id: u32,
        stream_id: u32,
        timestamp: u32,
        command: CommandMessage,
    ) -> Result<()> {
        match command.command {
            NetCommand::Publish(cmd) => {
                tracing::info!(
                    session_id = ctx.session.session_id,
                    stream_id = stream_id,
                    name = %cmd.publishing_name,
                    publish_type = %cmd.publishing_type,
                    "Publish"
                );

                match ctx.handler.on_publish(&*ctx.session, timestamp, &cmd).await {
                    Ok(()) => {}
                    Err(e) if e.is_ignorable() => {
                        tracing::warn!(
                            session_id = ctx.session.session_id,
                            error = %e,
                            "Publish declined"
                        );
                        return Ok(());
                    }
                    Err(e) => {
                        let status = CommandMessage::on_status(StatusInfo::error(
                            NS_PUBLISH_BAD_NAME,
                            e.to_string(),
                        ));
                        let _ = ctx
                            .conn
                            .write(
                                stream_id,
                                chunk_stream_id,
                                timestamp,
                                &RtmpMessage::Command {
                                    encoding: AmfEncoding::Amf0,
                                    message: status,
                                },
                            )
                            .await;
                        return Err(e.into());
                    }
                }

                ctx.conn
                    .write(
                        0,
                        CSID_PROTOCOL_CONTROL,
                        timestamp,
                        &RtmpMessage::UserControl(UserControlEvent::StreamBegin(stream_id)),
                    )
                    .await?;

                let status = CommandMessage::on_status(StatusInfo::status(
                    NS_PUBLISH_START,
                    format!("{} is now published.", cmd.publishing_name),
                ));
                ctx.conn
                    .write(
                        stream_id,
                        chunk_stream_id,
                        timestamp,
                        &RtmpMessage::Command {
                            encoding: AmfEncoding::Amf0,
                            message: status,
                        },
                    )
                    .await?;

                Ok(())
            }

            NetCommand::Play(cmd) => {
                tracing::info!(
                    session_id = ctx.session.session_id,
                    stream_id = stream_id,
                    name = %cmd.stream_name,
                    "Play"
                );

                match ctx.handler.on_play(&*ctx.session, timestamp, &cmd).await {
                    Ok(()) => {}
                    Err(e) if e.is_ignorable() => {
                        tracing::warn!(
                            session_id = ctx.session.session_id,
                            error = %e,
                            "Play declined"
                        );
                        return Ok(());
                    }
                    Err(e) => {
                        let status = CommandMessage::on_status(StatusInfo::error(
                            NS_PLAY_STREAM_NOT_FOUND,
                            e.to_string(),
                        ));
                        let _ = ctx
                            .conn
                            .write(
                                stream_id,
                                chunk_stream_id,
                                timestamp,
                                &RtmpMessage::Command {
                                    encoding: AmfEncoding::Amf0,
                                    message: status,
                                },
                            )
                            .await;
                        return Err(e.into());
                    }
                }

                ctx.conn
                    .write(
                        0,
                        CSID_PROTOCOL_CONTROL,
                        timestamp,
                        &RtmpMessage::UserControl(UserControlEvent::StreamBegin(stream_id)),
                    )
                    .await?;

                let status = CommandMessage::on_status(StatusInfo::status(
                    NS_PLAY_START,
                    format!("Started playing {}.", cmd.stream_name),
                ));
                ctx.conn
                    .write(
                        stream_id,
                        chunk_stream_id,
                        timestamp,
                        &RtmpMessage::Command {
                            encoding: AmfEncoding::Amf0,
                            message: status,
                        },
                    )
                    .await?;

                Ok(())
            }

            other => {
                tracing::debug!(
                    session_id = ctx.session.session_id,
                    stream_id = stream_id,
                    command = other.name(),
                    "Command ignored on data stream"
                );
                Ok(())
            }
        }
    }
}
