//! Per-connection supervisor
//!
//! Owns the handshake, the read loop, and per-stream dispatch for a single
//! accepted socket. Inbound bytes flow through the handshake, then the chunk
//! decoder, then the stream registry into the stream handlers. All outbound
//! traffic goes through a [`ConnectionHandle`], whose internal mutex
//! serializes chunk-encoder state, socket writes, and the written-byte
//! counter, so handlers and the read loop can write concurrently.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf};
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::error::{Error, HandshakeError, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
use crate::protocol::constants::*;
use crate::protocol::flow::FlowController;
use crate::protocol::handshake::ServerHandshake;
use crate::protocol::message::{RtmpMessage, UserControlEvent};
use crate::server::config::ServerConfig;
use crate::server::handler::{RtmpHandler, SessionContext};
use crate::stream::{DispatchContext, StreamRegistry};

/// Write half of a connection: socket sink, chunk encoder state, and the
/// outbound byte counter, all guarded by one mutex.
struct MessageWriter {
    io: Box<dyn AsyncWrite + Send + Unpin>,
    encoder: ChunkEncoder,
    scratch: BytesMut,
    total_written: u64,
    write_timeout: Duration,
}

impl MessageWriter {
    async fn write_message(
        &mut self,
        stream_id: u32,
        chunk_stream_id: u32,
        timestamp: u32,
        message: &RtmpMessage,
    ) -> Result<()> {
        let payload = message.encode_payload()?;
        let raw = RawMessage {
            chunk_stream_id,
            timestamp,
            type_id: message.type_id(),
            message_stream_id: stream_id,
            payload,
        };

        self.scratch.clear();
        self.encoder.encode(&raw, &mut self.scratch)?;
        self.flush_scratch().await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.scratch.extend_from_slice(bytes);
        self.flush_scratch().await
    }

    async fn flush_scratch(&mut self) -> Result<()> {
        let io = &mut self.io;
        let scratch = &self.scratch;
        let write = async move {
            io.write_all(scratch).await?;
            io.flush().await
        };

        match timeout(self.write_timeout, write).await {
            Ok(result) => {
                result?;
                self.total_written += self.scratch.len() as u64;
                Ok(())
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}

/// Thread-safe write access to a connection.
///
/// Handles may be cloned freely; messages submitted on the same chunk stream
/// go out in submission order, and `close` interrupts the connection's read
/// loop and fails all later writes with [`Error::ConnectionClosed`].
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionShared>,
}

struct ConnectionShared {
    writer: Mutex<MessageWriter>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl ConnectionHandle {
    pub(crate) fn new(
        io: Box<dyn AsyncWrite + Send + Unpin>,
        write_timeout: Duration,
        write_buffer_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionShared {
                writer: Mutex::new(MessageWriter {
                    io,
                    encoder: ChunkEncoder::new(),
                    scratch: BytesMut::with_capacity(write_buffer_size),
                    total_written: 0,
                    write_timeout,
                }),
                closed: AtomicBool::new(false),
                close_notify: Notify::new(),
            }),
        }
    }

    /// Write one message, fragmenting it into chunks as needed
    pub async fn write(
        &self,
        stream_id: u32,
        chunk_stream_id: u32,
        timestamp: u32,
        message: &RtmpMessage,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let mut writer = self.inner.writer.lock().await;
        writer
            .write_message(stream_id, chunk_stream_id, timestamp, message)
            .await
    }

    /// Close the connection: wakes the read loop and fails later writes
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.close_notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Bytes written to the socket so far
    pub async fn total_written(&self) -> u64 {
        self.inner.writer.lock().await.total_written
    }

    pub(crate) async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let mut writer = self.inner.writer.lock().await;
        writer.write_raw(bytes).await
    }

    /// Announce a new outbound chunk size and switch the encoder over, in one
    /// critical section so no message can interleave between the two.
    pub(crate) async fn announce_chunk_size(&self, size: u32) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        writer
            .write_message(
                0,
                CSID_PROTOCOL_CONTROL,
                0,
                &RtmpMessage::SetChunkSize(size),
            )
            .await?;
        writer.encoder.set_chunk_size(size);
        Ok(())
    }

    pub(crate) async fn wait_closed(&self) {
        while !self.is_closed() {
            let notified = self.inner.close_notify.notified();
            if self.is_closed() {
                break;
            }
            notified.await;
        }
    }
}

/// Supervisor for one accepted connection
pub struct Connection<S, H: RtmpHandler> {
    session: SessionContext,
    reader: BufReader<ReadHalf<S>>,
    read_buf: BytesMut,
    decoder: ChunkDecoder,
    flow: FlowController,
    registry: StreamRegistry,
    handle: ConnectionHandle,
    config: ServerConfig,
    handler: Arc<H>,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    H: RtmpHandler,
{
    pub fn new(
        session_id: u64,
        io: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        handler: Arc<H>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        let handle = ConnectionHandle::new(
            Box::new(write_half),
            config.write_timeout,
            config.write_buffer_size,
        );

        Self {
            session: SessionContext::new(session_id, peer_addr, handle.clone()),
            reader: BufReader::with_capacity(config.read_buffer_size, read_half),
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            decoder: ChunkDecoder::new().with_max_message_size(config.max_message_size),
            flow: FlowController::new(config.window_ack_size),
            registry: StreamRegistry::new(config.max_message_streams),
            handle,
            config,
            handler,
        }
    }

    /// Write access for the owner (the listener hands this to applications)
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Run the connection to completion: handshake, then the message loop.
    ///
    /// The handler's `on_disconnect` fires on every exit path with the
    /// terminating error, if any.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_inner().await;

        self.handle.close();
        self.handler
            .on_disconnect(&self.session, result.as_ref().err())
            .await;

        result
    }

    async fn run_inner(&mut self) -> Result<()> {
        self.do_handshake().await?;
        tracing::debug!(session_id = self.session.session_id, "Handshake complete");

        if self.config.chunk_size != DEFAULT_CHUNK_SIZE {
            self.handle.announce_chunk_size(self.config.chunk_size).await?;
        }

        self.message_loop().await
    }

    async fn do_handshake(&mut self) -> Result<()> {
        let mut handshake = ServerHandshake::new();
        let deadline = self.config.connection_timeout;

        timeout(deadline, async {
            loop {
                if let Some(response) = handshake.consume(&mut self.read_buf)? {
                    self.handle.write_bytes(&response).await?;
                }
                if handshake.is_done() {
                    break;
                }
                if self.read_buf.len() >= handshake.bytes_needed() {
                    continue;
                }

                let n = self.reader.read_buf(&mut self.read_buf).await?;
                if n == 0 {
                    return Err(HandshakeError::Failed.into());
                }
            }
            Ok::<_, Error>(())
        })
        .await
        .map_err(|_| Error::Timeout)??;

        Ok(())
    }

    async fn message_loop(&mut self) -> Result<()> {
        let handle = self.handle.clone();

        loop {
            // Drain every complete message already buffered
            while let Some(raw) = self.decoder.decode(&mut self.read_buf)? {
                self.dispatch(raw).await?;
            }

            if handle.is_closed() {
                return Ok(());
            }

            tokio::select! {
                _ = handle.wait_closed() => return Ok(()),

                read = timeout(self.config.read_timeout, self.reader.read_buf(&mut self.read_buf)) => {
                    match read {
                        Err(_) => {
                            tracing::debug!(
                                session_id = self.session.session_id,
                                "Read timeout, closing"
                            );
                            return Ok(());
                        }
                        Ok(Ok(0)) => return Ok(()),
                        Ok(Ok(n)) => {
                            if let Some(sequence_number) = self.flow.on_bytes_read(n) {
                                handle
                                    .write(
                                        0,
                                        CSID_PROTOCOL_CONTROL,
                                        0,
                                        &RtmpMessage::Ack { sequence_number },
                                    )
                                    .await?;
                            }
                        }
                        Ok(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, raw: RawMessage) -> Result<()> {
        let chunk_stream_id = raw.chunk_stream_id;
        let stream_id = raw.message_stream_id;
        let timestamp = raw.timestamp;

        let message = RtmpMessage::decode(raw.type_id, raw.payload)?;

        // Protocol control and user control are absorbed here; everything
        // else belongs to a message stream.
        match message {
            RtmpMessage::SetChunkSize(size) => {
                tracing::debug!(
                    session_id = self.session.session_id,
                    size = size,
                    "Peer chunk size changed"
                );
                self.decoder.set_chunk_size(size);
                Ok(())
            }

            RtmpMessage::Abort { chunk_stream_id } => {
                self.decoder.abort(chunk_stream_id);
                Ok(())
            }

            RtmpMessage::Ack { sequence_number } => {
                self.flow.on_peer_ack(sequence_number);
                Ok(())
            }

            RtmpMessage::WindowAckSize(size) => {
                tracing::debug!(
                    session_id = self.session.session_id,
                    size = size,
                    "Peer window size"
                );
                self.flow.set_ack_window(size);
                Ok(())
            }

            RtmpMessage::SetPeerBandwidth { size, limit } => {
                self.flow.apply_peer_bandwidth(size, limit);
                Ok(())
            }

            RtmpMessage::UserControl(event) => self.handle_user_control(event).await,

            message => {
                let mut stream = self.registry.detach(stream_id)?;
                let mut ctx = DispatchContext {
                    registry: &mut self.registry,
                    conn: &self.handle,
                    session: &mut self.session,
                    handler: self.handler.as_ref(),
                    window_ack_size: self.config.window_ack_size,
                };
                let result = stream
                    .handle(&mut ctx, chunk_stream_id, stream_id, timestamp, message)
                    .await;
                self.registry.attach(stream_id, stream);
                result
            }
        }
    }

    async fn handle_user_control(&mut self, event: UserControlEvent) -> Result<()> {
        match event {
            UserControlEvent::PingRequest(ts) => {
                self.handle
                    .write(
                        0,
                        CSID_PROTOCOL_CONTROL,
                        0,
                        &RtmpMessage::UserControl(UserControlEvent::PingResponse(ts)),
                    )
                    .await
            }
            other => {
                tracing::trace!(
                    session_id = self.session.session_id,
                    event = ?other,
                    "User control event ignored"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::{
        AmfEncoding, CommandMessage, ConnectParams, NetCommand, NetConnectionConnect,
        NetConnectionCreateStream, NetStreamDeleteStream, NetStreamPlay, NetStreamPublish,
    };
    use crate::server::handler::HandlerResult;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{duplex, DuplexStream};

    #[derive(Default)]
    struct CountingHandler {
        connects: AtomicUsize,
        publishes: AtomicUsize,
        audio_bytes: AtomicUsize,
        video_bytes: AtomicUsize,
        disconnect_errors: AtomicUsize,
    }

    #[async_trait]
    impl RtmpHandler for CountingHandler {
        async fn on_connect(
            &self,
            _ctx: &SessionContext,
            _timestamp: u32,
            _cmd: &NetConnectionConnect,
        ) -> HandlerResult {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_publish(
            &self,
            _ctx: &SessionContext,
            _timestamp: u32,
            _cmd: &NetStreamPublish,
        ) -> HandlerResult {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_play(
            &self,
            _ctx: &SessionContext,
            _timestamp: u32,
            _cmd: &NetStreamPlay,
        ) -> HandlerResult {
            Ok(())
        }

        async fn on_audio(
            &self,
            _ctx: &SessionContext,
            _timestamp: u32,
            payload: Bytes,
        ) -> HandlerResult {
            self.audio_bytes.fetch_add(payload.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn on_video(
            &self,
            _ctx: &SessionContext,
            _timestamp: u32,
            payload: Bytes,
        ) -> HandlerResult {
            self.video_bytes.fetch_add(payload.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn on_disconnect(&self, _ctx: &SessionContext, error: Option<&Error>) {
            if error.is_some() {
                self.disconnect_errors.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Scripted RTMP client over the other end of a duplex pipe
    struct TestClient {
        io: DuplexStream,
        encoder: ChunkEncoder,
        decoder: ChunkDecoder,
        buf: BytesMut,
    }

    impl TestClient {
        fn new(io: DuplexStream) -> Self {
            Self {
                io,
                encoder: ChunkEncoder::new(),
                decoder: ChunkDecoder::new(),
                buf: BytesMut::new(),
            }
        }

        async fn handshake(&mut self) -> (Vec<u8>, Vec<u8>) {
            let c1 = vec![0x11u8; HANDSHAKE_SIZE];
            self.io.write_all(&[RTMP_VERSION]).await.unwrap();
            self.io.write_all(&c1).await.unwrap();

            let mut s0s1 = vec![0u8; 1 + HANDSHAKE_SIZE];
            self.io.read_exact(&mut s0s1).await.unwrap();
            assert_eq!(s0s1[0], RTMP_VERSION);

            let mut s2 = vec![0u8; HANDSHAKE_SIZE];
            self.io.read_exact(&mut s2).await.unwrap();

            // C2: echo S1
            self.io.write_all(&s0s1[1..]).await.unwrap();

            (c1, s2)
        }

        async fn send(&mut self, stream_id: u32, csid: u32, timestamp: u32, msg: &RtmpMessage) {
            let payload = msg.encode_payload().unwrap();
            let raw = RawMessage {
                chunk_stream_id: csid,
                timestamp,
                type_id: msg.type_id(),
                message_stream_id: stream_id,
                payload,
            };
            let mut out = BytesMut::new();
            self.encoder.encode(&raw, &mut out).unwrap();
            self.io.write_all(&out).await.unwrap();
        }

        async fn recv(&mut self) -> RtmpMessage {
            loop {
                if let Some(raw) = self.decoder.decode(&mut self.buf).unwrap() {
                    return RtmpMessage::decode(raw.type_id, raw.payload).unwrap();
                }
                let mut tmp = [0u8; 8192];
                let n = self.io.read(&mut tmp).await.unwrap();
                assert!(n > 0, "server closed unexpectedly");
                self.buf.extend_from_slice(&tmp[..n]);
            }
        }

        /// Read until the connection is closed by the server
        async fn read_to_eof(&mut self) {
            let mut tmp = [0u8; 8192];
            loop {
                match self.io.read(&mut tmp).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        }

        async fn connect(&mut self, app: &str) {
            let msg = RtmpMessage::Command {
                encoding: AmfEncoding::Amf0,
                message: CommandMessage {
                    transaction_id: 1.0,
                    command: NetCommand::Connect(NetConnectionConnect {
                        params: ConnectParams {
                            app: app.to_string(),
                            ..Default::default()
                        },
                        args: vec![],
                    }),
                },
            };
            self.send(0, CSID_COMMAND, 0, &msg).await;
        }

        async fn create_stream(&mut self, transaction_id: f64) {
            let msg = RtmpMessage::Command {
                encoding: AmfEncoding::Amf0,
                message: CommandMessage {
                    transaction_id,
                    command: NetCommand::CreateStream(NetConnectionCreateStream),
                },
            };
            self.send(0, CSID_COMMAND, 0, &msg).await;
        }
    }

    fn spawn_server<H: RtmpHandler>(config: ServerConfig, handler: Arc<H>) -> TestClient {
        let (client, server) = duplex(1 << 20);
        let addr: SocketAddr = "127.0.0.1:51935".parse().unwrap();
        tokio::spawn(async move {
            let mut conn = Connection::new(1, server, addr, config, handler);
            let _ = conn.run().await;
        });
        TestClient::new(client)
    }

    fn result_values(msg: &RtmpMessage) -> (f64, &str, &[crate::amf::Amf0Value]) {
        match msg {
            RtmpMessage::Command { message, .. } => match &message.command {
                NetCommand::Raw { name, values } => (message.transaction_id, name.as_str(), values),
                other => panic!("expected raw command, got {:?}", other),
            },
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handshake_scenario() {
        let mut client = spawn_server(ServerConfig::default(), Arc::new(CountingHandler::default()));

        let c1 = vec![0xA5u8; HANDSHAKE_SIZE];
        client.io.write_all(&[RTMP_VERSION]).await.unwrap();
        client.io.write_all(&c1).await.unwrap();

        let mut s0 = [0u8; 1];
        client.io.read_exact(&mut s0).await.unwrap();
        assert_eq!(s0[0], RTMP_VERSION);

        let mut s1 = vec![0u8; HANDSHAKE_SIZE];
        client.io.read_exact(&mut s1).await.unwrap();
        assert_eq!(&s1[4..8], &[0, 0, 0, 0]);

        let mut s2 = vec![0u8; HANDSHAKE_SIZE];
        client.io.read_exact(&mut s2).await.unwrap();
        assert_eq!(&s2[0..4], &c1[0..4], "S2 echoes C1 time");
        assert_eq!(&s2[8..], &c1[8..], "S2 echoes C1 random tail");

        // C2 content is arbitrary; the server must still enter the message loop
        client.io.write_all(&vec![0u8; HANDSHAKE_SIZE]).await.unwrap();
        client.connect("live").await;
        let reply = client.recv().await;
        assert_eq!(reply, RtmpMessage::WindowAckSize(DEFAULT_WINDOW_ACK_SIZE));
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_version() {
        let mut client = spawn_server(ServerConfig::default(), Arc::new(CountingHandler::default()));
        client.io.write_all(&[6u8]).await.unwrap();
        client.read_to_eof().await;
    }

    #[tokio::test]
    async fn test_minimal_connect_sequence() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        client.connect("live").await;

        // Expected server output, in order
        let m1 = client.recv().await;
        assert_eq!(m1, RtmpMessage::WindowAckSize(2_500_000));

        let m2 = client.recv().await;
        assert_eq!(
            m2,
            RtmpMessage::SetPeerBandwidth {
                size: 1_048_576,
                limit: crate::protocol::message::BandwidthLimit::Soft
            }
        );

        let m3 = client.recv().await;
        let (txid, name, values) = result_values(&m3);
        assert_eq!(txid, 1.0);
        assert_eq!(name, "_result");
        assert_eq!(values[0].get_number("capabilities"), Some(250.0));
        assert_eq!(
            values[1].get_str("code"),
            Some("NetConnection.Connect.Success")
        );

        assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_stream_then_publish() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        client.connect("live").await;
        for _ in 0..3 {
            client.recv().await;
        }

        client.create_stream(2.0).await;
        let reply = client.recv().await;
        let (txid, name, values) = result_values(&reply);
        assert_eq!(txid, 2.0);
        assert_eq!(name, "_result");
        assert_eq!(values[1].as_number(), Some(1.0), "first stream id is 1");

        let publish = RtmpMessage::Command {
            encoding: AmfEncoding::Amf0,
            message: CommandMessage {
                transaction_id: 3.0,
                command: NetCommand::Publish(NetStreamPublish {
                    publishing_name: "cam".to_string(),
                    publishing_type: "live".to_string(),
                }),
            },
        };
        client.send(1, CSID_COMMAND, 0, &publish).await;

        let begin = client.recv().await;
        assert_eq!(
            begin,
            RtmpMessage::UserControl(UserControlEvent::StreamBegin(1))
        );
        let status = client.recv().await;
        let (_, name, values) = result_values(&status);
        assert_eq!(name, "onStatus");
        assert_eq!(values[1].get_str("code"), Some("NetStream.Publish.Start"));

        assert_eq!(handler.publishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chunk_size_change_and_large_message() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        client.connect("live").await;
        for _ in 0..3 {
            client.recv().await;
        }
        client.create_stream(2.0).await;
        client.recv().await;

        // S4: announce 4096-byte chunks, then a 10000-byte video message
        client
            .send(0, CSID_PROTOCOL_CONTROL, 0, &RtmpMessage::SetChunkSize(4096))
            .await;
        client.encoder.set_chunk_size(4096);

        let video = RtmpMessage::Video {
            data: Bytes::from(vec![0x42u8; 10_000]),
        };
        client.send(1, CSID_VIDEO, 40, &video).await;

        // Video handler sees the fully reassembled payload
        for _ in 0..100 {
            if handler.video_bytes.load(Ordering::SeqCst) == 10_000 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "video not reassembled, got {} bytes",
            handler.video_bytes.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_window_acknowledgements() {
        let handler = Arc::new(CountingHandler::default());
        let config = ServerConfig::default().window_ack_size(1000);
        let mut client = spawn_server(config, handler.clone());

        client.handshake().await;
        client.connect("live").await;
        for _ in 0..3 {
            client.recv().await;
        }
        client.create_stream(2.0).await;
        client.recv().await;

        // Each batch crosses the 1000-byte window on its own
        let audio = RtmpMessage::Audio {
            data: Bytes::from(vec![0x01u8; 1200]),
        };
        client.send(1, CSID_AUDIO, 10, &audio).await;
        let ack1 = loop {
            match client.recv().await {
                RtmpMessage::Ack { sequence_number } => break sequence_number,
                _ => continue,
            }
        };

        let audio = RtmpMessage::Audio {
            data: Bytes::from(vec![0x02u8; 1200]),
        };
        client.send(1, CSID_AUDIO, 20, &audio).await;
        let ack2 = loop {
            match client.recv().await {
                RtmpMessage::Ack { sequence_number } => break sequence_number,
                _ => continue,
            }
        };

        assert!(ack2 > ack1, "ack sequence must increase: {} then {}", ack1, ack2);
    }

    #[tokio::test]
    async fn test_delete_stream_frees_id_without_response() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        client.connect("live").await;
        for _ in 0..3 {
            client.recv().await;
        }

        client.create_stream(2.0).await;
        client.recv().await;
        client.create_stream(3.0).await;
        let reply = client.recv().await;
        let (_, _, values) = result_values(&reply);
        assert_eq!(values[1].as_number(), Some(2.0));

        // Delete stream 1; no response is expected, so the next reply we see
        // must belong to the following createStream and reuse id 1.
        let delete = RtmpMessage::Command {
            encoding: AmfEncoding::Amf0,
            message: CommandMessage {
                transaction_id: 4.0,
                command: NetCommand::DeleteStream(NetStreamDeleteStream { stream_id: 1 }),
            },
        };
        client.send(0, CSID_COMMAND, 0, &delete).await;

        client.create_stream(5.0).await;
        let reply = client.recv().await;
        let (txid, name, values) = result_values(&reply);
        assert_eq!(txid, 5.0);
        assert_eq!(name, "_result");
        assert_eq!(values[1].as_number(), Some(1.0), "freed id 1 is reused");
    }

    #[tokio::test]
    async fn test_message_to_unknown_stream_is_fatal() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        client.connect("live").await;
        for _ in 0..3 {
            client.recv().await;
        }

        let audio = RtmpMessage::Audio {
            data: Bytes::from_static(&[0u8; 16]),
        };
        client.send(5, CSID_AUDIO, 0, &audio).await;

        client.read_to_eof().await;
        assert_eq!(handler.disconnect_errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_amf3_command_accepted_with_amf0_reply() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        let msg = RtmpMessage::Command {
            encoding: AmfEncoding::Amf3,
            message: CommandMessage {
                transaction_id: 1.0,
                command: NetCommand::Connect(NetConnectionConnect {
                    params: ConnectParams {
                        app: "live".to_string(),
                        ..Default::default()
                    },
                    args: vec![],
                }),
            },
        };
        client.send(0, CSID_COMMAND, 0, &msg).await;

        let m1 = client.recv().await;
        assert_eq!(m1, RtmpMessage::WindowAckSize(2_500_000));
        client.recv().await;
        let result = client.recv().await;
        match &result {
            RtmpMessage::Command { encoding, .. } => {
                assert_eq!(*encoding, AmfEncoding::Amf0, "replies are always AMF0");
            }
            other => panic!("expected command, got {:?}", other),
        }
        assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ping_request_answered() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        client
            .send(
                0,
                CSID_PROTOCOL_CONTROL,
                0,
                &RtmpMessage::UserControl(UserControlEvent::PingRequest(777)),
            )
            .await;

        let reply = client.recv().await;
        assert_eq!(
            reply,
            RtmpMessage::UserControl(UserControlEvent::PingResponse(777))
        );
    }

    #[tokio::test]
    async fn test_custom_chunk_size_announced_after_handshake() {
        let handler = Arc::new(CountingHandler::default());
        let config = ServerConfig::default().chunk_size(4096);
        let mut client = spawn_server(config, handler.clone());

        client.handshake().await;
        let first = client.recv().await;
        assert_eq!(first, RtmpMessage::SetChunkSize(4096));
        client.decoder.set_chunk_size(4096);
    }

    #[tokio::test]
    async fn test_unknown_command_logged_and_ignored() {
        let handler = Arc::new(CountingHandler::default());
        let mut client = spawn_server(ServerConfig::default(), handler.clone());

        client.handshake().await;
        client.connect("live").await;
        for _ in 0..3 {
            client.recv().await;
        }

        // FCPublish is not part of the core command set; the server must not
        // fail and must keep serving afterwards.
        let fc = RtmpMessage::Command {
            encoding: AmfEncoding::Amf0,
            message: CommandMessage {
                transaction_id: 6.0,
                command: NetCommand::Raw {
                    name: "FCPublish".to_string(),
                    values: vec![
                        crate::amf::Amf0Value::Null,
                        crate::amf::Amf0Value::String("cam".into()),
                    ],
                },
            },
        };
        client.send(0, CSID_COMMAND, 0, &fc).await;

        client.create_stream(7.0).await;
        let reply = client.recv().await;
        let (txid, name, _) = result_values(&reply);
        assert_eq!(txid, 7.0);
        assert_eq!(name, "_result");
    }

    #[tokio::test]
    async fn test_handle_close_fails_writes() {
        let (_client, server) = duplex(1 << 16);
        let addr: SocketAddr = "127.0.0.1:51935".parse().unwrap();
        let conn: Connection<DuplexStream, CountingHandler> = Connection::new(
            1,
            server,
            addr,
            ServerConfig::default(),
            Arc::new(CountingHandler::default()),
        );

        let handle = conn.handle();
        handle.close();
        let result = handle
            .write(0, CSID_COMMAND, 0, &RtmpMessage::WindowAckSize(1))
            .await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}
