//! RTMP server listener
//!
//! Accepts TCP connections and spawns one connection supervisor per socket.
//! The handler factory builds a fresh application handler for every accepted
//! connection, so handlers may carry per-connection state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::RtmpHandler;

/// RTMP server
pub struct RtmpServer<H, F>
where
    H: RtmpHandler,
    F: Fn() -> H + Send + Sync + 'static,
{
    config: ServerConfig,
    handler_factory: F,
    next_session_id: AtomicU64,
}

impl<H, F> RtmpServer<H, F>
where
    H: RtmpHandler,
    F: Fn() -> H + Send + Sync + 'static,
{
    /// Create a server; `handler_factory` is invoked once per connection
    pub fn new(config: ServerConfig, handler_factory: F) -> Self {
        Self {
            config,
            handler_factory,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Bind the configured address and serve until shut down
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "RTMP server listening");
        self.serve(listener).await
    }

    /// Serve an already-bound listener until it stops accepting
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            self.spawn_connection(socket, peer_addr);
        }
    }

    /// Serve with graceful shutdown: resolves when `shutdown` completes
    pub async fn run_until<Fut>(&self, shutdown: Fut) -> Result<()>
    where
        Fut: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "RTMP server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    fn spawn_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "Connection accepted"
        );

        let config = self.config.clone();
        let handler = Arc::new((self.handler_factory)());

        tokio::spawn(async move {
            let mut connection = Connection::new(session_id, socket, peer_addr, config, handler);

            if let Err(e) = connection.run().await {
                tracing::debug!(session_id = session_id, error = %e, "Connection error");
            }

            tracing::debug!(session_id = session_id, "Connection finished");
        });
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
