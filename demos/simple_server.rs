//! Minimal RTMP server: accepts every stream and logs what flows through.
//!
//! Run with `cargo run --example simple_server`, then publish to it:
//! `ffmpeg -re -i input.mp4 -c copy -f flv rtmp://localhost/live/cam`

use rtmp_core::{LoggingHandler, RtmpServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtmp_core=debug".into()),
        )
        .init();

    let config = ServerConfig::default().chunk_size(4096);
    let server = RtmpServer::new(config, || LoggingHandler);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
