//! Speech Source Application
//!
//! Listens for WebSocket audio and drains it in chunk-sized reads, the way a
//! speech recogniser would, reporting throughput periodically.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ws_audio_source::{
    config::AppConfig, transport::TransportServer, AudioSource, WebSocketAudioSource,
};

/// Frames per consumer read
const FRAMES_PER_READ: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting speech source v{}", env!("CARGO_PKG_VERSION"));

    let source = Arc::new(WebSocketAudioSource::new(config.source.clone())?);
    let server = TransportServer::new(source.clone())
        .spawn(&tokio::runtime::Handle::current())
        .context("failed to start transport")?;

    tracing::info!(
        "Streaming endpoint {} ({} Hz, {} byte chunks, {:.1} ms each)",
        server.url(&config.source.route),
        config.source.sample_rate,
        config.source.chunk_size,
        config.source.chunk_duration_ms()
    );

    let running = Arc::new(AtomicBool::new(true));
    let consumer = {
        let source = source.clone();
        let running = running.clone();
        tokio::task::spawn_blocking(move || consume(&source, &running))
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    running.store(false, Ordering::SeqCst);
    consumer.await??;
    server.shutdown()?;

    tracing::info!("Stopped");
    Ok(())
}

/// Read loop on a blocking thread, standing in for a speech recogniser
fn consume(source: &WebSocketAudioSource, running: &AtomicBool) -> Result<()> {
    let session = source.start();
    let read_size = session.chunk_size() * FRAMES_PER_READ;

    let mut bytes_read = 0u64;
    let mut empty_reads = 0u64;
    let mut last_stats_time = Instant::now();

    while running.load(Ordering::SeqCst) {
        let data = session
            .read_timeout(read_size, false, Duration::from_millis(100))?
            .join()?;
        if data.is_empty() {
            empty_reads += 1;
        } else {
            bytes_read += data.len() as u64;
        }

        // Periodic stats
        if last_stats_time.elapsed() >= Duration::from_secs(5) {
            last_stats_time = Instant::now();

            let stats = session.stats();
            tracing::info!(
                "Source stats: {} frames in, {} muted, {} write failures, {} bytes read, {} empty reads, {} queued",
                stats.frames_received,
                stats.frames_muted,
                stats.write_failures,
                bytes_read,
                empty_reads,
                session.queued()
            );
        }
    }

    Ok(())
}
