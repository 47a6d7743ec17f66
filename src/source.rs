//! WebSocket-fed audio source
//!
//! [`WebSocketAudioSource`] owns the mute gate and the session lifecycle.
//! Each [`start`](WebSocketAudioSource::start) allocates a fresh frame queue;
//! [`stop`](WebSocketAudioSource::stop) drops it along with any unread audio.
//! The transport writes into whichever session is active, independently of
//! connection open/close events.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::audio::buffer::{
    audio_buffer, BufferStats, ChunkReader, FrameConsumer, FrameProducer, MuteGate,
    StreamCounters,
};
use crate::config::SourceConfig;
use crate::error::{ConfigError, StreamError};

/// Pull interface for anything that can stand in for a microphone
pub trait AudioSource {
    /// Nominal sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Bytes per frame
    fn chunk_size(&self) -> usize;

    /// Read `n` bytes worth of frames; see [`FrameConsumer::read`]
    fn read(&self, n: usize, overflow: bool) -> Result<ChunkReader, StreamError>;

    fn mute(&self);

    fn unmute(&self);

    fn is_muted(&self) -> bool;
}

/// One active buffer and its identity
struct StreamSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    producer: FrameProducer,
    consumer: FrameConsumer,
}

/// Serializable view of the source for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub session_id: Option<Uuid>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub muted: bool,
    pub queued_frames: usize,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub stats: BufferStats,
}

/// Audio source fed by WebSocket binary messages
pub struct WebSocketAudioSource {
    config: SourceConfig,
    gate: MuteGate,
    counters: Arc<StreamCounters>,
    session: RwLock<Option<StreamSession>>,
}

impl WebSocketAudioSource {
    /// Create a source. No session is active until [`start`](Self::start).
    pub fn new(config: SourceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let gate = MuteGate::new(config.mute);

        Ok(Self {
            config,
            gate,
            counters: Arc::new(StreamCounters::new()),
            session: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Open a new session, returning a guard that stops it when dropped.
    ///
    /// An already active session is replaced and its unread frames are lost.
    pub fn start(&self) -> SessionGuard<'_> {
        self.open_session();
        SessionGuard { source: self }
    }

    /// Open a new session without a guard. Returns the session id.
    pub fn open_session(&self) -> Uuid {
        let (producer, consumer) =
            audio_buffer(self.config.chunk_size, self.gate.clone(), self.counters.clone());
        let session = StreamSession {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            producer,
            consumer,
        };
        let id = session.id;

        if let Some(old) = self.session.write().replace(session) {
            tracing::debug!(
                "Session {} replaced with {} queued frames",
                old.id,
                old.consumer.len()
            );
        }
        tracing::info!("Audio session {} started", id);
        id
    }

    /// Drop the active session and any unread audio
    pub fn stop(&self) {
        if let Some(old) = self.session.write().take() {
            tracing::info!(
                "Audio session {} stopped, discarding {} frames",
                old.id,
                old.consumer.len()
            );
        }
    }

    /// Stop then start. Unread audio is lost.
    pub fn restart(&self) -> Uuid {
        self.stop();
        self.open_session()
    }

    pub fn is_active(&self) -> bool {
        self.session.read().is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.read().as_ref().map(|s| s.id)
    }

    /// Producer side, called from the network loop. Never blocks.
    ///
    /// Failures are counted in [`BufferStats::write_failures`].
    pub fn write(&self, frame: Bytes) -> Result<(), StreamError> {
        let result = match self.session.read().as_ref() {
            Some(session) => session.producer.push(frame),
            None => Err(StreamError::NoActiveSession),
        };
        if result.is_err() {
            self.counters.record_write_failure();
        }
        result
    }

    /// Like [`AudioSource::read`], but each frame may wait up to `timeout`
    pub fn read_timeout(
        &self,
        n: usize,
        overflow: bool,
        timeout: Duration,
    ) -> Result<ChunkReader, StreamError> {
        self.consumer()?.read_timeout(n, overflow, timeout)
    }

    /// Frames queued in the active session
    pub fn queued(&self) -> usize {
        self.session
            .read()
            .as_ref()
            .map(|s| s.consumer.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> BufferStats {
        self.counters.snapshot()
    }

    pub fn status(&self) -> SourceStatus {
        let session = self.session.read();
        SourceStatus {
            session_id: session.as_ref().map(|s| s.id),
            session_started_at: session.as_ref().map(|s| s.started_at),
            muted: self.gate.is_muted(),
            queued_frames: session.as_ref().map(|s| s.consumer.len()).unwrap_or(0),
            sample_rate: self.config.sample_rate,
            chunk_size: self.config.chunk_size,
            stats: self.counters.snapshot(),
        }
    }

    // Clone the handle so reads never hold the session lock
    fn consumer(&self) -> Result<FrameConsumer, StreamError> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.consumer.clone())
            .ok_or(StreamError::NoActiveSession)
    }
}

impl AudioSource for WebSocketAudioSource {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    fn read(&self, n: usize, overflow: bool) -> Result<ChunkReader, StreamError> {
        self.consumer()?.read(n, overflow)
    }

    fn mute(&self) {
        self.gate.mute();
    }

    fn unmute(&self) {
        self.gate.unmute();
    }

    fn is_muted(&self) -> bool {
        self.gate.is_muted()
    }
}

/// Scoped session. Stops the source when dropped.
pub struct SessionGuard<'a> {
    source: &'a WebSocketAudioSource,
}

impl Deref for SessionGuard<'_> {
    type Target = WebSocketAudioSource;

    fn deref(&self) -> &Self::Target {
        self.source
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.source.stop();
    }
}
