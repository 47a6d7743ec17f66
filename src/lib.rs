//! # WebSocket Audio Source
//!
//! Exposes audio streamed over a WebSocket as a pull-based audio source that
//! a speech pipeline can read like a local microphone.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐  binary frames   ┌──────────────────────────────────────┐
//! │  WS client   │ ───────────────► │ Transport (transport::websocket)     │
//! └──────────────┘   ws://…/speech  │  one streaming client at a time      │
//!                                   └──────────────────┬───────────────────┘
//!                                                      │ write(frame)
//!                                                      ▼
//!                                   ┌──────────────────────────────────────┐
//!                                   │ WebSocketAudioSource (source)        │
//!                                   │  mute gate, start / stop / restart   │
//!                                   │  ┌────────────────────────────────┐  │
//!                                   │  │ FrameProducer ─► FrameConsumer │  │
//!                                   │  │   (audio::buffer, unbounded)   │  │
//!                                   │  └────────────────────────────────┘  │
//!                                   └──────────────────┬───────────────────┘
//!                                                      │ read(n, overflow)
//!                                                      ▼
//!                                   ┌──────────────────────────────────────┐
//!                                   │ Speech pipeline (caller thread)      │
//!                                   └──────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod source;
pub mod transport;

pub use error::{Error, Result};
pub use source::{AudioSource, SessionGuard, WebSocketAudioSource};

/// Application-wide constants
pub mod constants {
    /// Default WebSocket route
    pub const DEFAULT_ROUTE: &str = "/speech";

    /// Default bind address
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Default listen port
    pub const DEFAULT_PORT: u16 = 6969;

    /// Default sample rate for speech audio
    pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

    /// Default frame size in bytes
    pub const DEFAULT_CHUNK_SIZE: usize = 1024;

    /// Default bytes per sample (16-bit PCM)
    pub const DEFAULT_SAMPLE_WIDTH: u16 = 2;
}
