//! Audio subsystem module

pub mod buffer;

pub use buffer::{
    audio_buffer, BufferStats, ChunkReader, FrameConsumer, FrameProducer, MuteGate,
    StreamCounters,
};
