//! Error types for the WebSocket audio source

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio stream errors, raised on the read and write paths
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Fewer frames were buffered than the read asked for
    #[error("Buffer overflow: no audio frame available")]
    Overflow,

    #[error("Read size {requested} is not a multiple of chunk size {chunk_size}")]
    ChunkMisaligned { requested: usize, chunk_size: usize },

    #[error("No active stream session")]
    NoActiveSession,

    /// The other half of the frame channel was dropped
    #[error("Stream disconnected")]
    Disconnected,
}

impl From<StreamError> for std::io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match err {
            StreamError::Overflow => std::io::ErrorKind::WouldBlock,
            StreamError::ChunkMisaligned { .. } => std::io::ErrorKind::InvalidInput,
            StreamError::NoActiveSession => std::io::ErrorKind::NotConnected,
            StreamError::Disconnected => std::io::ErrorKind::BrokenPipe,
        };
        std::io::Error::new(kind, err)
    }
}

/// Network transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Server error: {0}")]
    Serve(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_maps_to_would_block() {
        let err: std::io::Error = StreamError::Overflow.into();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_misaligned_message() {
        let err = StreamError::ChunkMisaligned { requested: 1500, chunk_size: 1024 };
        assert_eq!(
            err.to_string(),
            "Read size 1500 is not a multiple of chunk size 1024"
        );
    }
}
