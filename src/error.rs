//! Error types for lumabridge

use thiserror::Error;

/// Result type alias for lumabridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// lumabridge error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Component not initialized: {0}")]
    NotInitialized(&'static str),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(&'static str),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Buffer full")]
    BufferFull,

    #[error("Operation already in flight: {0}")]
    Busy(&'static str),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Device lost: {0}")]
    DeviceLost(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Per-frame errors are discarded with the frame; the render loop continues.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            Error::ProcessingFailed(_) | Error::Timeout(_) | Error::BufferFull | Error::Busy(_)
        )
    }

    /// Fatal on the main initialization path: the caller proceeds to orderly
    /// shutdown and exits non-zero.
    pub fn is_fatal_init(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::NotInitialized(_)
                | Error::DeviceLost(_)
                | Error::OutOfMemory(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_frame_classification() {
        assert!(Error::ProcessingFailed("gpu submit".into()).is_per_frame());
        assert!(Error::Timeout("pop").is_per_frame());
        assert!(Error::BufferFull.is_per_frame());
        assert!(!Error::NotFound("connector".into()).is_per_frame());
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::NotFound("device 0".into()).is_fatal_init());
        assert!(!Error::BufferFull.is_fatal_init());
    }
}
