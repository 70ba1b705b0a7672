//! Engine Error Types

use thiserror::Error;

/// Errors that can occur while building or running the visualization pipeline
///
/// Per-frame problems (unsupported PCM, exhausted slots) are not errors here:
/// they are logged and the frame is dropped. Only setup and teardown fail.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("DSP error: {0}")]
    DspError(#[from] visdriver_dsp::DspError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Failed to spawn render thread: {0}")]
    ThreadSpawn(String),

    #[error("Render thread panicked")]
    RenderThreadPanicked,

    #[error("Channel send error - render thread is gone")]
    ChannelSendError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
