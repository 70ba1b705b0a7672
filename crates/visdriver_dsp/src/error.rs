//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DspError {
    #[error("Invalid transform length: {0} (must be non-zero and even)")]
    InvalidWindowLength(usize),

    #[error("Could not allocate FFT working memory for {len} samples")]
    AllocationFailed { len: usize },

    #[error("Unsupported PCM format: {channels} channels at {bits_per_sample} bits per sample (need 16 bit stereo)")]
    UnsupportedFormat { channels: u32, bits_per_sample: u32 },

    #[error("PCM buffer too short: expected {expected} samples, got {got}")]
    BufferTooShort { expected: usize, got: usize },

    #[error("Transform input length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}
