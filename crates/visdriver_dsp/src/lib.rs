//! visdriver DSP - Spectral Analysis for Visualization Plugins
//!
//! This crate turns raw 16-bit stereo PCM callbacks into the 8-bit
//! waveform/spectrum frames that classic visualization plugins draw:
//! - Pre-computed Hann window over a 1152-sample overlapped window
//! - Unnormalized forward FFT with working memory allocated up front
//! - Frame builder with a one-callback carry buffer for window overlap
//!
//! # Architecture
//!
//! The analysis path follows a strict "no allocation in audio callback" rule.
//! Everything the callback touches is allocated when the builder is created.

mod error;
mod fft;
mod frame;
mod window;

pub use error::DspError;
pub use fft::SpectralAnalyzer;
pub use frame::{
    AnalysisFrame, FrameBuilder, AMPLITUDE_SCALE, PCM_BITS_PER_SAMPLE, PCM_SAMPLES_PER_CALLBACK,
    VIS_CHANNELS, VIS_FRAMES,
};
pub use window::{HannWindow, WINDOW_LEN};
