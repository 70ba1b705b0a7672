//! visdriver Core - Visualization Pipeline
//!
//! This crate connects an audio producer's PCM callbacks to a visualization
//! renderer, including:
//! - Triple-slot lock-free frame handoff between producer and render threads
//! - Delivery mode switch (render inline, or from a polled render loop)
//! - Render loop thread with command/event channels
//! - Logging setup for hosts running under Wine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Producer Thread                         │
//! │  add_pcm_data ──▶ FrameBuilder (visdriver_dsp) ──▶ claim    │
//! │              (Zero allocation, no locks in this path)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ SlotArbiter (3 slots, atomics)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Render Thread                          │
//! │  RenderLoop ──tick──▶ FrameConsumer ──▶ Renderer::render    │
//! │      ▲                                                      │
//! │      └── crossbeam-channel ── Command / Event ── host       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
pub mod logging;
mod message;
mod pipeline;
mod render_loop;
mod renderer;
mod slots;

pub use config::{DeliveryMode, PipelineConfig};
pub use error::{EngineError, EngineResult};
pub use message::{Command, Event};
pub use pipeline::{build_pipeline, FrameConsumer, PcmProducer};
pub use render_loop::RenderLoop;
pub use renderer::{RenderData, Renderer};
pub use slots::{
    ReadClaim, SlotArbiter, SlotState, SlotStats, SlotStatsSnapshot, WriteClaim, SLOT_COUNT,
};

// Re-export DSP types for convenience
pub use visdriver_dsp::{AnalysisFrame, DspError, VIS_CHANNELS, VIS_FRAMES};
