//! Pipeline Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Where the renderer's draw entry point is invoked from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Inline with the PCM callback; the slot arbiter is bypassed
    ProducerThread,
    /// From a separate render loop, fed through the slot arbiter
    RenderThread,
}

/// Visualization pipeline configuration
///
/// Consumed when the pipeline is built and fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Render synchronously from the audio producer's thread
    pub render_from_producer_thread: bool,

    /// Render loop cadence in milliseconds (render-thread mode only)
    pub render_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_from_producer_thread: false,
            // ~60fps
            render_interval_ms: 16,
        }
    }
}

impl PipelineConfig {
    /// Config that renders inline with the PCM callback
    pub fn producer_thread() -> Self {
        Self {
            render_from_producer_thread: true,
            ..Self::default()
        }
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.render_from_producer_thread {
            DeliveryMode::ProducerThread
        } else {
            DeliveryMode::RenderThread
        }
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if self.render_interval_ms == 0 || self.render_interval_ms > 1000 {
            return Err(EngineError::InvalidConfig(format!(
                "render_interval_ms must be 1-1000, got {}",
                self.render_interval_ms
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
