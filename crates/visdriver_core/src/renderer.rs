//! Renderer Boundary
//!
//! The visualization plugin that draws frames. Hosts wrap whatever drawing
//! capability they have (a plugin's render entry point, a test double) in a
//! [`Renderer`]. The pipeline never looks at what the renderer returns.

use visdriver_dsp::{AnalysisFrame, VIS_CHANNELS};

/// Everything a renderer gets for one draw call
#[derive(Debug, Clone, Copy)]
pub struct RenderData<'a> {
    /// Waveform and spectrum, 2 x 576 bytes each
    pub frame: &'a AnalysisFrame,
    /// Channel count (always 2)
    pub channels: usize,
    /// Last sample rate announced by the audio producer (0 = unknown)
    pub sample_rate: u32,
}

impl<'a> RenderData<'a> {
    pub fn new(frame: &'a AnalysisFrame, sample_rate: u32) -> Self {
        Self {
            frame,
            channels: VIS_CHANNELS,
            sample_rate,
        }
    }
}

/// Draw entry point of a visualization
///
/// # Real-time Note
///
/// In producer-thread mode `render()` runs inside the audio callback, so the
/// same rules as for audio processors apply there.
pub trait Renderer: Send {
    fn render(&mut self, data: &RenderData<'_>);
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, data: &RenderData<'_>) {
        (**self).render(data)
    }
}
