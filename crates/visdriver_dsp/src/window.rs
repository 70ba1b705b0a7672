//! Hann Window Table
//!
//! Pre-computed raised-cosine coefficients for the overlapped analysis window.
//! The window spans the previous callback's samples followed by the current
//! callback's samples, so its length is twice the frame size.

use crate::frame::VIS_FRAMES;

/// Length of the overlapped analysis window (previous frame + current frame)
pub const WINDOW_LEN: usize = VIS_FRAMES * 2;

/// Hann coefficient for `index` in a window of `len` samples
///
/// Centered form: 1.0 at `len / 2`, 0.0 at index 0.
fn hann_factor(index: usize, len: usize) -> f32 {
    let offset = index as f32 - (len / 2) as f32;
    0.5 * (1.0 + (2.0 * std::f32::consts::PI * offset / len as f32).cos())
}

/// Pre-computed Hann window lookup table
///
/// Computed once at construction, read-only afterwards.
#[derive(Clone)]
pub struct HannWindow {
    coeffs: [f32; WINDOW_LEN],
}

impl HannWindow {
    pub fn new() -> Self {
        let coeffs = core::array::from_fn(|i| hann_factor(i, WINDOW_LEN));
        Self { coeffs }
    }

    /// Scale a single sample by the coefficient at `index`
    #[inline]
    pub fn apply(&self, sample: f32, index: usize) -> f32 {
        sample * self.coeffs[index]
    }

    /// All coefficients, in window order
    pub fn coefficients(&self) -> &[f32; WINDOW_LEN] {
        &self.coeffs
    }
}

impl Default for HannWindow {
    fn default() -> Self {
        Self::new()
    }
}
