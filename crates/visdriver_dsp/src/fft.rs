//! FFT Spectral Analyzer
//!
//! Real-to-complex forward transform over one channel of the overlapped
//! analysis window. The transform is unnormalized: scaling compensation is
//! left to the caller (see `frame::AMPLITUDE_SCALE`).
//!
//! # Real-time Safety
//!
//! All working memory (input/output buffer and FFT scratch space) is reserved
//! at construction. `process()` neither allocates nor locks.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::DspError;
use crate::window::WINDOW_LEN;

/// Reserve a zeroed complex buffer, reporting allocation failure instead of aborting
fn try_zeroed(len: usize) -> Result<Vec<Complex<f32>>, DspError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| DspError::AllocationFailed { len })?;
    buffer.resize(len, Complex::new(0.0, 0.0));
    Ok(buffer)
}

/// Forward FFT engine with pre-allocated working state
pub struct SpectralAnalyzer {
    /// Planned forward transform (shared, immutable)
    fft: Arc<dyn Fft<f32>>,
    /// In-place transform buffer; holds the spectrum after `process()`
    buffer: Vec<Complex<f32>>,
    /// Scratch space required by the planned algorithm
    scratch: Vec<Complex<f32>>,
}

impl SpectralAnalyzer {
    /// Create an analyzer for the fixed analysis window length
    pub fn new() -> Result<Self, DspError> {
        Self::with_len(WINDOW_LEN)
    }

    /// Create an analyzer for an arbitrary even transform length
    pub fn with_len(len: usize) -> Result<Self, DspError> {
        if len == 0 || len % 2 != 0 {
            return Err(DspError::InvalidWindowLength(len));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);

        let buffer = try_zeroed(len)?;
        let scratch = try_zeroed(fft.get_inplace_scratch_len())?;

        Ok(Self {
            fft,
            buffer,
            scratch,
        })
    }

    /// Transform length in samples
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Always false: a zero-length analyzer cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Transform real-valued `input` into `len()` complex frequency bins
    ///
    /// Bin `k` and bin `len - k` are complex conjugates (real input), so callers
    /// normally read only the first half.
    pub fn process(&mut self, input: &[f32]) -> Result<&[Complex<f32>], DspError> {
        if input.len() != self.buffer.len() {
            return Err(DspError::LengthMismatch {
                expected: self.buffer.len(),
                got: input.len(),
            });
        }

        for (slot, &sample) in self.buffer.iter_mut().zip(input) {
            *slot = Complex::new(sample, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        Ok(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyzer_creation() {
        let analyzer = SpectralAnalyzer::new().unwrap();
        assert_eq!(analyzer.len(), WINDOW_LEN);
        assert!(!analyzer.is_empty());
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(
            SpectralAnalyzer::with_len(0).err(),
            Some(DspError::InvalidWindowLength(0))
        );
        assert_eq!(
            SpectralAnalyzer::with_len(1151).err(),
            Some(DspError::InvalidWindowLength(1151))
        );
    }

    #[test]
    fn test_wrong_input_length() {
        let mut analyzer = SpectralAnalyzer::new().unwrap();
        let input = vec![0.0f32; 100];
        assert!(matches!(
            analyzer.process(&input),
            Err(DspError::LengthMismatch { expected: 1152, got: 100 })
        ));
    }

    #[test]
    fn test_dc_input() {
        let mut analyzer = SpectralAnalyzer::new().unwrap();
        let input = vec![1.0f32; WINDOW_LEN];
        let output = analyzer.process(&input).unwrap();

        // Unnormalized: DC bin carries the plain sum
        assert!((output[0].re - WINDOW_LEN as f32).abs() < 1e-2);
        for bin in &output[1..] {
            assert!(bin.norm() < 1e-2);
        }
    }

    #[test]
    fn test_sine_peak() {
        let mut analyzer = SpectralAnalyzer::new().unwrap();
        let k = 24;
        let input: Vec<f32> = (0..WINDOW_LEN)
            .map(|i| (2.0 * std::f32::consts::PI * k as f32 * i as f32 / WINDOW_LEN as f32).cos())
            .collect();
        let output = analyzer.process(&input).unwrap();

        // A unit cosine on an exact bin lands as N/2 at bin k and its mirror
        let half = WINDOW_LEN as f32 / 2.0;
        assert!((output[k].norm() - half).abs() < 0.5);
        assert!((output[WINDOW_LEN - k].norm() - half).abs() < 0.5);
        assert!(output[k + 5].norm() < 0.5);
    }

    #[test]
    fn test_deterministic() {
        let mut analyzer = SpectralAnalyzer::new().unwrap();
        let input: Vec<f32> = (0..WINDOW_LEN).map(|i| ((i * 7919) % 113) as f32).collect();

        let first: Vec<Complex<f32>> = analyzer.process(&input).unwrap().to_vec();
        let second: Vec<Complex<f32>> = analyzer.process(&input).unwrap().to_vec();
        assert_eq!(first, second);
    }
}
