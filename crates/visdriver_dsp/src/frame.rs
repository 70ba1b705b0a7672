//! Frame Builder
//!
//! Turns one PCM callback (576 interleaved 16-bit stereo sample pairs) into an
//! [`AnalysisFrame`]: an 8-bit waveform and an 8-bit magnitude spectrum per
//! channel, in the layout visualization plugins expect.
//!
//! # Overlap
//!
//! The spectrum is computed over 1152 samples per channel: the previous
//! callback's 576 samples (the carry buffer) followed by the current 576,
//! tapered by a Hann window. The carry buffer is replaced after every call.
//!
//! # Real-time Safety
//!
//! `ingest_into()` does not allocate or lock. The only mutable state is the
//! carry buffer and the analyzer's pre-allocated working memory.

use crate::error::DspError;
use crate::fft::SpectralAnalyzer;
use crate::window::{HannWindow, WINDOW_LEN};

/// Samples per channel per frame (dictated by the visualization plugin ABI)
pub const VIS_FRAMES: usize = 576;

/// Channels per frame
pub const VIS_CHANNELS: usize = 2;

/// The only accepted PCM sample width
pub const PCM_BITS_PER_SAMPLE: u32 = 16;

/// Interleaved samples consumed per callback
pub const PCM_SAMPLES_PER_CALLBACK: usize = VIS_FRAMES * VIS_CHANNELS;

/// Magnitude scaling applied to every spectrum bin:
/// - `1 / (VIS_FRAMES / 2)` compensates the unnormalized transform
/// - `u8::MAX / i16::MAX` maps 16-bit amplitude range to 8-bit
/// - `5.0` compensates the Hann window and adds visual zoom
///
/// Tuned by eye; keep the factors as they are.
pub const AMPLITUDE_SCALE: f32 =
    1.0 / (VIS_FRAMES / 2) as f32 * 5.0 / i16::MAX as f32 * u8::MAX as f32;

/// One waveform + spectrum snapshot, 2 x 576 bytes each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisFrame {
    /// Time-domain samples, top 8 bits of the sample read as unsigned
    pub waveform: [[u8; VIS_FRAMES]; VIS_CHANNELS],
    /// Scaled magnitude per frequency bin, DC excluded (index 0 = bin 1)
    pub spectrum: [[u8; VIS_FRAMES]; VIS_CHANNELS],
}

impl AnalysisFrame {
    /// An all-zero frame (what the renderer sees when nothing is available)
    pub const fn zeroed() -> Self {
        Self {
            waveform: [[0; VIS_FRAMES]; VIS_CHANNELS],
            spectrum: [[0; VIS_FRAMES]; VIS_CHANNELS],
        }
    }

    /// Reset all samples to zero in place
    pub fn clear(&mut self) {
        for channel in 0..VIS_CHANNELS {
            self.waveform[channel].fill(0);
            self.spectrum[channel].fill(0);
        }
    }

    /// Whether every waveform and spectrum byte is zero
    pub fn is_zeroed(&self) -> bool {
        self.waveform
            .iter()
            .chain(self.spectrum.iter())
            .all(|channel| channel.iter().all(|&v| v == 0))
    }
}

impl Default for AnalysisFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Map one sample to the 8-bit waveform range (truncating, unsigned reading)
#[inline]
fn waveform_byte(sample: i16) -> u8 {
    // `as u16` reinterprets the bits: -1 becomes 0xFFFF
    ((sample as u16) / 256) as u8
}

/// Map one complex bin to the 8-bit spectrum range, saturating at both ends
#[inline]
fn spectrum_byte(re: f32, im: f32) -> u8 {
    let amplitude = (re * re + im * im).sqrt() * AMPLITUDE_SCALE;
    if amplitude > u8::MAX as f32 {
        u8::MAX
    } else if amplitude < 0.0 {
        0
    } else {
        // NaN also lands here and casts to 0
        amplitude as u8
    }
}

/// De-interleaves PCM, windows it against the previous callback and scales
/// the analysis into an [`AnalysisFrame`]
pub struct FrameBuilder {
    window: HannWindow,
    analyzer: SpectralAnalyzer,
    /// Raw interleaved samples of the previous callback
    carry: [i16; PCM_SAMPLES_PER_CALLBACK],
    /// Windowed single-channel transform input
    windowed: [f32; WINDOW_LEN],
}

impl FrameBuilder {
    /// Create a builder with a silent carry buffer
    ///
    /// Fails only if the FFT working memory cannot be allocated; the pipeline
    /// must not start in that case.
    pub fn new() -> Result<Self, DspError> {
        Ok(Self {
            window: HannWindow::new(),
            analyzer: SpectralAnalyzer::new()?,
            carry: [0; PCM_SAMPLES_PER_CALLBACK],
            windowed: [0.0; WINDOW_LEN],
        })
    }

    /// Forget the previous callback (e.g. when a new stream starts)
    pub fn reset(&mut self) {
        self.carry.fill(0);
        tracing::debug!("Frame builder carry buffer reset");
    }

    /// Samples retained from the previous callback, interleaved
    pub fn carry(&self) -> &[i16; PCM_SAMPLES_PER_CALLBACK] {
        &self.carry
    }

    /// Check whether a PCM block can be analyzed at all
    ///
    /// On success returns the one callback's worth of samples that will be
    /// used; anything past the first 576 pairs is left out.
    pub fn accepts(
        pcm: &[i16],
        channels: u32,
        bits_per_sample: u32,
    ) -> Result<&[i16; PCM_SAMPLES_PER_CALLBACK], DspError> {
        if channels != VIS_CHANNELS as u32 || bits_per_sample != PCM_BITS_PER_SAMPLE {
            return Err(DspError::UnsupportedFormat {
                channels,
                bits_per_sample,
            });
        }
        pcm.get(..PCM_SAMPLES_PER_CALLBACK)
            .and_then(|block| block.try_into().ok())
            .ok_or(DspError::BufferTooShort {
                expected: PCM_SAMPLES_PER_CALLBACK,
                got: pcm.len(),
            })
    }

    /// Analyze one callback's worth of PCM into `target`
    ///
    /// `target` is fully overwritten on success and untouched when the PCM
    /// block is rejected.
    /// Samples beyond the first 576 pairs are ignored.
    pub fn ingest_into(
        &mut self,
        pcm: &[i16],
        channels: u32,
        bits_per_sample: u32,
        target: &mut AnalysisFrame,
    ) -> Result<(), DspError> {
        let pcm = Self::accepts(pcm, channels, bits_per_sample)?;

        // Waveform: de-interleave and keep the top 8 bits
        for (i, pair) in pcm.chunks_exact(VIS_CHANNELS).enumerate() {
            for (channel, &sample) in pair.iter().enumerate() {
                target.waveform[channel][i] = waveform_byte(sample);
            }
        }

        // Spectrum: previous + current samples, windowed, transformed, scaled
        for channel in 0..VIS_CHANNELS {
            let (first_half, second_half) = self.windowed.split_at_mut(VIS_FRAMES);
            for i in 0..VIS_FRAMES {
                let previous = self.carry[VIS_CHANNELS * i + channel] as f32;
                let current = pcm[VIS_CHANNELS * i + channel] as f32;
                first_half[i] = self.window.apply(previous, i);
                second_half[i] = self.window.apply(current, i + VIS_FRAMES);
            }

            let bins = self.analyzer.process(&self.windowed)?;

            // Bin 0 (DC) is skipped
            for (out, bin) in target.spectrum[channel].iter_mut().zip(&bins[1..=VIS_FRAMES]) {
                *out = spectrum_byte(bin.re, bin.im);
            }
        }

        self.carry = *pcm;

        Ok(())
    }

    /// Advance the carry buffer without analyzing (the frame is being dropped)
    ///
    /// Keeps the next call's window contiguous with the audio stream. Takes
    /// the block returned by [`FrameBuilder::accepts`].
    pub fn carry_over(&mut self, block: &[i16; PCM_SAMPLES_PER_CALLBACK]) {
        self.carry = *block;
    }

    /// Analyze one callback into a freshly returned frame
    pub fn ingest(
        &mut self,
        pcm: &[i16],
        channels: u32,
        bits_per_sample: u32,
    ) -> Result<AnalysisFrame, DspError> {
        let mut frame = AnalysisFrame::zeroed();
        self.ingest_into(pcm, channels, bits_per_sample, &mut frame)?;
        Ok(frame)
    }
}
