//! Visualization Pipeline - Delivery Mode Switch
//!
//! Splits the pipeline into a producer half (called from the audio producer's
//! PCM callback) and a consumer half (called from the render loop), the same
//! way an SPSC ring buffer hands out its two ends.
//!
//! ```text
//! ProducerThread mode:
//!   PCM ──▶ FrameBuilder ──▶ renderer storage ──▶ Renderer::render()   (inline)
//!
//! RenderThread mode:
//!   PCM ──▶ FrameBuilder ──▶ SlotArbiter ─ ─ ─▶ FrameConsumer::render() ──▶ Renderer::render()
//!           (producer thread)                   (render thread, polled)
//! ```
//!
//! The renderer lives in whichever half calls it, so neither mode needs a lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, trace};
use visdriver_dsp::{AnalysisFrame, FrameBuilder};

use crate::config::{DeliveryMode, PipelineConfig};
use crate::error::EngineResult;
use crate::renderer::{RenderData, Renderer};
use crate::slots::{SlotArbiter, SlotStatsSnapshot, SLOT_COUNT};

/// State shared by both halves
struct Shared {
    arbiter: SlotArbiter,
    /// Last announced sample rate (0 = unknown)
    sample_rate: AtomicU32,
}

/// Where the producer sends finished frames
enum Delivery<R> {
    /// Straight into the renderer's input storage, then draw inline
    Direct {
        renderer: R,
        frame: Box<AnalysisFrame>,
    },
    /// Publish through the slot arbiter
    Slots,
}

/// Build a pipeline and split it into its producer and consumer halves
///
/// The delivery mode is fixed here. Fails if the configuration is invalid or
/// the FFT working memory cannot be allocated; the pipeline must not start then.
pub fn build_pipeline<R: Renderer>(
    config: &PipelineConfig,
    renderer: R,
) -> EngineResult<(PcmProducer<R>, FrameConsumer<R>)> {
    config.validate()?;
    let builder = FrameBuilder::new()?;

    let shared = Arc::new(Shared {
        arbiter: SlotArbiter::new(),
        sample_rate: AtomicU32::new(0),
    });

    let mode = config.delivery_mode();
    let (delivery, consumer_renderer) = match mode {
        DeliveryMode::ProducerThread => {
            info!("Will render from: producer thread");
            (
                Delivery::Direct {
                    renderer,
                    frame: Box::new(AnalysisFrame::zeroed()),
                },
                None,
            )
        }
        DeliveryMode::RenderThread => {
            info!("Will render from: render thread");
            (Delivery::Slots, Some(renderer))
        }
    };

    let producer = PcmProducer {
        builder,
        delivery,
        shared: Arc::clone(&shared),
    };
    let consumer = FrameConsumer {
        renderer: consumer_renderer,
        frame: Box::new(AnalysisFrame::zeroed()),
        shared,
        render_interval: config.render_interval(),
        frames_rendered: 0,
    };

    Ok((producer, consumer))
}

/// Producer half: receives PCM from the audio producer
///
/// Every method is safe to call from an audio callback: no allocation, no
/// locks, no waiting.
pub struct PcmProducer<R> {
    builder: FrameBuilder,
    delivery: Delivery<R>,
    shared: Arc<Shared>,
}

impl<R: Renderer> PcmProducer<R> {
    /// A new stream is starting: forget the previous audio
    pub fn init(&mut self, max_latency_ms: u32, sample_rate: u32) {
        debug!(
            "Producer announced: maximum latency {}ms, sampling rate {}",
            max_latency_ms, sample_rate
        );
        self.shared.sample_rate.store(sample_rate, Ordering::Relaxed);
        self.builder.reset();
    }

    /// Stream parameters changed
    pub fn set_info(&mut self, sample_rate: u32, channels: u32) {
        debug!(
            "Producer announced: sampling rate {}, {} channels",
            sample_rate, channels
        );
        self.shared.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    /// Analyze one PCM block and deliver it according to the delivery mode
    ///
    /// Returns whether a frame was delivered. Unsupported formats and slot
    /// exhaustion are logged and the frame is dropped.
    pub fn add_pcm_data(
        &mut self,
        pcm: &[i16],
        channels: u32,
        bits_per_sample: u32,
        timestamp: i32,
    ) -> bool {
        let block = match FrameBuilder::accepts(pcm, channels, bits_per_sample) {
            Ok(block) => block,
            Err(e) => {
                error!(timestamp, "Skipping PCM block: {}", e);
                return false;
            }
        };

        match &mut self.delivery {
            Delivery::Direct { renderer, frame } => {
                if let Err(e) = self
                    .builder
                    .ingest_into(block, channels, bits_per_sample, frame)
                {
                    error!(timestamp, "Frame analysis failed: {}", e);
                    return false;
                }
                let sample_rate = self.shared.sample_rate.load(Ordering::Relaxed);
                renderer.render(&RenderData::new(frame, sample_rate));
            }
            Delivery::Slots => {
                let Some(mut claim) = self.shared.arbiter.claim_for_write() else {
                    // Not expected with a single writer and a single reader
                    error!("All {} vis slots are currently locked, dropping frame", SLOT_COUNT);
                    self.builder.carry_over(block);
                    return false;
                };
                if let Err(e) =
                    self.builder
                        .ingest_into(block, channels, bits_per_sample, claim.frame_mut())
                {
                    error!(timestamp, "Frame analysis failed: {}", e);
                    return false;
                }
                claim.release_after_write();
            }
        }

        true
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        match self.delivery {
            Delivery::Direct { .. } => DeliveryMode::ProducerThread,
            Delivery::Slots => DeliveryMode::RenderThread,
        }
    }

    pub fn stats(&self) -> SlotStatsSnapshot {
        self.shared.arbiter.stats()
    }

    /// The renderer, if this half draws (producer-thread mode)
    pub fn renderer(&self) -> Option<&R> {
        match &self.delivery {
            Delivery::Direct { renderer, .. } => Some(renderer),
            Delivery::Slots => None,
        }
    }

    pub fn into_renderer(self) -> Option<R> {
        match self.delivery {
            Delivery::Direct { renderer, .. } => Some(renderer),
            Delivery::Slots => None,
        }
    }
}

/// Consumer half: polled by the render loop
pub struct FrameConsumer<R> {
    /// `None` in producer-thread mode (rendering happens on the producer side)
    renderer: Option<R>,
    /// The renderer's input storage
    frame: Box<AnalysisFrame>,
    shared: Arc<Shared>,
    /// Polling cadence for the render loop, from the pipeline config
    render_interval: Duration,
    frames_rendered: u64,
}

impl<R: Renderer> FrameConsumer<R> {
    /// Draw the freshest published frame, or silence if none can be claimed
    ///
    /// Returns whether a published frame was drawn. In producer-thread mode
    /// this does nothing and returns `false`.
    pub fn render(&mut self) -> bool {
        let Some(renderer) = self.renderer.as_mut() else {
            return false;
        };

        let claim = self.shared.arbiter.try_claim_for_read();
        match &claim {
            Some(claim) => self.frame.as_mut().clone_from(claim.frame()),
            None => {
                trace!("No vis slot available, rendering silence");
                self.frame.clear();
            }
        }

        let sample_rate = self.shared.sample_rate.load(Ordering::Relaxed);
        renderer.render(&RenderData::new(&self.frame, sample_rate));
        self.frames_rendered += 1;

        let fresh = claim.is_some();
        SlotArbiter::release_after_read(claim);
        fresh
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.renderer.is_some() {
            DeliveryMode::RenderThread
        } else {
            DeliveryMode::ProducerThread
        }
    }

    /// How often the render loop should poll this half
    pub fn render_interval(&self) -> Duration {
        self.render_interval
    }

    /// Draw calls made by this half
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn stats(&self) -> SlotStatsSnapshot {
        self.shared.arbiter.stats()
    }

    /// The renderer, if this half draws (render-thread mode)
    pub fn renderer(&self) -> Option<&R> {
        self.renderer.as_ref()
    }

    pub fn into_renderer(self) -> Option<R> {
        self.renderer
    }
}
