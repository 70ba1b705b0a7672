//! Message Types for Render Loop Communication
//!
//! Commands flow from the host -> render thread
//! Events flow from the render thread -> host

use serde::{Deserialize, Serialize};

use crate::slots::SlotStatsSnapshot;

/// Commands sent from the host to the render loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request a statistics snapshot (triggers a Stats event)
    RequestStats,

    /// Stop polling and hand the consumer back
    Shutdown,
}

/// Events sent from the render loop to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Slot arbiter counters plus draw calls made so far
    Stats {
        slots: SlotStatsSnapshot,
        frames_rendered: u64,
    },

    /// Render loop exited
    Stopped { frames_rendered: u64 },
}
