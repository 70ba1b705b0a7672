//! Slot Arbiter - Lock-free Triple Buffer
//!
//! Hands analysis frames from exactly one producer (the PCM callback) to
//! exactly one consumer (the render loop) without locks, waits or allocation.
//!
//! # Protocol
//!
//! Each of the three slots carries an atomic state tag:
//!
//! ```text
//!   FREE ──claim_for_write──▶ WRITE_LOCKED ──release_after_write──▶ FREE (+ last_written)
//!   FREE ──try_claim_for_read──▶ READ_LOCKED ──release_after_read──▶ FREE
//! ```
//!
//! Claims are single compare-and-swap attempts per slot, at most three probes.
//! A failed claim is a dropped (writer) or stale (reader) frame, never a wait.
//!
//! The writer starts probing right after the last written slot, so with a single
//! reader holding at most one slot it never overwrites the freshest frame.
//! The reader starts at the last written slot and walks backwards, preferring
//! fresh data over stale data.
//!
//! The state tag is the publication fence: frame contents are written before a
//! `Release` store of `FREE`, and read after an `Acquire` compare-and-swap.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use visdriver_dsp::AnalysisFrame;

/// Number of slots (fixed by the triple-buffer protocol)
pub const SLOT_COUNT: usize = 3;

/// Sentinel for "nothing published yet"
const NONE_WRITTEN: usize = usize::MAX;

/// Slot state tag
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free = b'_',
    WriteLocked = b'W',
    ReadLocked = b'R',
}

impl SlotState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            b'W' => SlotState::WriteLocked,
            b'R' => SlotState::ReadLocked,
            _ => SlotState::Free,
        }
    }
}

/// One storage cell: a frame plus its state tag
struct Slot {
    state: AtomicU8,
    frame: UnsafeCell<AnalysisFrame>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SlotState::Free as u8),
            frame: UnsafeCell::new(AnalysisFrame::zeroed()),
        }
    }

    /// Single compare-and-swap attempt from `from` to `to`
    #[inline]
    fn try_transition(&self, from: SlotState, to: SlotState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn release(&self) {
        self.state.store(SlotState::Free as u8, Ordering::Release);
    }
}

/// Claim/drop counters (for diagnostics and tests)
#[derive(Debug, Default)]
pub struct SlotStats {
    write_claims: AtomicU64,
    publishes: AtomicU64,
    dropped_writes: AtomicU64,
    read_claims: AtomicU64,
    read_misses: AtomicU64,
}

impl SlotStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        // Counters don't order any other memory, Relaxed is enough
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SlotStatsSnapshot {
        SlotStatsSnapshot {
            write_claims: self.write_claims.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
            read_claims: self.read_claims.load(Ordering::Relaxed),
            read_misses: self.read_misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SlotStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatsSnapshot {
    /// Successful `claim_for_write` calls
    pub write_claims: u64,
    /// Frames made visible to the reader
    pub publishes: u64,
    /// `claim_for_write` calls that found no free slot
    pub dropped_writes: u64,
    /// Successful `try_claim_for_read` calls
    pub read_claims: u64,
    /// `try_claim_for_read` calls that returned nothing
    pub read_misses: u64,
}

/// Three-slot lock-free handoff between one writer and one reader
pub struct SlotArbiter {
    slots: Box<[Slot; SLOT_COUNT]>,
    /// Index of the most recently published slot, or `NONE_WRITTEN`
    last_written: AtomicUsize,
    stats: SlotStats,
}

// Safety: a slot's frame is only accessed through a WriteClaim or ReadClaim,
// and those are only handed out after winning the compare-and-swap on the
// slot's state tag, so no two threads ever touch the same frame at once.
unsafe impl Sync for SlotArbiter {}

impl SlotArbiter {
    /// Allocate all slots up front; they are never resized
    pub fn new() -> Self {
        Self {
            slots: Box::new([Slot::new(), Slot::new(), Slot::new()]),
            last_written: AtomicUsize::new(NONE_WRITTEN),
            stats: SlotStats::default(),
        }
    }

    /// Claim a slot for writing, starting after the last written slot
    ///
    /// Returns `None` if all slots are claimed; the caller drops the frame.
    pub fn claim_for_write(&self) -> Option<WriteClaim<'_>> {
        let start = match self.last_written.load(Ordering::Acquire) {
            NONE_WRITTEN => 0,
            last => last + 1,
        };

        for distance in 0..SLOT_COUNT {
            let index = (start + distance) % SLOT_COUNT;
            if self.slots[index].try_transition(SlotState::Free, SlotState::WriteLocked) {
                SlotStats::bump(&self.stats.write_claims);
                return Some(WriteClaim {
                    arbiter: self,
                    index,
                    published: false,
                });
            }
        }

        SlotStats::bump(&self.stats.dropped_writes);
        None
    }

    /// Try to claim the freshest published slot for reading
    ///
    /// Returns `None` if nothing was published yet or no slot is free; the
    /// caller must tolerate staleness rather than wait.
    pub fn try_claim_for_read(&self) -> Option<ReadClaim<'_>> {
        let last = self.last_written.load(Ordering::Acquire);
        if last == NONE_WRITTEN {
            SlotStats::bump(&self.stats.read_misses);
            return None;
        }

        for distance in 0..SLOT_COUNT {
            // Most recent first, least recent last
            let index = (last + SLOT_COUNT - distance) % SLOT_COUNT;
            if self.slots[index].try_transition(SlotState::Free, SlotState::ReadLocked) {
                SlotStats::bump(&self.stats.read_claims);
                return Some(ReadClaim {
                    arbiter: self,
                    index,
                });
            }
        }

        SlotStats::bump(&self.stats.read_misses);
        None
    }

    /// Release a read claim; `None` is a no-op
    pub fn release_after_read(claim: Option<ReadClaim<'_>>) {
        if let Some(claim) = claim {
            claim.release_after_read();
        }
    }

    /// Index of the most recently published slot
    pub fn last_written(&self) -> Option<usize> {
        match self.last_written.load(Ordering::Acquire) {
            NONE_WRITTEN => None,
            index => Some(index),
        }
    }

    /// Current state tag of a slot (diagnostics only, may be stale immediately)
    pub fn state(&self, index: usize) -> SlotState {
        SlotState::from_tag(self.slots[index % SLOT_COUNT].state.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> SlotStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for SlotArbiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive write access to one slot
///
/// Dropping the claim without [`WriteClaim::release_after_write`] gives the
/// slot back without publishing it (its frame is cleared first).
pub struct WriteClaim<'a> {
    arbiter: &'a SlotArbiter,
    index: usize,
    published: bool,
}

impl WriteClaim<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The frame stored in this slot
    pub fn frame_mut(&mut self) -> &mut AnalysisFrame {
        // Safety: the WRITE_LOCKED tag gives this claim exclusive access
        unsafe { &mut *self.arbiter.slots[self.index].frame.get() }
    }

    /// Publish the slot: mark it FREE and make it the last written slot
    pub fn release_after_write(mut self) {
        self.published = true;
    }
}

impl Drop for WriteClaim<'_> {
    fn drop(&mut self) {
        if !self.published {
            // Never leave a half-written frame behind for the reader
            self.frame_mut().clear();
        }

        self.arbiter.slots[self.index].release();

        if self.published {
            self.arbiter.last_written.store(self.index, Ordering::Release);
            SlotStats::bump(&self.arbiter.stats.publishes);
        }
    }
}

/// Shared read access to one slot
///
/// The slot returns to FREE when the claim is released or dropped.
pub struct ReadClaim<'a> {
    arbiter: &'a SlotArbiter,
    index: usize,
}

impl ReadClaim<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The frame stored in this slot
    pub fn frame(&self) -> &AnalysisFrame {
        // Safety: the READ_LOCKED tag keeps the writer out of this slot
        unsafe { &*self.arbiter.slots[self.index].frame.get() }
    }

    pub fn release_after_read(self) {}
}

impl Drop for ReadClaim<'_> {
    fn drop(&mut self) {
        self.arbiter.slots[self.index].release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// Stamp every byte of a frame with `value`
    fn stamp(frame: &mut AnalysisFrame, value: u8) {
        for channel in 0..2 {
            frame.waveform[channel].fill(value);
            frame.spectrum[channel].fill(value);
        }
    }

    fn publish(arbiter: &SlotArbiter, value: u8) -> usize {
        let mut claim = arbiter.claim_for_write().expect("a free slot");
        let index = claim.index();
        stamp(claim.frame_mut(), value);
        claim.release_after_write();
        index
    }

    #[test]
    fn test_initial_state() {
        let arbiter = SlotArbiter::new();
        assert_eq!(arbiter.last_written(), None);
        for index in 0..SLOT_COUNT {
            assert_eq!(arbiter.state(index), SlotState::Free);
        }
        assert_eq!(arbiter.stats(), SlotStatsSnapshot::default());
    }

    #[test]
    fn test_read_before_first_publish() {
        let arbiter = SlotArbiter::new();
        assert!(arbiter.try_claim_for_read().is_none());
        assert_eq!(arbiter.stats().read_misses, 1);
    }

    #[test]
    fn test_write_scan_order() {
        let arbiter = SlotArbiter::new();
        assert_eq!(publish(&arbiter, 1), 0);
        assert_eq!(publish(&arbiter, 2), 1);
        assert_eq!(publish(&arbiter, 3), 2);
        assert_eq!(publish(&arbiter, 4), 0);
        assert_eq!(arbiter.last_written(), Some(0));
        assert_eq!(arbiter.stats().publishes, 4);
    }

    #[test]
    fn test_state_transitions() {
        let arbiter = SlotArbiter::new();

        let claim = arbiter.claim_for_write().unwrap();
        assert_eq!(arbiter.state(claim.index()), SlotState::WriteLocked);
        let index = claim.index();
        claim.release_after_write();
        assert_eq!(arbiter.state(index), SlotState::Free);

        let read = arbiter.try_claim_for_read().unwrap();
        assert_eq!(read.index(), index);
        assert_eq!(arbiter.state(index), SlotState::ReadLocked);
        read.release_after_read();
        assert_eq!(arbiter.state(index), SlotState::Free);
    }

    #[test]
    fn test_freshness() {
        let arbiter = SlotArbiter::new();
        publish(&arbiter, 1);
        publish(&arbiter, 2);

        let read = arbiter.try_claim_for_read().unwrap();
        assert_eq!(read.frame().waveform[0][0], 2, "Reader must see the newest frame");
        assert_eq!(read.frame().spectrum[1][575], 2);
    }

    #[test]
    fn test_writer_never_overwrites_freshest_while_reading() {
        let arbiter = SlotArbiter::new();
        publish(&arbiter, 1);

        let read = arbiter.try_claim_for_read().unwrap();
        let reading = read.index();

        // Writer keeps going while the reader holds its slot
        for value in 2..20 {
            let index = publish(&arbiter, value);
            assert_ne!(index, reading);
        }
        assert_eq!(read.frame().waveform[0][0], 1);
        drop(read);

        let read = arbiter.try_claim_for_read().unwrap();
        assert_eq!(read.frame().waveform[0][0], 19);
    }

    #[test]
    fn test_exhaustion_drops_frames() {
        let arbiter = SlotArbiter::new();
        publish(&arbiter, 1); // slot 0
        publish(&arbiter, 2); // slot 1
        publish(&arbiter, 3); // slot 2

        // Two rogue writer claims (slots 0 and 1) plus slot 2 read-locked
        let read = arbiter.try_claim_for_read().unwrap();
        assert_eq!(read.index(), 2);
        let w1 = arbiter.claim_for_write().unwrap();
        let w2 = arbiter.claim_for_write().unwrap();
        assert_eq!((w1.index(), w2.index()), (0, 1));

        // Everything is taken: writer drops, second reader misses
        assert!(arbiter.claim_for_write().is_none());
        assert!(arbiter.try_claim_for_read().is_none());
        let stats = arbiter.stats();
        assert_eq!(stats.dropped_writes, 1);
        assert_eq!(stats.read_misses, 1);

        drop(w1);
        drop(w2);
        drop(read);

        // Abandoned writes never published
        assert_eq!(arbiter.last_written(), Some(2));
    }

    #[test]
    fn test_abandoned_write_is_cleared() {
        let arbiter = SlotArbiter::new();
        publish(&arbiter, 7); // slot 0

        {
            let mut claim = arbiter.claim_for_write().unwrap();
            assert_eq!(claim.index(), 1);
            stamp(claim.frame_mut(), 99);
        }

        assert_eq!(arbiter.state(1), SlotState::Free);
        assert_eq!(arbiter.last_written(), Some(0));

        // Lock slot 0 so the reader walks back onto the abandoned slot 2, then 1
        let _hold = arbiter.try_claim_for_read().unwrap();
        let other = arbiter.try_claim_for_read().unwrap();
        assert_eq!(other.index(), 2);
        assert!(other.frame().is_zeroed());
        let third = arbiter.try_claim_for_read().unwrap();
        assert_eq!(third.index(), 1);
        assert!(third.frame().is_zeroed(), "Abandoned frame must not leak");
    }

    #[test]
    fn test_release_none_is_noop() {
        let arbiter = SlotArbiter::new();
        SlotArbiter::release_after_read(arbiter.try_claim_for_read());
        SlotArbiter::release_after_read(None);

        publish(&arbiter, 5);
        SlotArbiter::release_after_read(arbiter.try_claim_for_read());
        for index in 0..SLOT_COUNT {
            assert_eq!(arbiter.state(index), SlotState::Free);
        }
    }

    /// Tiny xorshift generator for randomized yield points
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn maybe_yield(&mut self) {
            if self.next() % 4 == 0 {
                thread::yield_now();
            }
        }
    }

    const WRITER: u8 = 1;
    const READER: u8 = 2;

    /// Records which role holds each slot; panics on overlap
    struct Occupancy([AtomicU8; SLOT_COUNT]);

    impl Occupancy {
        fn new() -> Self {
            Self([AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)])
        }

        fn enter(&self, index: usize, role: u8) {
            let previous = self.0[index].swap(role, Ordering::SeqCst);
            assert_eq!(previous, 0, "Slot {} held by role {} and {}", index, previous, role);
        }

        fn leave(&self, index: usize, role: u8) {
            let previous = self.0[index].swap(0, Ordering::SeqCst);
            assert_eq!(previous, role, "Slot {} released by wrong role", index);
        }
    }

    fn run_stress(seed: u64, iterations: u64) {
        let arbiter = Arc::new(SlotArbiter::new());
        let occupancy = Arc::new(Occupancy::new());

        let writer = {
            let arbiter = Arc::clone(&arbiter);
            let occupancy = Arc::clone(&occupancy);
            thread::spawn(move || {
                let mut rng = XorShift(seed);
                for sequence in 1..=iterations {
                    rng.maybe_yield();
                    let Some(mut claim) = arbiter.claim_for_write() else {
                        panic!("Single writer must always find a free slot");
                    };
                    let index = claim.index();
                    occupancy.enter(index, WRITER);

                    // Sequence number in the first bytes, a checksum byte everywhere else
                    let frame = claim.frame_mut();
                    stamp(frame, sequence as u8);
                    rng.maybe_yield();
                    frame.waveform[0][..8].copy_from_slice(&sequence.to_le_bytes());

                    occupancy.leave(index, WRITER);
                    claim.release_after_write();
                }
            })
        };

        let reader = {
            let arbiter = Arc::clone(&arbiter);
            let occupancy = Arc::clone(&occupancy);
            thread::spawn(move || {
                let mut rng = XorShift(seed.rotate_left(17) | 1);
                let mut newest_seen = 0u64;
                let mut reads = 0u64;
                while newest_seen < iterations {
                    rng.maybe_yield();
                    let Some(claim) = arbiter.try_claim_for_read() else {
                        continue;
                    };
                    let index = claim.index();
                    occupancy.enter(index, READER);

                    let frame = claim.frame();
                    let mut sequence_bytes = [0u8; 8];
                    sequence_bytes.copy_from_slice(&frame.waveform[0][..8]);
                    let sequence = u64::from_le_bytes(sequence_bytes);
                    rng.maybe_yield();

                    if sequence > 0 {
                        let check = sequence as u8;
                        let payload = frame.waveform[0][8..]
                            .iter()
                            .chain(frame.waveform[1].iter())
                            .chain(frame.spectrum.iter().flatten());
                        for &v in payload {
                            assert_eq!(v, check, "Torn frame {}", sequence);
                        }
                    }
                    assert!(
                        sequence >= newest_seen,
                        "Frame {} delivered after {}",
                        sequence,
                        newest_seen
                    );
                    newest_seen = sequence;
                    reads += 1;

                    occupancy.leave(index, READER);
                    claim.release_after_read();
                }
                reads
            })
        };

        writer.join().expect("writer thread");
        let reads = reader.join().expect("reader thread");
        assert!(reads > 0);

        let stats = arbiter.stats();
        assert_eq!(stats.publishes, iterations);
        assert_eq!(stats.dropped_writes, 0);
    }

    #[test]
    fn test_concurrent_mutual_exclusion() {
        for seed in [0x9E37_79B9_7F4A_7C15, 0xDEAD_BEEF, 12345, 0x0123_4567_89AB_CDEF] {
            run_stress(seed, 20_000);
        }
    }
}
