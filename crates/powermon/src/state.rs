//! Shared state store and statistics.
//!
//! The canonical decoded state (lamp matrix, solenoid banks, GI brightness
//! table) plus the diagnostic counters. The decoder loop is the sole writer;
//! every other execution context reads through the locked snapshot getters.
//!
//! Each logical group has its own `parking_lot` mutex so a reader never
//! observes a partially updated multi-byte value, and the decoder never
//! holds more than one lock at a time. Counters are plain relaxed atomics:
//! they are monotonic diagnostics, not synchronization points.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::triac::TRIAC_CHANNELS;

/// Lamp matrix columns (and rows).
pub const LAMP_COLUMNS: usize = 8;

/// Independent solenoid byte registers.
pub const SOLENOID_BANKS: usize = 4;

/// Decode statistics snapshot.
///
/// All counters persist until process restart; only `overflow` can be
/// cleared, through [`SharedState::reset_overflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Highest receive-queue depth observed at dequeue time.
    pub max_queue_depth: u32,
    /// Dequeued words, plus one extra increment per applied lamp or
    /// solenoid change.
    pub event_count: u64,
    /// Sticky flag: the receive queue was observed at full capacity at
    /// least once, so samples were almost certainly lost.
    pub overflow: bool,
    /// Words whose address code was 0 or not a known strobe line.
    pub address_errors: u32,
    /// Accepted lamp row events (valid pending column).
    pub rows_detected: u32,
    /// Lamp column select events with a non-zero data byte.
    pub cols_detected: u32,
    /// Zero-cross markers dequeued.
    pub zero_crossings_detected: u32,
    /// Triac firing words dispatched to the estimator.
    pub triac_events_detected: u32,
    /// Shortest phased triac firing delay observed, in microseconds.
    /// Zero until the first phased triac event.
    pub triac_min_time_us: u64,
    /// Longest phased triac firing delay observed, in microseconds.
    pub triac_max_time_us: u64,
}

/// Lock-protected canonical state shared between the decoder loop and
/// reader contexts.
#[derive(Debug)]
pub struct SharedState {
    lamps: Mutex<[u8; LAMP_COLUMNS]>,
    solenoids: Mutex<[u8; SOLENOID_BANKS]>,
    brightness: Mutex<[u8; TRIAC_CHANNELS]>,
    event_count: AtomicU64,
    address_errors: AtomicU32,
    overflow: AtomicBool,
    max_queue_depth: AtomicU32,
    rows_detected: AtomicU32,
    cols_detected: AtomicU32,
    zero_crossings: AtomicU32,
    triac_events: AtomicU32,
    /// `u64::MAX` until the first phased triac event.
    triac_min_us: AtomicU64,
    triac_max_us: AtomicU64,
}

impl Default for SharedState {
    fn default() -> Self {
        SharedState::new()
    }
}

impl SharedState {
    /// Create an empty store: all lamps off, all solenoids idle, GI dark.
    pub fn new() -> Self {
        SharedState {
            lamps: Mutex::new([0; LAMP_COLUMNS]),
            solenoids: Mutex::new([0; SOLENOID_BANKS]),
            brightness: Mutex::new([0; TRIAC_CHANNELS]),
            event_count: AtomicU64::new(0),
            address_errors: AtomicU32::new(0),
            overflow: AtomicBool::new(false),
            max_queue_depth: AtomicU32::new(0),
            rows_detected: AtomicU32::new(0),
            cols_detected: AtomicU32::new(0),
            zero_crossings: AtomicU32::new(0),
            triac_events: AtomicU32::new(0),
            triac_min_us: AtomicU64::new(u64::MAX),
            triac_max_us: AtomicU64::new(0),
        }
    }

    /// Atomic snapshot of the lamp matrix as a 64-bit bitmap, row-major,
    /// most significant byte first (column 0 in the top byte).
    pub fn lights(&self) -> u64 {
        u64::from_be_bytes(*self.lamps.lock())
    }

    /// Atomic snapshot of the four solenoid banks as a 32-bit bitmap,
    /// bank 1 in the top byte.
    pub fn solenoids(&self) -> u32 {
        u32::from_be_bytes(*self.solenoids.lock())
    }

    /// Snapshot of the published GI brightness table.
    pub fn gi(&self) -> [u8; TRIAC_CHANNELS] {
        *self.brightness.lock()
    }

    /// Snapshot of the decode statistics.
    pub fn stats(&self) -> Stats {
        Stats {
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            event_count: self.event_count.load(Ordering::Relaxed),
            overflow: self.overflow.load(Ordering::Relaxed),
            address_errors: self.address_errors.load(Ordering::Relaxed),
            rows_detected: self.rows_detected.load(Ordering::Relaxed),
            cols_detected: self.cols_detected.load(Ordering::Relaxed),
            zero_crossings_detected: self.zero_crossings.load(Ordering::Relaxed),
            triac_events_detected: self.triac_events.load(Ordering::Relaxed),
            triac_min_time_us: match self.triac_min_us.load(Ordering::Relaxed) {
                u64::MAX => 0,
                min => min,
            },
            triac_max_time_us: self.triac_max_us.load(Ordering::Relaxed),
        }
    }

    /// Whether a probable queue overflow has been observed.
    pub fn overflow(&self) -> bool {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Clear the sticky overflow flag.
    ///
    /// Overflow is advisory: bus events carry absolute register values, so
    /// a lost sample only delays convergence until the next differing value
    /// arrives.
    pub fn reset_overflow(&self) {
        self.overflow.store(false, Ordering::Relaxed);
    }

    // Mutators below are reserved for the decoder loop.

    pub(crate) fn set_lamp_row(&self, col: usize, data: u8) {
        self.lamps.lock()[col] = data;
    }

    pub(crate) fn set_solenoid(&self, bank: usize, data: u8) {
        self.solenoids.lock()[bank] = data;
    }

    pub(crate) fn publish_gi(&self, table: &[u8; TRIAC_CHANNELS]) {
        *self.brightness.lock() = *table;
    }

    pub(crate) fn bump_events(&self) {
        self.event_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_address_errors(&self) {
        self.address_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_rows(&self) {
        self.rows_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_cols(&self) {
        self.cols_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_zero_crossings(&self) {
        self.zero_crossings.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_triac_events(&self) {
        self.triac_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a phased triac firing delay for the min/max diagnostics.
    pub(crate) fn observe_triac_delay(&self, delay_us: u64) {
        self.triac_min_us.fetch_min(delay_us, Ordering::Relaxed);
        self.triac_max_us.fetch_max(delay_us, Ordering::Relaxed);
    }

    /// Record a receive-queue depth observed at dequeue time; flags the
    /// sticky overflow when the queue was full.
    pub(crate) fn observe_queue_depth(&self, depth: u32, capacity: u32) {
        self.max_queue_depth.fetch_max(depth, Ordering::Relaxed);
        if depth >= capacity {
            self.overflow.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lights_bitmap_is_row_major_big_endian() {
        let state = SharedState::new();
        state.set_lamp_row(0, 0xAA);
        state.set_lamp_row(7, 0x01);
        assert_eq!(state.lights(), 0xAA00_0000_0000_0001);
    }

    #[test]
    fn test_solenoid_bitmap_bank_order() {
        let state = SharedState::new();
        state.set_solenoid(0, 0x80);
        state.set_solenoid(3, 0x01);
        assert_eq!(state.solenoids(), 0x8000_0001);
    }

    #[test]
    fn test_overflow_is_sticky_until_reset() {
        let state = SharedState::new();
        state.observe_queue_depth(8, 8);
        assert!(state.overflow());
        // Later shallow observations must not clear it.
        state.observe_queue_depth(1, 8);
        assert!(state.overflow());
        state.reset_overflow();
        assert!(!state.overflow());
        assert_eq!(state.stats().max_queue_depth, 8);
    }

    #[test]
    fn test_triac_delay_extremes() {
        let state = SharedState::new();
        // Reported as zero until something has fired.
        assert_eq!(state.stats().triac_min_time_us, 0);
        assert_eq!(state.stats().triac_max_time_us, 0);

        state.observe_triac_delay(4200);
        state.observe_triac_delay(900);
        state.observe_triac_delay(7800);
        let stats = state.stats();
        assert_eq!(stats.triac_min_time_us, 900);
        assert_eq!(stats.triac_max_time_us, 7800);
    }

    #[test]
    fn test_max_queue_depth_tracks_maximum() {
        let state = SharedState::new();
        state.observe_queue_depth(3, 8);
        state.observe_queue_depth(2, 8);
        assert_eq!(state.stats().max_queue_depth, 3);
        assert!(!state.overflow());
    }
}
