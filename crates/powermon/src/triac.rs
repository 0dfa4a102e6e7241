//! Phase brightness estimation for the general-illumination triacs.
//!
//! The GI strings are dimmed by phase control: each triac fires some delay
//! after the mains zero crossing and conducts for the rest of the half-cycle,
//! so a shorter firing delay means more power and a brighter string. This
//! module reconstructs a per-channel brightness level from the observed
//! firing delays.
//!
//! Within one half-cycle each channel latches at most one level (the first
//! observed firing wins). Levels are accumulated over a window of `W`
//! half-cycles and the published value is `sum >> log2(W)`, so `W` identical
//! observations publish exactly the observed level with no rounding drift.
//! A channel that never fired during a window keeps its previous published
//! level; a missed marker or a missed firing must never flicker a string to
//! dark.

use crate::error::Error;

/// Number of triac channels on the power driver board.
///
/// WPC drives 5 GI strings; WPC-95 boards populate only 3 of them, which
/// simply leaves the upper channels at level 0.
pub const TRIAC_CHANNELS: usize = 5;

/// Default averaging window in half-cycles.
pub const DEFAULT_WINDOW: usize = 8;

/// Longest accepted averaging window in half-cycles.
///
/// Bounds the per-channel level sum to `MAX_WINDOW * u8::MAX`, which the
/// window accumulators must hold without wrapping. At mains frequency this is
/// already more than eight seconds of smoothing.
pub const MAX_WINDOW: usize = 1024;

/// Map from triac firing delay to a discrete brightness level.
///
/// The table is a monotonic step function: delays below `steps[0].0`
/// microseconds map to `steps[0].1`, and so on; delays beyond the last step
/// map to `floor`. A delay of zero means the triac was already conducting at
/// the crossing and maps to `full_on`.
///
/// The default thresholds were measured on real WPC hardware; see the scope
/// captures in the aggi project for the raw waveforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayTable {
    full_on: u8,
    floor: u8,
    steps: Vec<(u32, u8)>,
}

impl Default for DelayTable {
    fn default() -> Self {
        // Validated values, new() cannot fail on these.
        DelayTable {
            full_on: 8,
            floor: 0,
            steps: vec![(3300, 6), (3500, 5), (4800, 4), (6000, 2), (8000, 1)],
        }
    }
}

impl DelayTable {
    /// Build a delay table from explicit steps.
    ///
    /// `steps` are `(threshold_us, level)` pairs: a delay strictly below
    /// `threshold_us` maps to `level`. Thresholds must be strictly
    /// increasing, levels non-increasing, and no level may exceed `full_on`.
    /// `floor` is the level for delays beyond the last threshold and must
    /// not exceed the last step's level nor `full_on`.
    pub fn new(full_on: u8, floor: u8, steps: Vec<(u32, u8)>) -> Result<Self, Error> {
        for pair in steps.windows(2) {
            let (d0, l0) = pair[0];
            let (d1, l1) = pair[1];
            if d1 <= d0 {
                return Err(Error::NonMonotonicDelayTable(format!(
                    "threshold {} us follows {} us",
                    d1, d0
                )));
            }
            if l1 > l0 {
                return Err(Error::NonMonotonicDelayTable(format!(
                    "level {} follows level {}",
                    l1, l0
                )));
            }
        }
        for &(_, level) in &steps {
            if level > full_on {
                return Err(Error::LevelAboveFullOn { level, full_on });
            }
        }
        if floor > full_on {
            return Err(Error::LevelAboveFullOn {
                level: floor,
                full_on,
            });
        }
        if let Some(&(_, last)) = steps.last()
            && floor > last
        {
            return Err(Error::NonMonotonicDelayTable(format!(
                "floor level {} exceeds last step level {}",
                floor, last
            )));
        }
        Ok(DelayTable {
            full_on,
            floor,
            steps,
        })
    }

    /// Highest level this table can produce.
    pub fn max_level(&self) -> u8 {
        self.full_on
    }

    /// Look up the brightness level for a firing delay in microseconds.
    pub fn level(&self, delay_us: u64) -> u8 {
        if delay_us == 0 {
            return self.full_on;
        }
        for &(threshold, level) in &self.steps {
            if delay_us < threshold as u64 {
                return level;
            }
        }
        self.floor
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelWindow {
    /// Set once a firing has been latched for the current half-cycle.
    latched: bool,
    /// Sum of latched levels over the current window. Bounded by
    /// `MAX_WINDOW * u8::MAX`, so it cannot wrap.
    sum: u32,
    /// Half-cycles with a latched firing in the current window.
    latches: u16,
}

/// Per-channel brightness estimator driven by zero crossings and triac
/// firing events.
///
/// The estimator is private to the decoder context and needs no
/// synchronization; the decoder publishes the smoothed table to the shared
/// store whenever [`TriacEstimator::on_zero_cross`] reports a window
/// rollover.
#[derive(Debug, Clone)]
pub struct TriacEstimator {
    table: DelayTable,
    shift: u32,
    window: usize,
    /// Timestamp of the most recent zero crossing. `None` until the first
    /// marker arrives; firings seen before then cannot be phased and are
    /// dropped.
    zero_cross_us: Option<u64>,
    /// Closed half-cycles since the last window rollover.
    half_cycles: usize,
    channels: [ChannelWindow; TRIAC_CHANNELS],
    published: [u8; TRIAC_CHANNELS],
}

impl TriacEstimator {
    /// Create an estimator with the given delay table and window length.
    ///
    /// `window` must be a power of two so that averaging reduces to a shift,
    /// and no longer than [`MAX_WINDOW`].
    pub fn new(table: DelayTable, window: usize) -> Result<Self, Error> {
        if window == 0 || !window.is_power_of_two() {
            return Err(Error::WindowNotPowerOfTwo(window));
        }
        if window > MAX_WINDOW {
            return Err(Error::WindowTooLong {
                window,
                max: MAX_WINDOW,
            });
        }
        Ok(TriacEstimator {
            shift: window.trailing_zeros(),
            window,
            table,
            zero_cross_us: None,
            half_cycles: 0,
            channels: [ChannelWindow::default(); TRIAC_CHANNELS],
            published: [0; TRIAC_CHANNELS],
        })
    }

    /// Estimator with the default table and window.
    pub fn with_defaults() -> Self {
        match TriacEstimator::new(DelayTable::default(), DEFAULT_WINDOW) {
            Ok(estimator) => estimator,
            Err(_) => unreachable!("default estimator parameters are valid"),
        }
    }

    /// Currently published per-channel levels.
    pub fn published(&self) -> [u8; TRIAC_CHANNELS] {
        self.published
    }

    /// Handle a `TRIACS` bus word observed at `now_us`.
    ///
    /// Every set channel bit that has not yet latched this half-cycle
    /// latches the level for the elapsed delay since the last zero crossing.
    /// Returns the measured firing delay in microseconds, or `None` when no
    /// crossing has been seen yet and the event cannot be phased.
    pub fn on_triac(&mut self, data: u8, now_us: u64) -> Option<u64> {
        let zero_cross_us = self.zero_cross_us?;
        let delay_us = now_us.saturating_sub(zero_cross_us);
        let level = self.table.level(delay_us);
        for (bit, channel) in self.channels.iter_mut().enumerate() {
            if data & (1 << bit) != 0 && !channel.latched {
                channel.latched = true;
                channel.sum += level as u32;
                channel.latches += 1;
            }
        }
        Some(delay_us)
    }

    /// Handle a zero-cross marker dequeued at `now_us`.
    ///
    /// The very first marker only establishes the phase origin. Every later
    /// marker closes one half-cycle, and on every `window`th closed
    /// half-cycle the smoothed levels are published and returned so the
    /// caller can propagate them to the shared store. Channels with no
    /// latched firing in the whole window keep their previous published
    /// level.
    pub fn on_zero_cross(&mut self, now_us: u64) -> Option<[u8; TRIAC_CHANNELS]> {
        let first = self.zero_cross_us.is_none();
        self.zero_cross_us = Some(now_us);
        if first {
            return None;
        }

        self.half_cycles += 1;
        if self.half_cycles < self.window {
            for channel in self.channels.iter_mut() {
                channel.latched = false;
            }
            return None;
        }

        self.half_cycles = 0;
        for (channel, published) in self.channels.iter_mut().zip(self.published.iter_mut()) {
            if channel.latches > 0 {
                *published = (channel.sum >> self.shift) as u8;
            }
            *channel = ChannelWindow::default();
        }
        Some(self.published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_US: u64 = 8333;

    /// Fire without caring about the reported delay.
    fn fire(estimator: &mut TriacEstimator, data: u8, now_us: u64) {
        let _ = estimator.on_triac(data, now_us);
    }

    #[test]
    fn test_default_table_levels() {
        let table = DelayTable::default();
        assert_eq!(table.level(0), 8);
        assert_eq!(table.level(1000), 6);
        assert_eq!(table.level(3400), 5);
        assert_eq!(table.level(4000), 4);
        assert_eq!(table.level(5000), 2);
        assert_eq!(table.level(7000), 1);
        assert_eq!(table.level(8000), 0);
        assert_eq!(table.level(100_000), 0);
    }

    #[test]
    fn test_table_rejects_non_monotonic_steps() {
        assert!(DelayTable::new(8, 0, vec![(3000, 4), (2000, 2)]).is_err());
        assert!(DelayTable::new(8, 0, vec![(2000, 2), (3000, 4)]).is_err());
        assert!(DelayTable::new(4, 0, vec![(2000, 6)]).is_err());
        assert!(DelayTable::new(8, 3, vec![(2000, 2)]).is_err());
    }

    #[test]
    fn test_table_rejects_floor_above_full_on() {
        // A table with no steps must still bound the floor, otherwise
        // level() could exceed max_level().
        assert!(DelayTable::new(8, 200, vec![]).is_err());
        assert!(DelayTable::new(8, 9, vec![]).is_err());

        let table = DelayTable::new(8, 3, vec![]).unwrap();
        assert_eq!(table.level(0), 8);
        assert_eq!(table.level(5000), 3);
        assert!(table.level(5000) <= table.max_level());
    }

    #[test]
    fn test_window_must_be_power_of_two() {
        assert!(TriacEstimator::new(DelayTable::default(), 6).is_err());
        assert!(TriacEstimator::new(DelayTable::default(), 0).is_err());
        assert!(TriacEstimator::new(DelayTable::default(), 4).is_ok());
    }

    #[test]
    fn test_window_length_is_capped() {
        assert!(TriacEstimator::new(DelayTable::default(), MAX_WINDOW).is_ok());
        assert!(TriacEstimator::new(DelayTable::default(), MAX_WINDOW * 2).is_err());
    }

    #[test]
    fn test_identical_firings_publish_exact_level() {
        // W identical observations must publish the table level exactly,
        // with no rounding drift from the shift.
        let table = DelayTable::default();
        let mut estimator = TriacEstimator::with_defaults();
        let mut t = 0;
        estimator.on_zero_cross(t);
        for delay in [1000, 3400, 5000, 9000] {
            let mut published = None;
            for _ in 0..DEFAULT_WINDOW {
                fire(&mut estimator, 0x01, t + delay);
                t += HALF_US;
                published = estimator.on_zero_cross(t);
            }
            assert_eq!(published.unwrap()[0], table.level(delay));
        }
    }

    #[test]
    fn test_first_firing_per_half_cycle_wins() {
        let mut estimator = TriacEstimator::with_defaults();
        let mut t = 0;
        estimator.on_zero_cross(t);
        let mut published = None;
        for _ in 0..DEFAULT_WINDOW {
            // Early firing latches level 6, the late repeat must not
            // overwrite it.
            fire(&mut estimator, 0x01, t + 1000);
            fire(&mut estimator, 0x01, t + 7000);
            t += HALF_US;
            published = estimator.on_zero_cross(t);
        }
        assert_eq!(published.unwrap()[0], 6);
    }

    #[test]
    fn test_unobserved_channel_keeps_previous_level() {
        let mut estimator = TriacEstimator::with_defaults();
        let mut t = 0;
        estimator.on_zero_cross(t);
        let mut published = None;
        for _ in 0..DEFAULT_WINDOW {
            fire(&mut estimator, 0x02, t + 1000);
            t += HALF_US;
            published = estimator.on_zero_cross(t);
        }
        assert_eq!(published.unwrap()[1], 6);

        // A whole window with no firings at all: the channel must hold its
        // level instead of flickering to zero.
        let mut after = None;
        for _ in 0..DEFAULT_WINDOW {
            t += HALF_US;
            after = estimator.on_zero_cross(t);
        }
        assert_eq!(after.unwrap()[1], 6);
        assert_eq!(estimator.published()[1], 6);
    }

    #[test]
    fn test_partial_window_averages_down() {
        let mut estimator = TriacEstimator::with_defaults();
        let mut t = 0;
        estimator.on_zero_cross(t);
        let mut published = None;
        for half in 0..DEFAULT_WINDOW {
            if half % 2 == 0 {
                // Zero delay, full-on level 8.
                fire(&mut estimator, 0x01, t);
            }
            t += HALF_US;
            published = estimator.on_zero_cross(t);
        }
        // 4 latches of level 8 averaged over 8 half-cycles.
        assert_eq!(published.unwrap()[0], 4);
    }

    #[test]
    fn test_large_window_accumulates_without_wrapping() {
        // 512 half-cycles of full-on conduction: the level sum reaches
        // 512 * 8 and the latch count reaches 512, both beyond what a
        // byte-sized accumulator could hold.
        let window = 512;
        let mut estimator = TriacEstimator::new(DelayTable::default(), window).unwrap();
        let mut t = 0;
        estimator.on_zero_cross(t);
        let mut published = None;
        for _ in 0..window {
            fire(&mut estimator, 0x1F, t);
            t += HALF_US;
            published = estimator.on_zero_cross(t);
        }
        assert_eq!(published.unwrap(), [8; TRIAC_CHANNELS]);
    }

    #[test]
    fn test_on_triac_reports_firing_delay() {
        let mut estimator = TriacEstimator::with_defaults();
        assert_eq!(estimator.on_triac(0x01, 500), None);
        estimator.on_zero_cross(1000);
        assert_eq!(estimator.on_triac(0x01, 4400), Some(3400));
        // A repeat in the same half-cycle does not latch but is still timed.
        assert_eq!(estimator.on_triac(0x01, 8000), Some(7000));
    }

    #[test]
    fn test_triac_events_before_first_crossing_are_dropped() {
        let mut estimator = TriacEstimator::with_defaults();
        fire(&mut estimator, 0x1F, 500);
        let mut t = 0;
        estimator.on_zero_cross(t);
        let mut published = None;
        for _ in 0..DEFAULT_WINDOW {
            t += HALF_US;
            published = estimator.on_zero_cross(t);
        }
        assert_eq!(published.unwrap(), [0; TRIAC_CHANNELS]);
    }

    #[test]
    fn test_published_levels_never_exceed_table_max() {
        let max = DelayTable::default().max_level();
        let mut estimator = TriacEstimator::with_defaults();
        let mut t = 0;
        estimator.on_zero_cross(t);
        for window in 0..4u64 {
            for _ in 0..DEFAULT_WINDOW {
                fire(&mut estimator, 0x1F, t + window * 2000);
                t += HALF_US;
                estimator.on_zero_cross(t);
            }
            for level in estimator.published() {
                assert!(level <= max);
            }
        }
    }
}
