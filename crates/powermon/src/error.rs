//! Error type for construction and lifecycle failures.
//!
//! Everything that can go wrong is caught before the decoder loop starts.
//! Once running, the loop never terminates on its own: queue overflow and
//! address errors are reported through [`crate::state::Stats`], not as
//! `Err` values.

use thiserror::Error;

/// Construction or lifecycle failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested GPIO window does not fit the package.
    #[error("GPIO window {base}..={end} does not fit the package (last usable pin {max})")]
    PinRangeOutOfBounds {
        /// First GPIO of the window.
        base: u8,
        /// Last GPIO of the window.
        end: u8,
        /// Last usable GPIO on the package.
        max: u8,
    },

    /// The requested sequencer slots do not fit the PIO block.
    #[error("sequencer slots {base}..={end} exceed the available state machines (last slot {max})")]
    SequencerRangeOutOfBounds {
        /// First sequencer slot.
        base: u8,
        /// Last sequencer slot.
        end: u8,
        /// Last available slot.
        max: u8,
    },

    /// The triac averaging window must be a power of two so the published
    /// level can be computed with a shift.
    #[error("triac window length {0} is not a power of two")]
    WindowNotPowerOfTwo(usize),

    /// The triac averaging window is longer than the per-channel
    /// accumulators support.
    #[error("triac window length {window} exceeds the maximum {max}")]
    WindowTooLong {
        /// Requested window length.
        window: usize,
        /// Longest accepted window.
        max: usize,
    },

    /// Delay table steps must have strictly increasing delays and
    /// non-increasing levels.
    #[error("delay table is not monotonic: {0}")]
    NonMonotonicDelayTable(String),

    /// A delay table level exceeds the table's full-on level.
    #[error("delay table level {level} exceeds the full-on level {full_on}")]
    LevelAboveFullOn {
        /// Offending step level.
        level: u8,
        /// Configured full-on level.
        full_on: u8,
    },

    /// `start` was called while the decoder loop is running.
    #[error("monitor is already running")]
    AlreadyRunning,

    /// `stop` was called while the decoder loop is not running.
    #[error("monitor is not running")]
    NotRunning,

    /// The decoder thread panicked (only possible from inside a
    /// user-registered notification callback).
    #[error("decoder thread panicked")]
    DecoderPanicked,
}
