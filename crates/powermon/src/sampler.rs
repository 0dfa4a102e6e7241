//! Hardware sampler wire contract and queue emulation.
//!
//! The bus is sampled by dedicated hardware sequencers, not by this crate:
//! one sequencer watches the seven strobe lines for the low/high transition,
//! waits ~200 ns for the lines to settle, then triggers an atomic read of
//! the address and data lines; the inverted word lands in a small receive
//! queue. A second sequencer debounces the mains zero-cross line and pushes
//! a marker into its own queue. This module captures only the contract the
//! decoder relies on:
//!
//! - both queues are bounded and lossy; a full queue drops the sample
//!   because there is no backpressure path to the hardware,
//! - the decoder polls both queues every iteration and never blocks the
//!   producer,
//! - a queue observed at full capacity means samples were almost certainly
//!   lost between polls.
//!
//! [`QueueSampler`] implements the contract with in-memory bounded queues.
//! It backs the tests and the replay/simulation tools, and doubles as the
//! receive-FIFO model for any host-side producer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::queue::ArrayQueue;

use crate::bus::word::Revision;
use crate::error::Error;

/// Depth of the hardware receive queues.
pub const FIFO_DEPTH: usize = 8;

/// GPIO lines occupied by the bus: 8 data, 7 strobes, 1 zero cross.
pub const PIN_COUNT: u8 = 16;

/// Hardware sequencers claimed by the sampler: strobe watcher, data reader,
/// zero-cross watcher.
pub const SEQUENCERS: u8 = 3;

/// Last usable GPIO on the target package.
const MAX_GPIO: u8 = 29;

/// Last hardware sequencer slot.
const MAX_SEQUENCER: u8 = 7;

/// Pin and sequencer assignment for the hardware sampler.
///
/// Validation fails fast, before the decoder loop starts; an accepted
/// configuration can never surface an error mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// First GPIO of the 16-pin bus window (data lines first).
    pub gpio_base: u8,
    /// First of the three sequencer slots claimed by the sampler.
    pub sequencer_base: u8,
    /// Sampler hardware revision, selects the zero-cross indicator bit.
    pub revision: Revision,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            gpio_base: 0,
            sequencer_base: 0,
            revision: Revision::default(),
        }
    }
}

impl SamplerConfig {
    /// Check that the pin window and sequencer slots fit the hardware.
    pub fn validate(&self) -> Result<(), Error> {
        let pin_end = self.gpio_base.saturating_add(PIN_COUNT - 1);
        if pin_end > MAX_GPIO {
            return Err(Error::PinRangeOutOfBounds {
                base: self.gpio_base,
                end: pin_end,
                max: MAX_GPIO,
            });
        }
        let seq_end = self.sequencer_base.saturating_add(SEQUENCERS - 1);
        if seq_end > MAX_SEQUENCER {
            return Err(Error::SequencerRangeOutOfBounds {
                base: self.sequencer_base,
                end: seq_end,
                max: MAX_SEQUENCER,
            });
        }
        Ok(())
    }
}

/// Consumer side of the sampler contract, polled by the decoder loop.
///
/// Implementations must never block in any method: the decoder busy-polls
/// and the hardware producer cannot be slowed down.
pub trait BusSampler: Send {
    /// Enable the hardware sequencers.
    fn activate(&mut self);

    /// Disable the hardware sequencers.
    fn deactivate(&mut self);

    /// Capacity of the data receive queue.
    fn data_capacity(&self) -> usize;

    /// Current depth of the data receive queue.
    fn data_depth(&self) -> usize;

    /// Pop one raw data word, if any.
    fn pop_data(&mut self) -> Option<u16>;

    /// Pop one zero-cross marker, if any. The marker carries no payload;
    /// the decoder stamps it with its own clock at dequeue time.
    fn pop_zero_cross(&mut self) -> Option<()>;
}

/// In-memory implementation of the sampler contract.
///
/// Created together with a [`QueuePort`] that models the hardware producer
/// side. Both queues are bounded to [`FIFO_DEPTH`]; pushing into a full
/// queue drops the sample, exactly like the hardware FIFO.
#[derive(Debug)]
pub struct QueueSampler {
    data: Arc<ArrayQueue<u16>>,
    zero_cross: Arc<ArrayQueue<()>>,
    active: Arc<AtomicBool>,
}

/// Producer handle paired with a [`QueueSampler`].
///
/// Cloneable so a test or tool can feed data words and zero-cross markers
/// from different places.
#[derive(Debug, Clone)]
pub struct QueuePort {
    data: Arc<ArrayQueue<u16>>,
    zero_cross: Arc<ArrayQueue<()>>,
    active: Arc<AtomicBool>,
}

impl QueueSampler {
    /// Create a sampler/producer pair with [`FIFO_DEPTH`] queues.
    pub fn new() -> (QueueSampler, QueuePort) {
        let data = Arc::new(ArrayQueue::new(FIFO_DEPTH));
        let zero_cross = Arc::new(ArrayQueue::new(FIFO_DEPTH));
        let active = Arc::new(AtomicBool::new(false));
        (
            QueueSampler {
                data: data.clone(),
                zero_cross: zero_cross.clone(),
                active: active.clone(),
            },
            QueuePort {
                data,
                zero_cross,
                active,
            },
        )
    }
}

impl BusSampler for QueueSampler {
    fn activate(&mut self) {
        self.active.store(true, Ordering::Release);
    }

    fn deactivate(&mut self) {
        self.active.store(false, Ordering::Release);
    }

    fn data_capacity(&self) -> usize {
        self.data.capacity()
    }

    fn data_depth(&self) -> usize {
        self.data.len()
    }

    fn pop_data(&mut self) -> Option<u16> {
        self.data.pop()
    }

    fn pop_zero_cross(&mut self) -> Option<()> {
        self.zero_cross.pop()
    }
}

impl QueuePort {
    /// Whether the paired sampler is activated.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Push one raw data word, as the hardware sequencer would.
    ///
    /// Returns `false` when the word was dropped: either the sampler is
    /// deactivated or the queue is full. A full queue is exactly the lossy
    /// overflow condition the decoder detects and flags.
    pub fn push_word(&self, raw: u16) -> bool {
        self.is_active() && self.data.push(raw).is_ok()
    }

    /// Push one zero-cross marker.
    ///
    /// Returns `false` when the marker was dropped.
    pub fn push_zero_cross(&self) -> bool {
        self.is_active() && self.zero_cross.push(()).is_ok()
    }
}
