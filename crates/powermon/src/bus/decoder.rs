//! Bus decode dispatcher.
//!
//! The decoder drains the sampler's receive queues in a tight busy-poll
//! loop, demultiplexes each word by address and updates the shared state
//! store. The loop contains no suspension point and never blocks the
//! hardware producer; the only way it ends is the cooperative running flag,
//! checked once per iteration.
//!
//! Per-iteration order matters and is fixed:
//!
//! 1. the zero-cross queue is drained first (one marker per iteration at
//!    most) so the phase estimator's time origin is as fresh as possible,
//! 2. the data queue depth is recorded before popping, so a full queue is
//!    caught at the moment it implies loss,
//! 3. exactly one word is popped and dispatched,
//! 4. change notifications fire after the locks are released.
//!
//! The decoder keeps private shadow copies of the lamp and solenoid bytes
//! so the change comparison runs without a lock; the shared store is locked
//! only for the actual write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, trace};

use crate::bus::word::{BusAddress, BusWord, Revision, column_index};
use crate::notify::NotifySlots;
use crate::sampler::BusSampler;
use crate::state::{LAMP_COLUMNS, SOLENOID_BANKS, SharedState};
use crate::triac::TriacEstimator;

/// Bus decode dispatcher, sole writer of a [`SharedState`].
///
/// Everything the decoder mutates outside the shared store (pending column,
/// estimator window state, shadow registers) is private to it and needs no
/// synchronization.
pub struct Decoder<S: BusSampler> {
    sampler: S,
    shared: Arc<SharedState>,
    notify: Arc<NotifySlots>,
    estimator: TriacEstimator,
    revision: Revision,
    /// One-shot column latch: set by an accepted `LCOL`, consumed by the
    /// next `LROW` whatever its outcome.
    pending_col: Option<usize>,
    /// Shadow registers for lock-free change comparison.
    lamps: [u8; LAMP_COLUMNS],
    solenoids: [u8; SOLENOID_BANKS],
    epoch: Instant,
}

impl<S: BusSampler> Decoder<S> {
    /// Create a decoder over a sampler.
    pub fn new(
        sampler: S,
        shared: Arc<SharedState>,
        notify: Arc<NotifySlots>,
        revision: Revision,
        estimator: TriacEstimator,
    ) -> Self {
        Decoder {
            sampler,
            shared,
            notify,
            estimator,
            revision,
            pending_col: None,
            lamps: [0; LAMP_COLUMNS],
            solenoids: [0; SOLENOID_BANKS],
            epoch: Instant::now(),
        }
    }

    /// Access the sampler, e.g. to activate or deactivate the hardware.
    pub fn sampler_mut(&mut self) -> &mut S {
        &mut self.sampler
    }

    /// Run the decode loop until `running` is cleared.
    ///
    /// Busy-polls with no sleep: any pause here directly grows the window
    /// in which the 8-entry hardware queue can overflow. Worst-case stop
    /// latency is one iteration.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            self.poll_once();
        }
    }

    /// One iteration of the decode loop.
    ///
    /// Public so tests and the replay tool can drive the decoder
    /// synchronously; [`Decoder::run`] is nothing but this in a loop.
    pub fn poll_once(&mut self) {
        if self.sampler.pop_zero_cross().is_some() {
            // The marker is stamped here, at dequeue: its precision is
            // bounded by our polling latency, not by the sampler.
            self.zero_cross(self.now_us());
        }

        let depth = self.sampler.data_depth();
        if depth == 0 {
            return;
        }
        let capacity = self.sampler.data_capacity();
        if depth >= capacity {
            debug!(depth, "receive queue at capacity, probable sample loss");
        }
        self.shared.observe_queue_depth(depth as u32, capacity as u32);

        let Some(raw) = self.sampler.pop_data() else {
            return;
        };
        self.shared.bump_events();
        self.dispatch(BusWord::decode(raw, self.revision));
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn zero_cross(&mut self, now_us: u64) {
        self.shared.bump_zero_crossings();
        if let Some(table) = self.estimator.on_zero_cross(now_us) {
            self.shared.publish_gi(&table);
        }
    }

    fn dispatch(&mut self, word: BusWord) {
        // Revision B samplers fold the zero-cross indicator into the data
        // word; treat it like a marker dequeued this iteration.
        if word.zero_cross {
            self.zero_cross(self.now_us());
        }

        let mut lamps_changed = false;
        let mut solenoids_changed = false;

        match BusAddress::from_code(word.address) {
            Some(BusAddress::LampCol) => {
                if word.data == 0 {
                    // No column asserted; the previous selection, if any,
                    // stays pending.
                    trace!("LCOL with no column asserted");
                } else {
                    self.shared.bump_cols();
                    // A non-one-hot byte yields None and poisons the latch:
                    // the next LROW must be dropped.
                    self.pending_col = column_index(word.data);
                }
            }
            Some(BusAddress::LampRow) => {
                // One-shot: the selection is consumed no matter what.
                if let Some(col) = self.pending_col.take() {
                    self.shared.bump_rows();
                    if self.lamps[col] != word.data {
                        self.lamps[col] = word.data;
                        self.shared.set_lamp_row(col, word.data);
                        lamps_changed = true;
                    }
                } else {
                    trace!(data = word.data, "LROW without a column selection");
                }
            }
            Some(addr @ (BusAddress::Sol1 | BusAddress::Sol2 | BusAddress::Sol3 | BusAddress::Sol4)) => {
                // solenoid_bank() is Some for all four arms.
                if let Some(bank) = addr.solenoid_bank()
                    && self.solenoids[bank] != word.data
                {
                    self.solenoids[bank] = word.data;
                    self.shared.set_solenoid(bank, word.data);
                    solenoids_changed = true;
                }
            }
            Some(BusAddress::Triacs) => {
                self.shared.bump_triac_events();
                if let Some(delay_us) = self.estimator.on_triac(word.data, self.now_us()) {
                    self.shared.observe_triac_delay(delay_us);
                }
            }
            None => {
                // Transient bus noise, counted and dropped.
                debug!(address = word.address, data = word.data, "unknown bus address");
                self.shared.bump_address_errors();
            }
        }

        if lamps_changed {
            self.shared.bump_events();
            self.notify.notify_lamp();
        }
        if solenoids_changed {
            self.shared.bump_events();
            self.notify.notify_solenoid();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::word::{ADDR_LROW, BusAddress};
    use crate::sampler::{FIFO_DEPTH, QueuePort, QueueSampler};
    use std::sync::atomic::AtomicU32;

    fn make_decoder() -> (Decoder<QueueSampler>, QueuePort, Arc<SharedState>, Arc<NotifySlots>) {
        let (mut sampler, port) = QueueSampler::new();
        sampler.activate();
        let shared = Arc::new(SharedState::new());
        let notify = Arc::new(NotifySlots::new());
        let decoder = Decoder::new(
            sampler,
            shared.clone(),
            notify.clone(),
            Revision::A,
            TriacEstimator::with_defaults(),
        );
        (decoder, port, shared, notify)
    }

    fn feed(decoder: &mut Decoder<QueueSampler>, port: &QueuePort, words: &[(BusAddress, u8)]) {
        for &(addr, data) in words {
            assert!(port.push_word(BusWord::encode(addr, data)));
            decoder.poll_once();
        }
    }

    fn lamp_counter(notify: &NotifySlots) -> Arc<AtomicU32> {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        notify.set_lamp(Some(Box::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        })));
        counter
    }

    #[test]
    fn test_lamp_row_applies_after_one_hot_column() {
        // Scenario A: LCOL=0x04 selects column 2, LROW=0xAA lands there.
        let (mut decoder, port, shared, notify) = make_decoder();
        let notified = lamp_counter(&notify);

        feed(&mut decoder, &port, &[(BusAddress::LampCol, 0x04), (BusAddress::LampRow, 0xAA)]);
        assert_eq!(shared.lights(), 0x0000_AA00_0000_0000);
        assert_eq!(notified.load(Ordering::Relaxed), 1);

        // The selection was one-shot: a second identical LROW is dropped.
        feed(&mut decoder, &port, &[(BusAddress::LampRow, 0xAA)]);
        assert_eq!(shared.lights(), 0x0000_AA00_0000_0000);
        assert_eq!(notified.load(Ordering::Relaxed), 1);
        let stats = shared.stats();
        assert_eq!(stats.cols_detected, 1);
        assert_eq!(stats.rows_detected, 1);
    }

    #[test]
    fn test_lamp_row_without_selection_is_dropped() {
        let (mut decoder, port, shared, notify) = make_decoder();
        let notified = lamp_counter(&notify);
        feed(&mut decoder, &port, &[(BusAddress::LampRow, 0xFF)]);
        assert_eq!(shared.lights(), 0);
        assert_eq!(notified.load(Ordering::Relaxed), 0);
        assert_eq!(shared.stats().rows_detected, 0);
    }

    #[test]
    fn test_non_one_hot_column_poisons_the_latch() {
        let (mut decoder, port, shared, notify) = make_decoder();
        let notified = lamp_counter(&notify);
        feed(
            &mut decoder,
            &port,
            &[
                (BusAddress::LampCol, 0x04),
                // Two bits set: invalid selection replaces the pending one.
                (BusAddress::LampCol, 0x06),
                (BusAddress::LampRow, 0x55),
            ],
        );
        assert_eq!(shared.lights(), 0);
        assert_eq!(notified.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_lcol_zero_keeps_previous_selection() {
        let (mut decoder, port, shared, _notify) = make_decoder();
        feed(
            &mut decoder,
            &port,
            &[
                (BusAddress::LampCol, 0x01),
                (BusAddress::LampCol, 0x00),
                (BusAddress::LampRow, 0x3C),
            ],
        );
        assert_eq!(shared.lights(), 0x3C00_0000_0000_0000);
    }

    #[test]
    fn test_unchanged_row_does_not_notify() {
        // Idempotence: replaying an identical byte must not fire a second
        // notification and advances event_count only by the per-word amount.
        let (mut decoder, port, shared, notify) = make_decoder();
        let notified = lamp_counter(&notify);

        feed(&mut decoder, &port, &[(BusAddress::LampCol, 0x01), (BusAddress::LampRow, 0xAA)]);
        let events_after_change = shared.stats().event_count;
        assert_eq!(notified.load(Ordering::Relaxed), 1);

        feed(&mut decoder, &port, &[(BusAddress::LampCol, 0x01), (BusAddress::LampRow, 0xAA)]);
        assert_eq!(notified.load(Ordering::Relaxed), 1);
        // Two more words, no change increment.
        assert_eq!(shared.stats().event_count, events_after_change + 2);
    }

    #[test]
    fn test_solenoid_write_on_change_only() {
        // Scenario B: SOL2=0x01 twice fires exactly one notification.
        let (mut decoder, port, shared, notify) = make_decoder();
        let notified = Arc::new(AtomicU32::new(0));
        let c = notified.clone();
        notify.set_solenoid(Some(Box::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        })));

        feed(&mut decoder, &port, &[(BusAddress::Sol2, 0x01), (BusAddress::Sol2, 0x01)]);
        assert_eq!(shared.solenoids(), 0x0001_0000);
        assert_eq!(notified.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_solenoid_banks_are_independent() {
        let (mut decoder, port, shared, _notify) = make_decoder();
        feed(
            &mut decoder,
            &port,
            &[
                (BusAddress::Sol1, 0x11),
                (BusAddress::Sol2, 0x22),
                (BusAddress::Sol3, 0x33),
                (BusAddress::Sol4, 0x44),
            ],
        );
        assert_eq!(shared.solenoids(), 0x1122_3344);
    }

    #[test]
    fn test_invalid_address_counts_and_changes_nothing() {
        let (mut decoder, port, shared, _notify) = make_decoder();
        // Address 0 and a multi-bit address code, one error each.
        assert!(port.push_word(0x00FF));
        decoder.poll_once();
        assert!(port.push_word(0x03AA));
        decoder.poll_once();

        let stats = shared.stats();
        assert_eq!(stats.address_errors, 2);
        assert_eq!(stats.event_count, 2);
        assert_eq!(shared.lights(), 0);
        assert_eq!(shared.solenoids(), 0);
    }

    #[test]
    fn test_full_queue_sets_sticky_overflow() {
        // Scenario C: 9 words against an 8-entry queue.
        let (mut decoder, port, shared, _notify) = make_decoder();
        let mut dropped = 0;
        for _ in 0..9 {
            if !port.push_word((ADDR_LROW as u16) << 8) {
                dropped += 1;
            }
        }
        assert_eq!(dropped, 1);

        while shared.stats().event_count < FIFO_DEPTH as u64 {
            decoder.poll_once();
        }
        let stats = shared.stats();
        assert!(stats.overflow);
        assert_eq!(stats.max_queue_depth, FIFO_DEPTH as u32);

        // Overflow stays set across quiet iterations until reset.
        decoder.poll_once();
        assert!(shared.stats().overflow);
        shared.reset_overflow();
        assert!(!shared.stats().overflow);
    }

    #[test]
    fn test_zero_cross_markers_are_counted() {
        let (mut decoder, port, shared, _notify) = make_decoder();
        for _ in 0..3 {
            assert!(port.push_zero_cross());
            decoder.poll_once();
        }
        assert_eq!(shared.stats().zero_crossings_detected, 3);
    }

    #[test]
    fn test_triac_words_reach_the_estimator_counter() {
        let (mut decoder, port, shared, _notify) = make_decoder();
        feed(&mut decoder, &port, &[(BusAddress::Triacs, 0x1F)]);
        let stats = shared.stats();
        assert_eq!(stats.triac_events_detected, 1);
        // No lamp or solenoid state was touched.
        assert_eq!(shared.lights(), 0);
        assert_eq!(shared.solenoids(), 0);
    }

    #[test]
    fn test_triac_delay_extremes_need_a_crossing() {
        let (mut decoder, port, shared, _notify) = make_decoder();
        // No crossing seen yet: the firing cannot be phased, nothing is
        // recorded.
        feed(&mut decoder, &port, &[(BusAddress::Triacs, 0x01)]);
        let stats = shared.stats();
        assert_eq!(stats.triac_min_time_us, 0);
        assert_eq!(stats.triac_max_time_us, 0);

        assert!(port.push_zero_cross());
        decoder.poll_once();
        std::thread::sleep(std::time::Duration::from_millis(2));
        feed(&mut decoder, &port, &[(BusAddress::Triacs, 0x01)]);
        let stats = shared.stats();
        assert!(stats.triac_min_time_us >= 2000);
        assert!(stats.triac_max_time_us >= stats.triac_min_time_us);
    }

    #[test]
    fn test_revision_b_indicator_counts_as_crossing() {
        let (mut sampler, port) = QueueSampler::new();
        sampler.activate();
        let shared = Arc::new(SharedState::new());
        let notify = Arc::new(NotifySlots::new());
        let mut decoder = Decoder::new(
            sampler,
            shared.clone(),
            notify,
            Revision::B,
            TriacEstimator::with_defaults(),
        );
        let raw = 0x8000 | BusWord::encode(BusAddress::Triacs, 0x01);
        assert!(port.push_word(raw));
        decoder.poll_once();
        let stats = shared.stats();
        assert_eq!(stats.zero_crossings_detected, 1);
        assert_eq!(stats.triac_events_detected, 1);
    }
}
