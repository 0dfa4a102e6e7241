//! Monitor lifecycle and control API.
//!
//! [`PowerMonitor`] owns the sampler, the shared state store and the
//! notification slots; there are no process-wide globals. `start` spawns the
//! decoder loop on a dedicated thread and `stop` waits, bounded, for the
//! loop to observably exit before deactivating the hardware sequencers.
//!
//! The getters can be called from any context while the loop runs. `start`
//! and `stop` take `&mut self` and are therefore never concurrent with each
//! other.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::info;

use crate::bus::decoder::Decoder;
use crate::error::Error;
use crate::notify::NotifySlots;
use crate::sampler::{BusSampler, SamplerConfig};
use crate::state::{SharedState, Stats};
use crate::triac::{DEFAULT_WINDOW, DelayTable, TRIAC_CHANNELS, TriacEstimator};

/// How long `stop` polls for loop exit before joining the thread anyway.
/// One loop iteration is sub-millisecond, so this is generous.
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval while waiting for the decoder loop to exit.
const STOP_POLL: Duration = Duration::from_millis(1);

/// Full monitor configuration.
///
/// Everything is validated in [`PowerMonitor::new`], before any hardware is
/// touched; an accepted configuration cannot fail mid-run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pin and sequencer assignment for the sampler.
    pub sampler: SamplerConfig,
    /// Delay-to-brightness mapping for the GI estimator.
    pub delay_table: DelayTable,
    /// GI averaging window in half-cycles, power of two.
    pub triac_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            sampler: SamplerConfig::default(),
            delay_table: DelayTable::default(),
            triac_window: DEFAULT_WINDOW,
        }
    }
}

/// Owner of the decode pipeline: sampler, decoder thread, shared state and
/// notification slots.
pub struct PowerMonitor<S: BusSampler + 'static> {
    shared: Arc<SharedState>,
    notify: Arc<NotifySlots>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    /// The decoder while stopped; moves onto the decoder thread while
    /// running.
    idle: Option<Decoder<S>>,
    handle: Option<JoinHandle<Decoder<S>>>,
}

impl<S: BusSampler + 'static> PowerMonitor<S> {
    /// Build a monitor over a sampler.
    ///
    /// Fails fast on an invalid configuration; see [`Error`].
    pub fn new(sampler: S, config: MonitorConfig) -> Result<Self, Error> {
        config.sampler.validate()?;
        let estimator = TriacEstimator::new(config.delay_table, config.triac_window)?;
        let shared = Arc::new(SharedState::new());
        let notify = Arc::new(NotifySlots::new());
        let decoder = Decoder::new(
            sampler,
            shared.clone(),
            notify.clone(),
            config.sampler.revision,
            estimator,
        );
        Ok(PowerMonitor {
            shared,
            notify,
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(true)),
            idle: Some(decoder),
            handle: None,
        })
    }

    /// Monitor with the default configuration.
    pub fn with_defaults(sampler: S) -> Result<Self, Error> {
        PowerMonitor::new(sampler, MonitorConfig::default())
    }

    /// Whether the decoder loop is currently running.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Activate the sampler and start the decoder loop on its own thread.
    pub fn start(&mut self) -> Result<(), Error> {
        let mut decoder = self.idle.take().ok_or(Error::AlreadyRunning)?;
        decoder.sampler_mut().activate();
        self.running.store(true, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);

        let running = self.running.clone();
        let finished = self.finished.clone();
        self.handle = Some(thread::spawn(move || {
            decoder.run(&running);
            finished.store(true, Ordering::SeqCst);
            decoder
        }));
        info!("decoder loop started");
        Ok(())
    }

    /// Stop the decoder loop and deactivate the hardware sequencers.
    ///
    /// Cancellation is cooperative: the flag is cleared and the loop exits
    /// at the next iteration check. This is the one intentionally blocking
    /// call in the crate; the wait is bounded by [`STOP_TIMEOUT`].
    pub fn stop(&mut self) -> Result<(), Error> {
        let handle = self.handle.take().ok_or(Error::NotRunning)?;
        self.running.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !self.finished.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(STOP_POLL);
        }

        let mut decoder = handle.join().map_err(|_| Error::DecoderPanicked)?;
        decoder.sampler_mut().deactivate();
        self.idle = Some(decoder);
        info!("decoder loop stopped");
        Ok(())
    }

    /// Register a lamp-change callback, replacing any previous one.
    ///
    /// Runs synchronously on the decoder thread; it must return well within
    /// 1 ms and must not block, or the receive queue will overflow.
    pub fn set_lamp_notify<F: FnMut() + Send + 'static>(&self, callback: F) {
        self.notify.set_lamp(Some(Box::new(callback)));
    }

    /// Remove the lamp-change callback.
    pub fn clear_lamp_notify(&self) {
        self.notify.set_lamp(None);
    }

    /// Register a solenoid-change callback, replacing any previous one.
    /// Same timing obligation as [`PowerMonitor::set_lamp_notify`].
    pub fn set_solenoid_notify<F: FnMut() + Send + 'static>(&self, callback: F) {
        self.notify.set_solenoid(Some(Box::new(callback)));
    }

    /// Remove the solenoid-change callback.
    pub fn clear_solenoid_notify(&self) {
        self.notify.set_solenoid(None);
    }

    /// Lamp matrix snapshot as a 64-bit bitmap, row-major.
    pub fn get_lights(&self) -> u64 {
        self.shared.lights()
    }

    /// Solenoid banks snapshot as a 32-bit bitmap.
    pub fn get_solenoids(&self) -> u32 {
        self.shared.solenoids()
    }

    /// Published GI brightness levels.
    pub fn get_gi(&self) -> [u8; TRIAC_CHANNELS] {
        self.shared.gi()
    }

    /// Decode statistics snapshot.
    pub fn get_stats(&self) -> Stats {
        self.shared.stats()
    }

    /// Whether a probable queue overflow has been observed.
    pub fn get_overflow(&self) -> bool {
        self.shared.overflow()
    }

    /// Clear the sticky overflow flag.
    pub fn reset_overflow(&self) {
        self.shared.reset_overflow();
    }

    /// Handle to the shared store, for readers that outlive the monitor
    /// borrow.
    pub fn shared(&self) -> Arc<SharedState> {
        self.shared.clone()
    }
}

impl<S: BusSampler + 'static> Drop for PowerMonitor<S> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}
