#![doc = include_str!("../README.md")]
//! powermon — WPC power-driver bus decoder
//!
//! The crate is organized around four pieces:
//!
//! - [`bus`]: the raw word model ([`BusWord`], [`BusAddress`]) and the
//!   decode dispatcher ([`Decoder`]) that drains the receive queues and
//!   demultiplexes samples by address.
//! - [`triac`]: the phase brightness estimator, correlating zero-cross
//!   timestamps with triac firing delays into smoothed GI levels.
//! - [`state`]: the lock-protected shared store ([`SharedState`], [`Stats`])
//!   written only by the decoder and read through snapshot getters.
//! - [`monitor`]: the control surface ([`PowerMonitor`]) owning the decoder
//!   thread, with start/stop lifecycle and change notification slots.
//!
//! The hardware sampler itself is external; [`sampler`] specifies the wire
//! contract ([`BusSampler`]) it must honor and provides [`QueueSampler`],
//! a bounded-queue implementation used by tests, tools and host-side
//! producers.
//!
//! # Example
//!
//! Feeding synthetic bus traffic through a running monitor:
//!
//! ```rust
//! use powermon::{BusAddress, BusWord, PowerMonitor, QueueSampler};
//!
//! let (sampler, port) = QueueSampler::new();
//! let mut monitor = PowerMonitor::with_defaults(sampler)?;
//! monitor.set_lamp_notify(|| { /* ≤1 ms, non-blocking */ });
//! monitor.start()?;
//!
//! // Select lamp column 2, then write its row byte.
//! port.push_word(BusWord::encode(BusAddress::LampCol, 0x04));
//! port.push_word(BusWord::encode(BusAddress::LampRow, 0xAA));
//!
//! # std::thread::sleep(std::time::Duration::from_millis(50));
//! let lights: u64 = monitor.get_lights();
//! let stats = monitor.get_stats();
//! monitor.stop()?;
//! # assert_eq!(lights, 0x0000_AA00_0000_0000);
//! # assert!(stats.event_count >= 2);
//! # Ok::<(), powermon::Error>(())
//! ```
//!
//! Deterministic, single-threaded decoding with the same parts the monitor
//! uses internally:
//!
//! ```rust
//! use std::sync::Arc;
//! use powermon::bus::Decoder;
//! use powermon::{BusAddress, BusSampler, BusWord, NotifySlots, QueueSampler, Revision,
//!     SharedState, TriacEstimator};
//!
//! let (mut sampler, port) = QueueSampler::new();
//! sampler.activate();
//! let shared = Arc::new(SharedState::new());
//! let mut decoder = Decoder::new(
//!     sampler,
//!     shared.clone(),
//!     Arc::new(NotifySlots::new()),
//!     Revision::A,
//!     TriacEstimator::with_defaults(),
//! );
//!
//! port.push_word(BusWord::encode(BusAddress::Sol1, 0x80));
//! decoder.poll_once();
//! assert_eq!(shared.solenoids(), 0x8000_0000);
//! ```
pub mod bus;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod sampler;
pub mod state;
pub mod triac;

pub use bus::{BusAddress, BusWord, Decoder, Revision};
pub use error::Error;
pub use monitor::{MonitorConfig, PowerMonitor};
pub use notify::{NotifyFn, NotifySlots};
pub use sampler::{BusSampler, FIFO_DEPTH, QueuePort, QueueSampler, SamplerConfig};
pub use state::{SharedState, Stats};
pub use triac::{DelayTable, TRIAC_CHANNELS, TriacEstimator};
