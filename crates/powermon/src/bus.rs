//! Bus word model and decode dispatcher.
//!
//! `word` defines the raw sample layout, the address enumeration and the
//! one-hot column lookup; `decoder` is the polling dispatch loop that turns
//! the sample stream into shared state updates.
pub mod decoder;
pub mod word;

pub use decoder::Decoder;
pub use word::{BusAddress, BusWord, Revision, column_index};
