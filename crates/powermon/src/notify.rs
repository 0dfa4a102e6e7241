//! Change notification slots.
//!
//! The decoder invokes the registered callbacks synchronously, on its own
//! execution context, whenever a lamp row or a solenoid bank actually
//! changed. While a callback runs the receive queues keep filling, so a
//! callback must return well within 1 ms and must not block or re-enter any
//! mutating monitor operation; this is a caller obligation, not something
//! the decoder can enforce.

use parking_lot::Mutex;

/// A registered change callback.
pub type NotifyFn = Box<dyn FnMut() + Send>;

/// One optional slot per notification kind.
///
/// Setting a callback replaces the previous one; callbacks never accumulate.
#[derive(Default)]
pub struct NotifySlots {
    lamp: Mutex<Option<NotifyFn>>,
    solenoid: Mutex<Option<NotifyFn>>,
}

impl NotifySlots {
    /// Create empty slots.
    pub fn new() -> Self {
        NotifySlots::default()
    }

    /// Replace the lamp-change callback.
    pub fn set_lamp(&self, callback: Option<NotifyFn>) {
        *self.lamp.lock() = callback;
    }

    /// Replace the solenoid-change callback.
    pub fn set_solenoid(&self, callback: Option<NotifyFn>) {
        *self.solenoid.lock() = callback;
    }

    /// Invoke the lamp-change callback, if one is set.
    pub(crate) fn notify_lamp(&self) {
        if let Some(callback) = self.lamp.lock().as_mut() {
            callback();
        }
    }

    /// Invoke the solenoid-change callback, if one is set.
    pub(crate) fn notify_solenoid(&self) {
        if let Some(callback) = self.solenoid.lock().as_mut() {
            callback();
        }
    }
}

impl std::fmt::Debug for NotifySlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySlots")
            .field("lamp", &self.lamp.lock().is_some())
            .field("solenoid", &self.solenoid.lock().is_some())
            .finish()
    }
}
