//! Host control surface capability
//!
//! The host application exposes its parameters as a key-value store addressed
//! by `(group, name)`, plus a timer facility. The engine only ever talks to the
//! host through this trait.

use std::time::Duration;

/// Opaque handle to a scheduled host timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// Callback run by a host timer
///
/// Receives the surface so it can read and write host values when it fires.
pub type TimerCallback = Box<dyn FnMut(&mut dyn ControlSurface)>;

/// Host-side parameter store and scheduler
///
/// Value changes the host wants reflected on the device are delivered back by
/// calling [`crate::Engine::on_host_change`] for every key passed to
/// [`ControlSurface::subscribe`].
pub trait ControlSurface {
    /// Read a value (unknown keys read as 0.0)
    fn get(&self, group: &str, name: &str) -> f64;

    /// Write a raw value
    fn set(&mut self, group: &str, name: &str, value: f64);

    /// Write a normalized value (0.0-1.0)
    ///
    /// Hosts that distinguish raw and normalized values override this.
    fn set_parameter(&mut self, group: &str, name: &str, value: f64) {
        self.set(group, name, value);
    }

    /// Ask the host to report changes of `(group, name)`
    ///
    /// May be called more than once for the same key.
    fn subscribe(&mut self, group: &str, name: &str);

    /// Run `callback` after `delay`, and then every `delay` if `repeating`
    fn schedule(&mut self, delay: Duration, repeating: bool, callback: TimerCallback)
        -> TimerHandle;

    /// Cancel a timer; unknown or already-fired handles are ignored
    fn cancel(&mut self, handle: TimerHandle);
}
