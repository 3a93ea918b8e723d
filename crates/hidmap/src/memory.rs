//! In-memory host surface and transport
//!
//! A self-contained [`ControlSurface`] with a manually advanced clock, and a
//! [`ReportSink`] that records every report. Useful for dry runs without a
//! device or host, and as test doubles.

use crate::surface::{ControlSurface, TimerCallback, TimerHandle};
use crate::transport::{ReportSink, TransportError};
use crate::types::ControlKey;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Shortest repeat interval, so a zero-delay repeating timer can't spin forever
const MIN_REPEAT: Duration = Duration::from_millis(1);

/// Records outgoing reports
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<Vec<u8>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports sent so far, oldest first
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.sent.last().map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl ReportSink for MemoryTransport {
    fn send_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        self.sent.push(report.to_vec());
        Ok(())
    }
}

/// A value change on a subscribed key, waiting to be delivered to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub group: String,
    pub name: String,
    pub value: f64,
}

struct Timer {
    due: Duration,
    interval: Duration,
    repeating: bool,
    callback: TimerCallback,
}

/// In-memory host surface
#[derive(Default)]
pub struct MemorySurface {
    values: HashMap<ControlKey, f64>,
    subscriptions: HashSet<ControlKey>,
    pending: Vec<ValueChange>,
    timers: BTreeMap<u64, Timer>,
    next_timer: u64,
    now: Duration,
    /// Timer currently running, and whether it cancelled itself
    firing: Option<(u64, bool)>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-set a value without queuing a change notification
    pub fn with_value(mut self, group: &str, name: &str, value: f64) -> Self {
        self.values.insert(ControlKey::new(group, name), value);
        self
    }

    pub fn is_subscribed(&self, group: &str, name: &str) -> bool {
        self.subscriptions.contains(&ControlKey::new(group, name))
    }

    /// Take the queued notifications for subscribed keys
    pub fn drain_changes(&mut self) -> Vec<ValueChange> {
        std::mem::take(&mut self.pending)
    }

    /// Number of timers still scheduled
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// Time elapsed on the manual clock
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Advance the clock, firing every timer that comes due in order
    pub fn advance(&mut self, elapsed: Duration) {
        let target = self.now + elapsed;

        loop {
            let next = self
                .timers
                .iter()
                .filter(|(_, timer)| timer.due <= target)
                .min_by_key(|(id, timer)| (timer.due, **id))
                .map(|(id, _)| *id);
            let Some(id) = next else { break };
            let Some(mut timer) = self.timers.remove(&id) else { break };

            self.now = timer.due;
            self.firing = Some((id, false));
            (timer.callback)(self);
            let cancelled = matches!(self.firing.take(), Some((_, true)));

            if timer.repeating && !cancelled {
                timer.due += timer.interval;
                self.timers.insert(id, timer);
            }
        }

        self.now = target;
    }
}

impl ControlSurface for MemorySurface {
    fn get(&self, group: &str, name: &str) -> f64 {
        self.values
            .get(&ControlKey::new(group, name))
            .copied()
            .unwrap_or(0.0)
    }

    fn set(&mut self, group: &str, name: &str, value: f64) {
        let key = ControlKey::new(group, name);
        let previous = self.values.get(&key).copied().unwrap_or(0.0);
        if previous != value && self.subscriptions.contains(&key) {
            self.pending.push(ValueChange {
                group: group.to_string(),
                name: name.to_string(),
                value,
            });
        }
        self.values.insert(key, value);
    }

    fn subscribe(&mut self, group: &str, name: &str) {
        self.subscriptions.insert(ControlKey::new(group, name));
    }

    fn schedule(
        &mut self,
        delay: Duration,
        repeating: bool,
        callback: TimerCallback,
    ) -> TimerHandle {
        let id = self.next_timer;
        self.next_timer += 1;
        let interval = if repeating { delay.max(MIN_REPEAT) } else { delay };
        self.timers.insert(
            id,
            Timer {
                due: self.now + delay,
                interval,
                repeating,
                callback,
            },
        );
        TimerHandle(id)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some((id, cancelled)) = self.firing.as_mut() {
            if *id == handle.0 {
                *cancelled = true;
                return;
            }
        }
        if self.timers.remove(&handle.0).is_none() {
            log::trace!("MemorySurface: cancel of unknown timer {:?} ignored", handle);
        }
    }
}
