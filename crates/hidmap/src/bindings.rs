//! Reusable bindings
//!
//! Building blocks for device mappings: write, toggle or scale a control into
//! the host, turn encoder positions into relative jog moves, emulate a held
//! jog with a host timer, and mirror host values on lamps.

use crate::handler::{Context, ControlEvent, ControlHandler, FeedbackEvent, FeedbackHandler};
use crate::surface::TimerHandle;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

/// Flag shared between bindings of one device (shift, mode toggles)
pub type SharedFlag = Rc<Cell<bool>>;

/// Interval of the held-jog timer
pub const JOG_TICK: Duration = Duration::from_millis(20);

/// Rate nudge per tick while shift is held
const RATE_STEP: f64 = 0.001;

/// Encoder jumps larger than this are treated as wrap-around and dropped
pub const JOG_WRAP_THRESHOLD: i16 = 100;

/// Resolve the host target, applying optional overrides
fn target<'a>(
    event: &ControlEvent<'a>,
    group: &'a Option<String>,
    control: &'a Option<String>,
) -> (&'a str, &'a str) {
    (
        group.as_deref().unwrap_or(event.group()),
        control.as_deref().unwrap_or(event.name()),
    )
}

/// Writes the raw field value to the host
#[derive(Debug, Clone, Default)]
pub struct SetControl {
    control: Option<String>,
    group: Option<String>,
}

impl SetControl {
    /// Write to the control with the same group and name
    pub fn new() -> Self {
        Self::default()
    }

    /// Write to a differently named control in the same group
    pub fn to(control: impl Into<String>) -> Self {
        Self {
            control: Some(control.into()),
            group: None,
        }
    }

    /// Write to `control` in a fixed group
    pub fn to_group(control: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            control: Some(control.into()),
            group: Some(group.into()),
        }
    }
}

impl ControlHandler for SetControl {
    fn on_change(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let (group, control) = target(event, &self.group, &self.control);
        ctx.surface.set(group, control, f64::from(event.value));
        Ok(())
    }
}

/// Inverts the host value (0 ↔ 1)
#[derive(Debug, Clone, Default)]
pub struct ToggleControl {
    control: Option<String>,
    group: Option<String>,
}

impl ToggleControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(control: impl Into<String>) -> Self {
        Self {
            control: Some(control.into()),
            group: None,
        }
    }

    /// Toggle `control` in a fixed group, e.g. a deck button driving `[Master]`
    pub fn to_group(control: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            control: Some(control.into()),
            group: Some(group.into()),
        }
    }
}

impl ControlHandler for ToggleControl {
    fn on_change(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let (group, control) = target(event, &self.group, &self.control);
        let current = ctx.surface.get(group, control);
        ctx.surface
            .set(group, control, if current != 0.0 { 0.0 } else { 1.0 });
        Ok(())
    }
}

/// Sends the value scaled to 0.0-1.0 as a host parameter
#[derive(Debug, Clone, Default)]
pub struct Continuous {
    control: Option<String>,
}

impl Continuous {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(control: impl Into<String>) -> Self {
        Self {
            control: Some(control.into()),
        }
    }
}

impl ControlHandler for Continuous {
    fn on_change(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let control = self.control.as_deref().unwrap_or(event.name());
        ctx.surface
            .set_parameter(event.group(), control, event.normalized());
        Ok(())
    }
}

/// Turns an absolute encoder position into relative `jog` moves
///
/// The first event per group only seeds the position. Jumps larger than
/// [`JOG_WRAP_THRESHOLD`] happen when the position wraps and are dropped.
#[derive(Debug, Clone, Default)]
pub struct RelativeJog {
    seeded: HashSet<String>,
}

impl RelativeJog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signed movement for this event, or None if it should be ignored
    pub fn delta(&mut self, event: &ControlEvent<'_>) -> Option<i16> {
        if self.seeded.insert(event.group().to_string()) {
            return None;
        }
        let delta = i16::from(event.value) - i16::from(event.previous);
        (delta.abs() <= JOG_WRAP_THRESHOLD).then_some(delta)
    }
}

impl ControlHandler for RelativeJog {
    fn on_change(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        if let Some(delta) = self.delta(event) {
            ctx.surface.set(event.group(), "jog", f64::from(delta));
        }
        Ok(())
    }
}

/// Emulates a held jog wheel with a repeating host timer
///
/// While the button is down the deck's `jog` is nudged every [`JOG_TICK`]; with
/// shift held the deck `rate` is adjusted instead. Release (or a new press)
/// cancels the running timer.
pub struct JogButton {
    direction: f64,
    shift: SharedFlag,
    timers: HashMap<String, TimerHandle>,
}

impl JogButton {
    pub fn new(direction: f64, shift: SharedFlag) -> Self {
        Self {
            direction,
            shift,
            timers: HashMap::new(),
        }
    }
}

impl ControlHandler for JogButton {
    fn on_change(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let group = event.group().to_string();
        if let Some(handle) = self.timers.remove(&group) {
            ctx.surface.cancel(handle);
        }
        if event.value == 0 {
            return Ok(());
        }

        let direction = self.direction;
        let shift = self.shift.clone();
        let deck = group.clone();
        let handle = ctx.surface.schedule(
            JOG_TICK,
            true,
            Box::new(move |surface| {
                if shift.get() {
                    let rate = surface.get(&deck, "rate");
                    surface.set(&deck, "rate", rate + direction * RATE_STEP);
                } else {
                    surface.set(&deck, "jog", -direction);
                }
            }),
        );
        self.timers.insert(group, handle);
        Ok(())
    }
}

/// Mirrors a host value on a lamp, optionally under another name
///
/// The value is rounded and clamped to 0-255 before encoding.
#[derive(Debug, Clone, Default)]
pub struct ForwardToLamp {
    lamp: Option<String>,
}

impl ForwardToLamp {
    /// Lamp with the same group and name as the host control
    pub fn new() -> Self {
        Self::default()
    }

    /// Lamp with a different name in the same group
    pub fn renamed(lamp: impl Into<String>) -> Self {
        Self {
            lamp: Some(lamp.into()),
        }
    }
}

/// Convert a host value to a lamp field value
pub fn lamp_value(value: f64) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

impl FeedbackHandler for ForwardToLamp {
    fn on_feedback(
        &mut self,
        event: &FeedbackEvent<'_>,
        ctx: &mut Context<'_>,
    ) -> anyhow::Result<()> {
        let lamp = self.lamp.as_deref().unwrap_or(event.control);
        ctx.send(event.group, lamp, lamp_value(event.value))?;
        Ok(())
    }
}
