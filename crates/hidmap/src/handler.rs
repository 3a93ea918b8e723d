//! Handler traits and the context passed to them
//!
//! Bindings implement [`ControlHandler`] (hardware input) or
//! [`FeedbackHandler`] (host-side value changes). Plain closures implement both
//! traits through blanket impls.

use crate::encoder::LampWriter;
use crate::registry::ControlDescriptor;
use crate::surface::ControlSurface;
use crate::transport::TransportError;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

/// A genuine field-level change decoded from an input report
#[derive(Debug, Clone, Copy)]
pub struct ControlEvent<'a> {
    /// Layout of the control that changed
    pub descriptor: &'a ControlDescriptor,
    /// New right-aligned field value
    pub value: u8,
    /// Value before this report (the control's `last_value`)
    pub previous: u8,
}

impl<'a> ControlEvent<'a> {
    pub fn group(&self) -> &'a str {
        self.descriptor.group()
    }

    pub fn name(&self) -> &'a str {
        self.descriptor.name()
    }

    /// Value scaled to 0.0-1.0 by the field's maximum
    pub fn normalized(&self) -> f64 {
        f64::from(self.value) / f64::from(self.descriptor.max_value())
    }
}

/// A host-side value change for a subscribed `(group, control)`
#[derive(Debug, Clone, Copy)]
pub struct FeedbackEvent<'a> {
    pub group: &'a str,
    pub control: &'a str,
    pub value: f64,
}

/// Capabilities available to a handler while it runs
pub struct Context<'a> {
    /// Host parameter store and scheduler
    pub surface: &'a mut dyn ControlSurface,
    /// Output encoder bound to the device transport
    pub lamps: LampWriter<'a>,
}

impl<'a> Context<'a> {
    pub fn new(surface: &'a mut dyn ControlSurface, lamps: LampWriter<'a>) -> Self {
        Self { surface, lamps }
    }

    /// Write a lamp; see [`LampWriter::send`]
    pub fn send(&mut self, group: &str, name: &str, value: u8) -> Result<bool, TransportError> {
        self.lamps.send(group, name, value)
    }
}

/// Reacts to decoded input changes
pub trait ControlHandler {
    fn on_change(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()>;
}

impl<F> ControlHandler for F
where
    F: FnMut(&ControlEvent<'_>, &mut Context<'_>) -> anyhow::Result<()>,
{
    fn on_change(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self(event, ctx)
    }
}

/// Reacts to host-side value changes
pub trait FeedbackHandler {
    fn on_feedback(&mut self, event: &FeedbackEvent<'_>, ctx: &mut Context<'_>)
        -> anyhow::Result<()>;
}

impl<F> FeedbackHandler for F
where
    F: FnMut(&FeedbackEvent<'_>, &mut Context<'_>) -> anyhow::Result<()>,
{
    fn on_feedback(
        &mut self,
        event: &FeedbackEvent<'_>,
        ctx: &mut Context<'_>,
    ) -> anyhow::Result<()> {
        self(event, ctx)
    }
}

/// Box a closure as a [`ControlHandler`]
pub fn on_change<F>(f: F) -> Box<dyn ControlHandler>
where
    F: FnMut(&ControlEvent<'_>, &mut Context<'_>) -> anyhow::Result<()> + 'static,
{
    Box::new(f)
}

/// Box a closure as a [`FeedbackHandler`]
pub fn on_feedback<F>(f: F) -> Box<dyn FeedbackHandler>
where
    F: FnMut(&FeedbackEvent<'_>, &mut Context<'_>) -> anyhow::Result<()> + 'static,
{
    Box::new(f)
}

/// Run one handler invocation behind an error and panic boundary
///
/// Returns false if the handler failed. Failures are logged and never escape,
/// so one broken binding can't stop the others.
pub(crate) fn run_isolated<F>(label: impl Display, f: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::warn!("Handler for {} failed: {:#}", label, e);
            false
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Handler for {} panicked: {}", label, reason);
            false
        }
    }
}
