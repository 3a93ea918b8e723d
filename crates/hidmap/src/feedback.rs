//! Feedback subscription layer
//!
//! Routes host-side value changes (not hardware input) to handlers keyed by
//! `(group, control)`. Handlers usually forward the value to a lamp so the
//! device mirrors host state.

use crate::handler::{run_isolated, Context, FeedbackEvent, FeedbackHandler};
use crate::types::ControlKey;
use std::collections::HashMap;

/// `(group, control)` → ordered feedback handlers
#[derive(Default)]
pub struct FeedbackTable {
    handlers: HashMap<ControlKey, Vec<Box<dyn FeedbackHandler>>>,
}

impl FeedbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `(group, control)`
    ///
    /// Returns the handler's position so the caller can trigger it alone.
    pub fn subscribe(
        &mut self,
        group: &str,
        control: &str,
        handler: Box<dyn FeedbackHandler>,
    ) -> usize {
        let handlers = self
            .handlers
            .entry(ControlKey::new(group, control))
            .or_default();
        handlers.push(handler);
        handlers.len() - 1
    }

    pub fn handler_count(&self, group: &str, control: &str) -> usize {
        self.handlers
            .get(&ControlKey::new(group, control))
            .map_or(0, Vec::len)
    }

    /// Every subscribed `(group, control)` key
    pub fn keys(&self) -> impl Iterator<Item = &ControlKey> {
        self.handlers.keys()
    }

    /// Run every handler for the event's key, in subscription order
    ///
    /// Returns how many handlers ran. Errors and panics are isolated per handler.
    pub fn dispatch(&mut self, event: &FeedbackEvent<'_>, ctx: &mut Context<'_>) -> usize {
        let Some(handlers) = self
            .handlers
            .get_mut(&ControlKey::new(event.group, event.control))
        else {
            return 0;
        };

        for handler in handlers.iter_mut() {
            run_isolated(
                format_args!("feedback {}.{}", event.group, event.control),
                || handler.on_feedback(event, ctx),
            );
        }
        handlers.len()
    }

    /// Run a single handler, used to push the initial value after subscribing
    pub fn trigger(&mut self, index: usize, event: &FeedbackEvent<'_>, ctx: &mut Context<'_>) -> bool {
        let Some(handler) = self
            .handlers
            .get_mut(&ControlKey::new(event.group, event.control))
            .and_then(|handlers| handlers.get_mut(index))
        else {
            return false;
        };
        run_isolated(
            format_args!("feedback {}.{}", event.group, event.control),
            || handler.on_feedback(event, ctx),
        )
    }
}
