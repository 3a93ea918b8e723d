//! Engine: the single owned context
//!
//! Ties registry, decoder, dispatch table, output encoder and feedback layer
//! to one host surface and one transport. Everything runs synchronously on the
//! caller's thread; nothing here is shared or locked.
//!
//! ```text
//! input report → InputDecoder → DispatchTable → handler → surface / lamps
//! host change  → FeedbackTable → handler → OutputEncoder → transport
//! ```

use crate::decoder::InputDecoder;
use crate::dispatch::DispatchTable;
use crate::encoder::{LampWriter, OutputEncoder};
use crate::feedback::FeedbackTable;
use crate::handler::{
    Context, ControlEvent, ControlHandler, FeedbackEvent, FeedbackHandler,
};
use crate::memory::MemorySurface;
use crate::registry::ControlRegistry;
use crate::surface::ControlSurface;
use crate::transport::{ReportSink, TransportError};
use crate::types::TriggerMode;
use flume::Receiver;

/// HID codec and dispatch engine for one device
pub struct Engine<S: ControlSurface, T: ReportSink> {
    registry: ControlRegistry,
    decoder: InputDecoder,
    dispatch: DispatchTable,
    encoder: OutputEncoder,
    feedback: FeedbackTable,
    surface: S,
    transport: T,
}

impl<S: ControlSurface, T: ReportSink> Engine<S, T> {
    /// Build an engine around a finished registry
    ///
    /// Output buffers are created up front for every report that has lamps.
    pub fn new(registry: ControlRegistry, surface: S, transport: T) -> Self {
        let decoder = InputDecoder::new(&registry);
        let encoder = OutputEncoder::new(&registry.output_report_lengths());
        log::info!(
            "Engine: {} controls, {} output report(s)",
            registry.len(),
            registry.output_report_lengths().len()
        );
        Self {
            registry,
            decoder,
            dispatch: DispatchTable::new(),
            encoder,
            feedback: FeedbackTable::new(),
            surface,
            transport,
        }
    }

    /// Register a handler for every control called `name`
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        trigger: TriggerMode,
        handler: Box<dyn ControlHandler>,
    ) {
        self.dispatch.register(name, trigger, handler);
    }

    /// Register a closure for every control called `name`
    pub fn capture<F>(&mut self, name: impl Into<String>, trigger: TriggerMode, handler: F)
    where
        F: FnMut(&ControlEvent<'_>, &mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        self.dispatch.register(name, trigger, Box::new(handler));
    }

    /// Decode one raw input report and dispatch every genuine field change
    ///
    /// Returns the number of field changes. Never fails: handler errors are
    /// logged at the dispatch boundary.
    pub fn on_report(&mut self, report: &[u8]) -> usize {
        let Self {
            registry,
            decoder,
            dispatch,
            encoder,
            surface,
            transport,
            ..
        } = self;
        let registry: &ControlRegistry = registry;

        decoder.decode(registry, report, |change| {
            let descriptor = registry.descriptor(change.id);
            log::trace!(
                "Decoder: {}.{} {} → {}",
                descriptor.group(),
                descriptor.name(),
                change.previous,
                change.value
            );
            let event = ControlEvent {
                descriptor,
                value: change.value,
                previous: change.previous,
            };
            let lamps = LampWriter::new(registry, encoder, transport);
            let mut ctx = Context::new(surface, lamps);
            dispatch.dispatch(&event, &mut ctx);
        })
    }

    /// Process every report waiting on a channel without blocking
    pub fn drain_reports(&mut self, reports: &Receiver<Vec<u8>>) -> usize {
        let mut processed = 0;
        while let Ok(report) = reports.try_recv() {
            self.on_report(&report);
            processed += 1;
        }
        processed
    }

    /// Set a lamp and transmit its full output report
    ///
    /// `Ok(false)` means no lamp is registered for `(group, name)`.
    pub fn send(&mut self, group: &str, name: &str, value: u8) -> Result<bool, TransportError> {
        LampWriter::new(&self.registry, &mut self.encoder, &mut self.transport)
            .send(group, name, value)
    }

    /// Subscribe a feedback handler to a host value
    ///
    /// Registers the key with the host, then reads the current value and pushes
    /// it through the new handler right away so indicators are correct from
    /// the start instead of after the next host change.
    pub fn subscribe(&mut self, group: &str, control: &str, handler: Box<dyn FeedbackHandler>) {
        let index = self.feedback.subscribe(group, control, handler);
        self.surface.subscribe(group, control);

        let value = self.surface.get(group, control);
        let event = FeedbackEvent {
            group,
            control,
            value,
        };
        let lamps = LampWriter::new(&self.registry, &mut self.encoder, &mut self.transport);
        let mut ctx = Context::new(&mut self.surface, lamps);
        self.feedback.trigger(index, &event, &mut ctx);
    }

    /// Subscribe a feedback closure to a host value; see [`Self::subscribe`]
    pub fn connect<F>(&mut self, group: &str, control: &str, handler: F)
    where
        F: FnMut(&FeedbackEvent<'_>, &mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        self.subscribe(group, control, Box::new(handler));
    }

    /// Deliver a host-side value change to the feedback handlers
    pub fn on_host_change(&mut self, group: &str, control: &str, value: f64) -> usize {
        let event = FeedbackEvent {
            group,
            control,
            value,
        };
        let lamps = LampWriter::new(&self.registry, &mut self.encoder, &mut self.transport);
        let mut ctx = Context::new(&mut self.surface, lamps);
        self.feedback.dispatch(&event, &mut ctx)
    }

    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    /// Last decoded value of an input control
    pub fn last_value(&self, group: &str, name: &str) -> Option<u8> {
        self.registry
            .input(group, name)
            .map(|id| self.decoder.last_value(id))
    }

    /// Current contents of an output report
    pub fn output_report(&self, report_id: u8) -> Option<&[u8]> {
        self.encoder.report(report_id)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.dispatch.handler_count(name)
    }

    pub fn feedback_count(&self, group: &str, control: &str) -> usize {
        self.feedback.handler_count(group, control)
    }
}

/// Rounds of handler-produced changes delivered per pump
pub const MAX_PUMP_ROUNDS: usize = 64;

impl<T: ReportSink> Engine<MemorySurface, T> {
    /// Deliver the in-memory host's queued notifications to the feedback layer
    ///
    /// Loops until handlers stop producing new changes, for at most
    /// [`MAX_PUMP_ROUNDS`] rounds. Changes still queued after that stay queued
    /// for the next call.
    pub fn pump_host_changes(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let changes = self.surface.drain_changes();
            if changes.is_empty() {
                return delivered;
            }
            for change in changes {
                self.on_host_change(&change.group, &change.name, change.value);
                delivered += 1;
            }
        }
        log::warn!(
            "Engine: feedback still changing host values after {} rounds, stopping",
            MAX_PUMP_ROUNDS
        );
        delivered
    }
}
