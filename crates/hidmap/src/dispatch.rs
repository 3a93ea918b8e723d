//! Dispatch table
//!
//! Maps a control name to an ordered list of `(TriggerMode, handler)`
//! registrations. Controls with the same name in different groups share one
//! list; handlers look at the event's group to pick their target.

use crate::handler::{run_isolated, Context, ControlEvent, ControlHandler};
use crate::types::TriggerMode;
use std::collections::HashMap;

struct Registration {
    trigger: TriggerMode,
    handler: Box<dyn ControlHandler>,
}

/// Name → ordered handler registrations
#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<String, Vec<Registration>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for every control called `name`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        trigger: TriggerMode,
        handler: Box<dyn ControlHandler>,
    ) {
        self.handlers
            .entry(name.into())
            .or_default()
            .push(Registration { trigger, handler });
    }

    /// Number of handlers registered under `name`
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }

    /// Run every handler whose trigger matches, in registration order
    ///
    /// Each invocation is isolated: an error or panic is logged and the next
    /// handler still runs. Returns how many handlers were invoked.
    pub fn dispatch(&mut self, event: &ControlEvent<'_>, ctx: &mut Context<'_>) -> usize {
        let Some(registrations) = self.handlers.get_mut(event.name()) else {
            return 0;
        };

        let mut invoked = 0;
        for registration in registrations.iter_mut() {
            if !registration.trigger.matches(event.value) {
                continue;
            }
            invoked += 1;
            let handler = &mut registration.handler;
            run_isolated(
                format_args!("{}.{}", event.group(), event.name()),
                || handler.on_change(event, ctx),
            );
        }
        invoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{LampWriter, OutputEncoder};
    use crate::handler::on_change;
    use crate::memory::{MemorySurface, MemoryTransport};
    use crate::registry::ControlRegistry;
    use crate::surface::ControlSurface;
    use crate::types::ControlKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> Box<dyn ControlHandler> {
        let log = log.clone();
        on_change(move |event, _ctx| {
            log.borrow_mut().push(format!("{}:{}", label, event.value));
            Ok(())
        })
    }

    struct Harness {
        registry: ControlRegistry,
        encoder: OutputEncoder,
        surface: MemorySurface,
        transport: MemoryTransport,
    }

    impl Harness {
        fn new() -> Self {
            let mut registry = ControlRegistry::new();
            registry
                .register(1, "play", "[Channel1]", ControlKind::Button, 2, 0x04)
                .unwrap();
            registry
                .register(1, "play", "[Channel2]", ControlKind::Button, 5, 0x04)
                .unwrap();
            Self {
                encoder: OutputEncoder::default(),
                registry,
                surface: MemorySurface::new(),
                transport: MemoryTransport::new(),
            }
        }

        fn dispatch(&mut self, table: &mut DispatchTable, group: &str, value: u8, previous: u8) -> usize {
            let id = self.registry.input(group, "play").unwrap();
            let event = ControlEvent {
                descriptor: self.registry.descriptor(id),
                value,
                previous,
            };
            let lamps = LampWriter::new(&self.registry, &mut self.encoder, &mut self.transport);
            let mut ctx = Context::new(&mut self.surface, lamps);
            table.dispatch(&event, &mut ctx)
        }
    }

    #[test]
    fn test_trigger_sequence() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        table.register("play", TriggerMode::All, recorder(&log, "all"));
        table.register("play", TriggerMode::Press, recorder(&log, "press"));
        table.register("play", TriggerMode::Release, recorder(&log, "release"));

        let mut harness = Harness::new();
        assert_eq!(harness.dispatch(&mut table, "[Channel1]", 5, 0), 2);
        assert_eq!(harness.dispatch(&mut table, "[Channel1]", 0, 5), 2);

        assert_eq!(
            *log.borrow(),
            vec!["all:5", "press:5", "all:0", "release:0"]
        );
    }

    #[test]
    fn test_handlers_shared_across_groups() {
        let groups: Rc<RefCell<Vec<String>>> = Rc::default();
        let seen = groups.clone();
        let mut table = DispatchTable::new();
        table.register(
            "play",
            TriggerMode::Press,
            on_change(move |event, ctx| {
                seen.borrow_mut().push(event.group().to_string());
                ctx.surface.set(event.group(), "play", 1.0);
                Ok(())
            }),
        );

        let mut harness = Harness::new();
        harness.dispatch(&mut table, "[Channel2]", 1, 0);
        harness.dispatch(&mut table, "[Channel1]", 1, 0);

        assert_eq!(*groups.borrow(), vec!["[Channel2]", "[Channel1]"]);
        assert_eq!(harness.surface.get("[Channel2]", "play"), 1.0);
    }

    #[test]
    fn test_failing_handlers_do_not_stop_others() {
        let log: Log = Rc::default();
        let mut table = DispatchTable::new();
        table.register(
            "play",
            TriggerMode::All,
            on_change(|_, _| Err(anyhow::anyhow!("broken binding"))),
        );
        table.register(
            "play",
            TriggerMode::All,
            on_change(|_, _| panic!("panicking binding")),
        );
        table.register("play", TriggerMode::All, recorder(&log, "after"));

        let mut harness = Harness::new();
        assert_eq!(harness.dispatch(&mut table, "[Channel1]", 1, 0), 3);
        assert_eq!(*log.borrow(), vec!["after:1"]);
    }

    #[test]
    fn test_unregistered_name_dispatches_nothing() {
        let mut table = DispatchTable::new();
        let mut harness = Harness::new();
        assert_eq!(harness.dispatch(&mut table, "[Channel1]", 1, 0), 0);
        assert_eq!(table.handler_count("play"), 0);
    }
}
