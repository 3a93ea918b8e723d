//! Input report decoder
//!
//! Compares each incoming report against the previous one with the same report
//! id and only inspects controls living in bytes that changed. Within a changed
//! byte every control is masked independently, so a change is emitted only for
//! fields whose extracted value actually differs from its `last_value`.
//!
//! This is the latency-sensitive path (called at device polling rate): no
//! allocation happens once the report cache is warm.

use crate::registry::ControlRegistry;
use crate::types::ControlId;
use std::collections::HashMap;

/// One genuine field-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChange {
    pub id: ControlId,
    pub value: u8,
    pub previous: u8,
}

/// Input report cache plus per-control runtime state
#[derive(Debug)]
pub struct InputDecoder {
    /// report_id → last raw report
    cache: HashMap<u8, Vec<u8>>,
    /// Last decoded value per control, indexed by `ControlId`
    last_values: Vec<u8>,
}

impl InputDecoder {
    pub fn new(registry: &ControlRegistry) -> Self {
        Self {
            cache: HashMap::new(),
            last_values: vec![0; registry.len()],
        }
    }

    /// Last decoded value of a control (0 until its first change)
    pub fn last_value(&self, id: ControlId) -> u8 {
        self.last_values.get(id.index()).copied().unwrap_or(0)
    }

    /// Previously cached report for a report id
    pub fn cached(&self, report_id: u8) -> Option<&[u8]> {
        self.cache.get(&report_id).map(Vec::as_slice)
    }

    /// Decode one report, calling `on_change` for every changed field
    ///
    /// `on_change` runs before the control's `last_value` is updated. Returns
    /// the number of changes. Short reports decode partially; empty reports
    /// are ignored.
    pub fn decode<F>(&mut self, registry: &ControlRegistry, report: &[u8], mut on_change: F) -> usize
    where
        F: FnMut(ControlChange),
    {
        let Some(&report_id) = report.first() else {
            log::trace!("Decoder: empty report ignored");
            return 0;
        };

        let mut changes = 0;
        if let Some(slots) = registry.input_slots(report_id) {
            let previous = self.cache.get(&report_id);

            for (offset, &byte) in report.iter().enumerate().skip(1) {
                let Some(ids) = slots.get(offset) else { break };
                if ids.is_empty() {
                    continue;
                }
                if previous.is_some_and(|p| p.get(offset) == Some(&byte)) {
                    continue;
                }

                for &id in ids {
                    let value = registry.descriptor(id).extract(byte);
                    let last = &mut self.last_values[id.index()];
                    if value != *last {
                        on_change(ControlChange {
                            id,
                            value,
                            previous: *last,
                        });
                        *last = value;
                        changes += 1;
                    }
                }
            }
        }

        match self.cache.get_mut(&report_id) {
            Some(cached) => {
                cached.clear();
                cached.extend_from_slice(report);
            }
            None => {
                self.cache.insert(report_id, report.to_vec());
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControlKind;

    fn registry() -> ControlRegistry {
        let mut registry = ControlRegistry::new();
        registry
            .register(1, "keypad1", "[Channel1]", ControlKind::Button, 1, 0x01)
            .unwrap();
        registry
            .register(1, "keypad2", "[Channel1]", ControlKind::Button, 1, 0x02)
            .unwrap();
        registry
            .register(1, "play", "[Channel1]", ControlKind::Button, 2, 0x04)
            .unwrap();
        registry
            .register(1, "volume", "[Channel1]", ControlKind::Fader, 4, 0xFF)
            .unwrap();
        registry
            .register(2, "other", "[Master]", ControlKind::Button, 1, 0x01)
            .unwrap();
        registry
    }

    fn collect(
        decoder: &mut InputDecoder,
        registry: &ControlRegistry,
        report: &[u8],
    ) -> Vec<(String, u8, u8)> {
        let mut out = Vec::new();
        decoder.decode(registry, report, |c| {
            let d = registry.descriptor(c.id);
            out.push((d.name().to_string(), c.value, c.previous));
        });
        out
    }

    #[test]
    fn test_first_report_emits_nonzero_fields() {
        let registry = registry();
        let mut decoder = InputDecoder::new(&registry);

        let changes = collect(&mut decoder, &registry, &[1, 0x02, 0x00, 0x00, 0x80]);
        assert_eq!(
            changes,
            vec![("keypad2".to_string(), 1, 0), ("volume".to_string(), 0x80, 0)]
        );
    }

    #[test]
    fn test_all_zero_first_report_emits_nothing() {
        let registry = registry();
        let mut decoder = InputDecoder::new(&registry);
        assert!(collect(&mut decoder, &registry, &[1, 0, 0, 0, 0]).is_empty());
        assert_eq!(decoder.cached(1), Some(&[1u8, 0, 0, 0, 0][..]));
    }

    #[test]
    fn test_identical_report_emits_nothing() {
        let registry = registry();
        let mut decoder = InputDecoder::new(&registry);
        let report = [1, 0x03, 0x04, 0x00, 0x40];

        assert_eq!(collect(&mut decoder, &registry, &report).len(), 4);
        assert!(collect(&mut decoder, &registry, &report).is_empty());
    }

    #[test]
    fn test_shared_byte_only_changed_field() {
        let registry = registry();
        let mut decoder = InputDecoder::new(&registry);
        collect(&mut decoder, &registry, &[1, 0x01, 0, 0, 0]);

        // keypad1 stays pressed, keypad2 goes down
        let changes = collect(&mut decoder, &registry, &[1, 0x03, 0, 0, 0]);
        assert_eq!(changes, vec![("keypad2".to_string(), 1, 0)]);

        // unmapped bits flip: byte changed, no field changed
        let changes = collect(&mut decoder, &registry, &[1, 0xF3, 0, 0, 0]);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_unmapped_byte_changes_ignored() {
        let registry = registry();
        let mut decoder = InputDecoder::new(&registry);
        collect(&mut decoder, &registry, &[1, 0, 0, 0, 0, 0]);
        assert!(collect(&mut decoder, &registry, &[1, 0, 0, 0x55, 0, 0x55]).is_empty());
    }

    #[test]
    fn test_previous_value_and_last_value() {
        let registry = registry();
        let volume = registry.input("[Channel1]", "volume").unwrap();
        let mut decoder = InputDecoder::new(&registry);

        collect(&mut decoder, &registry, &[1, 0, 0, 0, 10]);
        let changes = collect(&mut decoder, &registry, &[1, 0, 0, 0, 25]);
        assert_eq!(changes, vec![("volume".to_string(), 25, 10)]);
        assert_eq!(decoder.last_value(volume), 25);
    }

    #[test]
    fn test_short_report_partial_decode() {
        let registry = registry();
        let mut decoder = InputDecoder::new(&registry);

        let changes = collect(&mut decoder, &registry, &[1, 0x01]);
        assert_eq!(changes, vec![("keypad1".to_string(), 1, 0)]);

        // a longer report afterwards still sees the missing bytes as changed
        let changes = collect(&mut decoder, &registry, &[1, 0x01, 0x04]);
        assert_eq!(changes, vec![("play".to_string(), 1, 0)]);
    }

    #[test]
    fn test_report_ids_are_independent() {
        let registry = registry();
        let mut decoder = InputDecoder::new(&registry);

        collect(&mut decoder, &registry, &[1, 0x01]);
        let changes = collect(&mut decoder, &registry, &[2, 0x01]);
        assert_eq!(changes, vec![("other".to_string(), 1, 0)]);

        // unknown report id: cached, nothing decoded
        assert!(collect(&mut decoder, &registry, &[9, 0xFF]).is_empty());
        assert_eq!(decoder.cached(9), Some(&[9u8, 0xFF][..]));
        assert!(collect(&mut decoder, &registry, &[]).is_empty());
    }
}
