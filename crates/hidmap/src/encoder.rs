//! Output report encoder
//!
//! Keeps one byte buffer per output report id and merges lamp values into it
//! with read-modify-write, so lamps sharing a status byte never clobber each
//! other. The whole buffer is retransmitted on every write because the
//! transport has no delta semantics.

use crate::registry::{ControlDescriptor, ControlRegistry};
use crate::transport::{ReportSink, TransportError};
use std::collections::{BTreeMap, HashMap};

/// Per-report output buffers (report id byte + payload)
#[derive(Debug, Default)]
pub struct OutputEncoder {
    reports: HashMap<u8, Vec<u8>>,
}

impl OutputEncoder {
    /// Create buffers for every known output report, zeroed apart from the id byte
    pub fn new(lengths: &BTreeMap<u8, usize>) -> Self {
        let reports = lengths
            .iter()
            .map(|(&report_id, &length)| {
                let mut buf = vec![0u8; length.max(1)];
                buf[0] = report_id;
                (report_id, buf)
            })
            .collect();
        Self { reports }
    }

    /// Merge `value` into the field described by `descriptor`
    ///
    /// Buffers for unknown report ids are created on first use and grown if
    /// the field lies past their end. Returns the full updated report.
    pub fn encode(&mut self, descriptor: &ControlDescriptor, value: u8) -> &[u8] {
        let report_id = descriptor.report_id();
        let offset = descriptor.offset();
        let buf = self.reports.entry(report_id).or_insert_with(|| vec![report_id]);
        if buf.len() <= offset {
            buf.resize(offset + 1, 0);
        }
        buf[offset] = descriptor.merge(buf[offset], value);
        buf
    }

    /// Current contents of an output report
    pub fn report(&self, report_id: u8) -> Option<&[u8]> {
        self.reports.get(&report_id).map(Vec::as_slice)
    }
}

/// Lamp writer: registry lookup + encoder + transport
///
/// Handed to handlers through [`crate::Context`] and used by
/// [`crate::Engine::send`].
pub struct LampWriter<'a> {
    registry: &'a ControlRegistry,
    encoder: &'a mut OutputEncoder,
    transport: &'a mut dyn ReportSink,
}

impl<'a> LampWriter<'a> {
    pub fn new(
        registry: &'a ControlRegistry,
        encoder: &'a mut OutputEncoder,
        transport: &'a mut dyn ReportSink,
    ) -> Self {
        Self {
            registry,
            encoder,
            transport,
        }
    }

    /// Set a lamp and transmit its whole report
    ///
    /// Returns `Ok(false)` without sending when no lamp is registered for
    /// `(group, name)`: not every logical control has an indicator.
    pub fn send(&mut self, group: &str, name: &str, value: u8) -> Result<bool, TransportError> {
        let Some(descriptor) = self.registry.lamp(group, name) else {
            log::trace!("Output: no lamp for {}.{}, ignoring", group, name);
            return Ok(false);
        };

        let report = self.encoder.encode(descriptor, value);
        if log::log_enabled!(log::Level::Trace) {
            let bytes: Vec<String> = report.iter().map(|b| format!("{:02x}", b)).collect();
            log::trace!("Output: {}.{} = {} → [{}]", group, name, value, bytes.join(" "));
        }
        self.transport.send_report(report)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use crate::types::ControlKind;

    fn lamp_registry() -> ControlRegistry {
        let mut registry = ControlRegistry::new();
        registry
            .register(1, "source", "[Channel1]", ControlKind::Lamp, 1, 0x10)
            .unwrap();
        registry
            .register(1, "play", "[Channel1]", ControlKind::Lamp, 1, 0x01)
            .unwrap();
        registry
            .register(1, "mode", "[Master]", ControlKind::Lamp, 2, 0x0E)
            .unwrap();
        registry
    }

    #[test]
    fn test_buffers_preinitialized() {
        let registry = lamp_registry();
        let encoder = OutputEncoder::new(&registry.output_report_lengths());
        assert_eq!(encoder.report(1), Some(&[1u8, 0, 0][..]));
        assert_eq!(encoder.report(2), None);
    }

    #[test]
    fn test_send_sets_and_clears_bit() {
        let registry = lamp_registry();
        let mut encoder = OutputEncoder::new(&registry.output_report_lengths());
        let mut transport = MemoryTransport::new();

        {
            let mut lamps = LampWriter::new(&registry, &mut encoder, &mut transport);
            assert!(lamps.send("[Channel1]", "play", 1).unwrap());
            assert!(lamps.send("[Channel1]", "source", 1).unwrap());
            assert!(lamps.send("[Channel1]", "source", 0).unwrap());
        }

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1], vec![1, 0x11, 0]);
        // source cleared, play untouched
        assert_eq!(sent[2], vec![1, 0x01, 0]);
    }

    #[test]
    fn test_unknown_lamp_is_noop() {
        let registry = lamp_registry();
        let mut encoder = OutputEncoder::new(&registry.output_report_lengths());
        let mut transport = MemoryTransport::new();

        let mut lamps = LampWriter::new(&registry, &mut encoder, &mut transport);
        assert!(!lamps.send("[Channel2]", "source", 1).unwrap());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_multibit_round_trip() {
        let registry = lamp_registry();
        let lamp = registry.lamp("[Master]", "mode").unwrap().clone();
        let mut encoder = OutputEncoder::new(&registry.output_report_lengths());

        for value in 0..=lamp.max_value() {
            let report = encoder.encode(&lamp, value);
            assert_eq!(lamp.extract(report[2]), value);
            assert_eq!(report[2] & lamp.inverse_mask(), 0);
        }
    }

    #[test]
    fn test_lazy_buffer_growth() {
        let mut registry = ControlRegistry::new();
        let id = registry
            .register(3, "far", "[Master]", ControlKind::Lamp, 6, 0x80)
            .unwrap();
        let lamp = registry.descriptor(id).clone();

        let mut encoder = OutputEncoder::default();
        let report = encoder.encode(&lamp, 1);
        assert_eq!(report, &[3, 0, 0, 0, 0, 0, 0x80]);
    }
}
