//! Control registry
//!
//! Holds the bit-field layout of every control on a device. Input controls are
//! indexed by `(report_id, byte offset)` for decoding; lamps are indexed by
//! `(group, name)` for encoding. A descriptor lives in exactly one of the two
//! tables depending on its kind.

use crate::types::{ControlId, ControlKey, ControlKind};
use std::collections::{BTreeMap, HashMap};

/// Largest report length (including the report id byte) a control may address
pub const MAX_REPORT_LEN: usize = 1024;

/// Error type for control registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Control '{0}' has an empty bit mask")]
    EmptyMask(ControlKey),

    #[error("Control '{0}' uses byte offset 0, which is reserved for the report id")]
    ReservedOffset(ControlKey),

    #[error("Control '{0}' uses byte offset {1}, past the largest supported report")]
    OffsetOutOfRange(ControlKey, usize),
}

/// Layout metadata for one control's bit field within a report
///
/// Immutable after construction. Derived values (`shift`, `inverse_mask`,
/// `max_value`) are computed once from the mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDescriptor {
    report_id: u8,
    name: String,
    group: String,
    kind: ControlKind,
    offset: usize,
    mask: u8,
    shift: u32,
}

impl ControlDescriptor {
    fn new(
        report_id: u8,
        name: String,
        group: String,
        kind: ControlKind,
        offset: usize,
        mask: u8,
    ) -> Result<Self, RegistryError> {
        if mask == 0 {
            return Err(RegistryError::EmptyMask(ControlKey::new(group, name)));
        }
        if offset == 0 {
            return Err(RegistryError::ReservedOffset(ControlKey::new(group, name)));
        }
        if offset >= MAX_REPORT_LEN {
            return Err(RegistryError::OffsetOutOfRange(
                ControlKey::new(group, name),
                offset,
            ));
        }
        Ok(Self {
            report_id,
            name,
            group,
            kind,
            offset,
            mask,
            shift: mask.trailing_zeros(),
        })
    }

    pub fn report_id(&self) -> u8 {
        self.report_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    /// Byte index into the report (1-based, byte 0 is the report id)
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Number of trailing zero bits in the mask
    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn inverse_mask(&self) -> u8 {
        !self.mask
    }

    /// Largest value the field can hold (255 for byte-wide fields)
    pub fn max_value(&self) -> u8 {
        self.mask >> self.shift
    }

    /// Extract this field's right-aligned value from a report byte
    pub fn extract(&self, byte: u8) -> u8 {
        (byte & self.mask) >> self.shift
    }

    /// Merge `value` into `byte`, leaving bits outside the mask untouched
    ///
    /// Bits of `value` that don't fit the field are dropped.
    pub fn merge(&self, byte: u8, value: u8) -> u8 {
        (byte & self.inverse_mask()) | ((value << self.shift) & self.mask)
    }

    pub fn key(&self) -> ControlKey {
        ControlKey::new(self.group.as_str(), self.name.as_str())
    }
}

/// Two input fields sharing bits at the same byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub report_id: u8,
    pub offset: usize,
    pub first: ControlId,
    pub second: ControlId,
}

/// All control descriptors of a device
#[derive(Debug, Default)]
pub struct ControlRegistry {
    descriptors: Vec<ControlDescriptor>,
    /// report_id → offset → input controls at that byte
    inputs: HashMap<u8, Vec<Vec<ControlId>>>,
    /// (group, name) → input control (first registration wins, lookup only)
    input_keys: HashMap<ControlKey, ControlId>,
    /// (group, name) → lamp (last registration wins)
    lamps: HashMap<ControlKey, ControlId>,
    /// Explicit output report lengths (including report id byte)
    output_lengths: BTreeMap<u8, usize>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one control
    ///
    /// Lamps go into the encode table, everything else into the decode table.
    /// Registering a lamp twice under the same `(group, name)` replaces the
    /// earlier one. Overlapping masks are accepted; see [`Self::overlapping_fields`].
    pub fn register(
        &mut self,
        report_id: u8,
        name: impl Into<String>,
        group: impl Into<String>,
        kind: ControlKind,
        offset: usize,
        mask: u8,
    ) -> Result<ControlId, RegistryError> {
        let descriptor =
            ControlDescriptor::new(report_id, name.into(), group.into(), kind, offset, mask)?;
        let id = ControlId(self.descriptors.len());
        let key = descriptor.key();

        if kind.is_output() {
            if let Some(previous) = self.lamps.insert(key.clone(), id) {
                log::debug!(
                    "Registry: lamp '{}' registered again, replacing #{}",
                    key,
                    previous.index()
                );
            }
        } else {
            let slots = self.inputs.entry(report_id).or_default();
            if slots.len() <= offset {
                slots.resize_with(offset + 1, Vec::new);
            }
            slots[offset].push(id);
            self.input_keys.entry(key).or_insert(id);
        }

        self.descriptors.push(descriptor);
        Ok(id)
    }

    /// Override the length of an output report (including the report id byte)
    ///
    /// Clamped to 1..=[`MAX_REPORT_LEN`].
    pub fn set_output_report_length(&mut self, report_id: u8, length: usize) {
        let clamped = length.clamp(1, MAX_REPORT_LEN);
        if clamped != length {
            log::warn!(
                "Registry: output report {} length {} clamped to {}",
                report_id,
                length,
                clamped
            );
        }
        self.output_lengths.insert(report_id, clamped);
    }

    pub fn descriptor(&self, id: ControlId) -> &ControlDescriptor {
        &self.descriptors[id.0]
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControlId, &ControlDescriptor)> {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (ControlId(i), d))
    }

    /// Look up the lamp registered for `(group, name)`
    pub fn lamp(&self, group: &str, name: &str) -> Option<&ControlDescriptor> {
        self.lamps
            .get(&ControlKey::new(group, name))
            .map(|id| self.descriptor(*id))
    }

    /// Look up an input control by `(group, name)`
    pub fn input(&self, group: &str, name: &str) -> Option<ControlId> {
        self.input_keys.get(&ControlKey::new(group, name)).copied()
    }

    /// Input controls of one report, indexed by byte offset
    pub fn input_slots(&self, report_id: u8) -> Option<&[Vec<ControlId>]> {
        self.inputs.get(&report_id).map(Vec::as_slice)
    }

    /// Output report lengths per report id
    ///
    /// Explicit lengths win; otherwise the report is sized to hold its
    /// highest lamp offset.
    pub fn output_report_lengths(&self) -> BTreeMap<u8, usize> {
        let mut lengths = BTreeMap::new();
        for id in self.lamps.values() {
            let d = self.descriptor(*id);
            let len = lengths.entry(d.report_id).or_insert(1usize);
            *len = (*len).max(d.offset + 1);
        }
        for (report_id, length) in &self.output_lengths {
            lengths.insert(*report_id, *length);
        }
        lengths
    }

    /// Find input fields at the same byte whose masks share bits
    ///
    /// Overlaps are not rejected at registration; callers decide whether to warn.
    pub fn overlapping_fields(&self) -> Vec<Overlap> {
        let mut overlaps = Vec::new();
        let mut report_ids: Vec<_> = self.inputs.keys().copied().collect();
        report_ids.sort_unstable();

        for report_id in report_ids {
            for (offset, ids) in self.inputs[&report_id].iter().enumerate() {
                for (i, first) in ids.iter().enumerate() {
                    for second in &ids[i + 1..] {
                        if self.descriptor(*first).mask & self.descriptor(*second).mask != 0 {
                            overlaps.push(Overlap {
                                report_id,
                                offset,
                                first: *first,
                                second: *second,
                            });
                        }
                    }
                }
            }
        }
        overlaps
    }
}
