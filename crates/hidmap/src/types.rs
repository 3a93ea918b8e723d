//! Shared control types
//!
//! Small value types used across the registry, decoder, dispatch table and
//! output encoder.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical kind of a control
///
/// Lamps are output-only and live in the encode table; every other kind is
/// input-only and lives in the decode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Momentary or latching push button (usually a single bit)
    Button,
    /// Absolute position control (fader, knob)
    Fader,
    /// Relative rotary control reporting a wrapping position
    Encoder,
    /// Indicator LED
    Lamp,
}

impl ControlKind {
    /// Whether this kind is written to the device rather than read from it
    pub fn is_output(self) -> bool {
        matches!(self, ControlKind::Lamp)
    }
}

/// Composite `(group, name)` key
///
/// Used for lamp lookup and feedback routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlKey {
    pub group: String,
    pub name: String,
}

impl ControlKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Index of a descriptor inside its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub(crate) usize);

impl ControlId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Filter applied to a decoded change before a handler runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Every genuine change
    #[default]
    All,
    /// Value became non-zero
    Press,
    /// Value became zero
    Release,
}

impl TriggerMode {
    /// Check whether a handler registered with this mode fires for `value`
    pub fn matches(self, value: u8) -> bool {
        match self {
            TriggerMode::All => true,
            TriggerMode::Press => value > 0,
            TriggerMode::Release => value == 0,
        }
    }
}
