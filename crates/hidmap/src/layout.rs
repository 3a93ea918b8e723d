//! Device layout schema and loader
//!
//! A layout is the bit-field table of one device, stored as YAML:
//!
//! ```yaml
//! name: "Hercules DJ Console RMX"
//! output_reports:
//!   - report_id: 1
//!     length: 9
//! controls:
//!   - { report_id: 1, name: play, group: "[Channel1]", kind: button, offset: 2, mask: 0x04 }
//! ```

use crate::registry::{ControlRegistry, RegistryError};
use crate::types::ControlKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Error type for layout loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read layout {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse layout: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid control in layout: {0}")]
    Registry(#[from] RegistryError),
}

/// Bit-field table of one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLayout {
    /// Human-readable device name
    pub name: String,
    /// Explicit output report sizes (otherwise derived from lamp offsets)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_reports: Vec<OutputReportSpec>,
    /// Every control, in registration order
    pub controls: Vec<ControlSpec>,
}

/// Size of one output report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputReportSpec {
    pub report_id: u8,
    /// Length including the report id byte
    pub length: usize,
}

/// One control's bit field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSpec {
    pub report_id: u8,
    pub name: String,
    pub group: String,
    pub kind: ControlKind,
    /// Byte offset (1-based, byte 0 is the report id)
    pub offset: usize,
    pub mask: u8,
}

impl ControlSpec {
    pub fn new(
        report_id: u8,
        name: &str,
        group: &str,
        kind: ControlKind,
        offset: usize,
        mask: u8,
    ) -> Self {
        Self {
            report_id,
            name: name.to_string(),
            group: group.to_string(),
            kind,
            offset,
            mask,
        }
    }
}

impl DeviceLayout {
    /// Build a registry from this layout
    ///
    /// Overlapping input masks are accepted but logged.
    pub fn build_registry(&self) -> Result<ControlRegistry, ConfigError> {
        let mut registry = ControlRegistry::new();
        for spec in &self.controls {
            registry.register(
                spec.report_id,
                spec.name.as_str(),
                spec.group.as_str(),
                spec.kind,
                spec.offset,
                spec.mask,
            )?;
        }
        for report in &self.output_reports {
            registry.set_output_report_length(report.report_id, report.length);
        }

        for overlap in registry.overlapping_fields() {
            log::warn!(
                "Layout '{}': '{}' and '{}' share bits at report {} byte {}",
                self.name,
                registry.descriptor(overlap.first).key(),
                registry.descriptor(overlap.second).key(),
                overlap.report_id,
                overlap.offset
            );
        }

        Ok(registry)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Parse a layout from YAML text
pub fn parse_layout(yaml: &str) -> Result<DeviceLayout, ConfigError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Load a layout file
pub fn load_layout(path: &Path) -> Result<DeviceLayout, ConfigError> {
    log::info!("load_layout: Loading from {:?}", path);
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let layout = parse_layout(&contents)?;
    log::info!(
        "load_layout: '{}' with {} controls",
        layout.name,
        layout.controls.len()
    );
    Ok(layout)
}
