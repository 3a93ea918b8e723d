//! Built-in device layouts
//!
//! Maps a device type string (as used in config files) to a compiled-in
//! layout, so common controllers work without a layout file.

pub mod hercules_rmx;

use crate::layout::DeviceLayout;

/// Known device entry
struct KnownLayout {
    device_type: &'static str,
    name: &'static str,
    layout: fn() -> DeviceLayout,
}

/// Registry of built-in layouts
static KNOWN_LAYOUTS: &[KnownLayout] = &[KnownLayout {
    device_type: hercules_rmx::DEVICE_TYPE,
    name: hercules_rmx::DEVICE_NAME,
    layout: hercules_rmx::layout,
}];

/// Built-in layout for a device type, or None if unrecognized
pub fn layout_for(device_type: &str) -> Option<DeviceLayout> {
    KNOWN_LAYOUTS
        .iter()
        .find(|d| d.device_type == device_type)
        .map(|d| (d.layout)())
}

/// Human-readable name for a device type
pub fn device_name(device_type: &str) -> Option<&'static str> {
    KNOWN_LAYOUTS
        .iter()
        .find(|d| d.device_type == device_type)
        .map(|d| d.name)
}

/// Every device type with a built-in layout
pub fn known_device_types() -> impl Iterator<Item = &'static str> {
    KNOWN_LAYOUTS.iter().map(|d| d.device_type)
}
