//! HID controller report codec and dispatch engine
//!
//! This crate provides:
//! - A registry of named bit fields inside raw HID reports
//! - Change-detecting input decoding with per-control handlers
//! - Read-modify-write output report encoding for lamps
//! - Host-to-device feedback subscriptions
//! - YAML device layouts and built-in layouts for known controllers
//! - An optional hidapi I/O thread (feature `hid`)
//!
//! # Architecture
//!
//! ```text
//! HID device → hid I/O thread → flume channel → Engine::drain_reports
//!     → InputDecoder → DispatchTable → handler → ControlSurface / lamps
//! host change → Engine::on_host_change → FeedbackTable → handler
//!     → OutputEncoder → ReportSink → HID device
//! ```
//!
//! The engine itself is single-threaded; the host surface and transport are
//! supplied by the caller through the [`ControlSurface`] and [`ReportSink`]
//! traits.

mod decoder;
mod dispatch;
mod encoder;
mod engine;
mod feedback;
mod handler;
mod registry;
mod surface;
mod transport;
mod types;

pub mod bindings;
pub mod devices;
pub mod layout;
pub mod memory;

#[cfg(feature = "hid")]
pub mod hid;

pub use decoder::{ControlChange, InputDecoder};
pub use dispatch::DispatchTable;
pub use encoder::{LampWriter, OutputEncoder};
pub use engine::{Engine, MAX_PUMP_ROUNDS};
pub use feedback::FeedbackTable;
pub use handler::{
    on_change, on_feedback, Context, ControlEvent, ControlHandler, FeedbackEvent,
    FeedbackHandler,
};
pub use layout::{load_layout, parse_layout, ConfigError, DeviceLayout};
pub use registry::{
    ControlDescriptor, ControlRegistry, Overlap, RegistryError, MAX_REPORT_LEN,
};
pub use surface::{ControlSurface, TimerCallback, TimerHandle};
pub use transport::{ChannelTransport, ReportSink, TransportError};
pub use types::{ControlId, ControlKey, ControlKind, TriggerMode};

/// Error type for hidmap operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Control registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Report transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Layout error: {0}")]
    Config(#[from] ConfigError),

    #[cfg(feature = "hid")]
    #[error("HID device error: {0}")]
    Hid(#[from] hid::HidError),
}

/// Load a layout file and build its registry in one step
pub fn registry_from_file(path: &std::path::Path) -> Result<ControlRegistry, Error> {
    Ok(load_layout(path)?.build_registry()?)
}
