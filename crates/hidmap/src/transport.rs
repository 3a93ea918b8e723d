//! Outgoing report transport
//!
//! The engine hands complete output reports to a [`ReportSink`]. Delivery is
//! fire-and-forget: the sink never reports back whether the device applied it.

use flume::{Sender, TrySendError};

/// Error type for report delivery
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Device disconnected")]
    Disconnected,

    #[error("Output queue full, report dropped")]
    Full,

    #[error("Device write failed: {0}")]
    Io(String),
}

/// Accepts complete output reports (report id byte first)
pub trait ReportSink {
    fn send_report(&mut self, report: &[u8]) -> Result<(), TransportError>;
}

impl<T: ReportSink + ?Sized> ReportSink for Box<T> {
    fn send_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        (**self).send_report(report)
    }
}

/// Forwards output reports over a bounded channel
///
/// Used to hand reports to a device I/O thread without blocking the engine.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new(tx: Sender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl ReportSink for ChannelTransport {
    fn send_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        match self.tx.try_send(report.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                log::warn!("Transport: output channel full, dropping report");
                Err(TransportError::Full)
            }
            Err(TrySendError::Disconnected(_)) => Err(TransportError::Disconnected),
        }
    }
}
