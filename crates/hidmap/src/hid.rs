//! hidapi device backend
//!
//! Each connected device gets a dedicated I/O thread. The thread pushes raw
//! input reports into a bounded channel and writes every raw output report it
//! receives. The engine stays on the caller's thread: feed it with
//! [`crate::Engine::drain_reports`] and give it the connection's
//! [`ChannelTransport`].

use crate::transport::ChannelTransport;
use flume::{Receiver, Sender, TrySendError};
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Reports buffered in each direction before sends are dropped
const CHANNEL_CAPACITY: usize = 256;

/// Input read buffer size; HID full-speed reports fit in 64 bytes
const READ_BUF_LEN: usize = 64;

/// Read timeout per loop iteration, in milliseconds
const READ_TIMEOUT_MS: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum HidError {
    #[error("Failed to initialize hidapi: {0}")]
    Init(#[source] hidapi::HidError),

    #[error("Invalid device path {0:?}")]
    InvalidPath(String),

    #[error("Failed to open HID device at {path}: {source}")]
    Open {
        path: String,
        source: hidapi::HidError,
    },

    #[error("Failed to set non-blocking mode: {0}")]
    Configure(#[source] hidapi::HidError),

    #[error("Failed to spawn HID I/O thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A connected device with its I/O thread
pub struct HidConnection {
    io_thread: HidIoThread,
    input_rx: Receiver<Vec<u8>>,
    output_tx: Sender<Vec<u8>>,
    pub path: String,
}

impl HidConnection {
    /// Raw input reports, in arrival order
    pub fn input(&self) -> &Receiver<Vec<u8>> {
        &self.input_rx
    }

    /// Transport that queues output reports for the I/O thread
    pub fn transport(&self) -> ChannelTransport {
        ChannelTransport::new(self.output_tx.clone())
    }

    /// False once the device disconnected or failed
    pub fn is_alive(&self) -> bool {
        self.io_thread.is_alive()
    }
}

/// Open a device by path and spawn its I/O thread
pub fn connect(path: &str, name: &str) -> Result<HidConnection, HidError> {
    let api = HidApi::new().map_err(HidError::Init)?;
    let c_path = CString::new(path).map_err(|_| HidError::InvalidPath(path.to_string()))?;
    let device = api.open_path(&c_path).map_err(|source| HidError::Open {
        path: path.to_string(),
        source,
    })?;

    // The I/O thread polls with read_timeout instead
    device
        .set_blocking_mode(false)
        .map_err(HidError::Configure)?;

    let (input_tx, input_rx) = flume::bounded(CHANNEL_CAPACITY);
    let (output_tx, output_rx) = flume::bounded(CHANNEL_CAPACITY);
    let io_thread = HidIoThread::spawn(device, input_tx, output_rx, name.to_string())?;

    log::info!("HID: Connected to '{}' at {}", name, path);
    Ok(HidConnection {
        io_thread,
        input_rx,
        output_tx,
        path: path.to_string(),
    })
}

/// I/O thread handle
///
/// Signals the thread to stop and joins it when dropped.
struct HidIoThread {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    device_name: String,
    alive: Arc<AtomicBool>,
}

impl HidIoThread {
    fn spawn(
        device: HidDevice,
        input_tx: Sender<Vec<u8>>,
        output_rx: Receiver<Vec<u8>>,
        device_name: String,
    ) -> Result<Self, HidError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let handle = {
            let shutdown = shutdown.clone();
            let alive = alive.clone();
            let name = device_name.clone();
            thread::Builder::new()
                .name(format!("hid-io-{}", device_name))
                .spawn(move || {
                    Self::io_loop(&device, &input_tx, &output_rx, &shutdown, &name);
                    alive.store(false, Ordering::Relaxed);
                })
                .map_err(HidError::Spawn)?
        };

        Ok(Self {
            shutdown,
            handle: Some(handle),
            device_name,
            alive,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    fn io_loop(
        device: &HidDevice,
        input_tx: &Sender<Vec<u8>>,
        output_rx: &Receiver<Vec<u8>>,
        shutdown: &AtomicBool,
        name: &str,
    ) {
        log::info!("[HID {}] I/O thread started", name);
        let mut buf = [0u8; READ_BUF_LEN];

        'io: while !shutdown.load(Ordering::Relaxed) {
            match device.read_timeout(&mut buf, READ_TIMEOUT_MS) {
                Ok(n) if n > 0 => {
                    if !forward_input(input_tx, &buf[..n], name) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("[HID {}] Read error: {}", name, e);
                    break;
                }
            }

            while let Ok(report) = output_rx.try_recv() {
                if let Err(e) = device.write(&report) {
                    log::error!("[HID {}] Write error: {}", name, e);
                    break 'io;
                }
            }
        }

        log::info!("[HID {}] I/O thread stopped", name);
    }
}

/// Queue one input report for the engine
///
/// Returns false once the receiving side is gone.
fn forward_input(input_tx: &Sender<Vec<u8>>, report: &[u8], name: &str) -> bool {
    match input_tx.try_send(report.to_vec()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            log::warn!("[HID {}] Input channel full, dropping report", name);
            true
        }
        Err(TrySendError::Disconnected(_)) => {
            log::info!("[HID {}] Input receiver dropped, stopping", name);
            false
        }
    }
}

impl Drop for HidIoThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            log::debug!("[HID {}] Waiting for I/O thread to stop...", self.device_name);
            let _ = handle.join();
        }
    }
}
