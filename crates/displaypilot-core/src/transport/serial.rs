//! Serial transport
//!
//! Opens a physical serial port for display communication. The write half
//! stays with the transport; a reader thread feeds received chunks into the
//! bound command queue and reports link loss. Displays are addressed by a
//! configured port name; there is no discovery layer.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{TransportError, TransportPort};
use crate::transaction::CommandQueue;

/// A physical serial link bound to a command queue.
///
/// Owns the write half; a reader thread forwards inbound chunks to the
/// queue via `ingest` and reports link loss via `set_online(false)`.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open `name` at `baud_rate`, configure the link, and start the reader.
    pub fn open(name: &str, baud_rate: u32, queue: CommandQueue) -> Result<Self, TransportError> {
        let port = Self::open_configured(name, baud_rate)?;

        let reader_port = port
            .try_clone()
            .map_err(|e| TransportError::Serial(e.to_string()))?;
        let cancel = CancellationToken::new();
        let reader = {
            let cancel = cancel.clone();
            let port_name = name.to_string();
            std::thread::Builder::new()
                .name(format!("serial-rx-{}", name.rsplit('/').next().unwrap_or(name)))
                .spawn(move || reader_loop(reader_port, port_name, queue, cancel))
                .map_err(TransportError::Io)?
        };

        Ok(Self {
            port,
            name: name.to_string(),
            cancel,
            reader: Some(reader),
        })
    }

    /// Open the named port 8N1 with a short read timeout, so the reader loop
    /// stays responsive to shutdown without busy-waiting.
    fn open_configured(
        name: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn SerialPort>, TransportError> {
        let mut port = serialport::new(name, baud_rate)
            .timeout(Duration::from_millis(100))
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(name.to_string()),
                _ => TransportError::Serial(e.to_string()),
            })?;

        // Keep DTR/RTS asserted; some RS-232 adapters and displays gate
        // their receive path on these lines.
        if let Err(e) = port.write_data_terminal_ready(true) {
            debug!(port = name, error = %e, "failed to assert DTR, continuing");
        }
        if let Err(e) = port.write_request_to_send(true) {
            debug!(port = name, error = %e, "failed to assert RTS, continuing");
        }

        // Discard anything the display transmitted while nothing listened.
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        Ok(port)
    }
}

fn reader_loop(
    mut port: Box<dyn SerialPort>,
    name: String,
    queue: CommandQueue,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; 512];
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => queue.ingest(&buf[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // Poll window elapsed with no data; check for shutdown.
            }
            Err(e) => {
                warn!(port = %name, error = %e, "serial read failed; marking link offline");
                queue.set_online(false);
                break;
            }
        }
    }
    debug!(port = %name, "serial reader stopped");
}

impl TransportPort for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(bytes)
            .map_err(|e| TransportError::Serial(e.to_string()))
    }

    fn description(&self) -> String {
        format!("serial:{}", self.name)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            // The reader wakes within its read timeout and observes the token.
            let _ = reader.join();
        }
    }
}
