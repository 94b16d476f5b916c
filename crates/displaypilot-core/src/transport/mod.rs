//! Transport ports
//!
//! The queue engine consumes a narrow outbound contract; the receive path is
//! a reader owned by each transport that forwards chunks and connectivity
//! edges back into the queue. Serial and TCP implementations are provided;
//! anything that can move bytes (an IR gateway, a test double) can implement
//! [`TransportPort`].

mod serial;
mod tcp;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use thiserror::Error;

/// Errors raised by transport ports
#[derive(Error, Debug)]
pub enum TransportError {
    /// The underlying serial device rejected an operation
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No port with the requested name exists
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// The link is not connected
    #[error("Not connected")]
    NotConnected,

    /// An OS-level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound half of a bidirectional byte channel.
///
/// Implementations deliver inbound bytes via [`CommandQueue::ingest`] and
/// connectivity changes via [`CommandQueue::set_online`] from their own
/// receive path.
///
/// [`CommandQueue::ingest`]: crate::transaction::CommandQueue::ingest
/// [`CommandQueue::set_online`]: crate::transaction::CommandQueue::set_online
pub trait TransportPort: Send {
    /// Hand bytes to the link for transmission.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Human-readable identification of the link, for log output.
    fn description(&self) -> String;
}
