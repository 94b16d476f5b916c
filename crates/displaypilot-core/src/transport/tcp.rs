//! TCP transport
//!
//! IP-attached displays speak the same wire protocols over a raw socket
//! (typically a terminal server or the panel's own LAN port).

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{TransportError, TransportPort};
use crate::transaction::CommandQueue;

/// A TCP link bound to a command queue.
///
/// Owns the write half; a reader thread on a cloned stream forwards inbound
/// chunks to the queue and reports EOF or socket errors as link loss.
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Connect to `addr` and start the reader.
    pub fn connect(addr: impl ToSocketAddrs, queue: CommandQueue) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let reader_stream = stream.try_clone()?;
        // Short read timeout keeps the reader responsive to shutdown.
        reader_stream.set_read_timeout(Some(Duration::from_millis(100)))?;

        let cancel = CancellationToken::new();
        let reader = {
            let cancel = cancel.clone();
            let peer = peer.clone();
            std::thread::Builder::new()
                .name(format!("tcp-rx-{}", peer))
                .spawn(move || reader_loop(reader_stream, peer, queue, cancel))
                .map_err(TransportError::Io)?
        };

        Ok(Self {
            stream,
            peer,
            cancel,
            reader: Some(reader),
        })
    }
}

fn reader_loop(mut stream: TcpStream, peer: String, queue: CommandQueue, cancel: CancellationToken) {
    let mut buf = [0u8; 512];
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match stream.read(&mut buf) {
            Ok(0) => {
                // EOF: the display closed the connection.
                debug!(peer = %peer, "tcp connection closed by remote");
                queue.set_online(false);
                break;
            }
            Ok(n) => queue.ingest(&buf[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!(peer = %peer, error = %e, "tcp read failed; marking link offline");
                queue.set_online(false);
                break;
            }
        }
    }
    debug!(peer = %peer, "tcp reader stopped");
}

impl TransportPort for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("tcp:{}", self.peer)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}
