//! # DisplayPilot Core Library
//!
//! Core transaction engine for DisplayPilot display-control drivers.
//!
//! This library provides:
//! - A serial command queue with strict one-at-a-time transaction pairing
//! - Pluggable frame-extraction buffers for vendor wire protocols
//! - Serial and TCP transport ports
//! - Driver-side state caching, verification and retry policy
//! - Representative vendor drivers (Sharp ASCII, Samsung MDC)
//!
//! ## Example
//!
//! ```rust,ignore
//! use displaypilot_core::prelude::*;
//!
//! let (queue, events) = CommandQueue::spawn(QueueConfig::default());
//! queue.set_buffer(Box::new(DelimiterBuffer::new(&[b'\r'], false)));
//! queue.bind_port(Some(Box::new(SerialTransport::open(
//!     "/dev/ttyUSB0",
//!     9600,
//!     queue.clone(),
//! )?)));
//!
//! let mut driver = SharpDriver::new(queue, VendorProfile::sharp());
//! driver.power_on();
//! ```

#![warn(missing_docs)]

pub mod demo;
pub mod device;
pub mod drivers;
pub mod framing;
pub mod transaction;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::DemoDisplay;
    pub use crate::device::{
        DisplayState, InputSource, PowerState, ScalingMode, StateChange, StateNotifier,
    };
    pub use crate::drivers::{SamsungDriver, SharpDriver, VendorProfile};
    pub use crate::framing::{
        BoundedBuffer, DelimiterBuffer, Frame, HeaderFrameBuffer, SentinelBuffer, SerialBuffer,
    };
    pub use crate::transaction::{
        CommandQueue, QueueConfig, QueueEvent, QueueEvents, SerialCommand,
    };
    pub use crate::transport::{SerialTransport, TcpTransport, TransportPort};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
