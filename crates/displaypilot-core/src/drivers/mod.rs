//! Vendor display drivers
//!
//! Each driver translates the generic display abstraction into one vendor's
//! wire protocol, consuming only the public queue, framing and transport
//! contracts. `sharp` covers the ASCII/delimiter protocol family, `samsung`
//! the binary header/checksum family.

mod profile;
pub mod samsung;
pub mod sharp;

pub use profile::{ErrorClass, ErrorRule, InputCode, VendorProfile};
pub use samsung::{SamsungCommand, SamsungDriver, SamsungReply};
pub use sharp::{SharpCommand, SharpDriver};

use thiserror::Error;

/// Errors raised while building or decoding vendor protocol data
#[derive(Error, Debug)]
pub enum DriverError {
    /// A frame the vendor grammar cannot decode
    #[error("Malformed frame: {0:02x?}")]
    MalformedFrame(Vec<u8>),

    /// A vendor profile failed to load
    #[error("Invalid profile: {0}")]
    Profile(String),
}

/// Priority for routine state polling; keeps polls behind user actions.
pub const POLL_PRIORITY: i32 = 10;

/// Priority for retries of failed commands; ahead of routine traffic.
pub const RETRY_PRIORITY: i32 = -5;

/// Priority for post-write verification queries; most urgent.
pub const VERIFY_PRIORITY: i32 = -10;
