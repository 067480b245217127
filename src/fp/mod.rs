//! UART fingerprint module protocol engine.
//!
//! Talks to the sensor with 8-byte `0xF5`-framed commands and replies,
//! plus length-prefixed body packets for templates, images and listings.
//!
//! # Example
//!
//! ```ignore
//! use uart_fingerprint::fp::{FingerprintReader, Privilege, Timeouts, UserId};
//! use std::time::Duration;
//!
//! let reader = FingerprintReader::open("/dev/ttyUSB0", 19200, Duration::from_millis(20), Timeouts::default())?;
//! reader.enroll(UserId::from_number(12), Privilege::Mid)?;
//! let user = reader.identify()?;
//! ```

pub mod codec;
pub mod commands;
pub mod enroll;
mod error;
mod reader;
pub mod response;
pub mod session;
mod types;

#[cfg(test)]
mod mock;

pub use commands::{AddMode, CaptureStep, Command};
pub use enroll::{EnrollState, Enrollment};
pub use error::{FpError, Result};
pub use reader::FingerprintReader;
pub use response::Reply;
pub use session::{DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL, Link, Session, Timeouts};
pub use types::{
    AckCode, EIGENVALUE_MAX, IMAGE_MAX, MAX_USER_ID, Privilege, User, UserId,
};
