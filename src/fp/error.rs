//! Fingerprint protocol error types.

use std::time::Duration;

use thiserror::Error;

use super::types::AckCode;

/// Errors that can occur while talking to the fingerprint module.
#[derive(Error, Debug)]
pub enum FpError {
    /// Marker bytes, checksum or echoed opcode did not match.
    #[error("Framing error: {0}")]
    Framing(String),

    /// No complete reply within the allotted window.
    #[error("Timed out after {waited:?} waiting for reply to opcode {opcode:#04x}")]
    AcquisitionTimeout { opcode: u8, waited: Duration },

    /// Well-formed negative acknowledgment from the module.
    #[error("Device rejected command: {0}")]
    DeviceAck(AckCode),

    /// Framed body whose length or content is outside the command's limits.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Caller supplied an argument the wire format cannot carry.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error on the serial link.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open or configure the serial port.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Result type for fingerprint protocol operations.
pub type Result<T> = std::result::Result<T, FpError>;

impl FpError {
    /// Create a framing error with message
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    /// Create an integrity error with message
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create an invalid input error with message
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True for a link-level timeout and for the module's own acquisition timeout ack.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionTimeout { .. } | Self::DeviceAck(AckCode::AcquisitionTimeout)
        )
    }

    /// True when repeating the same operation may succeed (operator retry, polling loop).
    pub fn is_retryable(&self) -> bool {
        self.is_timeout() || matches!(self, Self::DeviceAck(AckCode::GenericFailure) | Self::Framing(_))
    }

    /// The module's ack code, when this is a device rejection.
    pub fn ack_code(&self) -> Option<AckCode> {
        match self {
            Self::DeviceAck(code) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_kinds() {
        let link = FpError::AcquisitionTimeout {
            opcode: 0x0C,
            waited: Duration::from_millis(100),
        };
        assert!(link.is_timeout());
        assert!(FpError::DeviceAck(AckCode::AcquisitionTimeout).is_timeout());
        assert!(!FpError::DeviceAck(AckCode::NoSuchUser).is_timeout());
    }

    #[test]
    fn test_retryable() {
        assert!(FpError::framing("bad tail").is_retryable());
        assert!(FpError::DeviceAck(AckCode::GenericFailure).is_retryable());
        assert!(!FpError::DeviceAck(AckCode::DatabaseFull).is_retryable());
        assert!(!FpError::integrity("too long").is_retryable());
    }

    #[test]
    fn test_ack_code_accessor() {
        assert_eq!(
            FpError::DeviceAck(AckCode::UserAlreadyExists).ack_code(),
            Some(AckCode::UserAlreadyExists)
        );
        assert_eq!(FpError::framing("x").ack_code(), None);
    }

    #[test]
    fn test_timeout_message_names_opcode() {
        let err = FpError::AcquisitionTimeout {
            opcode: 0x05,
            waited: Duration::from_millis(100),
        };
        assert!(err.to_string().contains("0x05"));
    }
}
