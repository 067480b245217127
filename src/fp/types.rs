//! Fingerprint protocol value types and constants.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Head and tail marker of every frame and payload packet.
pub const MARKER: u8 = 0xF5;

/// Size of every command and response header frame.
pub const FRAME_SIZE: usize = 8;

/// Bytes a body packet carries beyond its declared length (start + checksum + tail).
pub const BODY_OVERHEAD: usize = 3;

/// Highest user id the module accepts (12-bit id space).
pub const MAX_USER_ID: u16 = 4095;

/// Maximum size of one extracted eigenvalue (template).
pub const EIGENVALUE_MAX: usize = 193;

/// Maximum size of one raw fingerprint image.
pub const IMAGE_MAX: usize = 9176;

/// Single status byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckCode {
    Success,
    GenericFailure,
    DatabaseFull,
    NoSuchUser,
    UserAlreadyExists,
    FingerprintAlreadyExists,
    AcquisitionTimeout,
    /// Any value outside the documented set.
    Other(u8),
}

impl AckCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Success,
            0x01 => Self::GenericFailure,
            0x04 => Self::DatabaseFull,
            0x05 => Self::NoSuchUser,
            0x06 => Self::UserAlreadyExists,
            0x07 => Self::FingerprintAlreadyExists,
            0x08 => Self::AcquisitionTimeout,
            other => Self::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::GenericFailure => 0x01,
            Self::DatabaseFull => 0x04,
            Self::NoSuchUser => 0x05,
            Self::UserAlreadyExists => 0x06,
            Self::FingerprintAlreadyExists => 0x07,
            Self::AcquisitionTimeout => 0x08,
            Self::Other(byte) => byte,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::GenericFailure => write!(f, "operation failed"),
            Self::DatabaseFull => write!(f, "fingerprint database is full"),
            Self::NoSuchUser => write!(f, "no such user"),
            Self::UserAlreadyExists => write!(f, "user already exists"),
            Self::FingerprintAlreadyExists => write!(f, "fingerprint already exists"),
            Self::AcquisitionTimeout => write!(f, "acquisition timeout"),
            Self::Other(byte) => write!(f, "unknown ack code {byte:#04x}"),
        }
    }
}

/// Ranked access level stored with each enrolled fingerprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    #[default]
    Low = 1,
    Mid = 2,
    High = 3,
}

impl Privilege {
    /// Tier carried in a status or payload byte; `None` outside 1..=3.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Low),
            2 => Some(Self::Mid),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Mid => write!(f, "mid"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for Privilege {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "low" | "guest" => Ok(Self::Low),
            "2" | "mid" | "normal" => Ok(Self::Mid),
            "3" | "high" | "master" => Ok(Self::High),
            other => Err(format!("unknown privilege '{other}' (expected low, mid or high)")),
        }
    }
}

/// 16-bit user identifier as carried in the two parameter bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(u16);

impl UserId {
    pub fn from_number(value: u16) -> Self {
        Self(value)
    }

    pub fn from_bytes(high: u8, low: u8) -> Self {
        Self(u16::from_be_bytes([high, low]))
    }

    /// Encode a short text tag into two bytes.
    ///
    /// A single digit becomes its numeric value in the low byte, any other
    /// single character its byte value. Longer tags keep their first two bytes.
    /// An empty tag yields a random id below [`MAX_USER_ID`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.as_bytes() {
            [] => Self::random(),
            [only] if only.is_ascii_digit() => Self::from_bytes(0, only - b'0'),
            [only] => Self::from_bytes(0, *only),
            [high, low, ..] => Self::from_bytes(*high, *low),
        }
    }

    /// Pseudo-random id in `1..MAX_USER_ID`.
    pub fn random() -> Self {
        let mut hasher = RandomState::new().build_hasher();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or_default();
        hasher.write_u32(nanos);
        let span = u64::from(MAX_USER_ID - 1);
        Self(1 + (hasher.finish() % span) as u16)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Decode the two bytes back into a two-character tag, if both are printable.
    ///
    /// Numeric ids never qualify: their high byte is at most `0x0F`.
    pub fn as_tag(self) -> Option<String> {
        let [high, low] = self.to_bytes();
        (high.is_ascii_graphic() && low.is_ascii_graphic())
            .then(|| format!("{}{}", char::from(high), char::from(low)))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = String;

    /// Numbers up to [`MAX_USER_ID`] are taken as-is, anything else as a text tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.parse::<u16>() {
            Ok(n) if n <= MAX_USER_ID => Ok(Self(n)),
            Ok(n) => Err(format!("user id {n} exceeds maximum {MAX_USER_ID}")),
            Err(_) => Ok(Self::from_tag(s)),
        }
    }
}

/// An enrolled user as reported by the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    /// `None` when the module acknowledged without reporting a tier.
    pub privilege: Option<Privilege>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Vec<u8>>,
}

impl User {
    pub fn new(id: UserId, privilege: Option<Privilege>) -> Self {
        Self {
            id,
            privilege,
            template: None,
        }
    }
}
