//! Command catalog: opcode, parameter placement, reply shape and timing per operation.

use tracing::warn;

use super::codec::{Frame, encode_packet};
use super::error::{FpError, Result};
use super::types::{EIGENVALUE_MAX, IMAGE_MAX, MAX_USER_ID, Privilege, UserId};

// Command codes
pub const CMD_ADD_1: u8 = 0x01;
pub const CMD_ADD_2: u8 = 0x02;
pub const CMD_ADD_3: u8 = 0x03;
pub const CMD_DEL: u8 = 0x04;
pub const CMD_DEL_ALL: u8 = 0x05;
pub const CMD_USER_CNT: u8 = 0x09;
pub const CMD_USER_PRI: u8 = 0x0A;
pub const CMD_COMP_ONE: u8 = 0x0B;
pub const CMD_COMP_MANY: u8 = 0x0C;
pub const CMD_UP_EXT: u8 = 0x23;
pub const CMD_ACQ_UP: u8 = 0x24;
pub const CMD_ACQ_VER: u8 = 0x26;
pub const CMD_COMP_LEV: u8 = 0x28;
pub const CMD_ALL_USR: u8 = 0x2B;
pub const CMD_LP_MODE: u8 = 0x2C;
pub const CMD_ADD_MODE: u8 = 0x2D;
pub const CMD_TIMEOUT: u8 = 0x2E;
pub const CMD_UP_EGV: u8 = 0x31;
pub const CMD_DOWN_SAVE: u8 = 0x41;
pub const CMD_DOWN_COMP: u8 = 0x42;
pub const CMD_DOWN_COMP_N: u8 = 0x43;
pub const CMD_DOWN_ACQ: u8 = 0x44;

/// Mode byte selecting "set" on configuration commands.
const MODE_SET: u8 = 0;
/// Mode byte selecting "query" on configuration commands.
const MODE_QUERY: u8 = 1;

pub const COMPARISON_LEVEL_MAX: u8 = 9;
pub const COMPARISON_LEVEL_DEFAULT: u8 = 5;

/// Id/privilege prefix carried ahead of template bytes in payload packets and bodies.
pub const TEMPLATE_PREFIX: usize = 3;

/// Largest template body: prefix plus one eigenvalue.
pub const EIGENVALUE_MAX_BODY: usize = TEMPLATE_PREFIX + EIGENVALUE_MAX;

/// Longest module version string accepted.
pub const VERSION_MAX: usize = 64;

/// One of the three enrollment captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    First,
    Second,
    Third,
}

impl CaptureStep {
    pub fn opcode(self) -> u8 {
        match self {
            Self::First => CMD_ADD_1,
            Self::Second => CMD_ADD_2,
            Self::Third => CMD_ADD_3,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::First => Some(Self::Second),
            Self::Second => Some(Self::Third),
            Self::Third => None,
        }
    }
}

/// Duplicate-finger policy used while enrolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// The same finger may be enrolled under several users.
    AllowRepeat,
    /// Enrolling an already known print is rejected.
    RejectRepeat,
}

impl AddMode {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::AllowRepeat => 0,
            Self::RejectRepeat => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::AllowRepeat),
            1 => Some(Self::RejectRepeat),
            _ => None,
        }
    }
}

/// How long the module may take before the header arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Configuration and status queries.
    Fast,
    /// Database-wide work that does not wait for a finger.
    Slow,
    /// Waits for a finger on the sensor; bounded by the acquisition timeout.
    Capture,
}

/// Expected reply after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Header only.
    Fixed,
    /// Header whose value is the body length, followed by a body of at most `max_len` data bytes.
    Body { max_len: usize },
}

/// How the status byte of a reply is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFamily {
    /// Status is always an ack code.
    Common,
    /// Values 1..=3 are a privilege tier, everything else an ack code.
    Privileged,
}

/// A logical operation on the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enroll {
        step: CaptureStep,
        id: UserId,
        privilege: Privilege,
    },
    Delete {
        id: UserId,
    },
    DeleteAll,
    UserCount,
    GetPrivilege {
        id: UserId,
    },
    CompareOne {
        id: UserId,
    },
    Identify,
    GetComparisonLevel,
    SetComparisonLevel(u8),
    GetAcquisitionTimeout,
    SetAcquisitionTimeout(u8),
    GetAddMode,
    SetAddMode(AddMode),
    Dormant,
    Version,
    ExtractEigenvalue,
    AcquireImage,
    UploadTemplate {
        id: UserId,
    },
    DownloadSave {
        id: UserId,
        privilege: Privilege,
        template: Vec<u8>,
    },
    DownloadCompareOne {
        id: UserId,
        template: Vec<u8>,
    },
    DownloadCompareMany {
        template: Vec<u8>,
    },
    DownloadCompareImmediate {
        template: Vec<u8>,
    },
    ListUsers,
}

impl Command {
    /// Set comparison strictness; values above 9 fall back to the default level.
    pub fn set_comparison_level(level: u8) -> Self {
        if level > COMPARISON_LEVEL_MAX {
            warn!("Comparison level {level} out of range 0..={COMPARISON_LEVEL_MAX}, using {COMPARISON_LEVEL_DEFAULT}");
            return Self::SetComparisonLevel(COMPARISON_LEVEL_DEFAULT);
        }
        Self::SetComparisonLevel(level)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Enroll { step, .. } => step.opcode(),
            Self::Delete { .. } => CMD_DEL,
            Self::DeleteAll => CMD_DEL_ALL,
            Self::UserCount => CMD_USER_CNT,
            Self::GetPrivilege { .. } => CMD_USER_PRI,
            Self::CompareOne { .. } => CMD_COMP_ONE,
            Self::Identify => CMD_COMP_MANY,
            Self::GetComparisonLevel | Self::SetComparisonLevel(_) => CMD_COMP_LEV,
            Self::GetAcquisitionTimeout | Self::SetAcquisitionTimeout(_) => CMD_TIMEOUT,
            Self::GetAddMode | Self::SetAddMode(_) => CMD_ADD_MODE,
            Self::Dormant => CMD_LP_MODE,
            Self::Version => CMD_ACQ_VER,
            Self::ExtractEigenvalue => CMD_UP_EXT,
            Self::AcquireImage => CMD_ACQ_UP,
            Self::UploadTemplate { .. } => CMD_UP_EGV,
            Self::DownloadSave { .. } => CMD_DOWN_SAVE,
            Self::DownloadCompareOne { .. } => CMD_DOWN_COMP,
            Self::DownloadCompareMany { .. } => CMD_DOWN_COMP_N,
            Self::DownloadCompareImmediate { .. } => CMD_DOWN_ACQ,
            Self::ListUsers => CMD_ALL_USR,
        }
    }

    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enroll { .. } => "enroll",
            Self::Delete { .. } => "delete",
            Self::DeleteAll => "delete-all",
            Self::UserCount => "user-count",
            Self::GetPrivilege { .. } => "get-privilege",
            Self::CompareOne { .. } => "compare-one",
            Self::Identify => "identify",
            Self::GetComparisonLevel => "get-comparison-level",
            Self::SetComparisonLevel(_) => "set-comparison-level",
            Self::GetAcquisitionTimeout => "get-acquisition-timeout",
            Self::SetAcquisitionTimeout(_) => "set-acquisition-timeout",
            Self::GetAddMode => "get-add-mode",
            Self::SetAddMode(_) => "set-add-mode",
            Self::Dormant => "dormant",
            Self::Version => "version",
            Self::ExtractEigenvalue => "extract-eigenvalue",
            Self::AcquireImage => "acquire-image",
            Self::UploadTemplate { .. } => "upload-template",
            Self::DownloadSave { .. } => "download-save",
            Self::DownloadCompareOne { .. } => "download-compare-one",
            Self::DownloadCompareMany { .. } => "download-compare-many",
            Self::DownloadCompareImmediate { .. } => "download-compare-immediate",
            Self::ListUsers => "list-users",
        }
    }

    /// Header frame for this command.
    pub fn frame(&self) -> Frame {
        let frame = Frame::new(self.opcode());
        let with_id = |id: &UserId| {
            let [high, low] = id.to_bytes();
            frame.params(high, low)
        };

        match self {
            Self::Enroll { id, privilege, .. } => with_id(id).mode(privilege.to_byte()),
            Self::Delete { id }
            | Self::GetPrivilege { id }
            | Self::CompareOne { id }
            | Self::UploadTemplate { id } => with_id(id),
            Self::GetComparisonLevel | Self::GetAcquisitionTimeout | Self::GetAddMode => frame.mode(MODE_QUERY),
            Self::SetComparisonLevel(value) | Self::SetAcquisitionTimeout(value) => {
                frame.params(0, *value).mode(MODE_SET)
            }
            Self::SetAddMode(mode) => frame.params(0, mode.to_byte()).mode(MODE_SET),
            Self::DownloadSave { template, .. }
            | Self::DownloadCompareOne { template, .. }
            | Self::DownloadCompareMany { template }
            | Self::DownloadCompareImmediate { template } => frame.value(template.len() as u16),
            Self::DeleteAll
            | Self::UserCount
            | Self::Identify
            | Self::Dormant
            | Self::Version
            | Self::ExtractEigenvalue
            | Self::AcquireImage
            | Self::ListUsers => frame,
        }
    }

    /// Data carried in the extended payload packet: id/privilege prefix followed by the template.
    pub fn payload(&self) -> Option<Vec<u8>> {
        let (prefix, template) = match self {
            Self::DownloadSave {
                id,
                privilege,
                template,
            } => {
                let [high, low] = id.to_bytes();
                ([high, low, privilege.to_byte()], template)
            }
            Self::DownloadCompareOne { id, template } => {
                let [high, low] = id.to_bytes();
                ([high, low, 0], template)
            }
            Self::DownloadCompareMany { template } | Self::DownloadCompareImmediate { template } => {
                ([0, 0, 0], template)
            }
            _ => return None,
        };

        let mut data = Vec::with_capacity(TEMPLATE_PREFIX + template.len());
        data.extend_from_slice(&prefix);
        data.extend_from_slice(template);
        Some(data)
    }

    /// Reject arguments the wire format cannot carry.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SetComparisonLevel(level) if *level > COMPARISON_LEVEL_MAX => Err(FpError::invalid_input(
                format!("Comparison level {level} out of range 0..={COMPARISON_LEVEL_MAX}"),
            )),
            Self::DownloadSave { template, .. }
            | Self::DownloadCompareOne { template, .. }
            | Self::DownloadCompareMany { template }
            | Self::DownloadCompareImmediate { template } => {
                if template.is_empty() {
                    return Err(FpError::invalid_input("Template is empty"));
                }
                if template.len() > EIGENVALUE_MAX {
                    return Err(FpError::invalid_input(format!(
                        "Template is {} bytes, maximum is {EIGENVALUE_MAX}",
                        template.len()
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Complete bytes to transmit: header frame plus payload packet when present.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut bytes = self.frame().encode().to_vec();
        if let Some(data) = self.payload() {
            bytes.extend_from_slice(&encode_packet(&data));
        }
        Ok(bytes)
    }

    pub fn response_shape(&self) -> ResponseShape {
        match self {
            Self::Version => ResponseShape::Body { max_len: VERSION_MAX },
            Self::ExtractEigenvalue | Self::UploadTemplate { .. } => ResponseShape::Body {
                max_len: EIGENVALUE_MAX_BODY,
            },
            Self::AcquireImage => ResponseShape::Body { max_len: IMAGE_MAX },
            Self::ListUsers => ResponseShape::Body {
                max_len: 2 + 3 * MAX_USER_ID as usize,
            },
            _ => ResponseShape::Fixed,
        }
    }

    pub fn timeout_class(&self) -> TimeoutClass {
        match self {
            Self::Enroll { .. }
            | Self::CompareOne { .. }
            | Self::Identify
            | Self::ExtractEigenvalue
            | Self::AcquireImage
            | Self::DownloadCompareImmediate { .. } => TimeoutClass::Capture,
            Self::DeleteAll
            | Self::DownloadSave { .. }
            | Self::DownloadCompareOne { .. }
            | Self::DownloadCompareMany { .. } => TimeoutClass::Slow,
            _ => TimeoutClass::Fast,
        }
    }

    pub fn status_family(&self) -> StatusFamily {
        match self {
            Self::GetPrivilege { .. } | Self::CompareOne { .. } | Self::Identify | Self::DownloadCompareMany { .. } => {
                StatusFamily::Privileged
            }
            _ => StatusFamily::Common,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(cmd: Command) -> Vec<u8> {
        cmd.encode().unwrap()
    }

    #[test]
    fn test_delete_all_bytes() {
        assert_eq!(
            bytes(Command::DeleteAll),
            vec![0xF5, 0x05, 0x00, 0x00, 0x00, 0x00, 0x05, 0xF5]
        );
    }

    #[test]
    fn test_set_comparison_level() {
        let encoded = bytes(Command::set_comparison_level(7));
        assert_eq!(&encoded[..6], &[0xF5, 0x28, 0x00, 0x07, 0x00, 0x00]);
        assert_eq!(encoded[6], 0x28 ^ 0x07);
        assert_eq!(encoded[7], 0xF5);
    }

    #[test]
    fn test_comparison_level_out_of_range_clamps_to_default() {
        assert_eq!(
            Command::set_comparison_level(15),
            Command::SetComparisonLevel(COMPARISON_LEVEL_DEFAULT)
        );
        assert_eq!(bytes(Command::set_comparison_level(15))[3], 5);
        assert!(Command::SetComparisonLevel(15).encode().is_err());
    }

    #[test]
    fn test_query_commands_use_query_mode() {
        for cmd in [
            Command::GetComparisonLevel,
            Command::GetAcquisitionTimeout,
            Command::GetAddMode,
        ] {
            assert_eq!(cmd.frame().mode, 1, "{}", cmd.name());
        }
        assert_eq!(Command::SetAcquisitionTimeout(0).frame().mode, 0);
    }

    #[test]
    fn test_enroll_places_id_and_privilege() {
        let cmd = Command::Enroll {
            step: CaptureStep::Second,
            id: UserId::from_number(0x0123),
            privilege: Privilege::High,
        };
        let encoded = bytes(cmd);
        assert_eq!(&encoded[..5], &[0xF5, 0x02, 0x01, 0x23, 0x03]);
        assert_eq!(encoded[6], 0x02 ^ 0x01 ^ 0x23 ^ 0x03);
    }

    #[test]
    fn test_add_mode_frames() {
        let reject = Command::SetAddMode(AddMode::RejectRepeat).frame().encode();
        assert_eq!(&reject[..5], &[0xF5, 0x2D, 0x00, 0x01, 0x00]);
        let allow = Command::SetAddMode(AddMode::AllowRepeat).frame().encode();
        assert_eq!(&allow[..5], &[0xF5, 0x2D, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_download_save_layout() {
        let template = vec![0xAA; 193];
        let encoded = bytes(Command::DownloadSave {
            id: UserId::from_number(0x0007),
            privilege: Privilege::Mid,
            template: template.clone(),
        });

        // header length counts the template only
        assert_eq!(&encoded[..4], &[0xF5, 0x41, 0x00, 193]);
        let packet = &encoded[8..];
        assert_eq!(packet.len(), 196 + 3);
        assert_eq!(&packet[..4], &[0xF5, 0x00, 0x07, 0x02]);
        assert_eq!(&packet[4..197], template.as_slice());
        assert_eq!(*packet.last().unwrap(), 0xF5);
    }

    #[test]
    fn test_template_limits() {
        assert!(
            Command::DownloadCompareMany {
                template: vec![0; 194]
            }
            .encode()
            .is_err()
        );
        assert!(Command::DownloadCompareImmediate { template: vec![] }.encode().is_err());
    }

    #[test]
    fn test_tag_id_fills_parameter_bytes() {
        let cmd = Command::Delete {
            id: UserId::from_tag("AB"),
        };
        assert_eq!(bytes(cmd), vec![0xF5, 0x04, 0x41, 0x42, 0x00, 0x00, 0x04 ^ 0x41 ^ 0x42, 0xF5]);
    }

    #[test]
    fn test_download_header_counts_template_only() {
        let frame = Command::DownloadCompareImmediate {
            template: vec![0x11; 193],
        }
        .frame();
        assert_eq!((frame.param_high, frame.param_low), (0x00, 0xC1));
    }

    #[test]
    fn test_status_families() {
        assert_eq!(Command::Identify.status_family(), StatusFamily::Privileged);
        assert_eq!(
            Command::CompareOne { id: UserId::from_number(1) }.status_family(),
            StatusFamily::Privileged
        );
        assert_eq!(Command::DeleteAll.status_family(), StatusFamily::Common);
        assert_eq!(Command::UserCount.status_family(), StatusFamily::Common);
    }

    #[test]
    fn test_timeout_classes() {
        assert_eq!(Command::UserCount.timeout_class(), TimeoutClass::Fast);
        assert_eq!(Command::DeleteAll.timeout_class(), TimeoutClass::Slow);
        assert_eq!(Command::Identify.timeout_class(), TimeoutClass::Capture);
    }

    #[test]
    fn test_capture_steps_advance() {
        assert_eq!(CaptureStep::First.next(), Some(CaptureStep::Second));
        assert_eq!(CaptureStep::Third.next(), None);
        assert_eq!(CaptureStep::Third.opcode(), CMD_ADD_3);
    }
}
