//! Response interpretation: validated header (and body) to typed outcome.

use super::codec::Header;
use super::commands::{AddMode, Command, EIGENVALUE_MAX_BODY, StatusFamily, TEMPLATE_PREFIX};
use super::error::{FpError, Result};
use super::types::{AckCode, IMAGE_MAX, Privilege, User, UserId};

/// Status byte resolved in the context of the command that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ack(AckCode),
    Tier(Privilege),
}

impl Status {
    pub fn resolve(family: StatusFamily, byte: u8) -> Self {
        match family {
            StatusFamily::Privileged => match Privilege::from_byte(byte) {
                Some(tier) => Self::Tier(tier),
                None => Self::Ack(AckCode::from_byte(byte)),
            },
            StatusFamily::Common => Self::Ack(AckCode::from_byte(byte)),
        }
    }

    /// Whether the module accepted the command.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Tier(_) | Self::Ack(AckCode::Success))
    }
}

/// Typed successful reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    Count(u16),
    Value(u8),
    Mode(AddMode),
    User(User),
    Users(Vec<User>),
    Bytes(Vec<u8>),
    Text(String),
}

/// Interpret a header whose framing and echoed opcode were already checked.
///
/// `body` is the validated body data for commands that carry one.
pub fn interpret(command: &Command, header: &Header, body: Option<&[u8]>) -> Result<Reply> {
    match Status::resolve(command.status_family(), header.status) {
        Status::Tier(tier) => Ok(Reply::User(matched_user(command, header, Some(tier)))),
        Status::Ack(AckCode::Success) => interpret_success(command, header, body),
        Status::Ack(code) => Err(FpError::DeviceAck(code)),
    }
}

fn matched_user(command: &Command, header: &Header, privilege: Option<Privilege>) -> User {
    let id = match command {
        Command::GetPrivilege { id } | Command::CompareOne { id } => *id,
        _ => UserId::from_bytes(header.field_a, header.field_b),
    };
    User::new(id, privilege)
}

fn interpret_success(command: &Command, header: &Header, body: Option<&[u8]>) -> Result<Reply> {
    let reply = match command {
        Command::GetPrivilege { .. }
        | Command::CompareOne { .. }
        | Command::Identify
        | Command::DownloadCompareMany { .. } => Reply::User(matched_user(command, header, None)),
        Command::UserCount => Reply::Count(header.value()),
        Command::GetComparisonLevel | Command::GetAcquisitionTimeout => Reply::Value(header.field_b),
        Command::GetAddMode => {
            let mode = AddMode::from_byte(header.field_b)
                .ok_or_else(|| FpError::integrity(format!("Unknown add mode {:#04x}", header.field_b)))?;
            Reply::Mode(mode)
        }
        Command::Version => {
            let text = String::from_utf8_lossy(require_body(command, body)?);
            Reply::Text(text.trim_matches(char::from(0)).trim().to_string())
        }
        Command::ExtractEigenvalue => {
            let data = require_body(command, body)?;
            Reply::Bytes(split_template(data)?.1.to_vec())
        }
        Command::AcquireImage => {
            let data = require_body(command, body)?;
            if data.len() > IMAGE_MAX {
                return Err(FpError::integrity(format!(
                    "Image is {} bytes, maximum is {IMAGE_MAX}",
                    data.len()
                )));
            }
            Reply::Bytes(data.to_vec())
        }
        Command::UploadTemplate { .. } => {
            let data = require_body(command, body)?;
            let (prefix, template) = split_template(data)?;
            let mut user = User::new(
                UserId::from_bytes(prefix[0], prefix[1]),
                Privilege::from_byte(prefix[2]),
            );
            user.template = Some(template.to_vec());
            Reply::User(user)
        }
        Command::ListUsers => Reply::Users(parse_user_list(require_body(command, body)?)?),
        Command::Enroll { .. }
        | Command::Delete { .. }
        | Command::DeleteAll
        | Command::SetComparisonLevel(_)
        | Command::SetAcquisitionTimeout(_)
        | Command::SetAddMode(_)
        | Command::Dormant
        | Command::DownloadSave { .. }
        | Command::DownloadCompareOne { .. }
        | Command::DownloadCompareImmediate { .. } => Reply::Done,
    };
    Ok(reply)
}

fn require_body<'a>(command: &Command, body: Option<&'a [u8]>) -> Result<&'a [u8]> {
    body.ok_or_else(|| FpError::framing(format!("Missing body for {}", command.name())))
}

/// Split body data into its 3-byte id/privilege prefix and template bytes.
fn split_template(data: &[u8]) -> Result<(&[u8], &[u8])> {
    if data.len() < TEMPLATE_PREFIX || data.len() > EIGENVALUE_MAX_BODY {
        return Err(FpError::integrity(format!(
            "Template body is {} bytes, expected {TEMPLATE_PREFIX}..={EIGENVALUE_MAX_BODY}",
            data.len()
        )));
    }
    Ok(data.split_at(TEMPLATE_PREFIX))
}

/// Parse the all-users body: big-endian count, then `id_high, id_low, privilege` per user.
pub fn parse_user_list(data: &[u8]) -> Result<Vec<User>> {
    if data.len() < 2 {
        return Err(FpError::integrity("User list body shorter than its count field"));
    }
    let count = u16::from_be_bytes([data[0], data[1]]) as usize;
    let entries = &data[2..];
    if entries.len() != count * 3 {
        return Err(FpError::integrity(format!(
            "User list declares {count} users but carries {} bytes",
            entries.len()
        )));
    }

    Ok(entries
        .chunks_exact(3)
        .map(|entry| User::new(UserId::from_bytes(entry[0], entry[1]), Privilege::from_byte(entry[2])))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::codec::{decode_header, encode};
    use crate::fp::commands::{CMD_ALL_USR, CMD_COMP_MANY, CMD_DEL_ALL};

    fn header(opcode: u8, a: u8, b: u8, status: u8) -> Header {
        decode_header(&encode(opcode, a, b, status, 0)).unwrap()
    }

    #[test]
    fn test_identify_tier_is_not_failure() {
        let reply = interpret(&Command::Identify, &header(CMD_COMP_MANY, 0x00, 0x2A, 2), None).unwrap();
        assert_eq!(
            reply,
            Reply::User(User::new(UserId::from_number(0x2A), Some(Privilege::Mid)))
        );
    }

    #[test]
    fn test_identify_low_tier_overloads_generic_failure() {
        let reply = interpret(&Command::Identify, &header(CMD_COMP_MANY, 0, 5, 1), None).unwrap();
        assert!(matches!(reply, Reply::User(User { privilege: Some(Privilege::Low), .. })));
    }

    #[test]
    fn test_identify_no_user() {
        let err = interpret(&Command::Identify, &header(CMD_COMP_MANY, 0, 0, 0x05), None).unwrap_err();
        assert_eq!(err.ack_code(), Some(AckCode::NoSuchUser));
    }

    #[test]
    fn test_delete_all_success_and_failure() {
        let ok = interpret(&Command::DeleteAll, &header(CMD_DEL_ALL, 0, 0, 0), None).unwrap();
        assert_eq!(ok, Reply::Done);

        let err = interpret(&Command::DeleteAll, &header(CMD_DEL_ALL, 0, 0, 1), None).unwrap_err();
        assert_eq!(err.ack_code(), Some(AckCode::GenericFailure));

        // value 2 carries no tier meaning here
        let err = interpret(&Command::DeleteAll, &header(CMD_DEL_ALL, 0, 0, 2), None).unwrap_err();
        assert_eq!(err.ack_code(), Some(AckCode::Other(2)));
    }

    #[test]
    fn test_get_privilege_uses_requested_id() {
        let id = UserId::from_number(300);
        let reply = interpret(&Command::GetPrivilege { id }, &header(0x0A, 0, 0, 3), None).unwrap();
        assert_eq!(reply, Reply::User(User::new(id, Some(Privilege::High))));
    }

    #[test]
    fn test_compare_one_success_without_tier() {
        let id = UserId::from_number(9);
        let reply = interpret(&Command::CompareOne { id }, &header(0x0B, 0, 0, 0), None).unwrap();
        assert_eq!(reply, Reply::User(User::new(id, None)));
    }

    #[test]
    fn test_user_count() {
        let reply = interpret(&Command::UserCount, &header(0x09, 0x01, 0x02, 0), None).unwrap();
        assert_eq!(reply, Reply::Count(0x0102));
    }

    #[test]
    fn test_user_already_exists_surfaces_ack() {
        let cmd = Command::Delete {
            id: UserId::from_number(1),
        };
        let err = interpret(&cmd, &header(0x04, 0, 1, 0x06), None).unwrap_err();
        assert!(matches!(err, FpError::DeviceAck(AckCode::UserAlreadyExists)));
    }

    #[test]
    fn test_eigenvalue_body() {
        let mut body = vec![0, 0, 0];
        body.extend_from_slice(&[0x11; 193]);
        let reply = interpret(&Command::ExtractEigenvalue, &header(0x23, 0, 196, 0), Some(&body)).unwrap();
        assert_eq!(reply, Reply::Bytes(vec![0x11; 193]));
    }

    #[test]
    fn test_oversized_eigenvalue_is_integrity_error() {
        let body = vec![0u8; 3 + 194];
        let err = interpret(&Command::ExtractEigenvalue, &header(0x23, 0, 197, 0), Some(&body)).unwrap_err();
        assert!(matches!(err, FpError::Integrity(_)));
    }

    #[test]
    fn test_upload_template_body() {
        let mut body = vec![0x00, 0x0C, 0x02];
        body.extend_from_slice(&[0x42; 10]);
        let cmd = Command::UploadTemplate {
            id: UserId::from_number(12),
        };
        let Reply::User(user) = interpret(&cmd, &header(0x31, 0, 13, 0), Some(&body)).unwrap() else {
            panic!("expected user");
        };
        assert_eq!(user.id, UserId::from_number(12));
        assert_eq!(user.privilege, Some(Privilege::Mid));
        assert_eq!(user.template, Some(vec![0x42; 10]));
    }

    #[test]
    fn test_user_list() {
        let body = [0x00, 0x02, 0x00, 0x01, 0x03, b'4', b'2', 0x01];
        let reply = interpret(&Command::ListUsers, &header(CMD_ALL_USR, 0, 8, 0), Some(&body)).unwrap();
        let Reply::Users(users) = reply else {
            panic!("expected users");
        };
        assert_eq!(users.len(), 2);
        assert_eq!(users[0], User::new(UserId::from_number(1), Some(Privilege::High)));
        assert_eq!(users[1].id.as_tag().as_deref(), Some("42"));
    }

    #[test]
    fn test_user_list_count_mismatch() {
        let body = [0x00, 0x03, 0x00, 0x01, 0x03];
        assert!(matches!(parse_user_list(&body), Err(FpError::Integrity(_))));
    }

    #[test]
    fn test_missing_body_is_framing_error() {
        let err = interpret(&Command::Version, &header(0x26, 0, 4, 0), None).unwrap_err();
        assert!(matches!(err, FpError::Framing(_)));
    }

    #[test]
    fn test_version_text() {
        let reply = interpret(&Command::Version, &header(0x26, 0, 6, 0), Some(b"V2.1\0\0")).unwrap();
        assert_eq!(reply, Reply::Text("V2.1".to_string()));
    }
}
