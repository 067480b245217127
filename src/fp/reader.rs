//! Thread-safe fingerprint reader: one mutual-exclusion gate around the session.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{info, warn};

use super::commands::{AddMode, Command};
use super::enroll::{EnrollState, Enrollment};
use super::error::{FpError, Result};
use super::response::Reply;
use super::session::{Link, Session, Timeouts};
use super::types::{Privilege, User, UserId};

/// Blocking client for one fingerprint module.
///
/// Every operation holds the gate for its whole exchange; enrollment holds it
/// across all three captures. Share it between threads with an `Arc`.
pub struct FingerprintReader<L: Link = Box<dyn SerialPort>> {
    session: Mutex<Session<L>>,
}

impl FingerprintReader {
    /// Open the module on a serial port.
    pub fn open(path: &str, baud_rate: u32, poll_interval: Duration, timeouts: Timeouts) -> Result<Self> {
        Ok(Self::new(Session::open(path, baud_rate, poll_interval, timeouts)?))
    }
}

impl<L: Link> FingerprintReader<L> {
    pub fn new(session: Session<L>) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// Acquire the gate for a multi-step operation.
    pub fn lock(&self) -> MutexGuard<'_, Session<L>> {
        self.session.lock().unwrap_or_else(|poisoned| {
            warn!("Session lock poisoned, continuing with inner session");
            poisoned.into_inner()
        })
    }

    /// Run a single command under the gate.
    pub fn execute(&self, command: &Command) -> Result<Reply> {
        self.lock().execute(command)
    }

    /// Enroll a fingerprint with three captures.
    pub fn enroll(&self, id: UserId, privilege: Privilege) -> Result<User> {
        self.enroll_with(id, privilege, |_| {})
    }

    /// Enroll, notifying `observer` on every state change so the operator can be prompted.
    pub fn enroll_with(&self, id: UserId, privilege: Privilege, observer: impl FnMut(EnrollState)) -> Result<User> {
        let mut session = self.lock();
        Enrollment::new(id, privilege).run(&mut *session, observer)
    }

    pub fn delete_user(&self, id: UserId) -> Result<()> {
        self.expect_done(Command::Delete { id })
    }

    pub fn delete_all(&self) -> Result<()> {
        info!("Deleting all users");
        self.expect_done(Command::DeleteAll)
    }

    pub fn user_count(&self) -> Result<u16> {
        match self.execute(&Command::UserCount)? {
            Reply::Count(count) => Ok(count),
            other => Err(unexpected(&Command::UserCount, other)),
        }
    }

    /// Privilege tier of an enrolled user.
    pub fn user_privilege(&self, id: UserId) -> Result<User> {
        self.expect_user(Command::GetPrivilege { id })
    }

    /// Capture a finger and compare it against one user.
    pub fn compare_one(&self, id: UserId) -> Result<User> {
        self.expect_user(Command::CompareOne { id })
    }

    /// Capture a finger and search the whole database.
    pub fn identify(&self) -> Result<User> {
        self.expect_user(Command::Identify)
    }

    pub fn comparison_level(&self) -> Result<u8> {
        self.expect_value(Command::GetComparisonLevel)
    }

    /// Set comparison strictness (0..=9); out-of-range values use the default of 5.
    pub fn set_comparison_level(&self, level: u8) -> Result<()> {
        self.expect_done(Command::set_comparison_level(level))
    }

    pub fn acquisition_timeout(&self) -> Result<u8> {
        self.expect_value(Command::GetAcquisitionTimeout)
    }

    /// Set how long the module waits for a finger; 0 waits indefinitely.
    pub fn set_acquisition_timeout(&self, value: u8) -> Result<()> {
        self.expect_done(Command::SetAcquisitionTimeout(value))
    }

    pub fn add_mode(&self) -> Result<AddMode> {
        match self.execute(&Command::GetAddMode)? {
            Reply::Mode(mode) => Ok(mode),
            other => Err(unexpected(&Command::GetAddMode, other)),
        }
    }

    pub fn set_add_mode(&self, mode: AddMode) -> Result<()> {
        self.expect_done(Command::SetAddMode(mode))
    }

    /// Put the module into its dormant low-power state.
    pub fn sleep(&self) -> Result<()> {
        self.expect_done(Command::Dormant)
    }

    pub fn version(&self) -> Result<String> {
        match self.execute(&Command::Version)? {
            Reply::Text(text) => Ok(text),
            other => Err(unexpected(&Command::Version, other)),
        }
    }

    /// Capture a finger and return its extracted eigenvalue.
    pub fn extract_eigenvalue(&self) -> Result<Vec<u8>> {
        self.expect_bytes(Command::ExtractEigenvalue)
    }

    /// Capture a finger and return the raw image.
    pub fn acquire_image(&self) -> Result<Vec<u8>> {
        self.expect_bytes(Command::AcquireImage)
    }

    /// Read the stored template of one user.
    pub fn upload_template(&self, id: UserId) -> Result<User> {
        self.expect_user(Command::UploadTemplate { id })
    }

    /// Store a template under `id`.
    pub fn download_and_save(&self, id: UserId, privilege: Privilege, template: &[u8]) -> Result<()> {
        self.expect_done(Command::DownloadSave {
            id,
            privilege,
            template: template.to_vec(),
        })
    }

    /// Compare a template against the stored print of `id`.
    pub fn download_compare_one(&self, id: UserId, template: &[u8]) -> Result<()> {
        self.expect_done(Command::DownloadCompareOne {
            id,
            template: template.to_vec(),
        })
    }

    /// Search the database for a template.
    pub fn download_compare_many(&self, template: &[u8]) -> Result<User> {
        self.expect_user(Command::DownloadCompareMany {
            template: template.to_vec(),
        })
    }

    /// Capture a finger and compare it against a template.
    pub fn download_compare_immediate(&self, template: &[u8]) -> Result<()> {
        self.expect_done(Command::DownloadCompareImmediate {
            template: template.to_vec(),
        })
    }

    /// All enrolled (id, privilege) pairs.
    pub fn list_users(&self) -> Result<Vec<User>> {
        match self.execute(&Command::ListUsers)? {
            Reply::Users(users) => Ok(users),
            other => Err(unexpected(&Command::ListUsers, other)),
        }
    }

    fn expect_done(&self, command: Command) -> Result<()> {
        match self.execute(&command)? {
            Reply::Done => Ok(()),
            other => Err(unexpected(&command, other)),
        }
    }

    fn expect_value(&self, command: Command) -> Result<u8> {
        match self.execute(&command)? {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected(&command, other)),
        }
    }

    fn expect_user(&self, command: Command) -> Result<User> {
        match self.execute(&command)? {
            Reply::User(user) => Ok(user),
            other => Err(unexpected(&command, other)),
        }
    }

    fn expect_bytes(&self, command: Command) -> Result<Vec<u8>> {
        match self.execute(&command)? {
            Reply::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(&command, other)),
        }
    }
}

fn unexpected(command: &Command, reply: Reply) -> FpError {
    FpError::integrity(format!("Unexpected reply to {}: {reply:?}", command.name()))
}
