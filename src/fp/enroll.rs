//! Three-capture enrollment state machine.
//!
//! The module beeps between captures; the coordinator only moves to the next
//! capture once the previous one has been acknowledged. Failures are never
//! retried here: a caller that wants another attempt starts a new enrollment.

use tracing::{info, warn};

use super::commands::{CaptureStep, Command};
use super::error::{FpError, Result};
use super::session::{Link, Session};
use super::types::{Privilege, User, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollState {
    Idle,
    CaptureOne,
    CaptureTwo,
    CaptureThree,
    Complete,
    Failed,
}

impl EnrollState {
    fn capture(self) -> Option<CaptureStep> {
        match self {
            Self::CaptureOne => Some(CaptureStep::First),
            Self::CaptureTwo => Some(CaptureStep::Second),
            Self::CaptureThree => Some(CaptureStep::Third),
            _ => None,
        }
    }

    fn after(step: CaptureStep) -> Self {
        match step.next() {
            Some(CaptureStep::Second) => Self::CaptureTwo,
            Some(CaptureStep::Third) => Self::CaptureThree,
            Some(CaptureStep::First) => Self::CaptureOne,
            None => Self::Complete,
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Ephemeral enrollment of one fingerprint.
#[derive(Debug)]
pub struct Enrollment {
    id: UserId,
    privilege: Privilege,
    state: EnrollState,
}

impl Enrollment {
    pub fn new(id: UserId, privilege: Privilege) -> Self {
        Self {
            id,
            privilege,
            state: EnrollState::Idle,
        }
    }

    pub fn state(&self) -> EnrollState {
        self.state
    }

    /// Advance by one transition, issuing a capture command when in a capture state.
    pub fn step<L: Link>(&mut self, session: &mut Session<L>) -> Result<EnrollState> {
        if self.state == EnrollState::Idle {
            self.state = EnrollState::CaptureOne;
            return Ok(self.state);
        }

        let Some(step) = self.state.capture() else {
            return Err(FpError::invalid_input(format!(
                "Enrollment of user {} already finished ({:?})",
                self.id, self.state
            )));
        };

        let command = Command::Enroll {
            step,
            id: self.id,
            privilege: self.privilege,
        };
        match session.execute(&command) {
            Ok(_) => {
                self.state = EnrollState::after(step);
                info!("User {} capture {}/3 accepted", self.id, step.number());
                Ok(self.state)
            }
            Err(e) => {
                warn!("User {} capture {}/3 failed: {e}", self.id, step.number());
                self.state = EnrollState::Failed;
                Err(e)
            }
        }
    }

    /// Drive all captures, reporting each new state to `observer`.
    pub fn run<L: Link>(
        mut self,
        session: &mut Session<L>,
        mut observer: impl FnMut(EnrollState),
    ) -> Result<User> {
        info!("Enrolling user {} with {} privilege", self.id, self.privilege);

        while !self.state.is_finished() {
            match self.step(session) {
                Ok(state) => observer(state),
                Err(e) => {
                    observer(EnrollState::Failed);
                    return Err(e);
                }
            }
        }

        info!("User {} enrolled", self.id);
        Ok(User::new(self.id, Some(self.privilege)))
    }
}
