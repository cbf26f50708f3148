//! Engine-level error taxonomy.
//!
//! Only genuine faults and precondition violations live here. Terminal
//! verification outcomes (liveness failed, no match) are normal results
//! carried in [`presence_core::types::VerificationAttempt`], never errors.

use presence_core::frame::MediaError;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::recognition::RecognitionError;
use crate::session::{SessionId, SessionStatus};

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed input media; the caller recovers by resubmitting.
    #[error("invalid media: {0}")]
    Media(#[from] MediaError),
    /// No face, multiple faces, or the recognition service is down —
    /// variants stay distinct so callers can apply the right retry policy.
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    /// Verification precondition: the employee must enroll first.
    #[error("no face template enrolled for employee {employee_id}")]
    TemplateNotFound { employee_id: String },
    #[error("unknown enrollment session {0}")]
    SessionNotFound(SessionId),
    #[error("session is {status}; no further captures accepted")]
    SessionNotActive { status: SessionStatus },
    #[error("enrollment session expired")]
    SessionExpired,
    #[error("employee directory error: {0}")]
    Directory(String),
}

impl From<DirectoryError> for EngineError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::TemplateNotFound { employee_id } => {
                EngineError::TemplateNotFound { employee_id }
            }
            DirectoryError::Storage(msg) => EngineError::Directory(msg),
        }
    }
}
