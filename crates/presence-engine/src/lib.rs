//! presence-engine — Orchestration for face-based attendance.
//!
//! Coordinates the capture pipeline (preprocess → recognition → liveness)
//! across stateful multi-angle enrollment sessions and single-shot or
//! video-based verification. The recognition backend and the employee
//! directory are external collaborators behind async capability traits;
//! in-memory implementations are provided for testing and single-node
//! deployments.

pub mod config;
pub mod directory;
pub mod enroll;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fakes;
pub mod recognition;
pub mod session;
pub mod verify;

pub use config::EngineConfig;
pub use directory::{DirectoryError, EmployeeDirectory, MemoryDirectory};
pub use enroll::{CaptureOutcome, EnrollmentManager, EnrollmentTicket, PendingEnrollment};
pub use error::EngineError;
pub use recognition::{HttpRecognitionService, RecognitionClient, RecognitionError, RecognitionService};
pub use session::{EnrollmentSession, SessionId, SessionStatus, SessionStore};
pub use verify::VerificationEngine;
