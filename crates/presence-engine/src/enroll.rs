//! Enrollment session manager — drives the multi-angle capture state
//! machine and synthesizes the face template on completion.
//!
//! Each `capture_angle` call runs the full pipeline (preprocess →
//! recognition → liveness) *without* holding the session lock, then
//! re-checks the session state before committing: a session that expired
//! or was cancelled while the recognition call was in flight discards the
//! result instead of resurrecting the session.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use presence_core::frame::{self, CaptureFrame};
use presence_core::liveness::LivenessEvaluator;
use presence_core::quality::{QualityAssessment, QualityPolicy};
use presence_core::types::{CaptureAngle, Embedding, FaceTemplate, LivenessResult};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::directory::EmployeeDirectory;
use crate::error::EngineError;
use crate::recognition::{RecognitionClient, RecognitionService};
use crate::session::{SessionId, SessionStatus, SessionStore};

/// Handed to the client when an enrollment session starts.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentTicket {
    pub session_id: SessionId,
    pub employee_id: String,
    pub required_angles: Vec<CaptureAngle>,
    pub expires_at: DateTime<Utc>,
}

/// Result of one angle capture attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub session_id: SessionId,
    pub angle: CaptureAngle,
    /// Whether this capture was stored (liveness passed).
    pub accepted: bool,
    pub status: SessionStatus,
    pub quality: QualityAssessment,
    pub liveness: LivenessResult,
    /// Angles captured so far, including this one if accepted.
    pub captured: Vec<CaptureAngle>,
    /// Required angles still missing.
    pub missing: Vec<CaptureAngle>,
    /// Why the capture was rejected or the session ended in `failed`.
    pub reason: Option<String>,
}

/// Read-only view of a collecting session, for operator tooling.
#[derive(Debug, Clone, Serialize)]
pub struct PendingEnrollment {
    pub session_id: SessionId,
    pub employee_id: String,
    pub captured: Vec<CaptureAngle>,
    pub missing: Vec<CaptureAngle>,
    pub expires_at: DateTime<Utc>,
}

pub struct EnrollmentManager {
    config: Arc<EngineConfig>,
    recognition: RecognitionClient,
    directory: Arc<dyn EmployeeDirectory>,
    quality: QualityPolicy,
    liveness: LivenessEvaluator,
    sessions: Arc<SessionStore>,
}

impl EnrollmentManager {
    pub fn new(
        config: Arc<EngineConfig>,
        service: Arc<dyn RecognitionService>,
        directory: Arc<dyn EmployeeDirectory>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let recognition = RecognitionClient::new(service, config.recognition_timeout());
        let quality = config.quality_policy();
        let liveness = LivenessEvaluator::new(config.liveness_policy());
        Self {
            config,
            recognition,
            directory,
            quality,
            liveness,
            sessions,
        }
    }

    /// Start a new enrollment session for an employee.
    ///
    /// Re-enrollment is permitted; a completed session simply replaces the
    /// stored template.
    pub fn begin(&self, employee_id: &str) -> EnrollmentTicket {
        let (session_id, expires_at) = self.sessions.create(employee_id);
        tracing::info!(session = %session_id, employee_id, "enrollment started");
        EnrollmentTicket {
            session_id,
            employee_id: employee_id.to_string(),
            required_angles: self.config.required_angles.clone(),
            expires_at,
        }
    }

    /// Capture one angle for a collecting session.
    ///
    /// A detected face must first clear the quality gate: a capture that
    /// fails assessment with a composite score under the configured floor
    /// is rejected without touching the retry budget (the client reframes
    /// and resubmits). Liveness failure leaves the session collecting (the
    /// client retries the angle) until the per-angle retry budget is
    /// exhausted. A passing capture stores its embedding last-write-wins.
    /// Filling the required angle set finalizes the session: the template
    /// is synthesized, persisted via the directory, and the session is
    /// destroyed.
    pub async fn capture_angle(
        &self,
        session_id: SessionId,
        angle: CaptureAngle,
        frame: &CaptureFrame,
    ) -> Result<CaptureOutcome, EngineError> {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(EngineError::SessionNotFound(session_id))?;

        // Gate on session state before spending a recognition call.
        {
            let mut s = session.lock().await;
            if s.note_expired_if_due(Utc::now()) {
                drop(s);
                self.sessions.remove(&session_id);
                return Err(EngineError::SessionExpired);
            }
            if s.status != SessionStatus::Collecting {
                return Err(EngineError::SessionNotActive { status: s.status });
            }
        }

        // External pipeline, session lock released.
        let normalized = frame::preprocess(frame, &self.config.frame_policy())?;
        let observation = self.recognition.extract_one(&normalized).await?;
        let quality = self
            .quality
            .assess(&observation.bbox, normalized.width, normalized.height);
        let liveness = self.liveness.evaluate_frame(&observation, None);

        // Re-check before committing: the session may have expired or been
        // cancelled while recognition was in flight.
        let mut s = session.lock().await;
        if s.note_expired_if_due(Utc::now()) {
            drop(s);
            self.sessions.remove(&session_id);
            return Err(EngineError::SessionExpired);
        }
        if s.status != SessionStatus::Collecting {
            return Err(EngineError::SessionNotActive { status: s.status });
        }

        // Quality gate: a badly framed or unclear face is rejected before
        // liveness, and does not count against the retry budget — the
        // client just reframes and resubmits.
        if !quality.passed && quality.score < self.config.quality_floor {
            tracing::info!(
                session = %session_id,
                %angle,
                score = quality.score,
                issues = ?quality.issues,
                "angle capture rejected by quality gate"
            );
            let reason = format!("capture quality too low: {}", quality.issues.join("; "));
            return Ok(CaptureOutcome {
                session_id,
                angle,
                accepted: false,
                status: s.status,
                quality,
                liveness,
                captured: s.captured.keys().copied().collect(),
                missing: s.missing_angles(&self.config.required_angles),
                reason: Some(reason),
            });
        }

        if !liveness.passed {
            let failures = s.record_failure(angle, self.config.max_liveness_retries);
            tracing::info!(
                session = %session_id,
                %angle,
                failures,
                score = liveness.score,
                "angle capture rejected by liveness"
            );
            let outcome = CaptureOutcome {
                session_id,
                angle,
                accepted: false,
                status: s.status,
                quality,
                liveness,
                captured: s.captured.keys().copied().collect(),
                missing: s.missing_angles(&self.config.required_angles),
                reason: (s.status == SessionStatus::Failed)
                    .then(|| "liveness retry budget exhausted".to_string()),
            };
            if s.status == SessionStatus::Failed {
                tracing::warn!(session = %session_id, %angle, "session failed: too many liveness rejections");
                drop(s);
                self.sessions.remove(&session_id);
            }
            return Ok(outcome);
        }

        // Last write wins per angle.
        s.captured.insert(angle, observation.embedding);
        let missing = s.missing_angles(&self.config.required_angles);

        if !missing.is_empty() {
            return Ok(CaptureOutcome {
                session_id,
                angle,
                accepted: true,
                status: s.status,
                quality,
                liveness,
                captured: s.captured.keys().copied().collect(),
                missing,
                reason: None,
            });
        }

        // Required set filled — all captures must show the same person.
        if !angles_consistent(&s.captured, self.config.identity_floor) {
            s.status = SessionStatus::Failed;
            tracing::warn!(session = %session_id, "session failed: angle captures disagree on identity");
            let outcome = CaptureOutcome {
                session_id,
                angle,
                accepted: true,
                status: s.status,
                quality,
                liveness,
                captured: s.captured.keys().copied().collect(),
                missing: Vec::new(),
                reason: Some("angle captures appear to be different people".to_string()),
            };
            drop(s);
            self.sessions.remove(&session_id);
            return Ok(outcome);
        }

        let template = FaceTemplate::new(s.employee_id.clone(), s.captured.clone());
        self.directory.save_template(template).await?;
        s.status = SessionStatus::Complete;
        tracing::info!(
            session = %session_id,
            employee_id = %s.employee_id,
            angles = s.captured.len(),
            "enrollment complete, template stored"
        );

        let outcome = CaptureOutcome {
            session_id,
            angle,
            accepted: true,
            status: s.status,
            quality,
            liveness,
            captured: s.captured.keys().copied().collect(),
            missing: Vec::new(),
            reason: None,
        };
        drop(s);
        self.sessions.remove(&session_id);
        Ok(outcome)
    }

    /// Explicitly abandon a collecting session.
    pub async fn cancel(&self, session_id: SessionId) -> Result<(), EngineError> {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(EngineError::SessionNotFound(session_id))?;

        let mut s = session.lock().await;
        if s.note_expired_if_due(Utc::now()) {
            drop(s);
            self.sessions.remove(&session_id);
            return Err(EngineError::SessionExpired);
        }
        if s.status != SessionStatus::Collecting {
            return Err(EngineError::SessionNotActive { status: s.status });
        }
        s.status = SessionStatus::Failed;
        tracing::info!(session = %session_id, employee_id = %s.employee_id, "enrollment cancelled");
        drop(s);
        self.sessions.remove(&session_id);
        Ok(())
    }

    /// Sessions still collecting captures, skipping any that are due for
    /// the expiry sweep.
    pub async fn pending(&self) -> Vec<PendingEnrollment> {
        let now = Utc::now();
        let mut out = Vec::new();
        for (id, session) in self.sessions.handles() {
            let mut s = session.lock().await;
            if s.note_expired_if_due(now) || s.status != SessionStatus::Collecting {
                continue;
            }
            out.push(PendingEnrollment {
                session_id: id,
                employee_id: s.employee_id.clone(),
                captured: s.captured.keys().copied().collect(),
                missing: s.missing_angles(&self.config.required_angles),
                expires_at: s.expires_at,
            });
        }
        out
    }
}

/// Minimum pairwise similarity across captured angles must clear the floor;
/// a template mixing two people is worse than no template.
fn angles_consistent(captured: &BTreeMap<CaptureAngle, Embedding>, floor: f32) -> bool {
    let embeddings: Vec<&Embedding> = captured.values().collect();
    for (i, a) in embeddings.iter().enumerate() {
        for b in embeddings.iter().skip(i + 1) {
            if a.similarity(b) < floor {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_angle_trivially_consistent() {
        let mut captured = BTreeMap::new();
        captured.insert(CaptureAngle::Front, Embedding::new(vec![1.0, 0.0]));
        assert!(angles_consistent(&captured, 0.5));
    }

    #[test]
    fn test_matching_angles_consistent() {
        let mut captured = BTreeMap::new();
        captured.insert(CaptureAngle::Front, Embedding::new(vec![1.0, 0.1, 0.0]));
        captured.insert(CaptureAngle::Left, Embedding::new(vec![0.9, 0.2, 0.1]));
        assert!(angles_consistent(&captured, 0.5));
    }

    #[test]
    fn test_orthogonal_angles_inconsistent() {
        let mut captured = BTreeMap::new();
        captured.insert(CaptureAngle::Front, Embedding::new(vec![1.0, 0.0]));
        captured.insert(CaptureAngle::Left, Embedding::new(vec![0.0, 1.0]));
        assert!(!angles_consistent(&captured, 0.5));
    }
}
