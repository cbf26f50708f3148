use std::sync::Arc;

use base64::Engine as _;
use presence_core::frame::{CaptureFrame, MediaFormat};
use presence_core::types::CaptureAngle;
use presence_engine::{
    EngineError, EnrollmentManager, SessionId, SessionStore, VerificationEngine,
};
use serde::Serialize;
use zbus::interface;

/// D-Bus interface for the Presence attendance daemon.
///
/// Bus name: org.presence.Attendance1
/// Object path: /org/presence/Attendance1
///
/// Images travel as base64-encoded JPEG or PNG payloads; video clips as a
/// JSON array of such payloads. Replies are JSON strings so frontends can
/// evolve independently of the D-Bus signature.
pub struct AttendanceService {
    enrollment: EnrollmentManager,
    verification: VerificationEngine,
    sessions: Arc<SessionStore>,
}

impl AttendanceService {
    pub fn new(
        enrollment: EnrollmentManager,
        verification: VerificationEngine,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            enrollment,
            verification,
            sessions,
        }
    }
}

fn decode_frame(payload: &str) -> zbus::fdo::Result<CaptureFrame> {
    // Browser frontends send data URLs; keep only the part after the comma.
    let raw = payload.rsplit(',').next().unwrap_or(payload);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid base64 image: {e}")))?;
    Ok(CaptureFrame::new(bytes, MediaFormat::Auto))
}

fn decode_frames(frames_json: &str) -> zbus::fdo::Result<Vec<CaptureFrame>> {
    let payloads: Vec<String> = serde_json::from_str(frames_json)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid frame list: {e}")))?;
    payloads.iter().map(|p| decode_frame(p)).collect()
}

fn parse_session(raw: &str) -> zbus::fdo::Result<SessionId> {
    raw.parse()
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid session id: {e}")))
}

fn parse_angle(raw: &str) -> zbus::fdo::Result<CaptureAngle> {
    raw.parse()
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("{e}")))
}

fn to_dbus(err: EngineError) -> zbus::fdo::Error {
    match &err {
        EngineError::Media(_) => zbus::fdo::Error::InvalidArgs(err.to_string()),
        EngineError::TemplateNotFound { .. } | EngineError::SessionNotFound(_) => {
            zbus::fdo::Error::UnknownObject(err.to_string())
        }
        EngineError::SessionNotActive { .. } | EngineError::SessionExpired => {
            zbus::fdo::Error::AccessDenied(err.to_string())
        }
        EngineError::Recognition(_) | EngineError::Directory(_) => {
            zbus::fdo::Error::Failed(err.to_string())
        }
    }
}

fn json_reply<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| zbus::fdo::Error::Failed(format!("reply encoding failed: {e}")))
}

#[interface(name = "org.presence.Attendance1")]
impl AttendanceService {
    /// Open a multi-angle enrollment session for an employee.
    async fn begin_enrollment(&self, employee_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(employee_id, "begin_enrollment requested");
        let ticket = self.enrollment.begin(employee_id);
        json_reply(&ticket)
    }

    /// Submit one angle capture for an open enrollment session.
    async fn capture_angle(
        &self,
        session_id: &str,
        angle: &str,
        image: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(session_id, angle, "capture_angle requested");
        let session = parse_session(session_id)?;
        let angle = parse_angle(angle)?;
        let frame = decode_frame(image)?;
        let outcome = self
            .enrollment
            .capture_angle(session, angle, &frame)
            .await
            .map_err(to_dbus)?;
        json_reply(&outcome)
    }

    /// Discard an enrollment session and any captures it holds.
    async fn cancel_enrollment(&self, session_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(session_id, "cancel_enrollment requested");
        let session = parse_session(session_id)?;
        self.enrollment.cancel(session).await.map_err(to_dbus)?;
        Ok(true)
    }

    /// Verify a single image against an employee's enrolled template.
    async fn verify(&self, employee_id: &str, image: &str) -> zbus::fdo::Result<String> {
        tracing::info!(employee_id, "verify requested");
        let frame = decode_frame(image)?;
        let attempt = self
            .verification
            .verify(employee_id, &frame)
            .await
            .map_err(to_dbus)?;
        json_reply(&attempt)
    }

    /// Verify a short video clip against an employee's enrolled template.
    async fn verify_video(&self, employee_id: &str, frames: &str) -> zbus::fdo::Result<String> {
        tracing::info!(employee_id, "verify_video requested");
        let frames = decode_frames(frames)?;
        let attempt = self
            .verification
            .verify_video(employee_id, &frames)
            .await
            .map_err(to_dbus)?;
        json_reply(&attempt)
    }

    /// Run the liveness pipeline over a clip without any identity match.
    async fn check_liveness(&self, frames: &str) -> zbus::fdo::Result<String> {
        tracing::info!("check_liveness requested");
        let frames = decode_frames(frames)?;
        let result = self
            .verification
            .check_liveness(&frames)
            .await
            .map_err(to_dbus)?;
        json_reply(&result)
    }

    /// List enrollment sessions that are still collecting captures.
    async fn pending_enrollments(&self) -> zbus::fdo::Result<String> {
        let pending = self.enrollment.pending().await;
        json_reply(&pending)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "active_sessions": self.sessions.len(),
        })
        .to_string())
    }
}
