//! End-to-end enrollment flows against scripted collaborators.

use std::io::Cursor;
use std::sync::Arc;

use presence_core::frame::{CaptureFrame, MediaFormat};
use presence_core::types::{BoundingBox, CaptureAngle};
use presence_engine::fakes::{observation_with_bbox, ScriptedRecognizer};
use presence_engine::{
    EmployeeDirectory, EngineConfig, EngineError, EnrollmentManager, MemoryDirectory,
    RecognitionError, SessionStatus, SessionStore,
};

fn png_frame() -> CaptureFrame {
    let img = image::RgbImage::from_fn(320, 320, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 32])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    CaptureFrame::new(buf, MediaFormat::Png)
}

struct Harness {
    recognizer: Arc<ScriptedRecognizer>,
    directory: Arc<MemoryDirectory>,
    sessions: Arc<SessionStore>,
    manager: EnrollmentManager,
}

fn harness(config: EngineConfig) -> Harness {
    let config = Arc::new(config);
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let directory = Arc::new(MemoryDirectory::new());
    let sessions = Arc::new(SessionStore::new(config.session_ttl()));
    let manager = EnrollmentManager::new(
        config,
        recognizer.clone(),
        directory.clone(),
        sessions.clone(),
    );
    Harness {
        recognizer,
        directory,
        sessions,
        manager,
    }
}

fn front_only() -> EngineConfig {
    EngineConfig {
        required_angles: vec![CaptureAngle::Front],
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn front_only_policy_completes_on_front_capture() {
    let h = harness(front_only());
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9);

    let ticket = h.manager.begin("e1");
    assert_eq!(ticket.required_angles, vec![CaptureAngle::Front]);

    let outcome = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.status, SessionStatus::Complete);
    assert!(outcome.missing.is_empty());

    let template = h.directory.get_template("e1").await.unwrap();
    assert!(template.is_complete());
    assert_eq!(template.angles[&CaptureAngle::Front].values, vec![1.0, 0.0, 0.0]);
    // Session destroyed on finalize.
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn larger_required_set_stays_collecting() {
    let h = harness(EngineConfig::default()); // front, left, right
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9);

    let ticket = h.manager.begin("e1");
    let outcome = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.status, SessionStatus::Collecting);
    assert_eq!(outcome.missing, vec![CaptureAngle::Left, CaptureAngle::Right]);
    assert!(h.directory.get_template("e1").await.is_err());
}

#[tokio::test]
async fn expired_session_rejects_capture_without_recognition_spend() {
    let h = harness(EngineConfig {
        session_ttl_secs: 0,
        ..front_only()
    });
    let ticket = h.manager.begin("e1");

    let err = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionExpired));
    assert_eq!(h.recognizer.calls(), 0);

    // The expired session was purged; a second call no longer finds it.
    let err = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}

#[tokio::test]
async fn duplicate_angle_capture_is_last_write_wins() {
    let h = harness(front_only());
    // Two captures of `left`, then `front` completes the session. All three
    // embeddings belong to the same person (high pairwise similarity).
    h.recognizer.push_face(&[0.9, 0.1, 0.0], 0.9);
    h.recognizer.push_face(&[0.8, 0.2, 0.0], 0.9);
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9);

    let ticket = h.manager.begin("e1");
    h.manager
        .capture_angle(ticket.session_id, CaptureAngle::Left, &png_frame())
        .await
        .unwrap();
    h.manager
        .capture_angle(ticket.session_id, CaptureAngle::Left, &png_frame())
        .await
        .unwrap();
    let outcome = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);

    let template = h.directory.get_template("e1").await.unwrap();
    assert_eq!(template.angles[&CaptureAngle::Left].values, vec![0.8, 0.2, 0.0]);
}

#[tokio::test]
async fn liveness_failure_leaves_session_collecting_then_retry_succeeds() {
    let h = harness(front_only());
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.1); // spoof
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9); // retry

    let ticket = h.manager.begin("e1");
    let rejected = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert!(!rejected.accepted);
    assert!(!rejected.liveness.passed);
    assert_eq!(rejected.status, SessionStatus::Collecting);

    let accepted = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert!(accepted.accepted);
    assert_eq!(accepted.status, SessionStatus::Complete);
}

#[tokio::test]
async fn exhausted_liveness_retries_fail_the_session() {
    let h = harness(EngineConfig {
        max_liveness_retries: 1,
        ..front_only()
    });
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.1);
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.1);

    let ticket = h.manager.begin("e1");
    let first = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert_eq!(first.status, SessionStatus::Collecting);

    let second = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert_eq!(second.status, SessionStatus::Failed);
    assert!(second.reason.is_some());
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn inconsistent_angle_identities_fail_the_session() {
    let h = harness(EngineConfig {
        required_angles: vec![CaptureAngle::Front, CaptureAngle::Left],
        ..EngineConfig::default()
    });
    // Orthogonal embeddings: two different people in one session.
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9);
    h.recognizer.push_face(&[0.0, 1.0, 0.0], 0.9);

    let ticket = h.manager.begin("e1");
    h.manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    let outcome = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Left, &png_frame())
        .await
        .unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(outcome.reason.is_some());
    assert!(h.directory.get_template("e1").await.is_err());
}

/// A tiny, cornered, low-confidence detection in a 320x320 frame.
fn hopeless_bbox() -> BoundingBox {
    BoundingBox {
        x: 0.0,
        y: 0.0,
        width: 20.0,
        height: 20.0,
        confidence: 0.2,
        landmarks: None,
    }
}

#[tokio::test]
async fn badly_framed_capture_is_rejected_by_quality_gate() {
    let h = harness(front_only());
    h.recognizer
        .push(Ok(vec![observation_with_bbox(&[1.0, 0.0, 0.0], 0.9, hopeless_bbox())]));
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9);

    let ticket = h.manager.begin("e1");
    let rejected = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert!(!rejected.accepted);
    assert_eq!(rejected.status, SessionStatus::Collecting);
    assert!(!rejected.quality.passed);
    assert!(rejected.quality.score < 0.5);
    assert!(rejected.reason.unwrap().contains("quality"));
    assert!(h.directory.get_template("e1").await.is_err());

    // A well-framed retry completes the session.
    let accepted = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert!(accepted.accepted);
    assert!(accepted.quality.passed);
    assert_eq!(accepted.status, SessionStatus::Complete);
}

#[tokio::test]
async fn quality_rejection_does_not_consume_the_retry_budget() {
    // Zero liveness retries: a single liveness failure would end the
    // session, so surviving repeated quality rejections proves the gate
    // never touches the budget.
    let h = harness(EngineConfig {
        max_liveness_retries: 0,
        ..front_only()
    });
    for _ in 0..3 {
        h.recognizer
            .push(Ok(vec![observation_with_bbox(&[1.0, 0.0, 0.0], 0.9, hopeless_bbox())]));
    }
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9);

    let ticket = h.manager.begin("e1");
    for _ in 0..3 {
        let outcome = h
            .manager
            .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
            .await
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.status, SessionStatus::Collecting);
    }

    let outcome = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);
}

#[tokio::test]
async fn marginal_quality_capture_still_enrolls() {
    // Well framed but middling confidence: flagged with issues, yet the
    // composite score stays above the rejection floor and the capture
    // proceeds through liveness.
    let h = harness(front_only());
    h.recognizer.push(Ok(vec![observation_with_bbox(
        &[1.0, 0.0, 0.0],
        0.9,
        BoundingBox {
            x: 100.0,
            y: 85.0,
            width: 120.0,
            height: 150.0,
            confidence: 0.5,
            landmarks: None,
        },
    )]));

    let ticket = h.manager.begin("e1");
    let outcome = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert!(outcome.accepted);
    assert!(!outcome.quality.passed);
    assert!(!outcome.quality.issues.is_empty());
    assert_eq!(outcome.status, SessionStatus::Complete);
}

#[tokio::test]
async fn cancelled_session_is_destroyed() {
    let h = harness(front_only());
    let ticket = h.manager.begin("e1");
    h.manager.cancel(ticket.session_id).await.unwrap();

    let err = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}

#[tokio::test]
async fn no_face_error_does_not_consume_the_session() {
    let h = harness(front_only());
    h.recognizer.push(Ok(vec![]));
    h.recognizer.push_face(&[1.0, 0.0, 0.0], 0.9);

    let ticket = h.manager.begin("e1");
    let err = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Recognition(RecognitionError::NoFace)
    ));

    // Session still collecting; the retry completes it.
    let outcome = h
        .manager
        .capture_angle(ticket.session_id, CaptureAngle::Front, &png_frame())
        .await
        .unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);
}

#[tokio::test]
async fn capture_on_unknown_session_fails() {
    let h = harness(front_only());
    let bogus = "00000000-0000-0000-0000-000000000000".parse().unwrap();
    let err = h
        .manager
        .capture_angle(bogus, CaptureAngle::Front, &png_frame())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}
