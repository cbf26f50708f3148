//! Engine configuration, loaded from `PRESENCE_*` environment variables.

use std::time::Duration;

use presence_core::frame::FramePolicy;
use presence_core::liveness::LivenessPolicy;
use presence_core::quality::QualityPolicy;
use presence_core::types::CaptureAngle;

/// Read-only parameters consumed by the enrollment and verification engines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the external recognition service.
    pub recognizer_url: String,
    /// Composite liveness score required for a frame to pass.
    pub liveness_threshold: f32,
    /// Cosine similarity required for a verification match.
    pub match_threshold: f32,
    /// Angles an enrollment session must capture. `front` is always present.
    pub required_angles: Vec<CaptureAngle>,
    /// Enrollment session time-to-live in seconds.
    pub session_ttl_secs: u64,
    /// Failed-liveness captures tolerated per angle before the session fails.
    pub max_liveness_retries: u32,
    /// Per-call timeout for the recognition service, in milliseconds.
    pub recognition_timeout_ms: u64,
    /// Smallest usable frame dimension (face-detectability floor).
    pub min_frame_dim: u32,
    /// Frames larger than this are downscaled before recognition.
    pub max_frame_dim: u32,
    /// Maximum frames sampled from a video for verification.
    pub video_sample_frames: usize,
    /// Minimum pairwise similarity between enrolled angles (all captures
    /// must show the same person).
    pub identity_floor: f32,
    /// Minimum consecutive-frame embedding similarity in video liveness.
    pub consistency_floor: f32,
    /// Inter-frame motion band considered live, in pixels.
    pub min_motion_px: f32,
    pub max_motion_px: f32,
    /// Minimum usable frames for a video liveness verdict.
    pub min_sequence_frames: usize,
    /// Detection confidence below which an enrollment capture is unclear.
    pub min_detection_confidence: f32,
    /// Composite quality score below which a failing enrollment capture
    /// is rejected outright.
    pub quality_floor: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recognizer_url: "http://127.0.0.1:8100".to_string(),
            liveness_threshold: 0.7,
            match_threshold: 0.5,
            required_angles: vec![CaptureAngle::Front, CaptureAngle::Left, CaptureAngle::Right],
            session_ttl_secs: 300,
            max_liveness_retries: 3,
            recognition_timeout_ms: 5000,
            min_frame_dim: 160,
            max_frame_dim: 640,
            video_sample_frames: 5,
            identity_floor: 0.5,
            consistency_floor: 0.7,
            min_motion_px: 2.0,
            max_motion_px: 50.0,
            min_sequence_frames: 3,
            min_detection_confidence: 0.7,
            quality_floor: 0.5,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `PRESENCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            recognizer_url: std::env::var("PRESENCE_RECOGNIZER_URL")
                .unwrap_or(defaults.recognizer_url),
            liveness_threshold: env_parse("PRESENCE_LIVENESS_THRESHOLD", defaults.liveness_threshold),
            match_threshold: env_parse("PRESENCE_MATCH_THRESHOLD", defaults.match_threshold),
            required_angles: std::env::var("PRESENCE_REQUIRED_ANGLES")
                .map(|v| parse_angles(&v))
                .unwrap_or(defaults.required_angles),
            session_ttl_secs: env_parse("PRESENCE_SESSION_TTL_SECS", defaults.session_ttl_secs),
            max_liveness_retries: env_parse("PRESENCE_MAX_LIVENESS_RETRIES", defaults.max_liveness_retries),
            recognition_timeout_ms: env_parse("PRESENCE_RECOGNITION_TIMEOUT_MS", defaults.recognition_timeout_ms),
            min_frame_dim: env_parse("PRESENCE_MIN_FRAME_DIM", defaults.min_frame_dim),
            max_frame_dim: env_parse("PRESENCE_MAX_FRAME_DIM", defaults.max_frame_dim),
            video_sample_frames: env_parse("PRESENCE_VIDEO_SAMPLE_FRAMES", defaults.video_sample_frames),
            identity_floor: env_parse("PRESENCE_IDENTITY_FLOOR", defaults.identity_floor),
            consistency_floor: env_parse("PRESENCE_CONSISTENCY_FLOOR", defaults.consistency_floor),
            min_motion_px: env_parse("PRESENCE_MIN_MOTION_PX", defaults.min_motion_px),
            max_motion_px: env_parse("PRESENCE_MAX_MOTION_PX", defaults.max_motion_px),
            min_sequence_frames: env_parse("PRESENCE_MIN_SEQUENCE_FRAMES", defaults.min_sequence_frames),
            min_detection_confidence: env_parse(
                "PRESENCE_MIN_DETECTION_CONFIDENCE",
                defaults.min_detection_confidence,
            ),
            quality_floor: env_parse("PRESENCE_QUALITY_FLOOR", defaults.quality_floor),
        }
    }

    pub fn frame_policy(&self) -> FramePolicy {
        FramePolicy {
            min_dimension: self.min_frame_dim,
            max_dimension: self.max_frame_dim,
        }
    }

    pub fn liveness_policy(&self) -> LivenessPolicy {
        LivenessPolicy {
            threshold: self.liveness_threshold,
            min_motion_px: self.min_motion_px,
            max_motion_px: self.max_motion_px,
            consistency_floor: self.consistency_floor,
            min_sequence_frames: self.min_sequence_frames,
        }
    }

    pub fn quality_policy(&self) -> QualityPolicy {
        QualityPolicy {
            min_confidence: self.min_detection_confidence,
            ..QualityPolicy::default()
        }
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Parse a comma-separated angle list; unknown names are skipped with a
/// warning, and `front` is forced into the set.
fn parse_angles(value: &str) -> Vec<CaptureAngle> {
    let mut angles: Vec<CaptureAngle> = Vec::new();
    for name in value.split(',').filter(|s| !s.trim().is_empty()) {
        match name.parse::<CaptureAngle>() {
            Ok(angle) => {
                if !angles.contains(&angle) {
                    angles.push(angle);
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unknown angle in PRESENCE_REQUIRED_ANGLES"),
        }
    }
    if !angles.contains(&CaptureAngle::Front) {
        angles.insert(0, CaptureAngle::Front);
    }
    angles
}

/// Parse an environment variable straight into its target type; values
/// that fail to parse (including out-of-range integers) fall back to the
/// default rather than being silently truncated.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
