use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template schema version. Bump when the angle layout or embedding
/// model changes incompatibly.
pub const TEMPLATE_VERSION: u32 = 1;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (fixed model-defined dimension, e.g. 512 for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Always walks all dimensions; no early exit on mismatch.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One detected face as reported by the recognition service:
/// location, identity embedding, and the raw per-frame liveness signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
    /// Raw anti-spoofing signal in [0, 1] from the recognition backend.
    pub liveness_signal: f32,
}

/// Named head pose captured during enrollment. `Front` is always required;
/// the rest are policy-configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureAngle {
    Front,
    Left,
    Right,
    Up,
    Down,
}

impl CaptureAngle {
    pub const ALL: [CaptureAngle; 5] = [
        CaptureAngle::Front,
        CaptureAngle::Left,
        CaptureAngle::Right,
        CaptureAngle::Up,
        CaptureAngle::Down,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureAngle::Front => "front",
            CaptureAngle::Left => "left",
            CaptureAngle::Right => "right",
            CaptureAngle::Up => "up",
            CaptureAngle::Down => "down",
        }
    }
}

impl std::fmt::Display for CaptureAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown capture angle: {0}")]
pub struct UnknownAngle(pub String);

impl std::str::FromStr for CaptureAngle {
    type Err = UnknownAngle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(CaptureAngle::Front),
            "left" => Ok(CaptureAngle::Left),
            "right" => Ok(CaptureAngle::Right),
            "up" => Ok(CaptureAngle::Up),
            "down" => Ok(CaptureAngle::Down),
            other => Err(UnknownAngle(other.to_string())),
        }
    }
}

/// Stored reference embeddings for one employee, keyed by capture angle.
///
/// Exactly one template exists per employee. A template is complete once it
/// holds at least the `front` embedding; other angles are optional extras
/// that improve matching under pose variation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceTemplate {
    pub employee_id: String,
    pub angles: BTreeMap<CaptureAngle, Embedding>,
    pub created_at: DateTime<Utc>,
    pub version: u32,
}

impl FaceTemplate {
    pub fn new(employee_id: String, angles: BTreeMap<CaptureAngle, Embedding>) -> Self {
        Self {
            employee_id,
            angles,
            created_at: Utc::now(),
            version: TEMPLATE_VERSION,
        }
    }

    /// A template is usable for verification only once the front view exists.
    pub fn is_complete(&self) -> bool {
        self.angles.contains_key(&CaptureAngle::Front)
    }

    /// Dimension of the stored embeddings (all angles share one model dimension).
    pub fn embedding_dim(&self) -> Option<usize> {
        self.angles.values().next().map(|e| e.values.len())
    }
}

/// Outcome of a liveness check. Failure is a normal result, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResult {
    pub passed: bool,
    /// Composite confidence in [0, 1] that the subject is a live person.
    pub score: f32,
    /// Per-signal contributions, keyed by signal name.
    pub signals: BTreeMap<String, f32>,
}

impl LivenessResult {
    pub fn failed(score: f32, signals: BTreeMap<String, f32>) -> Self {
        Self {
            passed: false,
            score,
            signals,
        }
    }
}

/// Final verdict of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
    /// Not enough usable evidence to accept or reject (e.g. too few
    /// analyzable video frames). Callers should re-capture.
    Inconclusive,
}

/// Why a verification attempt was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LivenessFailed,
    NoMatch,
}

/// One verification verdict. Created per call, returned to the caller,
/// never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationAttempt {
    pub employee_id: String,
    pub decision: Decision,
    pub reason: Option<RejectReason>,
    /// Cosine similarity against the stored template. Absent when the
    /// comparison was never performed (liveness gate, inconclusive).
    pub similarity: Option<f32>,
    pub liveness: LivenessResult,
}

impl VerificationAttempt {
    pub fn accepted(employee_id: &str, similarity: f32, liveness: LivenessResult) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            decision: Decision::Accepted,
            reason: None,
            similarity: Some(similarity),
            liveness,
        }
    }

    pub fn rejected(
        employee_id: &str,
        reason: RejectReason,
        similarity: Option<f32>,
        liveness: LivenessResult,
    ) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            decision: Decision::Rejected,
            reason: Some(reason),
            similarity,
            liveness,
        }
    }

    pub fn inconclusive(employee_id: &str, liveness: LivenessResult) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            decision: Decision::Inconclusive,
            reason: None,
            similarity: None,
            liveness,
        }
    }
}
