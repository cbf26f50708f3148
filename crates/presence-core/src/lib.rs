//! presence-core — Domain types for face-based attendance verification.
//!
//! Pure, synchronous building blocks: frame preprocessing, embeddings and
//! templates, template matching, capture quality assessment, and liveness
//! evaluation. Orchestration and all I/O live in `presence-engine`.

pub mod frame;
pub mod liveness;
pub mod matcher;
pub mod quality;
pub mod types;

pub use frame::{CaptureFrame, MediaError, MediaFormat, NormalizedFrame};
pub use liveness::{LivenessEvaluator, LivenessPolicy};
pub use quality::{QualityAssessment, QualityPolicy};
pub use matcher::{CosineMatcher, MatchOutcome, TemplateMatcher};
pub use types::{
    BoundingBox, CaptureAngle, Decision, Embedding, FaceObservation, FaceTemplate, LivenessResult,
    RejectReason, VerificationAttempt,
};
