//! Liveness evaluation — decide whether captured frames show a live person
//! or a spoof (printed photo, replayed video).
//!
//! A static photograph produces a near-zero backend signal and no
//! frame-to-frame motion; a spliced video produces implausibly large jumps
//! or inconsistent identity embeddings between frames. Single frames are
//! scored from the backend signal plus (when a prior frame exists) a
//! temporal motion signal; sequences must pass on a majority of frames so a
//! photo flashed briefly at the camera cannot carry the whole check.
//!
//! Liveness failure is a normal outcome reported via `passed = false`,
//! never an error.

use std::collections::BTreeMap;

use crate::types::{FaceObservation, LivenessResult};

// --- Composite score weights ---
const RECOGNITION_WEIGHT: f32 = 0.6;
const MOTION_WEIGHT: f32 = 0.4;

/// Thresholds and bands used by the evaluator.
#[derive(Debug, Clone)]
pub struct LivenessPolicy {
    /// Composite score at or above which a frame passes.
    pub threshold: f32,
    /// Inter-frame displacement (px) below which the subject is
    /// suspiciously static (photo).
    pub min_motion_px: f32,
    /// Displacement (px) above which the motion is implausible for a
    /// seated subject (splice / replay seam).
    pub max_motion_px: f32,
    /// Minimum mean consecutive-frame embedding similarity for a sequence
    /// to count as a single, continuous subject.
    pub consistency_floor: f32,
    /// Sequences with fewer usable frames than this cannot be assessed.
    pub min_sequence_frames: usize,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            min_motion_px: 2.0,
            max_motion_px: 50.0,
            consistency_floor: 0.7,
            min_sequence_frames: 3,
        }
    }
}

/// Result of evaluating a frame sequence: the aggregate verdict plus the
/// per-frame breakdown (used to pick the best frame for matching).
#[derive(Debug, Clone)]
pub struct SequenceLiveness {
    pub overall: LivenessResult,
    pub per_frame: Vec<LivenessResult>,
}

/// Applies a [`LivenessPolicy`] to single frames and frame sequences.
pub struct LivenessEvaluator {
    policy: LivenessPolicy,
}

impl LivenessEvaluator {
    pub fn new(policy: LivenessPolicy) -> Self {
        Self { policy }
    }

    /// Score a single frame, optionally against the preceding frame.
    ///
    /// Without a prior the score is the backend signal alone. With a prior,
    /// the temporal motion signal is blended in: displacement inside the
    /// configured live band scores 1.0, outside it 0.0.
    pub fn evaluate_frame(
        &self,
        observation: &FaceObservation,
        prior: Option<&FaceObservation>,
    ) -> LivenessResult {
        let raw = observation.liveness_signal.clamp(0.0, 1.0);
        let mut signals = BTreeMap::new();
        signals.insert("recognition".to_string(), raw);

        let score = match prior {
            None => raw,
            Some(prev) => {
                let displacement = displacement_px(prev, observation);
                let motion = if displacement >= self.policy.min_motion_px
                    && displacement <= self.policy.max_motion_px
                {
                    1.0
                } else {
                    0.0
                };
                signals.insert("motion".to_string(), motion);
                signals.insert("displacement_px".to_string(), displacement);
                RECOGNITION_WEIGHT * raw + MOTION_WEIGHT * motion
            }
        };

        LivenessResult {
            passed: score >= self.policy.threshold,
            score,
            signals,
        }
    }

    /// Score a sampled frame sequence (video path).
    ///
    /// The sequence passes only if a strict majority of frames pass
    /// individually AND consecutive embeddings stay consistent (one
    /// continuous subject, no photo swap mid-stream). Too few usable frames
    /// is an automatic fail with score 0.
    pub fn evaluate_sequence(&self, observations: &[FaceObservation]) -> SequenceLiveness {
        let n = observations.len();
        if n < self.policy.min_sequence_frames {
            let mut signals = BTreeMap::new();
            signals.insert("frames".to_string(), n as f32);
            tracing::debug!(frames = n, min = self.policy.min_sequence_frames, "too few frames for liveness");
            return SequenceLiveness {
                overall: LivenessResult::failed(0.0, signals),
                per_frame: Vec::new(),
            };
        }

        let per_frame: Vec<LivenessResult> = observations
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let prior = if i > 0 { Some(&observations[i - 1]) } else { None };
                self.evaluate_frame(obs, prior)
            })
            .collect();

        let passes = per_frame.iter().filter(|r| r.passed).count();
        let majority = passes * 2 > n;

        let consistency = mean_consecutive_similarity(observations);
        let consistent = consistency >= self.policy.consistency_floor;

        let score = per_frame.iter().map(|r| r.score).sum::<f32>() / n as f32;

        let mut signals = BTreeMap::new();
        signals.insert("frames".to_string(), n as f32);
        signals.insert("pass_fraction".to_string(), passes as f32 / n as f32);
        signals.insert("embedding_consistency".to_string(), consistency);

        SequenceLiveness {
            overall: LivenessResult {
                passed: majority && consistent,
                score,
                signals,
            },
            per_frame,
        }
    }
}

/// Inter-frame displacement: mean eye-landmark movement when both frames
/// carry landmarks, bounding-box drift otherwise.
fn displacement_px(prev: &FaceObservation, curr: &FaceObservation) -> f32 {
    match (&prev.bbox.landmarks, &curr.bbox.landmarks) {
        (Some(a), Some(b)) => {
            // Indices 0 and 1 are the left and right eye centres.
            let left = point_distance(a[0], b[0]);
            let right = point_distance(a[1], b[1]);
            (left + right) / 2.0
        }
        _ => point_distance((prev.bbox.x, prev.bbox.y), (curr.bbox.x, curr.bbox.y)),
    }
}

fn point_distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

fn mean_consecutive_similarity(observations: &[FaceObservation]) -> f32 {
    if observations.len() < 2 {
        return 1.0;
    }
    let sum: f32 = observations
        .windows(2)
        .map(|pair| pair[0].embedding.similarity(&pair[1].embedding))
        .sum();
    sum / (observations.len() - 1) as f32
}
