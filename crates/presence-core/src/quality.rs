//! Capture quality assessment — decide whether a detected face is sharp
//! enough evidence to enroll from.
//!
//! Scores the geometry the detector already reports: detection confidence,
//! the face's share of the frame, and how centered it sits. A capture can
//! carry issues yet still be usable; callers that need a hard gate compare
//! the composite score against their own floor. Pixel-level signals
//! (lighting, blur) are the recognition backend's concern and are folded
//! into its confidence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::BoundingBox;

// --- Composite score weights ---
const CONFIDENCE_WEIGHT: f32 = 0.4;
const AREA_WEIGHT: f32 = 0.3;
const CENTER_WEIGHT: f32 = 0.3;

/// Bands and floors applied during assessment.
#[derive(Debug, Clone)]
pub struct QualityPolicy {
    /// Detection confidence below which the face is considered unclear.
    pub min_confidence: f32,
    /// Face-area share of the frame below which the subject is too far away.
    pub min_area_ratio: f32,
    /// Face-area share above which the subject is too close.
    pub max_area_ratio: f32,
    /// Area band scoring full marks (comfortably framed).
    pub preferred_min_area: f32,
    pub preferred_max_area: f32,
    /// Normalized center offset above which the face is off-center.
    pub max_center_offset: f32,
    /// Composite score at or above which the capture passes outright.
    pub pass_score: f32,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            min_area_ratio: 0.05,
            max_area_ratio: 0.7,
            preferred_min_area: 0.1,
            preferred_max_area: 0.5,
            max_center_offset: 0.4,
            pass_score: 0.6,
        }
    }
}

/// Outcome of a quality assessment. Like liveness, a poor result is a
/// normal value, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub passed: bool,
    /// Composite quality in [0, 1].
    pub score: f32,
    /// Human-readable problems, empty when the capture is clean.
    pub issues: Vec<String>,
    /// Per-signal contributions, keyed by signal name.
    pub signals: BTreeMap<String, f32>,
}

impl QualityPolicy {
    /// Assess one detected face against the frame it was found in.
    pub fn assess(
        &self,
        bbox: &BoundingBox,
        frame_width: u32,
        frame_height: u32,
    ) -> QualityAssessment {
        let mut issues = Vec::new();
        let mut signals = BTreeMap::new();

        let confidence = bbox.confidence.clamp(0.0, 1.0);
        signals.insert("detection_confidence".to_string(), confidence);
        if confidence < self.min_confidence {
            issues.push("low detection confidence, face may be unclear".to_string());
        }

        let frame_area = (frame_width as f32) * (frame_height as f32);
        let area_ratio = if frame_area > 0.0 {
            (bbox.width * bbox.height) / frame_area
        } else {
            0.0
        };
        signals.insert("face_area_ratio".to_string(), area_ratio);
        if area_ratio < self.min_area_ratio {
            issues.push("face too small, move closer to the camera".to_string());
        } else if area_ratio > self.max_area_ratio {
            issues.push("face too large, move further from the camera".to_string());
        }

        let half_w = frame_width as f32 / 2.0;
        let half_h = frame_height as f32 / 2.0;
        let offset_x = if half_w > 0.0 {
            ((bbox.x + bbox.width / 2.0) - half_w).abs() / half_w
        } else {
            1.0
        };
        let offset_y = if half_h > 0.0 {
            ((bbox.y + bbox.height / 2.0) - half_h).abs() / half_h
        } else {
            1.0
        };
        let center_offset = offset_x.max(offset_y);
        signals.insert("center_offset".to_string(), center_offset);
        if center_offset > self.max_center_offset {
            issues.push("face not centered in the frame".to_string());
        }

        let area_component =
            if area_ratio >= self.preferred_min_area && area_ratio <= self.preferred_max_area {
                1.0
            } else if area_ratio >= self.min_area_ratio && area_ratio <= self.max_area_ratio {
                0.5
            } else {
                0.0
            };
        let center_component = (1.0 - center_offset).max(0.0);
        let score = CONFIDENCE_WEIGHT * confidence
            + AREA_WEIGHT * area_component
            + CENTER_WEIGHT * center_component;

        QualityAssessment {
            passed: issues.is_empty()
                && score >= self.pass_score
                && confidence >= self.min_confidence,
            score,
            issues,
            signals,
        }
    }
}
