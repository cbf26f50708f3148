//! Template matching — compare a live probe embedding against a stored
//! multi-angle face template.

use crate::types::{CaptureAngle, Embedding, FaceTemplate};

/// Result of comparing a probe embedding against a template.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: bool,
    /// Best cosine similarity across stored angles, in [-1, 1].
    pub similarity: f32,
    /// Angle whose stored embedding produced the best similarity.
    pub angle: Option<CaptureAngle>,
}

/// Strategy for comparing a probe embedding against a stored template.
pub trait TemplateMatcher: Send + Sync {
    fn compare(&self, probe: &Embedding, template: &FaceTemplate, threshold: f32) -> MatchOutcome;
}

/// Best-of-angle cosine matcher.
///
/// Compares the probe against every stored angle embedding and keeps the
/// highest similarity. All angles are always visited; deterministic for a
/// given probe and template (angles iterate in their fixed `CaptureAngle`
/// order).
pub struct CosineMatcher;

impl TemplateMatcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, template: &FaceTemplate, threshold: f32) -> MatchOutcome {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_angle: Option<CaptureAngle> = None;

        for (angle, stored) in &template.angles {
            let sim = probe.similarity(stored);
            if sim > best_sim {
                best_sim = sim;
                best_angle = Some(*angle);
            }
        }

        if best_sim == f32::NEG_INFINITY {
            // Empty template: nothing to match against.
            return MatchOutcome {
                matched: false,
                similarity: 0.0,
                angle: None,
            };
        }

        MatchOutcome {
            matched: best_sim >= threshold,
            similarity: best_sim,
            angle: best_angle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn template(angles: &[(CaptureAngle, Vec<f32>)]) -> FaceTemplate {
        let map: BTreeMap<_, _> = angles
            .iter()
            .map(|(a, v)| (*a, Embedding::new(v.clone())))
            .collect();
        FaceTemplate::new("e1".into(), map)
    }

    #[test]
    fn test_near_identical_probe_accepted() {
        // Front-only template at [1,0,0]; probe [0.95,0.1,0] has cosine ~0.995.
        let t = template(&[(CaptureAngle::Front, vec![1.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![0.95, 0.1, 0.0]);
        let outcome = CosineMatcher.compare(&probe, &t, 0.8);
        assert!(outcome.matched);
        assert!(outcome.similarity > 0.99);
        assert_eq!(outcome.angle, Some(CaptureAngle::Front));
    }

    #[test]
    fn test_orthogonal_probe_rejected() {
        let t = template(&[(CaptureAngle::Front, vec![1.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 1.0, 0.0]);
        let outcome = CosineMatcher.compare(&probe, &t, 0.8);
        assert!(!outcome.matched);
        assert!(outcome.similarity.abs() < 1e-6);
    }

    #[test]
    fn test_best_angle_wins() {
        let t = template(&[
            (CaptureAngle::Front, vec![0.0, 1.0, 0.0]),
            (CaptureAngle::Left, vec![1.0, 0.0, 0.0]),
        ]);
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let outcome = CosineMatcher.compare(&probe, &t, 0.5);
        assert!(outcome.matched);
        assert_eq!(outcome.angle, Some(CaptureAngle::Left));
        assert!((outcome.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_boundary_inclusive() {
        let t = template(&[(CaptureAngle::Front, vec![1.0, 0.0])]);
        let probe = Embedding::new(vec![1.0, 0.0]);
        let outcome = CosineMatcher.compare(&probe, &t, 1.0);
        assert!(outcome.matched, "similarity == threshold must match");
    }

    #[test]
    fn test_empty_template_never_matches() {
        let t = template(&[]);
        let probe = Embedding::new(vec![1.0, 0.0]);
        let outcome = CosineMatcher.compare(&probe, &t, 0.0);
        assert!(!outcome.matched);
        assert_eq!(outcome.similarity, 0.0);
        assert_eq!(outcome.angle, None);
    }

    #[test]
    fn test_deterministic_repeat() {
        let t = template(&[
            (CaptureAngle::Front, vec![0.4, 0.6, 0.1]),
            (CaptureAngle::Right, vec![0.2, 0.9, 0.3]),
        ]);
        let probe = Embedding::new(vec![0.3, 0.7, 0.2]);
        let a = CosineMatcher.compare(&probe, &t, 0.5);
        let b = CosineMatcher.compare(&probe, &t, 0.5);
        assert_eq!(a.matched, b.matched);
        assert_eq!(a.similarity, b.similarity);
        assert_eq!(a.angle, b.angle);
    }
}
