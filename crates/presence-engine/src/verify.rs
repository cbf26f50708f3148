//! Verification engine — compare a live capture against a stored template
//! and render an accept/reject verdict.
//!
//! The anti-spoofing invariant lives here: an embedding from a capture
//! that failed liveness is never compared against the template. Template
//! lookup happens before any recognition spend so an unenrolled employee
//! costs nothing but a directory read.

use std::sync::Arc;

use presence_core::frame::{self, CaptureFrame};
use presence_core::liveness::LivenessEvaluator;
use presence_core::matcher::TemplateMatcher;
use presence_core::types::{
    FaceObservation, LivenessResult, RejectReason, VerificationAttempt,
};

use crate::config::EngineConfig;
use crate::directory::EmployeeDirectory;
use crate::error::EngineError;
use crate::recognition::{RecognitionClient, RecognitionError, RecognitionService};

pub struct VerificationEngine {
    config: Arc<EngineConfig>,
    recognition: RecognitionClient,
    directory: Arc<dyn EmployeeDirectory>,
    liveness: LivenessEvaluator,
    matcher: Arc<dyn TemplateMatcher>,
}

impl VerificationEngine {
    pub fn new(
        config: Arc<EngineConfig>,
        service: Arc<dyn RecognitionService>,
        directory: Arc<dyn EmployeeDirectory>,
        matcher: Arc<dyn TemplateMatcher>,
    ) -> Self {
        let recognition = RecognitionClient::new(service, config.recognition_timeout());
        let liveness = LivenessEvaluator::new(config.liveness_policy());
        Self {
            config,
            recognition,
            directory,
            liveness,
            matcher,
        }
    }

    /// Single-frame verification.
    pub async fn verify(
        &self,
        employee_id: &str,
        frame: &CaptureFrame,
    ) -> Result<VerificationAttempt, EngineError> {
        let template = self.directory.get_template(employee_id).await?;

        let normalized = frame::preprocess(frame, &self.config.frame_policy())?;
        let observation = self.recognition.extract_one(&normalized).await?;
        let liveness = self.liveness.evaluate_frame(&observation, None);

        if !liveness.passed {
            tracing::info!(employee_id, score = liveness.score, "verification rejected: liveness failed");
            return Ok(VerificationAttempt::rejected(
                employee_id,
                RejectReason::LivenessFailed,
                None,
                liveness,
            ));
        }

        let outcome = self
            .matcher
            .compare(&observation.embedding, &template, self.config.match_threshold);
        tracing::info!(
            employee_id,
            matched = outcome.matched,
            similarity = outcome.similarity,
            "verification compared"
        );

        if outcome.matched {
            Ok(VerificationAttempt::accepted(employee_id, outcome.similarity, liveness))
        } else {
            Ok(VerificationAttempt::rejected(
                employee_id,
                RejectReason::NoMatch,
                Some(outcome.similarity),
                liveness,
            ))
        }
    }

    /// Video-based verification over a sampled frame sequence.
    ///
    /// Liveness must pass on a majority of sampled frames before any
    /// embedding comparison happens; the embedding of the
    /// highest-liveness-score frame is then matched with the same threshold
    /// logic as the single-frame path.
    pub async fn verify_video(
        &self,
        employee_id: &str,
        frames: &[CaptureFrame],
    ) -> Result<VerificationAttempt, EngineError> {
        let template = self.directory.get_template(employee_id).await?;

        let observations = self.observe_frames(frames).await?;
        let sequence = self.liveness.evaluate_sequence(&observations);

        if observations.len() < self.config.min_sequence_frames {
            tracing::info!(
                employee_id,
                usable = observations.len(),
                "video verification inconclusive: too few usable frames"
            );
            return Ok(VerificationAttempt::inconclusive(employee_id, sequence.overall));
        }

        if !sequence.overall.passed {
            tracing::info!(
                employee_id,
                score = sequence.overall.score,
                "video verification rejected: sequence liveness failed"
            );
            return Ok(VerificationAttempt::rejected(
                employee_id,
                RejectReason::LivenessFailed,
                None,
                sequence.overall,
            ));
        }

        // Best-quality frame: highest per-frame liveness score, earliest on ties.
        let mut best_idx = 0;
        for (i, result) in sequence.per_frame.iter().enumerate() {
            if result.score > sequence.per_frame[best_idx].score {
                best_idx = i;
            }
        }

        let outcome = self.matcher.compare(
            &observations[best_idx].embedding,
            &template,
            self.config.match_threshold,
        );
        tracing::info!(
            employee_id,
            matched = outcome.matched,
            similarity = outcome.similarity,
            best_frame = best_idx,
            "video verification compared"
        );

        if outcome.matched {
            Ok(VerificationAttempt::accepted(employee_id, outcome.similarity, sequence.overall))
        } else {
            Ok(VerificationAttempt::rejected(
                employee_id,
                RejectReason::NoMatch,
                Some(outcome.similarity),
                sequence.overall,
            ))
        }
    }

    /// Standalone sequence liveness check (no template involved).
    pub async fn check_liveness(
        &self,
        frames: &[CaptureFrame],
    ) -> Result<LivenessResult, EngineError> {
        let observations = self.observe_frames(frames).await?;
        Ok(self.liveness.evaluate_sequence(&observations).overall)
    }

    /// Run preprocess + extraction over a sampled subset of frames.
    ///
    /// Frames that fail to decode or contain no single dominant face are
    /// skipped; a down recognition service aborts the whole call.
    async fn observe_frames(
        &self,
        frames: &[CaptureFrame],
    ) -> Result<Vec<FaceObservation>, EngineError> {
        let policy = self.config.frame_policy();
        let mut observations = Vec::new();

        for (i, frame) in sample_indices(frames.len(), self.config.video_sample_frames)
            .into_iter()
            .map(|i| (i, &frames[i]))
        {
            let normalized = match frame::preprocess(frame, &policy) {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(frame = i, error = %e, "skipping undecodable frame");
                    continue;
                }
            };
            match self.recognition.extract_one(&normalized).await {
                Ok(obs) => observations.push(obs),
                Err(e @ RecognitionError::Unavailable(_)) => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(frame = i, error = %e, "skipping frame without dominant face");
                }
            }
        }
        Ok(observations)
    }
}

/// Evenly-spaced sample of `count` indices out of `len` frames.
fn sample_indices(len: usize, count: usize) -> Vec<usize> {
    if len <= count {
        return (0..len).collect();
    }
    if count == 1 {
        return vec![0];
    }
    (0..count).map(|i| i * (len - 1) / (count - 1)).collect()
}
