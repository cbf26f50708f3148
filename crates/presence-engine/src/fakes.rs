//! Scripted fakes for the collaborator interfaces (testing only).
//!
//! `ScriptedRecognizer` replays a queue of pre-programmed extraction
//! results; `CountingMatcher` wraps the real cosine matcher and counts
//! invocations so tests can assert the anti-spoofing invariant (no
//! comparison after a liveness failure).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use presence_core::frame::NormalizedFrame;
use presence_core::matcher::{CosineMatcher, MatchOutcome, TemplateMatcher};
use presence_core::types::{BoundingBox, Embedding, FaceObservation, FaceTemplate};

use crate::recognition::{RecognitionError, RecognitionService};

/// Build a face observation at a given position, with no landmarks.
pub fn observation_at(values: &[f32], liveness_signal: f32, x: f32, y: f32) -> FaceObservation {
    observation_with_bbox(
        values,
        liveness_signal,
        BoundingBox {
            x,
            y,
            width: 120.0,
            height: 150.0,
            confidence: 0.95,
            landmarks: None,
        },
    )
}

/// Build a face observation with full control over the bounding box.
pub fn observation_with_bbox(
    values: &[f32],
    liveness_signal: f32,
    bbox: BoundingBox,
) -> FaceObservation {
    FaceObservation {
        bbox,
        embedding: Embedding::new(values.to_vec()),
        liveness_signal,
    }
}

/// Recognition service that pops one scripted result per call.
///
/// An exhausted script reports the service as unavailable, which makes a
/// test that issues more calls than it scripted fail loudly.
#[derive(Default)]
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Result<Vec<FaceObservation>, RecognitionError>>>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<Vec<FaceObservation>, RecognitionError>) {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .push_back(result);
    }

    /// Script a single-face response.
    pub fn push_face(&self, values: &[f32], liveness_signal: f32) {
        self.push(Ok(vec![observation_at(values, liveness_signal, 100.0, 80.0)]));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionService for ScriptedRecognizer {
    async fn extract(
        &self,
        _frame: &NormalizedFrame,
    ) -> Result<Vec<FaceObservation>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(RecognitionError::Unavailable("script exhausted".into())))
    }
}

/// Cosine matcher that counts how often it is invoked.
pub struct CountingMatcher {
    inner: CosineMatcher,
    calls: AtomicUsize,
}

impl CountingMatcher {
    pub fn new() -> Self {
        Self {
            inner: CosineMatcher,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TemplateMatcher for CountingMatcher {
    fn compare(&self, probe: &Embedding, template: &FaceTemplate, threshold: f32) -> MatchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compare(probe, template, threshold)
    }
}
