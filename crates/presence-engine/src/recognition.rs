//! Recognition service client — the adapter to the external face
//! inference backend.
//!
//! The backend is a black box behind the [`RecognitionService`] capability
//! trait: given a normalized frame it returns the faces it found, each with
//! an identity embedding and a raw liveness signal. The [`RecognitionClient`]
//! adapter bounds every call with a timeout and enforces the
//! exactly-one-dominant-face rule. It never retries — retry policy belongs
//! to the caller, which is why "service down" is a distinct error from
//! "no face in this frame".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use presence_core::frame::NormalizedFrame;
use presence_core::types::{BoundingBox, Embedding, FaceObservation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("no face detected in frame")]
    NoFace,
    #[error("{count} faces detected — exactly one subject required")]
    MultipleFaces { count: usize },
    #[error("recognition service unavailable: {0}")]
    Unavailable(String),
}

/// External ML inference capability: frame in, detected faces out.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Detect faces and extract embeddings from a normalized frame.
    ///
    /// Transport or inference failures surface as
    /// [`RecognitionError::Unavailable`]; an empty vector is a valid
    /// response meaning no face was found.
    async fn extract(&self, frame: &NormalizedFrame)
        -> Result<Vec<FaceObservation>, RecognitionError>;
}

/// Timeout-bounding adapter over a [`RecognitionService`].
#[derive(Clone)]
pub struct RecognitionClient {
    service: Arc<dyn RecognitionService>,
    timeout: Duration,
}

impl RecognitionClient {
    pub fn new(service: Arc<dyn RecognitionService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Extract the single dominant face from a frame.
    ///
    /// Zero faces → `NoFace`; more than one → `MultipleFaces` (ambiguous
    /// subject is rejected rather than guessed); timeout → `Unavailable`.
    pub async fn extract_one(
        &self,
        frame: &NormalizedFrame,
    ) -> Result<FaceObservation, RecognitionError> {
        let mut faces = tokio::time::timeout(self.timeout, self.service.extract(frame))
            .await
            .map_err(|_| {
                RecognitionError::Unavailable(format!(
                    "call exceeded {} ms",
                    self.timeout.as_millis()
                ))
            })??;

        match faces.len() {
            0 => Err(RecognitionError::NoFace),
            1 => Ok(faces.remove(0)),
            count => Err(RecognitionError::MultipleFaces { count }),
        }
    }
}

// --- HTTP backend ---

#[derive(Serialize)]
struct ExtractRequest<'a> {
    width: u32,
    height: u32,
    /// Packed RGB8 pixels, base64-encoded.
    pixels: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    faces: Vec<WireFace>,
}

#[derive(Deserialize)]
struct WireFace {
    /// [x, y, width, height]
    bbox: [f32; 4],
    confidence: f32,
    #[serde(default)]
    landmarks: Option<[(f32, f32); 5]>,
    embedding: Vec<f32>,
    liveness: f32,
}

impl From<WireFace> for FaceObservation {
    fn from(face: WireFace) -> Self {
        FaceObservation {
            bbox: BoundingBox {
                x: face.bbox[0],
                y: face.bbox[1],
                width: face.bbox[2],
                height: face.bbox[3],
                confidence: face.confidence,
                landmarks: face.landmarks,
            },
            embedding: Embedding::new(face.embedding),
            liveness_signal: face.liveness,
        }
    }
}

/// JSON-over-HTTP recognition backend (`POST {base}/extract`).
pub struct HttpRecognitionService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRecognitionService {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl RecognitionService for HttpRecognitionService {
    async fn extract(
        &self,
        frame: &NormalizedFrame,
    ) -> Result<Vec<FaceObservation>, RecognitionError> {
        let pixels = base64::engine::general_purpose::STANDARD.encode(&frame.pixels);
        let request = ExtractRequest {
            width: frame.width,
            height: frame.height,
            pixels: &pixels,
        };

        let url = format!("{}/extract", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecognitionError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| RecognitionError::Unavailable(format!("malformed response: {e}")))?;

        tracing::debug!(faces = body.faces.len(), "recognition backend responded");
        Ok(body.faces.into_iter().map(FaceObservation::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{observation_at, ScriptedRecognizer};

    fn blank_frame() -> NormalizedFrame {
        NormalizedFrame {
            pixels: vec![0; 16 * 16 * 3],
            width: 16,
            height: 16,
        }
    }

    #[tokio::test]
    async fn test_extract_one_single_face() {
        let recognizer = Arc::new(ScriptedRecognizer::new());
        recognizer.push(Ok(vec![observation_at(&[1.0, 0.0], 0.9, 10.0, 10.0)]));
        let client = RecognitionClient::new(recognizer, Duration::from_secs(1));

        let face = client.extract_one(&blank_frame()).await.unwrap();
        assert_eq!(face.embedding.values, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_extract_one_no_face() {
        let recognizer = Arc::new(ScriptedRecognizer::new());
        recognizer.push(Ok(vec![]));
        let client = RecognitionClient::new(recognizer, Duration::from_secs(1));

        assert!(matches!(
            client.extract_one(&blank_frame()).await,
            Err(RecognitionError::NoFace)
        ));
    }

    #[tokio::test]
    async fn test_extract_one_multiple_faces_rejected() {
        let recognizer = Arc::new(ScriptedRecognizer::new());
        recognizer.push(Ok(vec![
            observation_at(&[1.0, 0.0], 0.9, 10.0, 10.0),
            observation_at(&[0.0, 1.0], 0.9, 200.0, 10.0),
        ]));
        let client = RecognitionClient::new(recognizer, Duration::from_secs(1));

        assert!(matches!(
            client.extract_one(&blank_frame()).await,
            Err(RecognitionError::MultipleFaces { count: 2 })
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_as_unavailable() {
        let recognizer = Arc::new(ScriptedRecognizer::new());
        recognizer.push(Err(RecognitionError::Unavailable("connection refused".into())));
        let client = RecognitionClient::new(recognizer, Duration::from_secs(1));

        assert!(matches!(
            client.extract_one(&blank_frame()).await,
            Err(RecognitionError::Unavailable(_))
        ));
    }
}
