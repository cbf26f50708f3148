//! Frame preprocessing — decode, validate, and size-normalize incoming media
//! before it is handed to the recognition service.
//!
//! A pure transform: bytes in, normalized RGB frame out. Frames too small to
//! contain a usable face are rejected here so no recognition call is wasted
//! on them.

use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{ImageError, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared encoding of an incoming frame. `Auto` sniffs the container
/// from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Jpeg,
    Png,
    Auto,
}

/// Raw image bytes as received from the transport layer. Immutable once
/// constructed; owned transiently by the pipeline call that consumes it.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub bytes: Vec<u8>,
    pub format: MediaFormat,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CaptureFrame {
    pub fn new(bytes: Vec<u8>, format: MediaFormat) -> Self {
        Self {
            bytes,
            format,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Size constraints applied during preprocessing.
#[derive(Debug, Clone)]
pub struct FramePolicy {
    /// Largest dimension below which a frame cannot contain a detectable face.
    pub min_dimension: u32,
    /// Largest dimension above which the frame is downscaled before inference.
    pub max_dimension: u32,
}

impl Default for FramePolicy {
    fn default() -> Self {
        Self {
            min_dimension: 160,
            max_dimension: 640,
        }
    }
}

/// A decoded, size-normalized frame: packed RGB8 pixels.
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The `InvalidMedia` family: the caller can recover by resubmitting a
/// well-formed frame.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("empty media payload")]
    EmptyPayload,
    #[error("unsupported media format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode media: {0}")]
    DecodeFailed(String),
    #[error("frame {width}x{height} is below the {min}px face-detectability minimum")]
    TooSmall { width: u32, height: u32, min: u32 },
}

/// Decode and size-normalize a captured frame.
///
/// Rejects zero-byte payloads, undecodable or mis-declared data, and frames
/// whose largest dimension is under `policy.min_dimension`. Frames larger
/// than `policy.max_dimension` are downscaled preserving aspect ratio.
pub fn preprocess(frame: &CaptureFrame, policy: &FramePolicy) -> Result<NormalizedFrame, MediaError> {
    if frame.bytes.is_empty() {
        return Err(MediaError::EmptyPayload);
    }

    let decoded = match frame.format {
        MediaFormat::Auto => image::load_from_memory(&frame.bytes),
        MediaFormat::Jpeg => image::load_from_memory_with_format(&frame.bytes, ImageFormat::Jpeg),
        MediaFormat::Png => image::load_from_memory_with_format(&frame.bytes, ImageFormat::Png),
    }
    .map_err(|e| match e {
        ImageError::Unsupported(u) => MediaError::UnsupportedFormat(u.to_string()),
        other => MediaError::DecodeFailed(other.to_string()),
    })?;

    let (width, height) = (decoded.width(), decoded.height());
    if width.max(height) < policy.min_dimension {
        return Err(MediaError::TooSmall {
            width,
            height,
            min: policy.min_dimension,
        });
    }

    let decoded = if width.max(height) > policy.max_dimension {
        tracing::debug!(
            width,
            height,
            max = policy.max_dimension,
            "downscaling frame before recognition"
        );
        decoded.resize(policy.max_dimension, policy.max_dimension, FilterType::Triangle)
    } else {
        decoded
    };

    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(NormalizedFrame {
        pixels: rgb.into_raw(),
        width,
        height,
    })
}
