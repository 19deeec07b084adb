//! rollcall-core: face recognition and distance gating for attendance sessions.
//!
//! Uses SCRFD for face detection and ArcFace for embeddings, both running via
//! ONNX Runtime on the CPU, behind the [`FaceDetect`] and [`FaceEmbed`]
//! capabilities so callers can substitute their own implementations.

pub mod alignment;
pub mod catalog;
pub mod detector;
pub mod distance;
pub mod recognizer;
pub mod types;

pub use catalog::{FaceCatalog, MatchMetric, MatchOutcome, Matcher, ThresholdMatcher, UNKNOWN_LABEL};
pub use detector::{DetectorError, FaceDetect, ScrfdDetector};
pub use distance::{DistanceEstimator, DistanceStatus};
pub use recognizer::{ArcFaceEmbedder, FaceEmbed, RecognizerError};
pub use types::{BoundingBox, Embedding, FaceTemplate};

use std::path::PathBuf;

/// SCRFD detection model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
