//! identikit-core: face identification engine.
//!
//! Normalizes probe photos, detects faces with SCRFD, embeds them with
//! ArcFace (both via ONNX Runtime on the CPU) and matches the embeddings
//! against a gallery of enrolled person records.

pub mod alignment;
pub mod dataurl;
pub mod detector;
pub mod preprocess;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, Candidate, CosineMatcher, EnrolledFace, Embedding, MatchResult, Matcher,
    PersonRecord,
};

/// Default location of the ONNX model files.
///
/// `$XDG_DATA_HOME/identikit/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("identikit")
        .join("models")
}
