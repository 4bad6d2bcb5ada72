use async_trait::async_trait;
use identikit_core::preprocess::{self, ToneTarget};
use identikit_core::{Embedding, FaceDetector, FaceRecognizer};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] identikit_core::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] identikit_core::recognizer::RecognizerError),
    #[error("No face detected")]
    NoFaceDetected,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Embedding of the most confident face in a probe.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub embedding: Embedding,
    /// Detector confidence of the face the embedding came from.
    pub confidence: f32,
}

/// Turns a photo into a face embedding.
///
/// The HTTP layer only sees this trait, so the ONNX engine can be swapped
/// for a fixture in router tests.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    async fn embed(&self, image: RgbImage) -> Result<FaceSample, EngineError>;

    /// Whether detection and recognition models are loaded.
    fn models_loaded(&self) -> bool;
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Embed {
        image: RgbImage,
        reply: oneshot::Sender<Result<FaceSample, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

#[async_trait]
impl FaceEmbedder for EngineHandle {
    async fn embed(&self, image: RgbImage) -> Result<FaceSample, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Embed { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    fn models_loaded(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Probe preparation parameters applied on the engine thread.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub size: u32,
    pub tone: ToneTarget,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads both ONNX models synchronously so startup fails fast when a model
/// is missing, then serves embed requests one at a time.
pub fn spawn_engine(
    scrfd_path: &str,
    arcface_path: &str,
    probe: ProbeSettings,
    queue: usize,
) -> Result<EngineHandle, EngineError> {
    let mut detector = FaceDetector::load(scrfd_path)?;
    tracing::info!(path = scrfd_path, "SCRFD detector loaded");

    let mut recognizer = FaceRecognizer::load(arcface_path)?;
    tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue);

    std::thread::Builder::new()
        .name("identikit-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Embed { image, reply } => {
                        let result = run_embed(&mut detector, &mut recognizer, &image, probe);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

/// Normalize the probe, detect faces, embed the most confident one.
fn run_embed(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    image: &RgbImage,
    probe: ProbeSettings,
) -> Result<FaceSample, EngineError> {
    let prepared = preprocess::prepare_probe(image, probe.size, probe.tone);

    let faces = detector.detect(&prepared)?;
    let face = faces.first().ok_or(EngineError::NoFaceDetected)?;
    tracing::debug!(
        faces = faces.len(),
        confidence = face.confidence,
        "embed: best face selected"
    );

    let embedding = recognizer.extract(&prepared, face)?;
    Ok(FaceSample {
        embedding,
        confidence: face.confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_fails_fast_without_models() {
        let probe = ProbeSettings { size: 320, tone: ToneTarget::default() };
        let err = spawn_engine("/nonexistent/det.onnx", "/nonexistent/rec.onnx", probe, 4)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Detector(_)));
    }

    #[tokio::test]
    async fn test_closed_channel_reports_engine_exit() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = EngineHandle { tx };
        assert!(!handle.models_loaded());
        let err = handle.embed(RgbImage::new(4, 4)).await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
    }
}
