use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::detection::domain::face::Face;
use crate::detection::infrastructure::model_resolver::{self, ModelResolveError, ProgressFn};
use crate::detection::infrastructure::scrfd_detector::ScrfdDetector;
use crate::shared::constants::{DETECTOR_MODEL_PATH, RECOGNIZER_MODEL_PATH, SWAPPER_MODEL_PATH};
use crate::shared::frame::Frame;
use crate::swapping::domain::model_service::{ModelError, ModelService};

use super::arcface_embedder::ArcFaceEmbedder;
use super::inswapper::InSwapper;

/// Model Service backed by the insightface detector, recognizer and swapper
/// ONNX models.
pub struct OnnxModelService {
    detector: ScrfdDetector,
    embedder: ArcFaceEmbedder,
    swapper: InSwapper,
}

impl OnnxModelService {
    /// Resolves the three models under `root` (downloading missing ones from
    /// `base_url` when given) and builds their sessions.
    pub fn load(root: &Path, base_url: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(root).map_err(|e| ModelResolveError::CreateDir {
            path: root.to_path_buf(),
            source: e,
        })?;

        let fetch = |relative: &str| {
            model_resolver::resolve(root, relative, base_url, Some(log_progress(relative)))
        };
        let detector_path = fetch(DETECTOR_MODEL_PATH)?;
        let recognizer_path = fetch(RECOGNIZER_MODEL_PATH)?;
        let swapper_path = fetch(SWAPPER_MODEL_PATH)?;

        Ok(Self {
            detector: ScrfdDetector::new(&detector_path)?,
            embedder: ArcFaceEmbedder::new(&recognizer_path)?,
            swapper: InSwapper::new(&swapper_path)?,
        })
    }
}

impl ModelService for OnnxModelService {
    fn detect(&self, frame: &Frame) -> Result<Vec<Face>, ModelError> {
        self.detector
            .detect(frame)?
            .into_iter()
            .map(|face| {
                let embedding = self.embedder.embed(frame, &face)?;
                Ok(face.with_embedding(embedding))
            })
            .collect()
    }

    fn swap(&self, frame: &Frame, target: &Face, source: &Face, paste_back: bool) -> Result<Frame, ModelError> {
        let embedding = source
            .embedding
            .as_deref()
            .ok_or("source face has no identity embedding")?;
        self.swapper.swap(frame, target, embedding, paste_back)
    }
}

/// Logs download progress for `name` in 10% steps.
fn log_progress(name: &str) -> ProgressFn {
    let name = name.to_string();
    let last_step = AtomicU64::new(u64::MAX);
    Box::new(move |done, total| {
        if total == 0 {
            return;
        }
        let step = done * 10 / total;
        if last_step.swap(step, Ordering::Relaxed) != step {
            log::info!("{name}: {}%", step * 10);
        }
    })
}
