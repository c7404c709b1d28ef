/// ArcFace identity embedder (`w600k_r50`) using ONNX Runtime.
///
/// Aligns a detected face to the 112×112 template and returns its
/// L2-normalized 512-d embedding.
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::detection::domain::face::Face;
use crate::detection::infrastructure::onnx_session::load_session;
use crate::shared::constants::{EMBEDDING_DIM, RECOGNIZER_INPUT_SIZE};
use crate::shared::frame::Frame;
use crate::swapping::domain::model_service::ModelError;

use super::alignment::{align_to_template, warp_affine};

const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct ArcFaceEmbedder {
    session: Mutex<ort::session::Session>,
}

impl ArcFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: Mutex::new(load_session(model_path)?),
        })
    }

    /// Normalized embedding of `face` as it appears in `frame`.
    pub fn embed(&self, frame: &Frame, face: &Face) -> Result<Vec<f32>, ModelError> {
        let size = RECOGNIZER_INPUT_SIZE;
        let transform = align_to_template(face.landmarks.points(), size)
            .ok_or("face landmarks are degenerate")?;
        let crop = warp_affine(frame, &transform, size, size).ok_or("alignment is not invertible")?;

        let input_value = ort::value::Tensor::from_array(preprocess(&crop))?;
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;

        let mut embedding: Vec<f32> = embedding_array.iter().copied().collect();
        if embedding.len() != EMBEDDING_DIM {
            return Err(format!(
                "recognizer produced {} values, expected {EMBEDDING_DIM}",
                embedding.len()
            )
            .into());
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Aligned RGB crop to NCHW, normalized to [-1, 1].
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let img = crop.as_ndarray();
    let (h, w) = (crop.height() as usize, crop.width() as usize);
    ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
        (img[[y, x, c]] as f32 - NORM_MEAN) / NORM_STD
    })
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
