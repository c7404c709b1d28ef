/// `inswapper_128` face swapper using ONNX Runtime.
///
/// The target face is aligned to a 128×128 crop, the source identity is
/// projected through the model's embedding map, and the generated crop is
/// optionally composited back onto the full frame.
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use ndarray::{Array2, ArrayView1, ArrayView4, Axis, Ix4};

use crate::detection::domain::face::Face;
use crate::detection::infrastructure::onnx_session::load_session;
use crate::shared::constants::{EMBEDDING_DIM, SWAPPER_INPUT_SIZE};
use crate::shared::frame::Frame;
use crate::swapping::domain::model_service::ModelError;

use super::alignment::{align_to_template, warp_affine};
use super::arcface_embedder::l2_normalize;
use super::onnx_initializer::read_last_initializer;
use super::paste_back::paste_back;

pub struct InSwapper {
    session: Mutex<ort::session::Session>,
    emap: Array2<f32>,
}

impl InSwapper {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;
        let initializer = read_last_initializer(model_path)?;
        let name = initializer.name.clone();
        let emap = initializer
            .into_array2()
            .filter(|m| m.dim() == (EMBEDDING_DIM, EMBEDDING_DIM))
            .ok_or_else(|| {
                format!("initializer '{name}' is not a {EMBEDDING_DIM}x{EMBEDDING_DIM} embedding map")
            })?;
        log::debug!("Loaded embedding map '{name}' from {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            emap,
        })
    }

    /// Replaces the identity of `target` in `frame` with the identity of
    /// `source_embedding` (a normalized recognizer embedding).
    ///
    /// Returns the full frame when `paste_back` is set, else the raw
    /// 128×128 generated crop.
    pub fn swap(
        &self,
        frame: &Frame,
        target: &Face,
        source_embedding: &[f32],
        paste: bool,
    ) -> Result<Frame, ModelError> {
        let size = SWAPPER_INPUT_SIZE;
        let transform = align_to_template(target.landmarks.points(), size)
            .ok_or("target face landmarks are degenerate")?;
        let crop = warp_affine(frame, &transform, size, size).ok_or("alignment is not invertible")?;

        let latent = source_latent(source_embedding, &self.emap)?;
        let target_value = ort::value::Tensor::from_array(preprocess(&crop))?;
        let source_value = ort::value::Tensor::from_array(latent)?;

        let fake = {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let outputs = session.run(ort::inputs![target_value, source_value])?;
            let pred = outputs[0].try_extract_array::<f32>()?;
            postprocess(pred.into_dimensionality::<Ix4>()?)?
        };

        if !paste {
            return Ok(fake);
        }
        Ok(paste_back(frame, &fake, &transform).ok_or("alignment is not invertible")?)
    }
}

/// Source identity in the swapper's latent space: `normalize(e · emap)`,
/// shaped `(1, D)`.
fn source_latent(embedding: &[f32], emap: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
    if embedding.len() != emap.nrows() {
        return Err(format!(
            "source embedding has {} values, embedding map expects {}",
            embedding.len(),
            emap.nrows()
        )
        .into());
    }
    let mut latent = ArrayView1::from(embedding).dot(emap);
    if let Some(values) = latent.as_slice_mut() {
        l2_normalize(values);
    }
    Ok(latent.insert_axis(Axis(0)))
}

/// Aligned RGB crop to NCHW in [0, 1].
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let img = crop.as_ndarray();
    let (h, w) = (crop.height() as usize, crop.width() as usize);
    ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| img[[y, x, c]] as f32 / 255.0)
}

/// NCHW output in [0, 1] to an RGB frame.
fn postprocess(pred: ArrayView4<'_, f32>) -> Result<Frame, ModelError> {
    let (n, c, h, w) = pred.dim();
    if n < 1 || c != 3 {
        return Err(format!("swapper output has shape {:?}, expected [1, 3, H, W]", pred.shape()).into());
    }
    let mut frame = Frame::filled(w as u32, h as u32, [0, 0, 0]);
    for y in 0..h {
        for x in 0..w {
            let px = [0, 1, 2].map(|ch| (pred[[0, ch, y, x]] * 255.0).round().clamp(0.0, 255.0) as u8);
            frame.set_pixel(x as u32, y as u32, px);
        }
    }
    Ok(frame)
}
