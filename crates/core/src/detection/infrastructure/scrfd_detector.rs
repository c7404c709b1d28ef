/// SCRFD face detector (`det_10g`) using ONNX Runtime via `ort`.
///
/// Handles aspect-preserving resize, inference, anchor decoding of the
/// three stride heads, NMS, and mapping back to frame coordinates.
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use image::imageops::{self, FilterType};

use crate::detection::domain::face::Face;
use crate::detection::domain::face_landmarks::{FaceLandmarks, NUM_LANDMARKS};
use crate::shared::constants::{
    DETECTOR_INPUT_SIZE, DETECTOR_NMS_THRESHOLD, DETECTOR_SCORE_THRESHOLD,
};
use crate::shared::frame::Frame;
use crate::swapping::domain::model_service::ModelError;

use super::math::nms;
use super::onnx_session::load_session;

/// Feature strides of the three detection heads, in output order.
const STRIDES: [u32; 3] = [8, 16, 32];

/// Anchors per feature-map cell.
const ANCHORS_PER_CELL: usize = 2;

const INPUT_MEAN: f32 = 127.5;
const INPUT_STD: f32 = 128.0;

pub struct ScrfdDetector {
    session: Mutex<ort::session::Session>,
    input_size: u32,
    score_threshold: f32,
    nms_threshold: f32,
}

impl ScrfdDetector {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: Mutex::new(load_session(model_path)?),
            input_size: DETECTOR_INPUT_SIZE,
            score_threshold: DETECTOR_SCORE_THRESHOLD,
            nms_threshold: DETECTOR_NMS_THRESHOLD,
        })
    }

    /// Detects faces, highest score first. Embeddings are not filled in.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<Face>, ModelError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        // 1. Preprocess
        let (input_tensor, det_scale) = preprocess(frame, self.input_size)?;

        // 2. Inference: scores, boxes, keypoints for each stride
        let heads = {
            let input_value = ort::value::Tensor::from_array(input_tensor)?;
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let outputs = session.run(ort::inputs![input_value])?;
            let expected = STRIDES.len() * 3;
            if outputs.len() < expected {
                return Err(format!(
                    "SCRFD model produced {} outputs, expected {expected}",
                    outputs.len()
                )
                .into());
            }
            let mut heads = Vec::with_capacity(expected);
            for i in 0..expected {
                let array = outputs[i].try_extract_array::<f32>()?;
                heads.push(array.iter().copied().collect::<Vec<f32>>());
            }
            heads
        };

        // 3. Decode, 4. NMS, 5. back to frame coordinates
        let candidates = decode(&heads, self.input_size, self.score_threshold)?;
        Ok(finalize(candidates, det_scale, self.nms_threshold))
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize a frame into the top-left corner of a `size` × `size` canvas.
///
/// Returns `(NCHW float32 tensor, det_scale)` where `det_scale` maps frame
/// pixels to input pixels.
fn preprocess(frame: &Frame, size: u32) -> Result<(ndarray::Array4<f32>, f32), ModelError> {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);
    let (new_w, new_h) = if fh / fw > 1.0 {
        (((size as f32) * fw / fh) as u32, size)
    } else {
        (size, ((size as f32) * fh / fw) as u32)
    };
    let (new_w, new_h) = (new_w.max(1), new_h.max(1));
    let det_scale = new_h as f32 / fh;

    let img = frame
        .to_rgb_image()
        .ok_or("frame buffer does not match its dimensions")?;
    let resized = imageops::resize(&img, new_w, new_h, FilterType::Triangle);

    let pad = (0.0 - INPUT_MEAN) / INPUT_STD;
    let side = size as usize;
    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, side, side), pad);
    for (x, y, px) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (px.0[c] as f32 - INPUT_MEAN) / INPUT_STD;
        }
    }
    Ok((tensor, det_scale))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
struct Candidate {
    bbox: [f32; 4],
    score: f32,
    landmarks: [[f32; 2]; NUM_LANDMARKS],
}

/// Decode the per-stride heads (`[scores.., boxes.., keypoints..]`) into
/// candidates in input-tensor coordinates.
fn decode(heads: &[Vec<f32>], input_size: u32, threshold: f32) -> Result<Vec<Candidate>, ModelError> {
    let n_strides = STRIDES.len();
    let mut candidates = Vec::new();

    for (k, &stride) in STRIDES.iter().enumerate() {
        let scores = &heads[k];
        let boxes = &heads[k + n_strides];
        let kps = &heads[k + 2 * n_strides];

        let fm = (input_size / stride) as usize;
        let anchors = fm * fm * ANCHORS_PER_CELL;
        if scores.len() < anchors
            || boxes.len() < anchors * 4
            || kps.len() < anchors * NUM_LANDMARKS * 2
        {
            return Err(format!("SCRFD head for stride {stride} is smaller than {anchors} anchors").into());
        }

        let s = stride as f32;
        for idx in 0..anchors {
            let score = scores[idx];
            if score < threshold {
                continue;
            }
            let cell = idx / ANCHORS_PER_CELL;
            let cx = (cell % fm) as f32 * s;
            let cy = (cell / fm) as f32 * s;

            let d = &boxes[idx * 4..idx * 4 + 4];
            let bbox = [cx - d[0] * s, cy - d[1] * s, cx + d[2] * s, cy + d[3] * s];

            let k = &kps[idx * NUM_LANDMARKS * 2..(idx + 1) * NUM_LANDMARKS * 2];
            let mut landmarks = [[0.0f32; 2]; NUM_LANDMARKS];
            for (i, point) in landmarks.iter_mut().enumerate() {
                *point = [cx + k[i * 2] * s, cy + k[i * 2 + 1] * s];
            }

            candidates.push(Candidate {
                bbox,
                score,
                landmarks,
            });
        }
    }
    Ok(candidates)
}

/// NMS, then rescale survivors from input pixels to frame pixels.
fn finalize(candidates: Vec<Candidate>, det_scale: f32, nms_threshold: f32) -> Vec<Face> {
    let boxes: Vec<[f32; 4]> = candidates.iter().map(|c| c.bbox).collect();
    let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    let inv = 1.0 / det_scale;

    nms(&boxes, &scores, nms_threshold)
        .into_iter()
        .map(|i| {
            let c = &candidates[i];
            Face::new(
                c.bbox.map(|v| v * inv),
                c.score,
                FaceLandmarks::new(c.landmarks).scaled(inv),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Empty heads for an input of `size`, all scores zero.
    fn empty_heads(size: u32) -> Vec<Vec<f32>> {
        let mut heads = vec![Vec::new(); 9];
        for (k, &stride) in STRIDES.iter().enumerate() {
            let fm = (size / stride) as usize;
            let anchors = fm * fm * ANCHORS_PER_CELL;
            heads[k] = vec![0.0; anchors];
            heads[k + 3] = vec![0.0; anchors * 4];
            heads[k + 6] = vec![0.0; anchors * 10];
        }
        heads
    }

    #[test]
    fn test_preprocess_wide_frame_scales_to_width() {
        let frame = Frame::filled(200, 100, [128, 128, 128]);
        let (tensor, det_scale) = preprocess(&frame, 64).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_relative_eq!(det_scale, 0.32);
    }

    #[test]
    fn test_preprocess_tall_frame_scales_to_height() {
        let frame = Frame::filled(50, 100, [128, 128, 128]);
        let (_, det_scale) = preprocess(&frame, 64).unwrap();
        assert_relative_eq!(det_scale, 0.64);
    }

    #[test]
    fn test_preprocess_pads_bottom_right() {
        let frame = Frame::filled(100, 50, [255, 255, 255]);
        let (tensor, _) = preprocess(&frame, 64).unwrap();

        // Image occupies the top 32 rows.
        let expected = (255.0 - INPUT_MEAN) / INPUT_STD;
        assert_relative_eq!(tensor[[0, 0, 0, 0]], expected, epsilon = 1e-3);

        let pad = (0.0 - INPUT_MEAN) / INPUT_STD;
        assert_relative_eq!(tensor[[0, 2, 63, 63]], pad);
    }

    #[test]
    fn test_decode_no_scores_above_threshold() {
        let heads = empty_heads(64);
        assert!(decode(&heads, 64, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_decode_maps_anchor_to_box_and_landmarks() {
        let mut heads = empty_heads(64);
        // Stride 8, fm = 8: anchor index 2 * (row 1 * 8 + col 2) + 1.
        let idx = 2 * (8 + 2) + 1;
        heads[0][idx] = 0.9;
        heads[3][idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 2.0, 2.0]);
        heads[6][idx * 10] = 0.5;
        heads[6][idx * 10 + 1] = -0.5;

        let candidates = decode(&heads, 64, 0.5).unwrap();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        // Anchor center = (16, 8).
        assert_eq!(c.bbox, [8.0, 0.0, 32.0, 24.0]);
        assert_eq!(c.landmarks[0], [20.0, 4.0]);
        assert_eq!(c.landmarks[1], [16.0, 8.0]);
        assert_relative_eq!(c.score, 0.9);
    }

    #[test]
    fn test_decode_uses_stride_of_each_head() {
        let mut heads = empty_heads(64);
        // Stride 32, fm = 2: first anchor of cell (col 1, row 1).
        let idx = 2 * (2 + 1);
        heads[2][idx] = 0.7;
        heads[5][idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);

        let candidates = decode(&heads, 64, 0.5).unwrap();
        assert_eq!(candidates[0].bbox, [16.0, 16.0, 48.0, 48.0]);
    }

    #[test]
    fn test_decode_rejects_short_heads() {
        let mut heads = empty_heads(64);
        heads[1].truncate(3);
        assert!(decode(&heads, 64, 0.5).is_err());
    }

    #[test]
    fn test_finalize_rescales_and_orders_by_score() {
        let candidates = vec![
            Candidate {
                bbox: [0.0, 0.0, 10.0, 10.0],
                score: 0.6,
                landmarks: [[5.0, 5.0]; 5],
            },
            Candidate {
                bbox: [20.0, 20.0, 30.0, 30.0],
                score: 0.9,
                landmarks: [[25.0, 25.0]; 5],
            },
            // Overlaps the first one heavily, lower score.
            Candidate {
                bbox: [1.0, 1.0, 10.0, 10.0],
                score: 0.55,
                landmarks: [[5.0, 5.0]; 5],
            },
        ];
        let faces = finalize(candidates, 0.5, 0.4);
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].bbox, [40.0, 40.0, 60.0, 60.0]);
        assert_eq!(faces[0].landmarks.points()[0], [50.0, 50.0]);
        assert_eq!(faces[1].bbox, [0.0, 0.0, 20.0, 20.0]);
    }
}
