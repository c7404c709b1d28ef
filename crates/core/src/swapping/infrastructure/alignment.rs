//! Landmark-based face alignment.
//!
//! A least-squares similarity transform (rotation, uniform scale,
//! translation, no reflection) maps detected landmarks onto the canonical
//! ArcFace template; crops are produced by inverse-mapping every output
//! pixel and sampling the source bilinearly.

use crate::detection::domain::face_landmarks::NUM_LANDMARKS;
use crate::shared::frame::Frame;

/// Canonical 5-point landmark positions inside a 112×112 ArcFace crop.
pub const ARCFACE_TEMPLATE: [[f32; 2]; NUM_LANDMARKS] = [
    [38.2946, 51.6963],
    [73.5318, 51.5014],
    [56.0252, 71.7366],
    [41.5493, 92.3655],
    [70.7299, 92.2041],
];

/// ArcFace template scaled to a `size`-pixel crop.
///
/// Multiples of 112 scale the template directly; other sizes treat it as a
/// 128-pixel layout with an 8-pixel horizontal margin.
pub fn arcface_template(size: u32) -> [[f32; 2]; NUM_LANDMARKS] {
    let (ratio, diff_x) = if size % 112 == 0 {
        (size as f32 / 112.0, 0.0)
    } else {
        let ratio = size as f32 / 128.0;
        (ratio, 8.0 * ratio)
    };
    ARCFACE_TEMPLATE.map(|[x, y]| [x * ratio + diff_x, y * ratio])
}

/// 2×3 affine matrix `[[a, b, tx], [c, d, ty]]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    pub m: [[f32; 3]; 2],
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    /// Least-squares similarity transform taking `src` points onto `dst`.
    ///
    /// Returns `None` when the source points are degenerate (all equal).
    pub fn estimate_similarity(src: &[[f32; 2]], dst: &[[f32; 2]]) -> Option<Self> {
        let n = src.len().min(dst.len());
        if n == 0 {
            return None;
        }
        let mean = |pts: &[[f32; 2]]| {
            let (sx, sy) = pts[..n]
                .iter()
                .fold((0.0f64, 0.0f64), |(ax, ay), [x, y]| (ax + *x as f64, ay + *y as f64));
            (sx / n as f64, sy / n as f64)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut dot = 0.0f64;
        let mut cross = 0.0f64;
        let mut var = 0.0f64;
        for i in 0..n {
            let (ax, ay) = (src[i][0] as f64 - smx, src[i][1] as f64 - smy);
            let (bx, by) = (dst[i][0] as f64 - dmx, dst[i][1] as f64 - dmy);
            dot += ax * bx + ay * by;
            cross += ax * by - ay * bx;
            var += ax * ax + ay * ay;
        }
        if var <= f64::EPSILON {
            return None;
        }

        // scale * cos(theta), scale * sin(theta)
        let a = dot / var;
        let b = cross / var;
        let tx = dmx - (a * smx - b * smy);
        let ty = dmy - (b * smx + a * smy);
        Some(Self {
            m: [
                [a as f32, -b as f32, tx as f32],
                [b as f32, a as f32, ty as f32],
            ],
        })
    }

    pub fn apply(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        let m = &self.m;
        [
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        ]
    }

    pub fn inverse(&self) -> Option<Self> {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det.abs() <= f32::EPSILON {
            return None;
        }
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        Some(Self {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }
}

/// Transform mapping `landmarks` onto the ArcFace template for a `size` crop.
pub fn align_to_template(landmarks: &[[f32; 2]; NUM_LANDMARKS], size: u32) -> Option<AffineTransform> {
    AffineTransform::estimate_similarity(landmarks, &arcface_template(size))
}

/// Warp `frame` through `transform` (frame → output coordinates) into a new
/// `width` × `height` frame. Pixels mapping outside `frame` are black.
pub fn warp_affine(frame: &Frame, transform: &AffineTransform, width: u32, height: u32) -> Option<Frame> {
    let inv = transform.inverse()?;
    let mut out = Frame::filled(width, height, [0, 0, 0]);
    for y in 0..height {
        for x in 0..width {
            let [sx, sy] = inv.apply([x as f32, y as f32]);
            let px = frame.sample_bilinear(sx, sy);
            out.set_pixel(x, y, px.map(|v| v.round().clamp(0.0, 255.0) as u8));
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_point_eq(a: [f32; 2], b: [f32; 2]) {
        assert_relative_eq!(a[0], b[0], epsilon = 1e-3);
        assert_relative_eq!(a[1], b[1], epsilon = 1e-3);
    }

    #[test]
    fn test_template_for_112_is_canonical() {
        assert_eq!(arcface_template(112), ARCFACE_TEMPLATE);
    }

    #[test]
    fn test_template_for_128_is_shifted_right() {
        let t = arcface_template(128);
        assert_point_eq(t[0], [38.2946 + 8.0, 51.6963]);
        assert_point_eq(t[4], [70.7299 + 8.0, 92.2041]);
    }

    #[test]
    fn test_template_for_224_doubles() {
        let t = arcface_template(224);
        assert_point_eq(t[2], [56.0252 * 2.0, 71.7366 * 2.0]);
    }

    #[test]
    fn test_estimate_identity() {
        let t = AffineTransform::estimate_similarity(&ARCFACE_TEMPLATE, &ARCFACE_TEMPLATE).unwrap();
        let id = AffineTransform::identity();
        for r in 0..2 {
            for c in 0..3 {
                assert_relative_eq!(t.m[r][c], id.m[r][c], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_estimate_recovers_rotation_scale_translation() {
        // Rotate 90 degrees, scale 2, translate (10, -5).
        let known = AffineTransform {
            m: [[0.0, -2.0, 10.0], [2.0, 0.0, -5.0]],
        };
        let src = ARCFACE_TEMPLATE;
        let dst = src.map(|p| known.apply(p));
        let t = AffineTransform::estimate_similarity(&src, &dst).unwrap();
        for p in src {
            assert_point_eq(t.apply(p), known.apply(p));
        }
    }

    #[test]
    fn test_estimate_degenerate_points() {
        let src = [[5.0, 5.0]; 5];
        assert!(AffineTransform::estimate_similarity(&src, &ARCFACE_TEMPLATE).is_none());
    }

    #[test]
    fn test_inverse_round_trips_points() {
        let t = AffineTransform {
            m: [[0.8, -0.6, 12.0], [0.6, 0.8, -3.0]],
        };
        let inv = t.inverse().unwrap();
        let p = [17.0, 42.0];
        assert_point_eq(inv.apply(t.apply(p)), p);
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let t = AffineTransform {
            m: [[1.0, 2.0, 0.0], [2.0, 4.0, 0.0]],
        };
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_align_to_template_maps_landmarks_onto_template() {
        let landmarks = ARCFACE_TEMPLATE.map(|[x, y]| [x * 3.0 + 100.0, y * 3.0 + 50.0]);
        let t = align_to_template(&landmarks, 112).unwrap();
        for (src, dst) in landmarks.iter().zip(ARCFACE_TEMPLATE.iter()) {
            assert_point_eq(t.apply(*src), *dst);
        }
    }

    #[test]
    fn test_warp_translation_moves_pixels() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0]);
        frame.set_pixel(5, 5, [200, 100, 50]);
        let shift = AffineTransform {
            m: [[1.0, 0.0, -3.0], [0.0, 1.0, -2.0]],
        };
        let out = warp_affine(&frame, &shift, 6, 6).unwrap();
        assert_eq!(out.pixel(2, 3), [200, 100, 50]);
        assert_eq!(out.pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_warp_outside_source_is_black() {
        let frame = Frame::filled(4, 4, [255, 255, 255]);
        let far = AffineTransform {
            m: [[1.0, 0.0, 100.0], [0.0, 1.0, 100.0]],
        };
        let out = warp_affine(&frame, &far, 4, 4).unwrap();
        assert!(out.data().iter().all(|v| *v == 0));
    }
}
