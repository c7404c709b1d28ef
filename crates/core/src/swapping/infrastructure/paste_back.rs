use crate::shared::frame::Frame;

use super::alignment::AffineTransform;

/// Fraction of the crop side eroded from the mask before feathering starts.
const MASK_ERODE_RATIO: f32 = 0.1;
/// Fraction of the crop side over which the mask ramps from 0 to 1.
const MASK_FEATHER_RATIO: f32 = 0.1;

/// Composites `crop` back onto a copy of `frame`.
///
/// `transform` is the frame → crop mapping the crop was aligned with. Each
/// frame pixel covered by the crop is blended with the crop sample using a
/// mask that is zero near the crop border and one in its interior, so the
/// seam is feathered. Returns `None` if `transform` is not invertible.
pub fn paste_back(frame: &Frame, crop: &Frame, transform: &AffineTransform) -> Option<Frame> {
    let inv = transform.inverse()?;
    let mut out = frame.clone();

    let (cw, ch) = (crop.width() as f32, crop.height() as f32);
    let corners = [[0.0, 0.0], [cw, 0.0], [0.0, ch], [cw, ch]].map(|p| inv.apply(p));
    let (min_x, max_x) = span(corners.iter().map(|p| p[0]), frame.width());
    let (min_y, max_y) = span(corners.iter().map(|p| p[1]), frame.height());

    let side = cw.min(ch);
    let erode = side * MASK_ERODE_RATIO;
    let feather = (side * MASK_FEATHER_RATIO).max(1.0);

    for y in min_y..max_y {
        for x in min_x..max_x {
            let [cx, cy] = transform.apply([x as f32, y as f32]);
            let weight = mask_weight(cx, cy, cw, ch, erode, feather);
            if weight <= 0.0 {
                continue;
            }
            let fake = crop.sample_bilinear(cx, cy);
            let orig = frame.pixel(x, y);
            let mut blended = [0u8; 3];
            for c in 0..3 {
                let v = weight * fake[c] + (1.0 - weight) * orig[c] as f32;
                blended[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            out.set_pixel(x, y, blended);
        }
    }
    Some(out)
}

/// Integer pixel range `[lo, hi)` covering `values`, clamped to `[0, limit)`.
fn span(values: impl Iterator<Item = f32>, limit: u32) -> (u32, u32) {
    let (lo, hi) = values.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let lo = lo.floor().max(0.0) as u32;
    let hi = (hi.ceil() + 1.0).clamp(0.0, limit as f32) as u32;
    (lo.min(hi), hi)
}

/// Blend weight at crop position `(cx, cy)`.
fn mask_weight(cx: f32, cy: f32, cw: f32, ch: f32, erode: f32, feather: f32) -> f32 {
    if cx < 0.0 || cy < 0.0 || cx > cw - 1.0 || cy > ch - 1.0 {
        return 0.0;
    }
    let edge = cx.min(cy).min(cw - 1.0 - cx).min(ch - 1.0 - cy);
    ((edge - erode) / feather).clamp(0.0, 1.0)
}
