//! 5-point face landmarks in image pixel coordinates.
//!
//! Point order is fixed: left eye, right eye, nose, left mouth corner,
//! right mouth corner. Alignment templates use the same order.

pub const NUM_LANDMARKS: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    points: [[f32; 2]; NUM_LANDMARKS],
}

impl FaceLandmarks {
    pub fn new(points: [[f32; 2]; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[[f32; 2]; NUM_LANDMARKS] {
        &self.points
    }

    /// Landmarks with every coordinate multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.points.map(|[x, y]| [x * factor, y * factor]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmarks() -> FaceLandmarks {
        FaceLandmarks::new([
            [10.0, 20.0],
            [40.0, 20.0],
            [25.0, 35.0],
            [15.0, 50.0],
            [35.0, 50.0],
        ])
    }

    #[test]
    fn test_scaled_multiplies_all_points() {
        let scaled = landmarks().scaled(0.5);
        assert_eq!(scaled.points()[0], [5.0, 10.0]);
        assert_eq!(scaled.points()[4], [17.5, 25.0]);
    }

    #[test]
    fn test_scaled_by_one_is_unchanged() {
        assert_eq!(landmarks().scaled(1.0), landmarks());
    }
}
