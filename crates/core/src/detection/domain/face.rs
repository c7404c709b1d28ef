use super::face_landmarks::FaceLandmarks;

/// One detected face within a specific image.
///
/// Produced by the model service and owned by a single job; it has no
/// meaning outside the image it was detected in.
#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    /// `[x1, y1, x2, y2]` in image pixels.
    pub bbox: [f32; 4],
    pub score: f32,
    pub landmarks: FaceLandmarks,
    /// L2-normalized identity embedding, when the service computed one.
    pub embedding: Option<Vec<f32>>,
}

impl Face {
    pub fn new(bbox: [f32; 4], score: f32, landmarks: FaceLandmarks) -> Self {
        Self {
            bbox,
            score,
            landmarks,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> Face {
        Face::new(
            [10.0, 20.0, 110.0, 170.0],
            0.9,
            FaceLandmarks::new([[0.0; 2]; 5]),
        )
    }

    #[test]
    fn test_new_face_has_no_embedding() {
        assert!(face().embedding.is_none());
    }

    #[test]
    fn test_with_embedding_attaches_vector() {
        let f = face().with_embedding(vec![1.0, 0.0]);
        assert_eq!(f.embedding.as_deref(), Some(&[1.0, 0.0][..]));
    }
}
