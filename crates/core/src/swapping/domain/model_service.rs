use crate::detection::domain::face::Face;
use crate::shared::frame::Frame;

/// Error type returned across the model service boundary.
pub type ModelError = Box<dyn std::error::Error + Send + Sync>;

/// Face detection and face swapping capability.
///
/// Constructed once per process and shared by reference with every job.
/// Implementations must not change their configuration in response to a
/// call, hence `&self`.
pub trait ModelService {
    /// Detects every face in `frame`, highest score first.
    ///
    /// No face is an empty vector, not an error.
    fn detect(&self, frame: &Frame) -> Result<Vec<Face>, ModelError>;

    /// Replaces `target` (a face of `frame`) with the identity of `source`.
    ///
    /// With `paste_back` the result is a full-size copy of `frame` with the
    /// swapped face composited in place; without it the result is the raw
    /// aligned swapped face crop.
    fn swap(
        &self,
        frame: &Frame,
        target: &Face,
        source: &Face,
        paste_back: bool,
    ) -> Result<Frame, ModelError>;
}
