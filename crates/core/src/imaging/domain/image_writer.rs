use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single frame to an image file.
pub trait ImageWriter: Send {
    /// Writes `frame` to `path`. A failed write leaves no file at `path`.
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
