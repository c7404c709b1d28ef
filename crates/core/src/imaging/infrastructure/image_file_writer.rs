use std::io::{BufWriter, Write};
use std::path::Path;

use image::ImageFormat;
use tempfile::NamedTempFile;

use crate::imaging::domain::image_writer::ImageWriter;
use crate::shared::frame::Frame;

/// Writes a frame with the `image` crate, encoding by the path's extension.
///
/// The image is encoded into a temporary file next to the destination and
/// renamed over it once fully written.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let format = ImageFormat::from_path(path)?;
        let img = frame
            .to_rgb_image()
            .ok_or("Failed to create image from frame data")?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            img.write_to(&mut out, format)?;
            out.flush()?;
        }
        tmp.persist(path)?;
        log::debug!("Wrote {}x{} image to {}", frame.width(), frame.height(), path.display());
        Ok(())
    }
}
