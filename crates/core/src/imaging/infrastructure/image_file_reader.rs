use std::path::Path;

use crate::imaging::domain::image_reader::ImageReader;
use crate::shared::frame::Frame;

/// Decodes any format the `image` crate supports and converts it to RGB8.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error + Send + Sync>> {
        let img = image::open(path)?.to_rgb8();
        Ok(Frame::from_rgb_image(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([50, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_read_returns_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), "test.png", 100, 80);
        let frame = ImageFileReader::new().read(&path).unwrap();
        assert_eq!(frame.width(), 100);
        assert_eq!(frame.height(), 80);
    }

    #[test]
    fn test_read_is_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), "test.png", 4, 4);
        let frame = ImageFileReader::new().read(&path).unwrap();
        assert_eq!(frame.pixel(0, 0), [50, 100, 200]);
    }

    #[test]
    fn test_read_converts_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(3, 3, image::Luma([77])).save(&path).unwrap();
        let frame = ImageFileReader::new().read(&path).unwrap();
        assert_eq!(frame.pixel(2, 2), [77, 77, 77]);
    }

    #[test]
    fn test_read_nonexistent_is_error() {
        assert!(ImageFileReader::new()
            .read(Path::new("/nonexistent/test.png"))
            .is_err());
    }

    #[test]
    fn test_read_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(ImageFileReader::new().read(&path).is_err());
    }
}
