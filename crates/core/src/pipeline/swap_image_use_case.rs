use std::path::Path;
use std::time::Instant;

use crate::imaging::domain::image_reader::ImageReader;
use crate::imaging::domain::image_writer::ImageWriter;
use crate::pipeline::swap_error::SwapError;
use crate::swapping::domain::model_service::ModelService;
use crate::templates::template_selector::TemplateSelector;

/// Single-image swap pipeline: read → detect → pick template → swap each
/// face → write.
pub struct SwapImageUseCase {
    reader: Box<dyn ImageReader>,
    writer: Box<dyn ImageWriter>,
    selector: TemplateSelector,
}

impl SwapImageUseCase {
    pub fn new(reader: Box<dyn ImageReader>, writer: Box<dyn ImageWriter>, selector: TemplateSelector) -> Self {
        Self {
            reader,
            writer,
            selector,
        }
    }

    /// Swaps every face of the image at `target` with a template identity
    /// and writes the result to `output`. Returns the number of faces swapped.
    ///
    /// Swaps accumulate on one working copy, in detection order. Nothing is
    /// written unless every step succeeds.
    pub fn execute(&mut self, service: &dyn ModelService, target: &Path, output: &Path) -> Result<usize, SwapError> {
        let start = Instant::now();
        let mut working = self.reader.read(target).map_err(|e| SwapError::ReadImage {
            path: target.to_path_buf(),
            source: e,
        })?;
        log::debug!("read {}: {:?}", target.display(), start.elapsed());

        let start = Instant::now();
        let faces = service.detect(&working).map_err(SwapError::Detect)?;
        log::debug!("detect: {} face(s) in {:?}", faces.len(), start.elapsed());
        if faces.is_empty() {
            return Err(SwapError::NoFacesDetected);
        }

        let replacement = self.selector.select(service)?;

        let start = Instant::now();
        for face in &faces {
            working = service
                .swap(&working, face, &replacement, true)
                .map_err(SwapError::Swap)?;
        }
        log::debug!("swap: {:?}", start.elapsed());

        let start = Instant::now();
        self.writer
            .write(output, &working)
            .map_err(|e| SwapError::WriteImage {
                path: output.to_path_buf(),
                source: e,
            })?;
        log::debug!("write {}: {:?}", output.display(), start.elapsed());

        Ok(faces.len())
    }
}
