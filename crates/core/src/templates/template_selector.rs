use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::detection::domain::face::Face;
use crate::imaging::domain::image_reader::ImageReader;
use crate::pipeline::swap_error::SwapError;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::swapping::domain::model_service::ModelService;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to read template directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no template images found in {path}")]
    Empty { path: PathBuf },
    #[error("template list is empty")]
    NoTemplates,
}

/// Supplies the replacement identity for each job.
///
/// Picks one template of a fixed pool uniformly at random and returns the
/// first face detected in it. With caching enabled, a template's face is
/// detected once and reused; failures are retried on the next pick.
pub struct TemplateSelector {
    paths: Vec<PathBuf>,
    reader: Box<dyn ImageReader>,
    rng: StdRng,
    cache: Option<HashMap<usize, Face>>,
}

impl TemplateSelector {
    /// Builds a selector over a non-empty list of template paths.
    pub fn new(paths: Vec<PathBuf>, reader: Box<dyn ImageReader>) -> Result<Self, TemplateError> {
        if paths.is_empty() {
            return Err(TemplateError::NoTemplates);
        }
        Ok(Self {
            paths,
            reader,
            rng: StdRng::from_entropy(),
            cache: None,
        })
    }

    /// Builds a selector over every image file in `dir`, sorted by name.
    pub fn from_dir(dir: &Path, reader: Box<dyn ImageReader>) -> Result<Self, TemplateError> {
        let read_err = |e| TemplateError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        if paths.is_empty() {
            return Err(TemplateError::Empty {
                path: dir.to_path_buf(),
            });
        }
        log::info!("Found {} template(s) in {}", paths.len(), dir.display());
        Self::new(paths, reader)
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(HashMap::new);
        self
    }

    /// Makes selection deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Reference face of a randomly chosen template.
    pub fn select(&mut self, service: &dyn ModelService) -> Result<Face, SwapError> {
        let index = self.rng.gen_range(0..self.paths.len());
        self.face_at(index, service)
    }

    /// Detects every template once so later selections hit the cache.
    ///
    /// Templates that fail are logged and left uncached. Returns the number
    /// of templates with a usable face. Does nothing without caching.
    pub fn warm(&mut self, service: &dyn ModelService) -> usize {
        if self.cache.is_none() {
            return 0;
        }
        let mut ready = 0;
        for index in 0..self.paths.len() {
            match self.face_at(index, service) {
                Ok(_) => ready += 1,
                Err(e) => log::warn!("Template unusable: {e}"),
            }
        }
        log::info!("Warmed {ready}/{} template(s)", self.paths.len());
        ready
    }

    fn face_at(&mut self, index: usize, service: &dyn ModelService) -> Result<Face, SwapError> {
        if let Some(face) = self.cache.as_ref().and_then(|c| c.get(&index)) {
            return Ok(face.clone());
        }

        let path = &self.paths[index];
        let frame = self.reader.read(path).map_err(|e| SwapError::ReadImage {
            path: path.clone(),
            source: e,
        })?;
        let face = service
            .detect(&frame)
            .map_err(SwapError::Detect)?
            .into_iter()
            .next()
            .ok_or_else(|| SwapError::TemplateWithoutFace { path: path.clone() })?;
        log::debug!("Template {} face score {:.3}", path.display(), face.score);

        if let Some(cache) = self.cache.as_mut() {
            cache.insert(index, face.clone());
        }
        Ok(face)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
