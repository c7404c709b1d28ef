use std::path::PathBuf;

use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync>;

/// Job-level failure of the swap pipeline.
///
/// Every variant is reported back to the caller as a message; none of them
/// affects later jobs.
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("NO_FACES_DETECTED")]
    NoFacesDetected,
    #[error("no face detected in template {path}")]
    TemplateWithoutFace { path: PathBuf },
    #[error("failed to read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: Source,
    },
    #[error("face detection failed: {0}")]
    Detect(#[source] Source),
    #[error("face swap failed: {0}")]
    Swap(#[source] Source),
    #[error("failed to write image {path}: {source}")]
    WriteImage {
        path: PathBuf,
        #[source]
        source: Source,
    },
}
