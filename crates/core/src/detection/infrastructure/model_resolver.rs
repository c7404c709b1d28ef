use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{ASSETS_ROOT_ENV, DEFAULT_ASSETS_DIR};

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create model directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model not found at {path}; place it there or set FACESWAP_MODEL_URL to download it")]
    Missing { path: PathBuf },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Model asset root: `$INSIGHTFACE_HOME`, else `~/.insightface`.
pub fn assets_root_from_env() -> PathBuf {
    assets_root(std::env::var_os(ASSETS_ROOT_ENV), dirs::home_dir())
}

fn assets_root(configured: Option<OsString>, home: Option<PathBuf>) -> PathBuf {
    match configured {
        Some(root) if !root.is_empty() => PathBuf::from(root),
        _ => home
            .map(|h| h.join(DEFAULT_ASSETS_DIR))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR)),
    }
}

/// Resolve a model file stored at `root/relative`.
///
/// An existing file is returned as is. A missing file is downloaded from
/// `base_url/relative` when a base URL is given, and is an error otherwise.
pub fn resolve(
    root: &Path,
    relative: &str,
    base_url: Option<&str>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let path = root.join(relative);
    if path.is_file() {
        return Ok(path);
    }

    let Some(base_url) = base_url else {
        return Err(ModelResolveError::Missing { path });
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ModelResolveError::CreateDir {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let url = model_url(base_url, relative);
    log::info!("Downloading {url} to {}", path.display());
    download(&url, &path, progress)?;
    Ok(path)
}

fn model_url(base_url: &str, relative: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), relative)
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    // Clean up .part file on any error
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let write_err = |e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(temp_path).map_err(write_err)?;

    // Swapper weights are several hundred MB; stream instead of buffering.
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
