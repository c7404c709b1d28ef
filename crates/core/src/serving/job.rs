use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One unit of work read from a single input line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Job {
    /// Opaque caller token, echoed back unchanged. `Null` when absent.
    #[serde(default)]
    pub request_id: Value,
    pub target_path: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Error, Debug)]
pub enum JobParseError {
    #[error("invalid request: empty line")]
    Empty,
    #[error("invalid request: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses one request line. Surrounding whitespace (including the line
/// terminator) is ignored, as are unknown fields.
pub fn parse_job(line: &str) -> Result<Job, JobParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(JobParseError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}
