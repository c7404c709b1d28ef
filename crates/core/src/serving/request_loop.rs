use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use crate::pipeline::swap_image_use_case::SwapImageUseCase;
use crate::swapping::domain::model_service::ModelService;

use super::job::parse_job;
use super::response::{Response, TARGET_NOT_FOUND};

/// Counters reported when the input channel closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Serves jobs one line at a time until end of input.
///
/// Every line yields exactly one response. Successes are written to the
/// output channel, failures to the error channel, each flushed immediately.
/// A failing or panicking job never affects the next one.
pub struct RequestLoop {
    service: Box<dyn ModelService>,
    pipeline: SwapImageUseCase,
}

impl RequestLoop {
    pub fn new(service: Box<dyn ModelService>, pipeline: SwapImageUseCase) -> Self {
        Self { service, pipeline }
    }

    /// Runs until `input` is exhausted.
    ///
    /// Returns an error only if reading the input or writing a response
    /// fails; job failures are reported as responses.
    pub fn run(&mut self, mut input: impl BufRead, mut out: impl Write, mut err: impl Write) -> io::Result<LoopStats> {
        let mut stats = LoopStats::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            stats.received += 1;

            let line = String::from_utf8_lossy(&buf);
            let response = self.handle_line(&line);
            if response.is_error() {
                stats.failed += 1;
                response.write_line(&mut err)?;
            } else {
                stats.succeeded += 1;
                response.write_line(&mut out)?;
            }
        }
        log::info!(
            "Input closed after {} request(s): {} ok, {} failed",
            stats.received,
            stats.succeeded,
            stats.failed
        );
        Ok(stats)
    }

    fn handle_line(&mut self, line: &str) -> Response {
        let job = match parse_job(line) {
            Ok(job) => job,
            Err(e) => {
                log::debug!("Rejected request line: {e}");
                return Response::error(e.to_string(), Value::Null);
            }
        };

        if !job.target_path.is_file() {
            log::debug!("Target {} does not exist", job.target_path.display());
            return Response::error(TARGET_NOT_FOUND, job.request_id);
        }

        let service = self.service.as_ref();
        let pipeline = &mut self.pipeline;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pipeline.execute(service, &job.target_path, &job.output_path)
        }));

        match outcome {
            Ok(Ok(faces)) => {
                log::debug!(
                    "Request {} ok: {faces} face(s) -> {}",
                    job.request_id,
                    job.output_path.display()
                );
                Response::ok(job.request_id)
            }
            Ok(Err(e)) => {
                log::debug!("Request {} failed: {e}", job.request_id);
                Response::error(e.to_string(), job.request_id)
            }
            Err(payload) => {
                let message = format!("internal error: {}", panic_message(payload.as_ref()));
                log::debug!("Request {} panicked: {message}", job.request_id);
                Response::error(message, job.request_id)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
