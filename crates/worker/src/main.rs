use std::error::Error;
use std::io::{self, BufRead, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};

use faceswap_core::detection::infrastructure::model_resolver;
use faceswap_core::imaging::infrastructure::image_file_reader::ImageFileReader;
use faceswap_core::imaging::infrastructure::image_file_writer::ImageFileWriter;
use faceswap_core::pipeline::swap_image_use_case::SwapImageUseCase;
use faceswap_core::serving::request_loop::RequestLoop;
use faceswap_core::shared::constants::INIT_CONFIRMATION;
use faceswap_core::shared::output_guard::with_silenced_output;
use faceswap_core::swapping::domain::model_service::ModelService;
use faceswap_core::swapping::infrastructure::onnx_model_service::OnnxModelService;
use faceswap_core::templates::template_selector::TemplateSelector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Read jobs from stdin until it closes.
    Serve,
    /// Load (and fetch) the models, print a confirmation and exit.
    Init,
}

/// Face-swap worker reading one JSON job per line on stdin.
#[derive(Parser, Debug)]
#[command(name = "faceswap-worker")]
struct Cli {
    #[arg(value_enum, default_value_t = Mode::Serve)]
    mode: Mode,

    /// Root directory holding the model files.
    #[arg(long, env = "INSIGHTFACE_HOME")]
    assets_root: Option<PathBuf>,

    /// Base URL missing model files are downloaded from.
    #[arg(long, env = "FACESWAP_MODEL_URL")]
    model_url: Option<String>,

    /// Directory of replacement-identity template images.
    #[arg(long, default_value = "templates")]
    templates_dir: PathBuf,

    /// Detect template faces once at startup and reuse them.
    #[arg(long)]
    cache_templates: bool,

    /// Keep stdout/stderr visible while the models load.
    #[arg(long)]
    show_init_output: bool,
}

type LoadResult = Result<Box<dyn ModelService>, Box<dyn Error>>;

fn main() {
    env_logger::init();
    // Job panics become error responses; keep the default hook from
    // printing non-JSON text on the error channel.
    panic::set_hook(Box::new(|info| log::debug!("{info}")));

    let cli = Cli::parse();
    if let Err(e) = run(&cli, load_onnx, io::stdin().lock(), io::stdout().lock(), io::stderr()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_onnx(root: &Path, model_url: Option<&str>) -> LoadResult {
    Ok(Box::new(OnnxModelService::load(root, model_url)?))
}

/// Loads the models, then either confirms and returns or serves `input`
/// until it closes.
fn run(
    cli: &Cli,
    load: impl FnOnce(&Path, Option<&str>) -> LoadResult,
    input: impl BufRead,
    mut out: impl Write,
    err: impl Write,
) -> Result<(), Box<dyn Error>> {
    let root = cli
        .assets_root
        .clone()
        .unwrap_or_else(model_resolver::assets_root_from_env);

    let service = with_silenced_output(!cli.show_init_output, || {
        load(&root, cli.model_url.as_deref())
    })?;
    log::info!("Models ready from {}", root.display());

    match cli.mode {
        Mode::Init => {
            writeln!(out, "{INIT_CONFIRMATION}")?;
            out.flush()?;
            Ok(())
        }
        Mode::Serve => serve(cli, service, input, out, err),
    }
}

fn serve(
    cli: &Cli,
    service: Box<dyn ModelService>,
    input: impl BufRead,
    out: impl Write,
    err: impl Write,
) -> Result<(), Box<dyn Error>> {
    let mut selector = TemplateSelector::from_dir(&cli.templates_dir, Box::new(ImageFileReader::new()))?
        .with_cache(cli.cache_templates);
    if cli.cache_templates && selector.warm(service.as_ref()) == 0 {
        log::warn!("No template in {} yields a face", cli.templates_dir.display());
    }
    let pipeline = SwapImageUseCase::new(
        Box::new(ImageFileReader::new()),
        Box::new(ImageFileWriter::new()),
        selector,
    );

    RequestLoop::new(service, pipeline).run(input, out, err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use faceswap_core::detection::domain::face::Face;
    use faceswap_core::shared::frame::Frame;
    use faceswap_core::swapping::domain::model_service::ModelError;
    use std::cell::RefCell;

    // --- Stubs ---

    struct StubService;

    impl ModelService for StubService {
        fn detect(&self, _: &Frame) -> Result<Vec<Face>, ModelError> {
            Ok(Vec::new())
        }

        fn swap(&self, frame: &Frame, _: &Face, _: &Face, _: bool) -> Result<Frame, ModelError> {
            Ok(frame.clone())
        }
    }

    fn stub_load(_: &Path, _: Option<&str>) -> LoadResult {
        Ok(Box::new(StubService))
    }

    /// Input that fails the test if anything tries to read it.
    struct UntouchedInput;

    impl io::Read for UntouchedInput {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            panic!("input was read");
        }
    }

    impl BufRead for UntouchedInput {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            panic!("input was read");
        }

        fn consume(&mut self, _: usize) {}
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["faceswap-worker", "--show-init-output", "--assets-root", "/srv/models"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["faceswap-worker"]).unwrap();
        assert_eq!(cli.mode, Mode::Serve);
        assert_eq!(cli.templates_dir, PathBuf::from("templates"));
        assert!(!cli.cache_templates);
        assert!(!cli.show_init_output);
    }

    #[test]
    fn test_init_mode() {
        let cli = Cli::try_parse_from(["faceswap-worker", "init"]).unwrap();
        assert_eq!(cli.mode, Mode::Init);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "faceswap-worker",
            "serve",
            "--assets-root",
            "/srv/models",
            "--model-url",
            "https://models.internal",
            "--templates-dir",
            "faces",
            "--cache-templates",
            "--show-init-output",
        ])
        .unwrap();
        assert_eq!(cli.assets_root, Some(PathBuf::from("/srv/models")));
        assert_eq!(cli.model_url.as_deref(), Some("https://models.internal"));
        assert_eq!(cli.templates_dir, PathBuf::from("faces"));
        assert!(cli.cache_templates);
        assert!(cli.show_init_output);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["faceswap-worker", "train"]).is_err());
    }

    #[test]
    fn test_init_prints_confirmation_without_reading_input() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        run(&cli(&["init"]), stub_load, UntouchedInput, &mut out, &mut err).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "initialized\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_load_receives_root_and_model_url() {
        let seen = RefCell::new(None);
        let load = |root: &Path, url: Option<&str>| -> LoadResult {
            *seen.borrow_mut() = Some((root.to_path_buf(), url.map(str::to_string)));
            Ok(Box::new(StubService))
        };
        run(
            &cli(&["init", "--model-url", "https://models.internal"]),
            load,
            UntouchedInput,
            io::sink(),
            io::sink(),
        )
        .unwrap();
        assert_eq!(
            seen.into_inner(),
            Some((
                PathBuf::from("/srv/models"),
                Some("https://models.internal".to_string())
            ))
        );
    }

    #[test]
    fn test_load_failure_is_fatal_before_any_output() {
        let mut out = Vec::new();
        let result = run(
            &cli(&["init"]),
            |_: &Path, _: Option<&str>| -> LoadResult { Err("model missing".into()) },
            UntouchedInput,
            &mut out,
            io::sink(),
        );
        assert_eq!(result.unwrap_err().to_string(), "model missing");
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_templates_dir_is_fatal_in_serve_mode() {
        let result = run(
            &cli(&["serve", "--templates-dir", "/nonexistent/templates"]),
            stub_load,
            UntouchedInput,
            io::sink(),
            io::sink(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_serve_answers_each_line_until_input_closes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.png"), b"").unwrap();
        let templates = dir.path().to_str().unwrap();

        let mut out = Vec::new();
        let mut err = Vec::new();
        let input = "not json\n{\"request_id\":7,\"target_path\":\"/nonexistent/in.png\",\"output_path\":\"o.png\"}\n";
        run(
            &cli(&["serve", "--templates-dir", templates]),
            stub_load,
            input.as_bytes(),
            &mut out,
            &mut err,
        )
        .unwrap();

        assert!(out.is_empty());
        let err = String::from_utf8(err).unwrap();
        let lines: Vec<&str> = err.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"request_id\":null"), "{}", lines[0]);
        assert_eq!(lines[1], r#"{"error":"target path not real","request_id":7}"#);
    }
}
