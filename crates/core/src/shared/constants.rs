/// Environment variable selecting the model asset root.
pub const ASSETS_ROOT_ENV: &str = "INSIGHTFACE_HOME";
/// Directory name used under the home directory when no root is configured.
pub const DEFAULT_ASSETS_DIR: &str = ".insightface";

/// Optional base URL that missing model files are fetched from.
pub const MODEL_URL_ENV: &str = "FACESWAP_MODEL_URL";

pub const DETECTOR_MODEL_PATH: &str = "models/buffalo_l/det_10g.onnx";
pub const RECOGNIZER_MODEL_PATH: &str = "models/buffalo_l/w600k_r50.onnx";
pub const SWAPPER_MODEL_PATH: &str = "models/inswapper_128.onnx";

/// Square input resolution of the SCRFD detector.
pub const DETECTOR_INPUT_SIZE: u32 = 640;
pub const DETECTOR_SCORE_THRESHOLD: f32 = 0.5;
pub const DETECTOR_NMS_THRESHOLD: f32 = 0.4;

/// Side of the aligned crop the recognizer embeds.
pub const RECOGNIZER_INPUT_SIZE: u32 = 112;
pub const EMBEDDING_DIM: usize = 512;

/// Side of the aligned crop the swapper consumes and produces.
pub const SWAPPER_INPUT_SIZE: u32 = 128;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Printed to stdout once models are constructed in initialize-only mode.
pub const INIT_CONFIRMATION: &str = "initialized";
