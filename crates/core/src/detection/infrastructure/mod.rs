pub mod math;
pub mod model_resolver;
pub mod onnx_session;
pub mod scrfd_detector;
