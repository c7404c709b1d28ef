pub mod alignment;
pub mod arcface_embedder;
pub mod inswapper;
pub mod onnx_initializer;
pub mod onnx_model_service;
pub mod paste_back;
