pub mod model_service;
