pub mod constants;
pub mod frame;
pub mod output_guard;
