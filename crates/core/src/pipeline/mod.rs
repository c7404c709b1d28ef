pub mod swap_error;
pub mod swap_image_use_case;
