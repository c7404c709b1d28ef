//! Face-swap worker core: detection, swapping, template selection, the
//! single-image swap pipeline and the line-delimited job loop.

pub mod detection;
pub mod imaging;
pub mod pipeline;
pub mod serving;
pub mod shared;
pub mod swapping;
pub mod templates;
