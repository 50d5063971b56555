pub mod base;
pub mod image;

pub use self::image::ImageCrateResizer;
pub use base::{ImageResizer, ResizeResult};
