//! Video collaborators of the output transport.

pub mod image_set;
pub mod resizer;

pub use image_set::VideoImageSet;
pub use resizer::{ImageCrateResizer, ImageResizer, ResizeResult};
