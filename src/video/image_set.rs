use std::sync::Arc;

use crate::frames::OutputImageRawFrame;

/// The images the non-live video pacer cycles through.
///
/// Replaced wholesale when a new image or sprite arrives; the images themselves are shared,
/// so handing a set to the pacer never copies pixel data.
#[derive(Debug, Clone, Default)]
pub struct VideoImageSet {
    images: Arc<Vec<OutputImageRawFrame>>,
    position: usize,
}

impl VideoImageSet {
    pub fn new(images: Vec<OutputImageRawFrame>) -> Self {
        Self {
            images: Arc::new(images),
            position: 0,
        }
    }

    pub fn single(image: OutputImageRawFrame) -> Self {
        Self::new(vec![image])
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Next image in the cycle, wrapping around at the end.
    pub fn next_image(&mut self) -> Option<OutputImageRawFrame> {
        if self.images.is_empty() {
            return None;
        }
        let image = self.images[self.position].clone();
        self.position = (self.position + 1) % self.images.len();
        Some(image)
    }
}
