//! Image resizing with the `image` crate.

use std::io::Cursor;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageFormat};

use super::base::{ImageResizer, ResizeResult};

/// Lanczos3 resizer. Raw `RGB`/`RGBA` buffers stay raw; encoded images (`PNG`, `JPEG`, or
/// anything `image` can sniff) are decoded, resized and re-encoded in their own format.
///
/// Work runs on the blocking pool so large frames do not stall the runtime.
#[derive(Debug, Clone, Default)]
pub struct ImageCrateResizer {
    filter: Option<FilterType>,
}

impl ImageCrateResizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: FilterType) -> Self {
        Self {
            filter: Some(filter),
        }
    }
}

fn raw_image(
    image: Vec<u8>,
    (width, height): (u32, u32),
    bytes_per_pixel: usize,
) -> ResizeResult<DynamicImage> {
    let expected = width as usize * height as usize * bytes_per_pixel;
    if image.len() != expected {
        return Err(format!(
            "image data length {} doesn't match {}x{}x{}",
            image.len(),
            width,
            height,
            bytes_per_pixel
        )
        .into());
    }
    let decoded = match bytes_per_pixel {
        3 => ImageBuffer::from_raw(width, height, image).map(DynamicImage::ImageRgb8),
        _ => ImageBuffer::from_raw(width, height, image).map(DynamicImage::ImageRgba8),
    };
    decoded.ok_or_else(|| "failed to build image buffer".into())
}

fn encoded_format(image: &[u8], format: Option<&str>) -> ImageFormat {
    match format.map(str::to_ascii_uppercase).as_deref() {
        Some("JPEG") | Some("JPG") => ImageFormat::Jpeg,
        Some("PNG") => ImageFormat::Png,
        _ => image::guess_format(image).unwrap_or(ImageFormat::Png),
    }
}

fn resize_blocking(
    image: Vec<u8>,
    from: (u32, u32),
    to: (u32, u32),
    format: Option<String>,
    filter: FilterType,
) -> ResizeResult<Vec<u8>> {
    match format.as_deref() {
        Some("RGB") => {
            let resized = raw_image(image, from, 3)?.resize_exact(to.0, to.1, filter);
            Ok(resized.to_rgb8().into_raw())
        }
        Some("RGBA") => {
            let resized = raw_image(image, from, 4)?.resize_exact(to.0, to.1, filter);
            Ok(resized.to_rgba8().into_raw())
        }
        other => {
            let image_format = encoded_format(&image, other);
            let decoded = image::load_from_memory_with_format(&image, image_format)?;
            let resized = decoded.resize_exact(to.0, to.1, filter);
            let resized = match image_format {
                ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
                _ => resized,
            };
            let mut encoded = Cursor::new(Vec::new());
            resized.write_to(&mut encoded, image_format)?;
            Ok(encoded.into_inner())
        }
    }
}

#[async_trait]
impl ImageResizer for ImageCrateResizer {
    async fn resize(
        &self,
        image: &[u8],
        from: (u32, u32),
        to: (u32, u32),
        format: Option<&str>,
    ) -> ResizeResult<Vec<u8>> {
        if from == to {
            return Ok(image.to_vec());
        }
        let image = image.to_vec();
        let format = format.map(str::to_string);
        let filter = self.filter.unwrap_or(FilterType::Lanczos3);
        tokio::task::spawn_blocking(move || resize_blocking(image, from, to, format, filter))
            .await
            .map_err(|e| format!("resize task failed: {}", e))?
    }
}
