pub type ResizeResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Rescales an image to the transport's output resolution.
///
/// The returned bytes use the same `format` as the input.
#[async_trait::async_trait]
pub trait ImageResizer: Send + Sync {
    async fn resize(
        &self,
        image: &[u8],
        from: (u32, u32),
        to: (u32, u32),
        format: Option<&str>,
    ) -> ResizeResult<Vec<u8>>;
}
