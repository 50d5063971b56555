pub type ResamplerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Converts 16-bit little-endian PCM between sample rates.
#[async_trait::async_trait]
pub trait BaseAudioResampler: Send + Sync {
    async fn resample(&self, audio: Vec<u8>, in_rate: u32, out_rate: u32)
        -> ResamplerResult<Vec<u8>>;
}
