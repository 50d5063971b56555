//! Background audio mixer interface.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::frames::MixerControlFrame;

pub type MixerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Shared handle to a mixer, as configured on the output transport.
pub type AudioMixerHandle = Arc<Mutex<dyn BaseAudioMixer>>;

/// Blends a background bed (music, ambience) into outgoing audio.
///
/// When a mixer is configured the output transport never goes quiet: idle periods are
/// filled with mixer output over silence, and every outgoing audio chunk goes through
/// [`mix`](BaseAudioMixer::mix).
#[async_trait::async_trait]
pub trait BaseAudioMixer: Send + Sync + std::fmt::Debug {
    /// Called when the transport starts, with its output sample rate.
    async fn start(&mut self, sample_rate: u32) -> MixerResult<()>;

    /// Called after the transport has stopped or been cancelled.
    async fn stop(&mut self) -> MixerResult<()>;

    /// Apply a runtime control instruction (enable, volume, sound selection).
    async fn process_frame(&mut self, frame: &MixerControlFrame) -> MixerResult<()>;

    /// Mix `audio` (16-bit PCM, chunk sized) with the mixer's own output.
    async fn mix(&mut self, audio: &[u8]) -> MixerResult<Vec<u8>>;
}
