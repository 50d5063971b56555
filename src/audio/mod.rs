//! Audio collaborators of the output transport: chunking, mixing and resampling.

pub mod chunker;
pub mod mixer;
pub mod resampler;

pub use chunker::{audio_chunk_size, AudioAccumulator};
pub use mixer::{AudioMixerHandle, BaseAudioMixer, MixerResult};
pub use resampler::{BaseAudioResampler, ResamplerResult, RubatoAudioResampler};
