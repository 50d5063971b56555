pub mod base;

pub use base::{AudioMixerHandle, BaseAudioMixer, MixerResult};
