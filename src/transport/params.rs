use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::audio::mixer::{AudioMixerHandle, BaseAudioMixer};

/// Configuration of an output transport.
///
/// * `audio_out_enabled` - Deliver audio frames. When off, audio is dropped.
/// * `audio_out_sample_rate` - Output rate in Hz; `None` or `0` inherits the StartFrame rate.
/// * `audio_out_channels` - Number of interleaved output channels.
/// * `audio_out_10ms_chunks` - Output chunk length, in 10ms blocks.
/// * `audio_out_mixer` - Optional background mixer applied to all outgoing audio.
/// * `video_out_enabled` - Deliver image frames. When off, images are dropped.
/// * `video_out_is_live` - Images are a live stream paced by arrival instead of a loop.
/// * `video_out_width` / `video_out_height` - Output resolution; other sizes are resized.
/// * `video_out_framerate` - Output frames per second.
/// * `interruptions_allowed` - `None` inherits `StartFrame::allow_interruptions`.
#[derive(Debug, Clone)]
pub struct TransportParams {
    pub audio_out_enabled: bool,
    pub audio_out_sample_rate: Option<u32>,
    pub audio_out_channels: u16,
    pub audio_out_10ms_chunks: u32,
    pub audio_out_mixer: Option<AudioMixerHandle>,

    pub video_out_enabled: bool,
    pub video_out_is_live: bool,
    pub video_out_width: u32,
    pub video_out_height: u32,
    pub video_out_framerate: u32,

    pub interruptions_allowed: Option<bool>,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            audio_out_enabled: false,
            audio_out_sample_rate: None,
            audio_out_channels: 1,
            audio_out_10ms_chunks: 4,
            audio_out_mixer: None,

            video_out_enabled: false,
            video_out_is_live: false,
            video_out_width: 1024,
            video_out_height: 768,
            video_out_framerate: 30,

            interruptions_allowed: None,
        }
    }
}

impl TransportParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio_out(mut self, enabled: bool) -> Self {
        self.audio_out_enabled = enabled;
        self
    }

    pub fn with_audio_out_sample_rate(mut self, sample_rate: u32) -> Self {
        self.audio_out_sample_rate = Some(sample_rate);
        self
    }

    pub fn with_audio_out_channels(mut self, channels: u16) -> Self {
        self.audio_out_channels = channels;
        self
    }

    pub fn with_audio_out_10ms_chunks(mut self, chunks: u32) -> Self {
        self.audio_out_10ms_chunks = chunks;
        self
    }

    pub fn with_audio_out_mixer<M>(mut self, mixer: M) -> Self
    where
        M: BaseAudioMixer + 'static,
    {
        self.audio_out_mixer = Some(Arc::new(Mutex::new(mixer)));
        self
    }

    pub fn with_audio_out_mixer_handle(mut self, mixer: AudioMixerHandle) -> Self {
        self.audio_out_mixer = Some(mixer);
        self
    }

    pub fn with_video_out(mut self, enabled: bool) -> Self {
        self.video_out_enabled = enabled;
        self
    }

    pub fn with_video_out_is_live(mut self, live: bool) -> Self {
        self.video_out_is_live = live;
        self
    }

    pub fn with_video_out_size(mut self, width: u32, height: u32) -> Self {
        self.video_out_width = width;
        self.video_out_height = height;
        self
    }

    pub fn with_video_out_framerate(mut self, framerate: u32) -> Self {
        self.video_out_framerate = framerate;
        self
    }

    pub fn with_interruptions_allowed(mut self, allowed: bool) -> Self {
        self.interruptions_allowed = Some(allowed);
        self
    }

    /// The configured output rate, or `fallback` when none is set.
    pub fn resolve_sample_rate(&self, fallback: u32) -> u32 {
        match self.audio_out_sample_rate {
            Some(rate) if rate > 0 => rate,
            _ => fallback,
        }
    }

    /// Time between two video frames.
    pub fn video_frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.video_out_framerate.max(1) as f64)
    }

    /// Emit a BotSpeaking pulse once every this many audio chunks (about every 200ms).
    pub fn bot_speaking_period(&self) -> u32 {
        let chunk_ms = self.audio_out_10ms_chunks.max(1) * 10;
        (200 / chunk_ms).max(1)
    }
}
