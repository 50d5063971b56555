//! Where the FIFO delivery task pulls its next frame from.
//!
//! Without a mixer the task simply waits on its queue. With a mixer the output never goes
//! idle: whenever the queue is empty a chunk of mixed silence is produced instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{sleep, timeout, Instant};

use crate::audio::mixer::AudioMixerHandle;
use crate::error::{Result, TransportError};
use crate::frames::{FrameType, OutputAudioRawFrame};
use crate::transport::media_sender::SinkContext;

/// Silence after which the bot is considered to have stopped speaking.
pub const BOT_VAD_STOP_SECS: Duration = Duration::from_millis(350);

#[async_trait]
pub trait FrameSource: Send {
    /// Next frame to deliver, or `None` once the queue is closed and drained.
    async fn next_frame(&mut self) -> Result<Option<FrameType>>;
}

/// Pick the strategy matching the sink's mixer configuration.
pub fn frame_source(
    ctx: Arc<SinkContext>,
    rx: mpsc::UnboundedReceiver<FrameType>,
) -> Box<dyn FrameSource> {
    match ctx.mixer.clone() {
        Some(mixer) => Box::new(MixerFrameSource::new(ctx, rx, mixer)),
        None => Box::new(QueueFrameSource::new(ctx, rx)),
    }
}

pub struct QueueFrameSource {
    ctx: Arc<SinkContext>,
    rx: mpsc::UnboundedReceiver<FrameType>,
    grace: Duration,
}

impl QueueFrameSource {
    pub fn new(ctx: Arc<SinkContext>, rx: mpsc::UnboundedReceiver<FrameType>) -> Self {
        Self {
            ctx,
            rx,
            grace: BOT_VAD_STOP_SECS,
        }
    }
}

#[async_trait]
impl FrameSource for QueueFrameSource {
    async fn next_frame(&mut self) -> Result<Option<FrameType>> {
        loop {
            match timeout(self.grace, self.rx.recv()).await {
                Ok(frame) => return Ok(frame),
                Err(_) => self.ctx.speaking.stopped_speaking().await,
            }
        }
    }
}

pub struct MixerFrameSource {
    ctx: Arc<SinkContext>,
    rx: mpsc::UnboundedReceiver<FrameType>,
    mixer: AudioMixerHandle,
    grace: Duration,
    last_frame_time: Option<Instant>,
}

impl MixerFrameSource {
    pub fn new(
        ctx: Arc<SinkContext>,
        rx: mpsc::UnboundedReceiver<FrameType>,
        mixer: AudioMixerHandle,
    ) -> Self {
        Self {
            ctx,
            rx,
            mixer,
            grace: BOT_VAD_STOP_SECS,
            last_frame_time: None,
        }
    }

    async fn mix(&self, audio: &[u8]) -> Result<Vec<u8>> {
        self.mixer
            .lock()
            .await
            .mix(audio)
            .await
            .map_err(|e| TransportError::Mixer(e.to_string()))
    }
}

#[async_trait]
impl FrameSource for MixerFrameSource {
    async fn next_frame(&mut self) -> Result<Option<FrameType>> {
        match self.rx.try_recv() {
            Ok(mut frame) => {
                if let Some(audio_frame) = frame.audio_frame_mut() {
                    audio_frame.audio = self.mix(&audio_frame.audio).await?;
                }
                self.last_frame_time = Some(Instant::now());
                Ok(Some(frame))
            }
            Err(TryRecvError::Empty) => {
                let idle = self
                    .last_frame_time
                    .map_or(true, |last| last.elapsed() > self.grace);
                if idle {
                    self.ctx.speaking.stopped_speaking().await;
                }

                // Keeps the idle loop from monopolising the runtime.
                sleep(Duration::from_millis(1)).await;

                let silence = vec![0u8; self.ctx.audio_chunk_size];
                let mixed = self.mix(&silence).await?;
                Ok(Some(FrameType::OutputAudioRaw(OutputAudioRawFrame::new(
                    mixed,
                    self.ctx.sample_rate,
                    self.ctx.params.audio_out_channels,
                ))))
            }
            Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}
