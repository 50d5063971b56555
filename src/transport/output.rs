//! The output transport: last processor of a pipeline, delivering frames to a concrete
//! sink in order, on time and correctly chunked.
//!
//! Concrete transports plug in through [`OutputTransportHooks`]; everything else (routing,
//! chunking, scheduling, video pacing, speaking state and interruptions) lives here.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use crate::audio::resampler::{BaseAudioResampler, RubatoAudioResampler};
use crate::audio::{audio_chunk_size, AudioAccumulator};
use crate::clock::{BaseClock, SystemClock};
use crate::error::{Result, TransportError};
use crate::frames::{
    EndFrame, FrameType, OutputAudioRawFrame, OutputImageRawFrame, StartFrame,
    TransportMessageFrameType,
};
use crate::processors::{FrameDirection, FrameProcessorTrait, FramePusher};
use crate::task_manager::TaskManager;
use crate::transport::media_sender::{MediaSender, SinkContext};
use crate::transport::params::TransportParams;
use crate::transport::router::{route, Route};
use crate::transport::speaking::SpeakingTracker;
use crate::video::{ImageCrateResizer, ImageResizer, VideoImageSet};

/// Write path of a concrete transport. Every hook is a no-op by default.
#[async_trait]
pub trait OutputTransportHooks: Send + Sync {
    /// Write one audio chunk to the sink.
    async fn write_audio_frame(&self, _frame: &OutputAudioRawFrame) -> Result<()> {
        Ok(())
    }

    /// Render one video frame.
    async fn write_video_frame(&self, _frame: &OutputImageRawFrame) -> Result<()> {
        Ok(())
    }

    /// Deliver an application message, queued or urgent.
    async fn send_message(&self, _frame: &TransportMessageFrameType) -> Result<()> {
        Ok(())
    }
}

/// Hooks that discard everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHooks;

impl OutputTransportHooks for NullHooks {}

/// Last processor of a pipeline: routes, paces and writes frames through its hooks.
pub struct BaseOutputTransport {
    name: String,
    params: TransportParams,
    hooks: Arc<dyn OutputTransportHooks>,
    pusher: Arc<dyn FramePusher>,
    clock: Arc<dyn BaseClock>,
    resampler: Arc<dyn BaseAudioResampler>,
    resizer: Arc<dyn ImageResizer>,
    task_manager: Arc<TaskManager>,

    sample_rate: u32,
    audio_chunk_size: usize,
    allow_interruptions: bool,

    sender: Option<MediaSender>,
}

impl BaseOutputTransport {
    /// Start configuring a transport.
    pub fn builder() -> OutputTransportBuilder {
        OutputTransportBuilder::new()
    }

    /// Configuration the transport was built with.
    pub fn params(&self) -> &TransportParams {
        &self.params
    }

    /// Output sample rate of the current run. Zero before the first StartFrame.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bytes per outgoing audio chunk. Zero before the first StartFrame.
    pub fn audio_chunk_size(&self) -> usize {
        self.audio_chunk_size
    }

    /// Whether StartInterruption restarts delivery in the current run.
    pub fn interruptions_allowed(&self) -> bool {
        self.allow_interruptions
    }

    /// Clock used to release timestamped frames.
    pub fn clock(&self) -> Arc<dyn BaseClock> {
        Arc::clone(&self.clock)
    }

    /// Supervisor of the delivery tasks.
    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.task_manager
    }

    /// True between StartFrame and End or Cancel.
    pub fn is_started(&self) -> bool {
        self.sender.is_some()
    }

    /// Whether the bot is currently speaking.
    pub fn is_speaking(&self) -> bool {
        self.sender
            .as_ref()
            .map_or(false, |sender| sender.context().speaking.is_speaking())
    }

    /// Set up a run: resolve the audio format, start the mixer and create the delivery tasks.
    pub async fn start(&mut self, frame: &StartFrame) -> Result<()> {
        if let Some(mut previous) = self.sender.take() {
            log::warn!("{}: started twice, cancelling the previous run", self.name);
            previous.cancel().await?;
        }

        self.sample_rate = self.params.resolve_sample_rate(frame.audio_out_sample_rate);
        self.audio_chunk_size = audio_chunk_size(
            self.sample_rate,
            self.params.audio_out_channels,
            self.params.audio_out_10ms_chunks,
        );
        self.allow_interruptions = self
            .params
            .interruptions_allowed
            .unwrap_or(frame.allow_interruptions);

        if let Some(mixer) = &self.params.audio_out_mixer {
            mixer
                .lock()
                .await
                .start(self.sample_rate)
                .await
                .map_err(|e| TransportError::Mixer(e.to_string()))?;
        }

        let accumulator = Arc::new(Mutex::new(AudioAccumulator::new()));
        let ctx = Arc::new(SinkContext {
            name: self.name.clone(),
            params: self.params.clone(),
            sample_rate: self.sample_rate,
            audio_chunk_size: self.audio_chunk_size,
            hooks: Arc::clone(&self.hooks),
            pusher: Arc::clone(&self.pusher),
            clock: Arc::clone(&self.clock),
            resizer: Arc::clone(&self.resizer),
            mixer: self.params.audio_out_mixer.clone(),
            speaking: SpeakingTracker::new(Arc::clone(&self.pusher), Arc::clone(&accumulator)),
            images: watch::channel(VideoImageSet::default()).0,
        });

        let mut sender = MediaSender::new(
            ctx,
            Arc::clone(&self.task_manager),
            accumulator,
            Arc::clone(&self.resampler),
        );
        sender.start().await?;
        self.sender = Some(sender);

        log::debug!(
            "{}: started (sample rate {}, chunk size {})",
            self.name,
            self.sample_rate,
            self.audio_chunk_size
        );
        Ok(())
    }

    /// Deliver everything already queued, then tear the run down.
    pub async fn stop(&mut self, frame: &EndFrame) -> Result<()> {
        let result = match self.sender.take() {
            Some(mut sender) => sender.stop(frame).await,
            None => Ok(()),
        };
        self.stop_mixer().await;
        result
    }

    /// Tear the run down without delivering what is queued.
    pub async fn cancel(&mut self) -> Result<()> {
        let result = match self.sender.take() {
            Some(mut sender) => sender.cancel().await,
            None => Ok(()),
        };
        self.stop_mixer().await;
        result
    }

    /// Queue an audio frame as if it had arrived from upstream.
    pub async fn send_audio(&mut self, frame: OutputAudioRawFrame) -> Result<()> {
        if self.sender.is_none() {
            return Err(TransportError::NotStarted);
        }
        self.process_frame(FrameType::OutputAudioRaw(frame), FrameDirection::Downstream)
            .await
    }

    /// Queue an image frame as if it had arrived from upstream.
    pub async fn send_image(&mut self, frame: OutputImageRawFrame) -> Result<()> {
        if self.sender.is_none() {
            return Err(TransportError::NotStarted);
        }
        self.process_frame(FrameType::OutputImageRaw(frame), FrameDirection::Downstream)
            .await
    }

    async fn stop_mixer(&self) {
        if let Some(mixer) = &self.params.audio_out_mixer {
            if let Err(e) = mixer.lock().await.stop().await {
                log::error!("{}: failed to stop mixer: {}", self.name, e);
            }
        }
    }

    async fn push_frame(&self, frame: FrameType, direction: FrameDirection) -> Result<()> {
        self.pusher.push_frame(frame, direction).await
    }

    /// The current run, or `None` with a warning when there is none.
    fn running(&self, frame: &FrameType) -> Option<&MediaSender> {
        if self.sender.is_none() {
            log::warn!("{}: not running, dropping {}", self.name, frame);
        }
        self.sender.as_ref()
    }

    /// Re-push an interruption frame and, if allowed, restart delivery.
    async fn handle_interruption(
        &mut self,
        frame: FrameType,
        direction: FrameDirection,
    ) -> Result<()> {
        let interrupt = matches!(frame, FrameType::StartInterruption(_));
        self.push_frame(frame, direction).await?;

        if interrupt && self.allow_interruptions {
            if let Some(sender) = self.sender.as_mut() {
                sender.handle_interruption().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FrameProcessorTrait for BaseOutputTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_frame(&mut self, frame: FrameType, direction: FrameDirection) -> Result<()> {
        let mixer_configured = self.params.audio_out_mixer.is_some();

        match route(frame, direction, mixer_configured) {
            Route::Start(start) => {
                self.push_frame(FrameType::Start(start.clone()), direction)
                    .await?;
                self.start(&start).await
            }
            Route::Cancel(frame) => {
                self.cancel().await?;
                self.push_frame(frame, direction).await
            }
            Route::Interruption(frame) => self.handle_interruption(frame, direction).await,
            Route::UrgentMessage(message) => {
                let message = TransportMessageFrameType::Urgent(message);
                if let Err(e) = self.hooks.send_message(&message).await {
                    log::error!("{}: failed to send urgent message: {}", self.name, e);
                }
                Ok(())
            }
            Route::Immediate(frame) => self.push_frame(frame, direction).await,
            Route::End(end) => {
                let stopped = self.stop(&end).await;
                self.push_frame(FrameType::End(end), direction).await?;
                stopped
            }
            Route::Mixer(control) => match &self.params.audio_out_mixer {
                Some(mixer) => mixer
                    .lock()
                    .await
                    .process_frame(&control)
                    .await
                    .map_err(|e| TransportError::Mixer(e.to_string())),
                None => Ok(()),
            },
            Route::Audio(frame) => {
                if !self.params.audio_out_enabled {
                    return Ok(());
                }
                match self.running(&frame) {
                    Some(sender) => sender.handle_audio_frame(frame).await,
                    None => Ok(()),
                }
            }
            Route::Image(frame) => {
                if !self.params.video_out_enabled {
                    return Ok(());
                }
                match self.running(&frame) {
                    Some(sender) => sender.handle_image_frame(frame).await,
                    None => Ok(()),
                }
            }
            Route::Scheduled(frame) => match self.running(&frame) {
                Some(sender) => sender.handle_timed_frame(frame).await,
                None => Ok(()),
            },
            Route::Upstream(frame) => self.push_frame(frame, FrameDirection::Upstream).await,
            Route::Fifo(frame) => match self.running(&frame) {
                Some(sender) => sender.handle_sync_frame(frame).await,
                None => Ok(()),
            },
        }
    }
}

/// Builder for [`BaseOutputTransport`]. Only the frame pusher is required.
pub struct OutputTransportBuilder {
    name: Option<String>,
    params: TransportParams,
    hooks: Option<Arc<dyn OutputTransportHooks>>,
    pusher: Option<Arc<dyn FramePusher>>,
    clock: Option<Arc<dyn BaseClock>>,
    resampler: Option<Arc<dyn BaseAudioResampler>>,
    resizer: Option<Arc<dyn ImageResizer>>,
    task_manager: Option<Arc<TaskManager>>,
}

impl OutputTransportBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            params: TransportParams::default(),
            hooks: None,
            pusher: None,
            clock: None,
            resampler: None,
            resizer: None,
            task_manager: None,
        }
    }

    /// Name used in logs and task names.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Transport configuration. Defaults to [`TransportParams::default`].
    pub fn with_params(mut self, params: TransportParams) -> Self {
        self.params = params;
        self
    }

    /// Write path. Defaults to [`NullHooks`].
    pub fn with_hooks(mut self, hooks: Arc<dyn OutputTransportHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Where frames go next in the pipeline. Required.
    pub fn with_pusher(mut self, pusher: Arc<dyn FramePusher>) -> Self {
        self.pusher = Some(pusher);
        self
    }

    /// Defaults to a [`SystemClock`] started at build time.
    pub fn with_clock(mut self, clock: Arc<dyn BaseClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to [`RubatoAudioResampler`].
    pub fn with_resampler(mut self, resampler: Arc<dyn BaseAudioResampler>) -> Self {
        self.resampler = Some(resampler);
        self
    }

    /// Defaults to [`ImageCrateResizer`].
    pub fn with_resizer(mut self, resizer: Arc<dyn ImageResizer>) -> Self {
        self.resizer = Some(resizer);
        self
    }

    /// Defaults to a fresh [`TaskManager`].
    pub fn with_task_manager(mut self, task_manager: Arc<TaskManager>) -> Self {
        self.task_manager = Some(task_manager);
        self
    }

    /// Fails only when no frame pusher was given.
    pub fn build(self) -> std::result::Result<BaseOutputTransport, &'static str> {
        let pusher = self.pusher.ok_or("Frame pusher is required")?;
        let clock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new_started().map_err(|_| "Unable to start clock")?),
        };
        let channels = self.params.audio_out_channels;

        Ok(BaseOutputTransport {
            name: self
                .name
                .unwrap_or_else(|| "BaseOutputTransport".to_string()),
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NullHooks)),
            pusher,
            clock,
            resampler: self
                .resampler
                .unwrap_or_else(|| Arc::new(RubatoAudioResampler::with_channels(channels))),
            resizer: self
                .resizer
                .unwrap_or_else(|| Arc::new(ImageCrateResizer::new())),
            task_manager: self.task_manager.unwrap_or_default(),
            params: self.params,
            sample_rate: 0,
            audio_chunk_size: 0,
            allow_interruptions: false,
            sender: None,
        })
    }
}

impl Default for OutputTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
