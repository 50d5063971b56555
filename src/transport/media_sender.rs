//! Per-run delivery machinery of the output transport.
//!
//! A [`MediaSender`] is created on StartFrame and owns the three delivery tasks (FIFO,
//! scheduled and video), their queues and the audio accumulator. [`SinkContext`] is the
//! read-mostly state those tasks share.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};

use crate::audio::mixer::AudioMixerHandle;
use crate::audio::resampler::BaseAudioResampler;
use crate::audio::AudioAccumulator;
use crate::clock::BaseClock;
use crate::error::{Result, TransportError};
use crate::frames::{
    EndFrame, ErrorFrame, FrameType, OutputImageRawFrame, TransportMessageFrameType,
};
use crate::processors::{FrameDirection, FramePusher};
use crate::task_manager::{TaskContext, TaskHandle, TaskManager};
use crate::transport::audio_task::run_fifo_task;
use crate::transport::clock_task::{run_clock_task, TimedFrame};
use crate::transport::frame_source::frame_source;
use crate::transport::output::OutputTransportHooks;
use crate::transport::params::TransportParams;
use crate::transport::speaking::SpeakingTracker;
use crate::transport::video_task::run_video_task;
use crate::video::{ImageResizer, VideoImageSet};

/// State shared by the delivery tasks of one run.
pub struct SinkContext {
    pub name: String,
    pub params: TransportParams,
    pub sample_rate: u32,
    pub audio_chunk_size: usize,
    pub hooks: Arc<dyn OutputTransportHooks>,
    pub pusher: Arc<dyn FramePusher>,
    pub clock: Arc<dyn BaseClock>,
    pub resizer: Arc<dyn ImageResizer>,
    pub mixer: Option<AudioMixerHandle>,
    pub speaking: SpeakingTracker,
    /// Current image set of the non-live video loop. Only the delivery tasks write it.
    pub images: watch::Sender<VideoImageSet>,
}

impl SinkContext {
    /// Side effects of a dequeued frame that happen before it is pushed.
    pub async fn handle_frame(&self, frame: &FrameType) {
        match frame {
            FrameType::OutputImageRaw(image) => {
                self.images.send_replace(VideoImageSet::single(image.clone()));
            }
            FrameType::Sprite(sprite) => {
                log::debug!("{}: new sprite with {} images", self.name, sprite.images.len());
                self.images.send_replace(VideoImageSet::new(sprite.images.clone()));
            }
            FrameType::TransportMessage(message) => {
                let message = TransportMessageFrameType::Message(message.clone());
                if let Err(e) = self.hooks.send_message(&message).await {
                    log::error!("{}: failed to send transport message: {}", self.name, e);
                }
            }
            _ => {}
        }
    }

    /// Write audio frames to the transport and push the frame downstream.
    ///
    /// An audio frame the transport failed to write is not pushed.
    pub async fn write_and_push(&self, frame: FrameType) {
        if let Some(audio) = frame.to_output_audio() {
            if let Err(e) = self.hooks.write_audio_frame(&audio).await {
                log::error!("{}: error writing audio frame: {}", self.name, e);
                return;
            }
        }
        self.push_downstream(frame).await;
    }

    /// Push a frame to the next processor, logging failures.
    pub async fn push_downstream(&self, frame: FrameType) {
        if let Err(e) = self
            .pusher
            .push_frame(frame, FrameDirection::Downstream)
            .await
        {
            log::error!("{}: failed to push frame downstream: {}", self.name, e);
        }
    }

    /// Render one image, resizing it to the output resolution first if needed.
    pub async fn draw_image(&self, mut frame: OutputImageRawFrame) {
        let desired = (self.params.video_out_width, self.params.video_out_height);

        if frame.image_frame.size != desired {
            log::warn!(
                "Frame size {:?} does not match expected size {:?}, resizing",
                frame.image_frame.size,
                desired
            );
            match self
                .resizer
                .resize(
                    &frame.image_frame.image,
                    frame.image_frame.size,
                    desired,
                    frame.image_frame.format.as_deref(),
                )
                .await
                .map_err(|e| TransportError::Resize(e.to_string()))
            {
                Ok(resized) => {
                    frame.image_frame.image = resized;
                    frame.image_frame.size = desired;
                }
                Err(e) => log::error!("{}: {}, using original frame", self.name, e),
            }
        }

        if let Err(e) = self.hooks.write_video_frame(&frame).await {
            log::error!("{}: error writing video frame: {}", self.name, e);
        }
    }
}

/// Owns the queues and delivery tasks of one run.
pub struct MediaSender {
    ctx: Arc<SinkContext>,
    task_manager: Arc<TaskManager>,
    accumulator: Arc<Mutex<AudioAccumulator>>,
    resampler: Arc<dyn BaseAudioResampler>,

    fifo_queue: Option<mpsc::UnboundedSender<FrameType>>,
    clock_queue: Option<mpsc::UnboundedSender<TimedFrame>>,
    video_queue: Option<mpsc::UnboundedSender<OutputImageRawFrame>>,

    fifo_task: Option<TaskHandle>,
    clock_task: Option<TaskHandle>,
    video_task: Option<TaskHandle>,
}

impl MediaSender {
    /// A sender with no tasks yet; call [`start`](Self::start) to create them.
    pub fn new(
        ctx: Arc<SinkContext>,
        task_manager: Arc<TaskManager>,
        accumulator: Arc<Mutex<AudioAccumulator>>,
        resampler: Arc<dyn BaseAudioResampler>,
    ) -> Self {
        Self {
            ctx,
            task_manager,
            accumulator,
            resampler,
            fifo_queue: None,
            clock_queue: None,
            video_queue: None,
            fifo_task: None,
            clock_task: None,
            video_task: None,
        }
    }

    /// Shared state of this run.
    pub fn context(&self) -> &Arc<SinkContext> {
        &self.ctx
    }

    /// Create the video task (if enabled) and both delivery tasks.
    pub async fn start(&mut self) -> Result<()> {
        self.accumulator.lock().await.clear();
        self.create_video_task().await?;
        self.create_clock_task().await?;
        self.create_fifo_task().await?;
        Ok(())
    }

    /// Graceful stop: everything queued before `frame` is delivered, nothing after it.
    pub async fn stop(&mut self, frame: &EndFrame) -> Result<()> {
        // Dropping the senders closes both queues behind the sentinel.
        if let Some(queue) = self.clock_queue.take() {
            let _ = queue.send(TimedFrame::end(frame.clone()));
        }
        if let Some(queue) = self.fifo_queue.take() {
            let _ = queue.send(FrameType::End(frame.clone()));
        }

        let fifo_task = self.fifo_task.take();
        let clock_task = self.clock_task.take();
        let fifo = self.wait_task(fifo_task).await;
        let clock = self.wait_task(clock_task).await;
        self.cancel_video_task().await?;

        fifo.and(clock)
    }

    /// Hard stop: abort every task without draining its queue.
    pub async fn cancel(&mut self) -> Result<()> {
        self.cancel_fifo_task().await?;
        self.cancel_clock_task().await?;
        self.cancel_video_task().await?;
        Ok(())
    }

    /// Discard everything buffered and restart the delivery tasks.
    pub async fn handle_interruption(&mut self) -> Result<()> {
        self.cancel().await?;
        self.start().await?;
        self.ctx.speaking.stopped_speaking().await;
        Ok(())
    }

    /// Resample, accumulate and queue full chunks of an audio frame.
    pub async fn handle_audio_frame(&self, frame: FrameType) -> Result<()> {
        let Some(audio) = frame.audio_frame() else {
            return Ok(());
        };

        let resampled = self
            .resampler
            .resample(audio.audio.clone(), audio.sample_rate, self.ctx.sample_rate)
            .await
            .map_err(|e| TransportError::Resample(e.to_string()))?;

        let chunks = self
            .accumulator
            .lock()
            .await
            .drain_chunks(&resampled, self.ctx.audio_chunk_size);

        for chunk in chunks {
            if let Some(chunk_frame) = frame.with_audio(chunk, self.ctx.sample_rate) {
                self.queue_fifo(chunk_frame)?;
            }
        }
        Ok(())
    }

    /// Live images feed the pacer directly; anything else swaps the image set in order.
    pub async fn handle_image_frame(&self, frame: FrameType) -> Result<()> {
        match frame {
            FrameType::OutputImageRaw(image) if self.ctx.params.video_out_is_live => {
                let queue = self
                    .video_queue
                    .as_ref()
                    .ok_or(TransportError::QueueClosed("video"))?;
                queue
                    .send(image)
                    .map_err(|_| TransportError::QueueClosed("video"))
            }
            other => self.queue_fifo(other),
        }
    }

    /// Queue a frame for release at its presentation timestamp.
    pub async fn handle_timed_frame(&self, frame: FrameType) -> Result<()> {
        let queue = self
            .clock_queue
            .as_ref()
            .ok_or(TransportError::QueueClosed("clock"))?;
        queue
            .send(TimedFrame::new(frame))
            .map_err(|_| TransportError::QueueClosed("clock"))
    }

    /// Queue a frame behind everything already queued.
    pub async fn handle_sync_frame(&self, frame: FrameType) -> Result<()> {
        self.queue_fifo(frame)
    }

    fn queue_fifo(&self, frame: FrameType) -> Result<()> {
        let queue = self
            .fifo_queue
            .as_ref()
            .ok_or(TransportError::QueueClosed("fifo"))?;
        queue
            .send(frame)
            .map_err(|_| TransportError::QueueClosed("fifo"))
    }

    /// Spawn a delivery task. A failing task reports a fatal ErrorFrame upstream.
    async fn spawn<F, Fut>(&self, kind: &str, task: F) -> Result<TaskHandle>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let pusher = Arc::clone(&self.ctx.pusher);
        let handle = self
            .task_manager
            .create_task(format!("{}::{}", self.ctx.name, kind), move |task_ctx| async move {
                let name = task_ctx.name.clone();
                let result = task(task_ctx).await;
                if let Err(e) = &result {
                    let error = FrameType::Error(ErrorFrame::fatal(format!("{}: {}", name, e)));
                    if let Err(push_error) =
                        pusher.push_frame(error, FrameDirection::Upstream).await
                    {
                        log::error!("{}: unable to report failure: {}", name, push_error);
                    }
                }
                result
            })
            .await?;
        Ok(handle)
    }

    async fn create_fifo_task(&mut self) -> Result<()> {
        if self.fifo_task.is_some() {
            return Ok(());
        }
        let (queue, rx) = mpsc::unbounded_channel();
        let ctx = Arc::clone(&self.ctx);
        let source = frame_source(Arc::clone(&ctx), rx);
        let handle = self
            .spawn("audio", move |_| run_fifo_task(ctx, source))
            .await?;
        self.fifo_queue = Some(queue);
        self.fifo_task = Some(handle);
        Ok(())
    }

    async fn create_clock_task(&mut self) -> Result<()> {
        if self.clock_task.is_some() {
            return Ok(());
        }
        let (queue, rx) = mpsc::unbounded_channel();
        let ctx = Arc::clone(&self.ctx);
        let handle = self
            .spawn("clock", move |_| run_clock_task(ctx, rx))
            .await?;
        self.clock_queue = Some(queue);
        self.clock_task = Some(handle);
        Ok(())
    }

    async fn create_video_task(&mut self) -> Result<()> {
        if self.video_task.is_some() || !self.ctx.params.video_out_enabled {
            return Ok(());
        }
        let (queue, rx) = mpsc::unbounded_channel();
        let ctx = Arc::clone(&self.ctx);
        let images = ctx.images.subscribe();
        let handle = self
            .spawn("video", move |_| run_video_task(ctx, rx, images))
            .await?;
        self.video_queue = Some(queue);
        self.video_task = Some(handle);
        Ok(())
    }

    async fn wait_task(&self, handle: Option<TaskHandle>) -> Result<()> {
        match handle {
            Some(handle) => Ok(self.task_manager.wait_for_task(&handle, None).await?),
            None => Ok(()),
        }
    }

    async fn cancel_fifo_task(&mut self) -> Result<()> {
        self.fifo_queue = None;
        if let Some(handle) = self.fifo_task.take() {
            self.task_manager.cancel_task(&handle).await?;
        }
        Ok(())
    }

    async fn cancel_clock_task(&mut self) -> Result<()> {
        self.clock_queue = None;
        if let Some(handle) = self.clock_task.take() {
            self.task_manager.cancel_task(&handle).await?;
        }
        Ok(())
    }

    async fn cancel_video_task(&mut self) -> Result<()> {
        self.video_queue = None;
        if let Some(handle) = self.video_task.take() {
            self.task_manager.cancel_task(&handle).await?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::audio::resampler::RubatoAudioResampler;
    use crate::frames::{Frame, TTSAudioRawFrame, TextFrame};
    use crate::transport::params::TransportParams;

    fn sender(sink: &TestSink) -> (MediaSender, Arc<TaskManager>) {
        let task_manager = Arc::new(TaskManager::default());
        let sender = MediaSender::new(
            sink.ctx.clone(),
            task_manager.clone(),
            sink.accumulator.clone(),
            Arc::new(RubatoAudioResampler::new()),
        );
        (sender, task_manager)
    }

    fn drain(sink: &mut TestSink) -> Vec<(FrameType, FrameDirection)> {
        std::iter::from_fn(|| sink.pushed.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_start_creates_tasks() {
        let sink = test_sink(TransportParams::default().with_video_out(true));
        let (mut sender, task_manager) = sender(&sink);
        sender.start().await.unwrap();
        assert_eq!(task_manager.current_tasks().await.len(), 3);

        sender.cancel().await.unwrap();
        assert!(task_manager.current_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_video_task_only_when_enabled() {
        let sink = test_sink(TransportParams::default());
        let (mut sender, task_manager) = sender(&sink);
        sender.start().await.unwrap();
        let names: Vec<String> = task_manager
            .current_tasks()
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(!names.iter().any(|n| n.ends_with("::video")));
        sender.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_audio_is_chunked_in_order() {
        let mut sink = test_sink(
            TransportParams::default()
                .with_audio_out(true)
                .with_audio_out_10ms_chunks(2),
        );
        let (mut sender, _tm) = sender(&sink);
        sender.start().await.unwrap();

        let audio: Vec<u8> = (0..1000).map(|i| (i % 200) as u8).collect();
        sender
            .handle_audio_frame(FrameType::TTSAudioRaw(TTSAudioRawFrame::new(
                audio.clone(),
                16000,
                1,
            )))
            .await
            .unwrap();
        assert_eq!(sink.accumulator.lock().await.len(), 360);

        sender.stop(&EndFrame::new()).await.unwrap();

        let chunks: Vec<Vec<u8>> = drain(&mut sink)
            .into_iter()
            .filter_map(|(f, d)| match f {
                FrameType::TTSAudioRaw(f) if d == FrameDirection::Downstream => {
                    Some(f.audio_frame.audio)
                }
                _ => None,
            })
            .collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], audio[..640].to_vec());
    }

    #[tokio::test]
    async fn test_stop_delivers_queued_then_nothing() {
        let mut sink = test_sink(TransportParams::default());
        let (mut sender, _tm) = sender(&sink);
        sender.start().await.unwrap();

        let first = TextFrame::new("first");
        let first_id = first.id();
        sender.handle_sync_frame(FrameType::Text(first)).await.unwrap();

        let mut timed = FrameType::Text(TextFrame::new("timed"));
        timed.set_pts(Some(0));
        let timed_id = timed.id();
        sender.handle_timed_frame(timed).await.unwrap();

        sender.stop(&EndFrame::new()).await.unwrap();

        let mut ids: Vec<u64> = drain(&mut sink).into_iter().map(|(f, _)| f.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![first_id, timed_id]);

        let late = sender.handle_sync_frame(FrameType::Text(TextFrame::new("late"))).await;
        assert!(matches!(late, Err(TransportError::QueueClosed("fifo"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interruption_recreates_tasks() {
        let mut sink = test_sink(TransportParams::default().with_audio_out(true));
        let (mut sender, task_manager) = sender(&sink);
        sender.start().await.unwrap();

        sender
            .handle_audio_frame(FrameType::TTSAudioRaw(TTSAudioRawFrame::new(
                vec![0u8; 1280 * 2 + 100],
                16000,
                1,
            )))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        while !sink.ctx.speaking.is_speaking() {
            tokio::task::yield_now().await;
        }

        let before: Vec<_> = task_manager.current_tasks().await.into_iter().map(|t| t.id).collect();
        sender.handle_interruption().await.unwrap();
        let after: Vec<_> = task_manager.current_tasks().await.into_iter().map(|t| t.id).collect();

        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|id| !before.contains(id)));
        assert!(sink.accumulator.lock().await.is_empty());
        assert!(!sink.ctx.speaking.is_speaking());

        let stops = drain(&mut sink)
            .into_iter()
            .filter(|(f, _)| matches!(f, FrameType::BotStoppedSpeaking(_)))
            .count();
        assert_eq!(stops, 2);

        // The recreated tasks accept frames.
        let text = TextFrame::new("after");
        let id = text.id();
        sender.handle_sync_frame(FrameType::Text(text)).await.unwrap();
        sender.stop(&EndFrame::new()).await.unwrap();
        assert!(drain(&mut sink).iter().any(|(f, _)| f.id() == id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_failure_is_reported_upstream() {
        let params = TransportParams::default()
            .with_audio_out(true)
            .with_audio_out_mixer_handle(CountingMixer::failing_handle());
        let mut sink = test_sink(params);
        let (mut sender, _tm) = sender(&sink);
        sender.start().await.unwrap();

        let (frame, direction) = sink.pushed.recv().await.unwrap();
        assert_eq!(direction, FrameDirection::Upstream);
        match frame {
            FrameType::Error(error) => {
                assert!(error.fatal);
                assert!(error.error.contains("mixer exploded"));
            }
            other => panic!("unexpected {}", other),
        }

        let result = sender.stop(&EndFrame::new()).await;
        assert!(matches!(result, Err(TransportError::Task(_))));
    }

    #[tokio::test]
    async fn test_failed_resize_writes_original_image() {
        let sink = test_sink(TransportParams::default().with_video_out_size(4, 4));

        // An empty buffer cannot be resized; the frame is written unchanged.
        sink.ctx
            .draw_image(OutputImageRawFrame::new(Vec::new(), (2, 2), None))
            .await;
        sink.ctx
            .draw_image(OutputImageRawFrame::new(vec![5u8; 12], (2, 2), None))
            .await;

        let frames = sink.hooks.video_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].image_frame.size, (2, 2));
        assert!(frames[0].image_frame.image.is_empty());
        assert_eq!(frames[1].image_frame.size, (4, 4));
        assert_eq!(frames[1].image_frame.image, vec![5u8; 48]);
    }
}
