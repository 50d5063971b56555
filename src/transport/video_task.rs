//! Fixed-framerate video output.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};

use crate::error::Result;
use crate::frames::OutputImageRawFrame;
use crate::transport::media_sender::SinkContext;
use crate::video::VideoImageSet;

/// Pacing decision for one live image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pace {
    /// Drift exceeded the reset threshold; timing restarts from now.
    Resync,
    /// Render after sleeping this long.
    Wait(Duration),
    /// Behind schedule but within tolerance; render immediately.
    Proceed,
}

/// Keeps live video at a steady framerate relative to the first rendered image.
#[derive(Debug)]
pub struct LivePacer {
    start: Option<Instant>,
    index: u64,
    frame_duration: f64,
    frame_reset: f64,
}

impl LivePacer {
    pub fn new(frame_duration: Duration) -> Self {
        let frame_duration = frame_duration.as_secs_f64();
        Self {
            start: None,
            index: 0,
            frame_duration,
            frame_reset: frame_duration * 5.0,
        }
    }

    pub fn pace(&mut self, now: Instant) -> Pace {
        let start = match self.start {
            Some(start) => start,
            None => {
                self.index = 0;
                *self.start.insert(now)
            }
        };

        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        let render_time = self.index as f64 * self.frame_duration;
        let delay = self.frame_duration + render_time - elapsed;

        if delay.abs() > self.frame_reset {
            self.start = Some(now);
            self.index = 0;
            Pace::Resync
        } else if delay > 0.0 {
            self.index += 1;
            Pace::Wait(Duration::from_secs_f64(delay))
        } else {
            Pace::Proceed
        }
    }
}

pub(crate) async fn run_video_task(
    ctx: Arc<SinkContext>,
    live_rx: mpsc::UnboundedReceiver<OutputImageRawFrame>,
    images: watch::Receiver<VideoImageSet>,
) -> Result<()> {
    if ctx.params.video_out_is_live {
        run_live(ctx, live_rx).await
    } else {
        run_loop(ctx, images).await
    }
}

async fn run_live(
    ctx: Arc<SinkContext>,
    mut live_rx: mpsc::UnboundedReceiver<OutputImageRawFrame>,
) -> Result<()> {
    let mut pacer = LivePacer::new(ctx.params.video_frame_duration());

    while let Some(image) = live_rx.recv().await {
        if let Pace::Wait(delay) = pacer.pace(Instant::now()) {
            sleep(delay).await;
        }
        ctx.draw_image(image).await;
    }

    Ok(())
}

async fn run_loop(ctx: Arc<SinkContext>, mut images: watch::Receiver<VideoImageSet>) -> Result<()> {
    let frame_duration = ctx.params.video_frame_duration();
    let mut current = images.borrow_and_update().clone();

    loop {
        if images.has_changed().unwrap_or(false) {
            current = images.borrow_and_update().clone();
        }
        if let Some(image) = current.next_image() {
            ctx.draw_image(image).await;
        }
        sleep(frame_duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::media_sender::test_support::test_sink;
    use crate::transport::params::TransportParams;

    fn image(tag: u8, size: (u32, u32)) -> OutputImageRawFrame {
        let len = (size.0 * size.1 * 3) as usize;
        OutputImageRawFrame::new(vec![tag; len], size, Some("RGB".to_string()))
    }

    fn assert_wait(pace: Pace, expected_ms: u64) {
        match pace {
            Pace::Wait(delay) => {
                let diff = delay.as_secs_f64() - expected_ms as f64 / 1000.0;
                assert!(diff.abs() < 1e-6, "waited {:?}", delay);
            }
            other => panic!("expected wait, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_pacer_steady() {
        let mut pacer = LivePacer::new(Duration::from_millis(100));
        let t0 = Instant::now();

        assert_wait(pacer.pace(t0), 100);
        assert_wait(pacer.pace(t0 + Duration::from_millis(100)), 100);
        assert_wait(pacer.pace(t0 + Duration::from_millis(230)), 70);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_pacer_behind_and_resync() {
        let mut pacer = LivePacer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        pacer.pace(t0);

        // 150ms late: within 5 frame periods, render right away.
        assert_eq!(pacer.pace(t0 + Duration::from_millis(350)), Pace::Proceed);
        // 900ms late: beyond 5 frame periods.
        assert_eq!(pacer.pace(t0 + Duration::from_millis(1100)), Pace::Resync);
        assert_wait(pacer.pace(t0 + Duration::from_millis(1100)), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_mode_cycles_and_resizes() {
        let params = TransportParams::default()
            .with_video_out(true)
            .with_video_out_size(2, 2)
            .with_video_out_framerate(10);
        let sink = test_sink(params);
        let (_live_tx, live_rx) = mpsc::unbounded_channel();
        let images = sink.ctx.images.subscribe();

        sink.ctx
            .images
            .send_replace(VideoImageSet::new(vec![image(1, (2, 2)), image(2, (4, 4))]));

        let task = tokio::spawn(run_video_task(sink.ctx.clone(), live_rx, images));
        sleep(Duration::from_millis(350)).await;
        task.abort();

        let frames = sink.hooks.video_frames();
        assert_eq!(frames.len(), 4);
        let tags: Vec<u8> = frames.iter().map(|f| f.image_frame.image[0]).collect();
        assert_eq!(tags, vec![1, 2, 1, 2]);
        assert!(frames.iter().all(|f| f.image_frame.size == (2, 2)));
        assert!(frames.iter().all(|f| f.image_frame.image.len() == 12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_mode_without_images_is_idle() {
        let sink = test_sink(TransportParams::default().with_video_out(true));
        let (_live_tx, live_rx) = mpsc::unbounded_channel();
        let images = sink.ctx.images.subscribe();

        let task = tokio::spawn(run_video_task(sink.ctx.clone(), live_rx, images));
        sleep(Duration::from_millis(200)).await;
        task.abort();
        assert!(sink.hooks.video_frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_renders_in_order() {
        let params = TransportParams::default()
            .with_video_out(true)
            .with_video_out_is_live(true)
            .with_video_out_size(1, 1)
            .with_video_out_framerate(20);
        let sink = test_sink(params);
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let images = sink.ctx.images.subscribe();

        for tag in 0..3 {
            live_tx.send(image(tag, (1, 1))).unwrap();
        }
        drop(live_tx);

        let start = Instant::now();
        run_video_task(sink.ctx.clone(), live_rx, images).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));

        let tags: Vec<u8> = sink
            .hooks
            .video_frames()
            .iter()
            .map(|f| f.image_frame.image[0])
            .collect();
        assert_eq!(tags, vec![0, 1, 2]);
    }
}
