//! Timestamp-scheduled delivery.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::error::{Result, TransportError};
use crate::frames::{EndFrame, Frame, FrameType};
use crate::transport::media_sender::SinkContext;

/// Total order of scheduled frames: timestamp first, frame id on ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchedulingKey {
    pub timestamp: u64,
    pub id: u64,
}

#[derive(Debug)]
pub struct TimedFrame {
    pub key: SchedulingKey,
    pub frame: FrameType,
}

impl TimedFrame {
    /// Key a frame by its pts. Frames without one are due immediately.
    pub fn new(frame: FrameType) -> Self {
        let key = SchedulingKey {
            timestamp: frame.pts().unwrap_or(0),
            id: frame.id(),
        };
        Self { key, frame }
    }

    /// The stop sentinel sorts after every real frame.
    pub fn end(frame: EndFrame) -> Self {
        let key = SchedulingKey {
            timestamp: u64::MAX,
            id: frame.id(),
        };
        Self {
            key,
            frame: FrameType::End(frame),
        }
    }
}

impl PartialEq for TimedFrame {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TimedFrame {}

impl PartialOrd for TimedFrame {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedFrame {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Scheduled delivery loop.
///
/// Frames are released in ascending key order once the logical clock reaches their
/// timestamp. A frame arriving while the loop waits on a later one is considered right
/// away, so an earlier timestamp is never delivered after a later one that was merely
/// enqueued first. Per-frame failures are logged and never end the loop.
pub(crate) async fn run_clock_task(
    ctx: Arc<SinkContext>,
    mut rx: mpsc::UnboundedReceiver<TimedFrame>,
) -> Result<()> {
    let mut queue: BinaryHeap<Reverse<TimedFrame>> = BinaryHeap::new();
    let mut open = true;

    loop {
        while let Ok(timed) = rx.try_recv() {
            queue.push(Reverse(timed));
        }

        let (timestamp, is_end) = match queue.peek() {
            Some(Reverse(next)) => (next.key.timestamp, next.frame.is_end()),
            None if open => {
                match rx.recv().await {
                    Some(timed) => queue.push(Reverse(timed)),
                    None => open = false,
                }
                continue;
            }
            None => break,
        };

        if is_end {
            break;
        }

        let now = match ctx
            .clock
            .get_time()
            .map_err(|e| TransportError::Clock(e.to_string()))
        {
            Ok(now) => now,
            Err(e) => {
                log::error!("{}: {}, dropping frame", ctx.name, e);
                queue.pop();
                continue;
            }
        };

        if timestamp > now {
            let wait = sleep(Duration::from_nanos(timestamp - now));
            if open {
                tokio::select! {
                    _ = wait => {}
                    arrival = rx.recv() => {
                        match arrival {
                            Some(timed) => queue.push(Reverse(timed)),
                            None => open = false,
                        }
                        continue;
                    }
                }
            } else {
                wait.await;
            }
        }

        if let Some(Reverse(timed)) = queue.pop() {
            ctx.handle_frame(&timed.frame).await;
            ctx.push_downstream(timed.frame).await;
        }
    }

    log::debug!("{}: clock task finished", ctx.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::clock::{BaseClock, ClockResult};
    use crate::frames::TextFrame;
    use crate::processors::FrameDirection;
    use crate::transport::media_sender::test_support::{test_context_with_clock, test_sink};
    use crate::transport::params::TransportParams;

    /// Fails the first read, then reports a fixed time.
    #[derive(Debug, Default)]
    struct FlakyClock {
        failed: AtomicBool,
    }

    impl BaseClock for FlakyClock {
        fn get_time(&self) -> ClockResult<u64> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err("clock unavailable".into());
            }
            Ok(1_000)
        }

        fn start(&mut self) -> ClockResult<()> {
            Ok(())
        }
    }

    fn text_at(pts: u64) -> (u64, TimedFrame) {
        let mut frame = FrameType::Text(TextFrame::new(format!("at {}", pts)));
        frame.set_pts(Some(pts));
        (frame.id(), TimedFrame::new(frame))
    }

    #[test]
    fn test_scheduling_key_order() {
        let a = SchedulingKey { timestamp: 50, id: 9 };
        let b = SchedulingKey { timestamp: 70, id: 1 };
        let c = SchedulingKey { timestamp: 70, id: 2 };
        assert!(a < b);
        assert!(b < c);
        assert!(TimedFrame::end(EndFrame::new()).key > c);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_timestamp_order() {
        let mut sink = test_sink(TransportParams::default());
        sink.clock.set_time(0);
        let (tx, rx) = mpsc::unbounded_channel();

        let (id_100, f_100) = text_at(100);
        let (id_50, f_50) = text_at(50);
        let (id_70, f_70) = text_at(70);
        tx.send(f_100).unwrap();
        tx.send(f_50).unwrap();
        tx.send(f_70).unwrap();
        tx.send(TimedFrame::end(EndFrame::new())).unwrap();

        run_clock_task(sink.ctx.clone(), rx).await.unwrap();

        let ids: Vec<u64> = std::iter::from_fn(|| sink.pushed.try_recv().ok())
            .map(|(f, d)| {
                assert_eq!(d, FrameDirection::Downstream);
                f.id()
            })
            .collect();
        assert_eq!(ids, vec![id_50, id_70, id_100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_arrival_preempts_wait() {
        let mut sink = test_sink(TransportParams::default());
        sink.clock.set_time(0);
        let (tx, rx) = mpsc::unbounded_channel();

        let (late_id, late) = text_at(1_000_000_000);
        let (early_id, early) = text_at(10_000_000);
        tx.send(late).unwrap();

        let task = tokio::spawn(run_clock_task(sink.ctx.clone(), rx));
        tokio::time::sleep(Duration::from_millis(1)).await;
        tx.send(early).unwrap();
        tx.send(TimedFrame::end(EndFrame::new())).unwrap();
        task.await.unwrap().unwrap();

        let ids: Vec<u64> = std::iter::from_fn(|| sink.pushed.try_recv().ok())
            .map(|(f, _)| f.id())
            .collect();
        assert_eq!(ids, vec![early_id, late_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_frame_is_not_delayed() {
        let mut sink = test_sink(TransportParams::default());
        sink.clock.set_time(5_000_000_000);
        let (tx, rx) = mpsc::unbounded_channel();
        let (id, frame) = text_at(1_000);
        tx.send(frame).unwrap();
        tx.send(TimedFrame::end(EndFrame::new())).unwrap();

        let start = tokio::time::Instant::now();
        run_clock_task(sink.ctx.clone(), rx).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(sink.pushed.try_recv().unwrap().0.id(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_frame_waits_until_due() {
        let mut sink = test_sink(TransportParams::default());
        sink.clock.set_time(0);
        let (tx, rx) = mpsc::unbounded_channel();
        let (_, frame) = text_at(250_000_000);
        tx.send(frame).unwrap();
        drop(tx);

        let start = tokio::time::Instant::now();
        run_clock_task(sink.ctx.clone(), rx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(sink.pushed.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_clock_error_drops_only_that_frame() {
        let (ctx, mut pushed) =
            test_context_with_clock(TransportParams::default(), Arc::new(FlakyClock::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        let (_, dropped) = text_at(10);
        let (kept_id, kept) = text_at(20);
        tx.send(dropped).unwrap();
        tx.send(kept).unwrap();
        tx.send(TimedFrame::end(EndFrame::new())).unwrap();

        run_clock_task(ctx, rx).await.unwrap();

        let ids: Vec<u64> = std::iter::from_fn(|| pushed.try_recv().ok())
            .map(|(f, _)| f.id())
            .collect();
        assert_eq!(ids, vec![kept_id]);
    }
}
