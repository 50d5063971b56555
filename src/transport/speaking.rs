//! Bot speaking state and its notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::audio::AudioAccumulator;
use crate::frames::{BotSpeakingFrame, BotStartedSpeakingFrame, BotStoppedSpeakingFrame, FrameType};
use crate::processors::{FrameDirection, FramePusher};

/// Edge-triggered speaking state.
///
/// `started_speaking` only notifies on a silent -> speaking transition and
/// `stopped_speaking` only on speaking -> silent, no matter how many tasks call them.
pub struct SpeakingTracker {
    speaking: AtomicBool,
    pusher: Arc<dyn FramePusher>,
    accumulator: Arc<Mutex<AudioAccumulator>>,
}

impl SpeakingTracker {
    pub fn new(pusher: Arc<dyn FramePusher>, accumulator: Arc<Mutex<AudioAccumulator>>) -> Self {
        Self {
            speaking: AtomicBool::new(false),
            pusher,
            accumulator,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub async fn started_speaking(&self) {
        if self
            .speaking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        log::debug!("Bot started speaking");
        self.push_both(|| FrameType::BotStartedSpeaking(BotStartedSpeakingFrame::new()))
            .await;
    }

    pub async fn stopped_speaking(&self) {
        if self
            .speaking
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        log::debug!("Bot stopped speaking");
        // Drop any sub-chunk leftover from the finished utterance.
        self.accumulator.lock().await.clear();
        self.push_both(|| FrameType::BotStoppedSpeaking(BotStoppedSpeakingFrame::new()))
            .await;
    }

    pub async fn pulse(&self) {
        self.push_both(|| FrameType::BotSpeaking(BotSpeakingFrame::new()))
            .await;
    }

    async fn push_both<F>(&self, make: F)
    where
        F: Fn() -> FrameType,
    {
        for direction in [FrameDirection::Downstream, FrameDirection::Upstream] {
            let frame = make();
            if let Err(e) = self.pusher.push_frame(frame, direction).await {
                log::error!("Failed to push speaking notification {:?}: {}", direction, e);
            }
        }
    }
}

/// Throttles BotSpeaking pulses to one every `period` speech chunks.
#[derive(Debug)]
pub struct SpeakingPulse {
    period: u32,
    counter: u32,
}

impl SpeakingPulse {
    pub fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            counter: 0,
        }
    }

    /// Count one speech chunk; returns true when a pulse is due.
    pub fn tick(&mut self) -> bool {
        let due = self.counter % self.period == 0;
        if due {
            self.counter = 0;
        }
        self.counter += 1;
        due
    }
}
