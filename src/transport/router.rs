//! Classification of incoming frames.
//!
//! The order of the checks matters: more specific system frames are matched before the
//! generic system arm, and timestamped frames only reach the scheduler if no earlier
//! media rule claimed them.

use crate::frames::{
    EndFrame, Frame, FrameType, MixerControlFrame, StartFrame, TransportMessageUrgentFrame,
};
use crate::processors::FrameDirection;

/// Where a frame goes next.
#[derive(Debug)]
pub enum Route {
    /// Push first, then start the transport.
    Start(StartFrame),
    /// Cancel all tasks, then push.
    Cancel(FrameType),
    /// Push, then run the interruption controller.
    Interruption(FrameType),
    /// Send now, ahead of anything queued.
    UrgentMessage(TransportMessageUrgentFrame),
    /// Push without queuing.
    Immediate(FrameType),
    /// Drain and stop, then push.
    End(EndFrame),
    /// Hand to the configured mixer.
    Mixer(MixerControlFrame),
    /// Chunk and queue.
    Audio(FrameType),
    /// Live queue or image swap.
    Image(FrameType),
    /// Timestamp-ordered queue.
    Scheduled(FrameType),
    /// Push upstream right away.
    Upstream(FrameType),
    /// Arrival-ordered queue.
    Fifo(FrameType),
}

pub fn route(frame: FrameType, direction: FrameDirection, mixer_configured: bool) -> Route {
    match frame {
        FrameType::Start(start) => Route::Start(start),
        FrameType::Cancel(_) => Route::Cancel(frame),
        FrameType::StartInterruption(_) | FrameType::StopInterruption(_) => {
            Route::Interruption(frame)
        }
        FrameType::TransportMessageUrgent(message) => Route::UrgentMessage(message),
        other if other.is_system_frame() => Route::Immediate(other),
        FrameType::End(end) => Route::End(end),
        FrameType::MixerControl(control) if mixer_configured => Route::Mixer(control),
        FrameType::OutputAudioRaw(_) | FrameType::TTSAudioRaw(_) => Route::Audio(frame),
        FrameType::OutputImageRaw(_) | FrameType::Sprite(_) => Route::Image(frame),
        other if other.pts().is_some() => Route::Scheduled(other),
        other if direction == FrameDirection::Upstream => Route::Upstream(other),
        other => Route::Fifo(other),
    }
}
