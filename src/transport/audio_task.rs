use std::sync::Arc;

use crate::error::Result;
use crate::frames::FrameType;
use crate::transport::frame_source::FrameSource;
use crate::transport::media_sender::SinkContext;
use crate::transport::speaking::SpeakingPulse;

/// FIFO delivery loop.
///
/// Frames come out in arrival order. Synthesized speech drives the speaking state and
/// the BotSpeaking pulse; every frame is then handled, written (audio) and pushed
/// downstream. The loop ends on an EndFrame, which is not re-pushed, or when the queue
/// closes.
pub(crate) async fn run_fifo_task(
    ctx: Arc<SinkContext>,
    mut source: Box<dyn FrameSource>,
) -> Result<()> {
    // Push a BotSpeakingFrame every ~200ms of audio, or every chunk if chunks are longer.
    let mut pulse = SpeakingPulse::new(ctx.params.bot_speaking_period());

    while let Some(frame) = source.next_frame().await? {
        if frame.is_end() {
            break;
        }

        if matches!(frame, FrameType::TTSAudioRaw(_)) {
            ctx.speaking.started_speaking().await;
            if pulse.tick() {
                ctx.speaking.pulse().await;
            }
        }

        ctx.handle_frame(&frame).await;
        ctx.write_and_push(frame).await;
    }

    log::debug!("{}: audio task finished", ctx.name);
    Ok(())
}
