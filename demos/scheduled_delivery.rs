//! Example: timestamped frames released by the clock task, interleaved with FIFO audio.
//!
//! Run with `RUST_LOG=debug` to see the transport's own logging.

use std::sync::Arc;
use std::time::Duration;

use agentflow_output::clock::SystemClock;
use agentflow_output::{
    BaseOutputTransport, ChannelPusher, EndFrame, Frame, FrameDirection, FrameProcessorTrait,
    FrameType, OutputAudioRawFrame, OutputTransportHooks, StartFrame, TTSAudioRawFrame, TextFrame,
    TransportParams,
};

/// Prints every audio chunk the transport writes.
struct PrintingHooks;

#[async_trait::async_trait]
impl OutputTransportHooks for PrintingHooks {
    async fn write_audio_frame(&self, frame: &OutputAudioRawFrame) -> agentflow_output::Result<()> {
        println!(
            "  write_audio: {} bytes @ {} Hz",
            frame.audio_frame.audio.len(),
            frame.audio_frame.sample_rate
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    println!("Scheduled delivery example");
    println!("==========================");

    let (pusher, mut pushed) = ChannelPusher::new();
    let clock = Arc::new(SystemClock::new_started()?);
    let mut transport = BaseOutputTransport::builder()
        .with_name("DemoOutput")
        .with_params(
            TransportParams::new()
                .with_audio_out(true)
                .with_audio_out_sample_rate(16000)
                .with_audio_out_10ms_chunks(2),
        )
        .with_hooks(Arc::new(PrintingHooks))
        .with_pusher(Arc::new(pusher))
        .with_clock(clock)
        .build()?;

    let printer = tokio::spawn(async move {
        while let Some((frame, direction)) = pushed.recv().await {
            println!("  pushed {:?}: {}", direction, frame.name());
        }
    });

    transport
        .process_frame(FrameType::Start(StartFrame::new()), FrameDirection::Downstream)
        .await?;

    // Scheduled in reverse order of arrival: delivered at 300ms, 200ms, 100ms.
    for (ms, text) in [(300u64, "third"), (100, "first"), (200, "second")] {
        let mut frame = FrameType::Text(TextFrame::new(text));
        frame.set_pts(Some(Duration::from_millis(ms).as_nanos() as u64));
        transport
            .process_frame(frame, FrameDirection::Downstream)
            .await?;
    }

    // 50ms of 24 kHz speech, resampled to 16 kHz and cut into 20ms chunks.
    let speech = vec![0u8; 2400];
    transport
        .process_frame(
            FrameType::TTSAudioRaw(TTSAudioRawFrame::new(speech, 24000, 1)),
            FrameDirection::Downstream,
        )
        .await?;

    tokio::time::sleep(Duration::from_millis(400)).await;

    transport
        .process_frame(FrameType::End(EndFrame::new()), FrameDirection::Downstream)
        .await?;

    drop(transport);
    printer.await?;
    Ok(())
}
