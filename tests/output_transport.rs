use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentflow_output::audio::{BaseAudioMixer, MixerResult};
use agentflow_output::clock::ManualClock;
use agentflow_output::*;
use tokio::sync::mpsc::UnboundedReceiver;

type Pushed = UnboundedReceiver<(FrameType, FrameDirection)>;

#[derive(Default)]
struct RecordingSink {
    audio: Mutex<Vec<OutputAudioRawFrame>>,
    video: Mutex<Vec<OutputImageRawFrame>>,
}

impl RecordingSink {
    fn audio_len(&self) -> usize {
        self.audio.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl OutputTransportHooks for RecordingSink {
    async fn write_audio_frame(&self, frame: &OutputAudioRawFrame) -> Result<()> {
        self.audio.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn write_video_frame(&self, frame: &OutputImageRawFrame) -> Result<()> {
        self.video.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BedMixer {
    sample_rate: Option<u32>,
    mixed: usize,
    stopped: bool,
}

#[async_trait::async_trait]
impl BaseAudioMixer for BedMixer {
    async fn start(&mut self, sample_rate: u32) -> MixerResult<()> {
        self.sample_rate = Some(sample_rate);
        Ok(())
    }

    async fn stop(&mut self) -> MixerResult<()> {
        self.stopped = true;
        Ok(())
    }

    async fn process_frame(&mut self, _frame: &MixerControlFrame) -> MixerResult<()> {
        Ok(())
    }

    async fn mix(&mut self, audio: &[u8]) -> MixerResult<Vec<u8>> {
        self.mixed += 1;
        Ok(audio.to_vec())
    }
}

fn build(params: TransportParams) -> (BaseOutputTransport, Pushed, Arc<RecordingSink>) {
    let (pusher, pushed) = ChannelPusher::new();
    let sink = Arc::new(RecordingSink::default());
    let transport = BaseOutputTransport::builder()
        .with_name("IntegrationOutput")
        .with_params(params)
        .with_pusher(Arc::new(pusher))
        .with_hooks(sink.clone())
        .with_clock(Arc::new(ManualClock::new(0)))
        .build()
        .unwrap();
    (transport, pushed, sink)
}

fn drain(pushed: &mut Pushed) -> Vec<(FrameType, FrameDirection)> {
    std::iter::from_fn(|| pushed.try_recv().ok()).collect()
}

async fn send(transport: &mut BaseOutputTransport, frame: FrameType) {
    transport
        .process_frame(frame, FrameDirection::Downstream)
        .await
        .unwrap();
}

fn start_16k() -> FrameType {
    FrameType::Start(
        StartFrame::new()
            .with_sample_rates(16000, 16000)
            .with_interruptions(true),
    )
}

#[tokio::test]
async fn test_speech_is_chunked_and_delivered_in_order() {
    let params = TransportParams::default()
        .with_audio_out(true)
        .with_audio_out_10ms_chunks(2);
    let (mut transport, mut pushed, sink) = build(params);

    send(&mut transport, start_16k()).await;
    send(
        &mut transport,
        FrameType::TTSAudioRaw(TTSAudioRawFrame::new(vec![7u8; 640 * 3 + 100], 16000, 1)),
    )
    .await;
    send(&mut transport, FrameType::Text(TextFrame::new("bye"))).await;
    send(&mut transport, FrameType::End(EndFrame::new())).await;

    let frames = drain(&mut pushed);
    assert!(matches!(frames.first(), Some((FrameType::Start(_), _))));
    assert!(matches!(frames.last(), Some((FrameType::End(_), FrameDirection::Downstream))));

    let started: Vec<FrameDirection> = frames
        .iter()
        .filter(|(f, _)| matches!(f, FrameType::BotStartedSpeaking(_)))
        .map(|(_, d)| *d)
        .collect();
    assert_eq!(started, vec![FrameDirection::Downstream, FrameDirection::Upstream]);

    let chunks: Vec<usize> = frames
        .iter()
        .filter_map(|(f, _)| match f {
            FrameType::TTSAudioRaw(f) => Some(f.audio_frame.audio.len()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![640, 640, 640]);
    assert_eq!(sink.audio_len(), 3);

    let text_at = frames
        .iter()
        .position(|(f, _)| matches!(f, FrameType::Text(_)))
        .unwrap();
    let last_chunk_at = frames
        .iter()
        .rposition(|(f, _)| matches!(f, FrameType::TTSAudioRaw(_)))
        .unwrap();
    assert!(last_chunk_at < text_at);
}

#[tokio::test(start_paused = true)]
async fn test_timestamped_frames_follow_the_clock() {
    let (mut transport, mut pushed, _) = build(TransportParams::default());
    send(&mut transport, start_16k()).await;

    let mut expected = Vec::new();
    for ms in [100u64, 50, 70] {
        let mut frame = FrameType::Text(TextFrame::new(format!("{}ms", ms)));
        frame.set_pts(Some(Duration::from_millis(ms).as_nanos() as u64));
        expected.push((ms, frame.id()));
        send(&mut transport, frame).await;
    }
    send(&mut transport, FrameType::End(EndFrame::new())).await;

    expected.sort();
    let expected: Vec<u64> = expected.into_iter().map(|(_, id)| id).collect();
    let delivered: Vec<u64> = drain(&mut pushed)
        .into_iter()
        .filter(|(f, _)| matches!(f, FrameType::Text(_)))
        .map(|(f, _)| f.id())
        .collect();
    assert_eq!(delivered, expected);
}

#[tokio::test(start_paused = true)]
async fn test_interruption_discards_and_recovers() {
    let params = TransportParams::default().with_audio_out(true);
    let (mut transport, mut pushed, _) = build(params);
    send(&mut transport, start_16k()).await;

    send(
        &mut transport,
        FrameType::TTSAudioRaw(TTSAudioRawFrame::new(vec![0u8; 1280 * 4], 16000, 1)),
    )
    .await;
    while !transport.is_speaking() {
        tokio::task::yield_now().await;
    }

    send(
        &mut transport,
        FrameType::StartInterruption(StartInterruptionFrame::new()),
    )
    .await;
    assert!(!transport.is_speaking());

    send(&mut transport, FrameType::Text(TextFrame::new("after"))).await;
    send(&mut transport, FrameType::End(EndFrame::new())).await;

    let frames = drain(&mut pushed);
    let stopped = frames
        .iter()
        .filter(|(f, _)| matches!(f, FrameType::BotStoppedSpeaking(_)))
        .count();
    assert_eq!(stopped, 2);
    assert!(frames.iter().any(|(f, _)| matches!(f, FrameType::Text(_))));
}

#[tokio::test]
async fn test_mixer_keeps_audio_flowing() {
    let mixer = Arc::new(tokio::sync::Mutex::new(BedMixer::default()));
    let handle: audio::AudioMixerHandle = mixer.clone();
    let params = TransportParams::default()
        .with_audio_out(true)
        .with_audio_out_mixer_handle(handle);
    let (mut transport, _pushed, sink) = build(params);

    send(&mut transport, start_16k()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send(&mut transport, FrameType::End(EndFrame::new())).await;

    let mixer = mixer.lock().await;
    assert_eq!(mixer.sample_rate, Some(16000));
    assert!(mixer.mixed > 0);
    assert!(mixer.stopped);
    assert!(sink.audio_len() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_live_video_is_paced() {
    let params = TransportParams::default()
        .with_video_out(true)
        .with_video_out_is_live(true)
        .with_video_out_size(1, 1)
        .with_video_out_framerate(50);
    let (mut transport, _pushed, sink) = build(params);
    send(&mut transport, start_16k()).await;

    for tag in 1..=3u8 {
        transport
            .send_image(OutputImageRawFrame::new(vec![tag; 3], (1, 1), None))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let tags: Vec<u8> = sink
        .video
        .lock()
        .unwrap()
        .iter()
        .map(|f| f.image_frame.image[0])
        .collect();
    assert_eq!(tags, vec![1, 2, 3]);

    transport.cancel().await.unwrap();
}
