//! Frame definitions for the output delivery engine.
//!
//! Every unit of data or control that reaches the output transport is a [`FrameType`].
//! The enum is closed: routing decisions are exhaustive matches, so adding a variant
//! forces every classification site to be revisited.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generate a unique, monotonically increasing frame id.
fn obj_id() -> u64 {
    static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);
    FRAME_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// Processing category of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// High priority, pushed immediately and never queued.
    System,
    /// Ordered content, dropped on interruption.
    Data,
    /// Ordered control signals, dropped on interruption.
    Control,
}

/// Common accessors shared by all frames.
pub trait Frame {
    fn base(&self) -> &BaseFrame;

    fn base_mut(&mut self) -> &mut BaseFrame;

    /// Unique identifier, also used as the scheduling tie-break.
    fn id(&self) -> u64 {
        self.base().id
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    /// Presentation timestamp in logical nanoseconds.
    fn pts(&self) -> Option<u64> {
        self.base().pts
    }

    fn set_pts(&mut self, pts: Option<u64>) {
        self.base_mut().pts = pts;
    }

    fn transport_destination(&self) -> Option<&str> {
        self.base().transport_destination.as_deref()
    }

    fn set_transport_destination(&mut self, destination: Option<String>) {
        self.base_mut().transport_destination = destination;
    }
}

/// Fields carried by every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseFrame {
    pub id: u64,
    pub name: String,
    pub pts: Option<u64>,
    pub transport_destination: Option<String>,
}

impl BaseFrame {
    pub fn new(type_name: &str) -> Self {
        let id = obj_id();
        Self {
            id,
            name: format!("{}#{}", type_name, id),
            pts: None,
            transport_destination: None,
        }
    }
}

macro_rules! impl_frame {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Frame for $ty {
                fn base(&self) -> &BaseFrame {
                    &self.base
                }

                fn base_mut(&mut self) -> &mut BaseFrame {
                    &mut self.base
                }
            }
        )*
    };
}

//
// Audio and image payloads
//

/// A chunk of raw 16-bit PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRawFrame {
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub num_channels: u16,
    pub num_frames: usize,
}

impl AudioRawFrame {
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u16) -> Self {
        let num_frames = audio.len() / (num_channels.max(1) as usize * 2);
        Self {
            audio,
            sample_rate,
            num_channels,
            num_frames,
        }
    }
}

/// A raw image with its dimensions and pixel format (e.g. "RGB", "RGBA", "JPEG").
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRawFrame {
    pub image: Vec<u8>,
    pub size: (u32, u32),
    pub format: Option<String>,
}

impl ImageRawFrame {
    pub fn new(image: Vec<u8>, size: (u32, u32), format: Option<String>) -> Self {
        Self {
            image,
            size,
            format,
        }
    }
}

//
// Data frames
//

/// Audio to be written by the output transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputAudioRawFrame {
    pub base: BaseFrame,
    pub audio_frame: AudioRawFrame,
}

impl OutputAudioRawFrame {
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u16) -> Self {
        Self {
            base: BaseFrame::new("OutputAudioRawFrame"),
            audio_frame: AudioRawFrame::new(audio, sample_rate, num_channels),
        }
    }
}

impl fmt::Display for OutputAudioRawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(pts: {:?}, size: {}, frames: {}, sample_rate: {}, channels: {})",
            self.name(),
            self.pts(),
            self.audio_frame.audio.len(),
            self.audio_frame.num_frames,
            self.audio_frame.sample_rate,
            self.audio_frame.num_channels
        )
    }
}

/// Synthesized bot speech. This is the only audio that drives the speaking state.
#[derive(Debug, Clone, PartialEq)]
pub struct TTSAudioRawFrame {
    pub base: BaseFrame,
    pub audio_frame: AudioRawFrame,
}

impl TTSAudioRawFrame {
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u16) -> Self {
        Self {
            base: BaseFrame::new("TTSAudioRawFrame"),
            audio_frame: AudioRawFrame::new(audio, sample_rate, num_channels),
        }
    }
}

/// Image to be rendered by the output transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputImageRawFrame {
    pub base: BaseFrame,
    pub image_frame: ImageRawFrame,
}

impl OutputImageRawFrame {
    pub fn new(image: Vec<u8>, size: (u32, u32), format: Option<String>) -> Self {
        Self {
            base: BaseFrame::new("OutputImageRawFrame"),
            image_frame: ImageRawFrame::new(image, size, format),
        }
    }
}

impl fmt::Display for OutputImageRawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(pts: {:?}, size: {:?}, format: {:?})",
            self.name(),
            self.pts(),
            self.image_frame.size,
            self.image_frame.format
        )
    }
}

/// An animation: the images are rendered in a loop at the output framerate.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteFrame {
    pub base: BaseFrame,
    pub images: Vec<OutputImageRawFrame>,
}

impl SpriteFrame {
    pub fn new(images: Vec<OutputImageRawFrame>) -> Self {
        Self {
            base: BaseFrame::new("SpriteFrame"),
            images,
        }
    }
}

/// Application message sent through the transport in order with the media.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessageFrame {
    pub base: BaseFrame,
    pub message: String,
}

impl TransportMessageFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            base: BaseFrame::new("TransportMessageFrame"),
            message: message.into(),
        }
    }
}

/// Plain text travelling through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFrame {
    pub base: BaseFrame,
    pub text: String,
}

impl TextFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            base: BaseFrame::new("TextFrame"),
            text: text.into(),
        }
    }
}

//
// System frames
//

/// First frame of every run. Carries the negotiated pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StartFrame {
    pub base: BaseFrame,
    pub audio_in_sample_rate: u32,
    pub audio_out_sample_rate: u32,
    pub allow_interruptions: bool,
    pub enable_metrics: bool,
}

impl StartFrame {
    pub fn new() -> Self {
        Self {
            base: BaseFrame::new("StartFrame"),
            audio_in_sample_rate: 16000,
            audio_out_sample_rate: 24000,
            allow_interruptions: false,
            enable_metrics: false,
        }
    }

    pub fn with_sample_rates(mut self, input: u32, output: u32) -> Self {
        self.audio_in_sample_rate = input;
        self.audio_out_sample_rate = output;
        self
    }

    pub fn with_interruptions(mut self, allow: bool) -> Self {
        self.allow_interruptions = allow;
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }
}

impl Default for StartFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Error notification. A fatal error asks the pipeline to shut down.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorFrame {
    pub base: BaseFrame,
    pub error: String,
    pub fatal: bool,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            base: BaseFrame::new("ErrorFrame"),
            error: error.into(),
            fatal: false,
        }
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(error)
        }
    }
}

impl fmt::Display for ErrorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(error: {}, fatal: {})", self.name(), self.error, self.fatal)
    }
}

/// Message that must reach the transport before anything already queued.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessageUrgentFrame {
    pub base: BaseFrame,
    pub message: String,
}

impl TransportMessageUrgentFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            base: BaseFrame::new("TransportMessageUrgentFrame"),
            message: message.into(),
        }
    }
}

macro_rules! unit_frames {
    ($($(#[$meta:meta])* $ty:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $ty {
                pub base: BaseFrame,
            }

            impl $ty {
                pub fn new() -> Self {
                    Self {
                        base: BaseFrame::new(stringify!($ty)),
                    }
                }
            }

            impl Default for $ty {
                fn default() -> Self {
                    Self::new()
                }
            }
        )*
    };
}

unit_frames!(
    /// Stops the pipeline immediately, dropping anything queued.
    CancelFrame,
    /// The user started talking over the bot: buffered output must be discarded.
    StartInterruptionFrame,
    /// The interruption is over.
    StopInterruptionFrame,
    UserStartedSpeakingFrame,
    UserStoppedSpeakingFrame,
    /// Emitted once when the bot starts producing audio.
    BotStartedSpeakingFrame,
    /// Emitted once when the bot audio goes silent.
    BotStoppedSpeakingFrame,
    /// Periodic keep-alive while the bot is speaking.
    BotSpeakingFrame,
    /// Graceful end of the run; everything queued before it is delivered.
    EndFrame,
    LLMFullResponseStartFrame,
    LLMFullResponseEndFrame,
);

//
// Control frames with payload
//

/// Runtime instruction for the background audio mixer.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerControlFrame {
    pub base: BaseFrame,
    pub enable: Option<bool>,
    pub volume: Option<f32>,
    pub sound: Option<String>,
}

impl MixerControlFrame {
    pub fn new() -> Self {
        Self {
            base: BaseFrame::new("MixerControlFrame"),
            enable: None,
            volume: None,
            sound: None,
        }
    }

    pub fn enable(enable: bool) -> Self {
        Self {
            enable: Some(enable),
            ..Self::new()
        }
    }

    pub fn volume(volume: f32) -> Self {
        Self {
            volume: Some(volume.clamp(0.0, 1.0)),
            ..Self::new()
        }
    }

    pub fn sound(sound: impl Into<String>) -> Self {
        Self {
            sound: Some(sound.into()),
            ..Self::new()
        }
    }
}

impl Default for MixerControlFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl_frame!(
    OutputAudioRawFrame,
    TTSAudioRawFrame,
    OutputImageRawFrame,
    SpriteFrame,
    TransportMessageFrame,
    TextFrame,
    StartFrame,
    ErrorFrame,
    TransportMessageUrgentFrame,
    CancelFrame,
    StartInterruptionFrame,
    StopInterruptionFrame,
    UserStartedSpeakingFrame,
    UserStoppedSpeakingFrame,
    BotStartedSpeakingFrame,
    BotStoppedSpeakingFrame,
    BotSpeakingFrame,
    EndFrame,
    LLMFullResponseStartFrame,
    LLMFullResponseEndFrame,
    MixerControlFrame,
);

/// Transport messages handed to the `send_message` write hook.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessageFrameType {
    Message(TransportMessageFrame),
    Urgent(TransportMessageUrgentFrame),
}

impl TransportMessageFrameType {
    pub fn message(&self) -> &str {
        match self {
            TransportMessageFrameType::Message(frame) => &frame.message,
            TransportMessageFrameType::Urgent(frame) => &frame.message,
        }
    }
}

/// Every frame the output transport can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameType {
    // Data frames
    OutputAudioRaw(OutputAudioRawFrame),
    TTSAudioRaw(TTSAudioRawFrame),
    OutputImageRaw(OutputImageRawFrame),
    Sprite(SpriteFrame),
    TransportMessage(TransportMessageFrame),
    Text(TextFrame),

    // System frames
    Start(StartFrame),
    Cancel(CancelFrame),
    Error(ErrorFrame),
    StartInterruption(StartInterruptionFrame),
    StopInterruption(StopInterruptionFrame),
    TransportMessageUrgent(TransportMessageUrgentFrame),
    UserStartedSpeaking(UserStartedSpeakingFrame),
    UserStoppedSpeaking(UserStoppedSpeakingFrame),
    BotStartedSpeaking(BotStartedSpeakingFrame),
    BotStoppedSpeaking(BotStoppedSpeakingFrame),
    BotSpeaking(BotSpeakingFrame),

    // Control frames
    End(EndFrame),
    MixerControl(MixerControlFrame),
    LLMFullResponseStart(LLMFullResponseStartFrame),
    LLMFullResponseEnd(LLMFullResponseEndFrame),
}

impl Frame for FrameType {
    fn base(&self) -> &BaseFrame {
        match self {
            FrameType::OutputAudioRaw(f) => f.base(),
            FrameType::TTSAudioRaw(f) => f.base(),
            FrameType::OutputImageRaw(f) => f.base(),
            FrameType::Sprite(f) => f.base(),
            FrameType::TransportMessage(f) => f.base(),
            FrameType::Text(f) => f.base(),
            FrameType::Start(f) => f.base(),
            FrameType::Cancel(f) => f.base(),
            FrameType::Error(f) => f.base(),
            FrameType::StartInterruption(f) => f.base(),
            FrameType::StopInterruption(f) => f.base(),
            FrameType::TransportMessageUrgent(f) => f.base(),
            FrameType::UserStartedSpeaking(f) => f.base(),
            FrameType::UserStoppedSpeaking(f) => f.base(),
            FrameType::BotStartedSpeaking(f) => f.base(),
            FrameType::BotStoppedSpeaking(f) => f.base(),
            FrameType::BotSpeaking(f) => f.base(),
            FrameType::End(f) => f.base(),
            FrameType::MixerControl(f) => f.base(),
            FrameType::LLMFullResponseStart(f) => f.base(),
            FrameType::LLMFullResponseEnd(f) => f.base(),
        }
    }

    fn base_mut(&mut self) -> &mut BaseFrame {
        match self {
            FrameType::OutputAudioRaw(f) => f.base_mut(),
            FrameType::TTSAudioRaw(f) => f.base_mut(),
            FrameType::OutputImageRaw(f) => f.base_mut(),
            FrameType::Sprite(f) => f.base_mut(),
            FrameType::TransportMessage(f) => f.base_mut(),
            FrameType::Text(f) => f.base_mut(),
            FrameType::Start(f) => f.base_mut(),
            FrameType::Cancel(f) => f.base_mut(),
            FrameType::Error(f) => f.base_mut(),
            FrameType::StartInterruption(f) => f.base_mut(),
            FrameType::StopInterruption(f) => f.base_mut(),
            FrameType::TransportMessageUrgent(f) => f.base_mut(),
            FrameType::UserStartedSpeaking(f) => f.base_mut(),
            FrameType::UserStoppedSpeaking(f) => f.base_mut(),
            FrameType::BotStartedSpeaking(f) => f.base_mut(),
            FrameType::BotStoppedSpeaking(f) => f.base_mut(),
            FrameType::BotSpeaking(f) => f.base_mut(),
            FrameType::End(f) => f.base_mut(),
            FrameType::MixerControl(f) => f.base_mut(),
            FrameType::LLMFullResponseStart(f) => f.base_mut(),
            FrameType::LLMFullResponseEnd(f) => f.base_mut(),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::OutputAudioRaw(frame) => fmt::Display::fmt(frame, f),
            FrameType::OutputImageRaw(frame) => fmt::Display::fmt(frame, f),
            FrameType::Error(frame) => fmt::Display::fmt(frame, f),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl FrameType {
    pub fn kind(&self) -> FrameKind {
        match self {
            FrameType::OutputAudioRaw(_)
            | FrameType::TTSAudioRaw(_)
            | FrameType::OutputImageRaw(_)
            | FrameType::Sprite(_)
            | FrameType::TransportMessage(_)
            | FrameType::Text(_) => FrameKind::Data,
            FrameType::Start(_)
            | FrameType::Cancel(_)
            | FrameType::Error(_)
            | FrameType::StartInterruption(_)
            | FrameType::StopInterruption(_)
            | FrameType::TransportMessageUrgent(_)
            | FrameType::UserStartedSpeaking(_)
            | FrameType::UserStoppedSpeaking(_)
            | FrameType::BotStartedSpeaking(_)
            | FrameType::BotStoppedSpeaking(_)
            | FrameType::BotSpeaking(_) => FrameKind::System,
            FrameType::End(_)
            | FrameType::MixerControl(_)
            | FrameType::LLMFullResponseStart(_)
            | FrameType::LLMFullResponseEnd(_) => FrameKind::Control,
        }
    }

    pub fn is_system_frame(&self) -> bool {
        self.kind() == FrameKind::System
    }

    pub fn is_data_frame(&self) -> bool {
        self.kind() == FrameKind::Data
    }

    pub fn is_control_frame(&self) -> bool {
        self.kind() == FrameKind::Control
    }

    /// Audio payload of output audio frames (plain or synthesized speech).
    pub fn audio_frame(&self) -> Option<&AudioRawFrame> {
        match self {
            FrameType::OutputAudioRaw(f) => Some(&f.audio_frame),
            FrameType::TTSAudioRaw(f) => Some(&f.audio_frame),
            _ => None,
        }
    }

    pub fn audio_frame_mut(&mut self) -> Option<&mut AudioRawFrame> {
        match self {
            FrameType::OutputAudioRaw(f) => Some(&mut f.audio_frame),
            FrameType::TTSAudioRaw(f) => Some(&mut f.audio_frame),
            _ => None,
        }
    }

    /// Builds a new audio frame of the same variant as `self` carrying `audio`.
    ///
    /// Returns `None` for non-audio frames.
    pub fn with_audio(&self, audio: Vec<u8>, sample_rate: u32) -> Option<FrameType> {
        match self {
            FrameType::OutputAudioRaw(f) => {
                let mut chunk =
                    OutputAudioRawFrame::new(audio, sample_rate, f.audio_frame.num_channels);
                chunk.set_transport_destination(f.base.transport_destination.clone());
                Some(FrameType::OutputAudioRaw(chunk))
            }
            FrameType::TTSAudioRaw(f) => {
                let mut chunk =
                    TTSAudioRawFrame::new(audio, sample_rate, f.audio_frame.num_channels);
                chunk.set_transport_destination(f.base.transport_destination.clone());
                Some(FrameType::TTSAudioRaw(chunk))
            }
            _ => None,
        }
    }

    /// The frame written by the audio write hook.
    pub fn to_output_audio(&self) -> Option<OutputAudioRawFrame> {
        match self {
            FrameType::OutputAudioRaw(f) => Some(f.clone()),
            FrameType::TTSAudioRaw(f) => Some(OutputAudioRawFrame {
                base: f.base.clone(),
                audio_frame: f.audio_frame.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, FrameType::End(_))
    }
}
