//! Output transport.
//!
//! - `output`: the frame processor and its builder, plus the write hooks a concrete
//!   transport implements
//! - `params`: configuration
//! - `router`: frame classification
//! - `media_sender`: per-run queues and delivery tasks
//!
//! The remaining modules are the delivery tasks themselves and the speaking-state
//! tracker they share.
mod audio_task;
mod clock_task;
pub mod frame_source;
pub mod media_sender;
pub mod output;
pub mod params;
pub mod router;
pub mod speaking;
mod video_task;

pub use clock_task::{SchedulingKey, TimedFrame};
pub use media_sender::{MediaSender, SinkContext};
pub use output::{BaseOutputTransport, NullHooks, OutputTransportBuilder, OutputTransportHooks};
pub use params::TransportParams;
pub use router::{route, Route};
pub use speaking::{SpeakingPulse, SpeakingTracker};
pub use video_task::{LivePacer, Pace};
