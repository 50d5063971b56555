//! Output delivery engine for real-time voice and video agent pipelines.
//!
//! [`BaseOutputTransport`] is the last frame processor of a pipeline. It routes every
//! incoming frame to an immediate push, an arrival-ordered queue or a timestamp-ordered
//! queue, chunks audio, paces video and tracks whether the bot is speaking. Concrete
//! transports only implement [`OutputTransportHooks`].

pub mod audio;
pub mod clock;
pub mod error;
pub mod frames;
pub mod processors;
pub mod task_manager;
pub mod transport;
pub mod video;

pub use error::{Result, TransportError};
pub use frames::*;
pub use processors::{ChannelPusher, FrameDirection, FrameProcessorTrait, FramePusher, NullPusher};
pub use task_manager::{TaskError, TaskManager, TaskManagerConfig};
pub use transport::{
    BaseOutputTransport, NullHooks, OutputTransportBuilder, OutputTransportHooks, TransportParams,
};
