// Pipeline contract for frame processors.
//
// A processor receives `(FrameType, FrameDirection)` pairs and emits frames to its
// neighbours through a `FramePusher`. The output transport is the last processor of a
// pipeline, so it only ever needs the push side of the graph.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::frames::FrameType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    Downstream,
    Upstream,
}

impl Default for FrameDirection {
    fn default() -> Self {
        FrameDirection::Downstream
    }
}

#[async_trait]
pub trait FrameProcessorTrait: Send + Sync {
    async fn process_frame(&mut self, frame: FrameType, direction: FrameDirection) -> Result<()>;

    fn name(&self) -> &str;
}

/// Emits frames to the rest of the pipeline.
#[async_trait]
pub trait FramePusher: Send + Sync {
    async fn push_frame(&self, frame: FrameType, direction: FrameDirection) -> Result<()>;
}

/// Forwards pushed frames into an unbounded channel.
///
/// Lets a pipeline stage (or a test) observe everything the transport emits, in order.
#[derive(Debug, Clone)]
pub struct ChannelPusher {
    tx: mpsc::UnboundedSender<(FrameType, FrameDirection)>,
}

impl ChannelPusher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(FrameType, FrameDirection)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FramePusher for ChannelPusher {
    async fn push_frame(&self, frame: FrameType, direction: FrameDirection) -> Result<()> {
        self.tx
            .send((frame, direction))
            .map_err(|e| TransportError::Push(format!("receiver dropped {}", e.0 .0)))
    }
}

/// Discards every frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPusher;

#[async_trait]
impl FramePusher for NullPusher {
    async fn push_frame(&self, _frame: FrameType, _direction: FrameDirection) -> Result<()> {
        Ok(())
    }
}
