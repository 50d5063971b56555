//! Logical clocks used to schedule timestamped frames.

pub mod base;
pub mod manual;
pub mod system;

pub use base::{BaseClock, ClockResult};
pub use manual::ManualClock;
pub use system::SystemClock;
