//! Logical clock shared by the pipeline.

pub type ClockResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Monotonic time source used to release timestamped frames.
///
/// Times are nanoseconds since an implementation-defined origin, in the same unit as
/// [`Frame::pts`](crate::frames::Frame::pts).
pub trait BaseClock: Send + Sync + std::fmt::Debug {
    /// Current logical time in nanoseconds.
    fn get_time(&self) -> ClockResult<u64>;

    /// Start the clock. Must be called before `get_time`.
    fn start(&mut self) -> ClockResult<()>;

    fn stop(&mut self) -> ClockResult<()> {
        Ok(())
    }

    fn is_running(&self) -> bool {
        true
    }
}
