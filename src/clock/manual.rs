use crate::clock::{BaseClock, ClockResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// A clock that only moves when told to.
///
/// Useful to drive timestamped delivery deterministically in tests and simulations. Share it
/// behind an `Arc` and call [`advance`](Self::advance) from the driving side.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set_time(&self, nanos: u64) {
        self.now.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, nanos: u64) -> u64 {
        self.now.fetch_add(nanos, Ordering::SeqCst) + nanos
    }
}

impl BaseClock for ManualClock {
    fn get_time(&self) -> ClockResult<u64> {
        Ok(self.now.load(Ordering::SeqCst))
    }

    fn start(&mut self) -> ClockResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.get_time().unwrap(), 10);
        assert_eq!(clock.advance(5), 15);
        clock.set_time(3);
        assert_eq!(clock.get_time().unwrap(), 3);
    }
}
