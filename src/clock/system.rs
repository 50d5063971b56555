use crate::clock::{BaseClock, ClockResult};
use std::time::Instant;

/// Wall clock measured from `start()` with `Instant`, unaffected by system time changes.
#[derive(Debug, Default)]
pub struct SystemClock {
    started_at: Option<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { started_at: None }
    }

    pub fn new_started() -> ClockResult<Self> {
        let mut clock = Self::new();
        clock.start()?;
        Ok(clock)
    }
}

impl BaseClock for SystemClock {
    fn get_time(&self) -> ClockResult<u64> {
        let started_at = self
            .started_at
            .ok_or("Clock is not running. Call start() first.")?;
        Ok(started_at.elapsed().as_nanos() as u64)
    }

    fn start(&mut self) -> ClockResult<()> {
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) -> ClockResult<()> {
        self.started_at = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}
