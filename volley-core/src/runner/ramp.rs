use std::time::Duration;

/// Linear start stagger: worker `k` of `threads` starts `ramp * k / threads`
/// after the run begins, so the first starts immediately and the last one
/// `ramp / threads` before the ramp ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSchedule {
    ramp: Duration,
    threads: u64,
}

impl RampSchedule {
    pub fn new(ramp: Duration, threads: u64) -> Self {
        Self {
            ramp,
            threads: threads.max(1),
        }
    }

    pub fn start_offset(&self, worker: u64) -> Duration {
        if self.ramp.is_zero() {
            return Duration::ZERO;
        }
        let k = worker.min(self.threads - 1) as u128;
        let nanos = self.ramp.as_nanos().saturating_mul(k) / self.threads as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}
