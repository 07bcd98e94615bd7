use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::Barrier;
use tokio::time::Instant;

use super::signal::AbortHandle;

/// Sustained-load phase after the fixed iterations.
///
/// Every worker reaches `arrive` after finishing its iterations; the hold
/// window opens only once all of them are there, and the first one through
/// pins the deadline.
#[derive(Debug)]
pub struct HoldGate {
    hold: Duration,
    barrier: Barrier,
    deadline: OnceLock<Instant>,
}

impl HoldGate {
    pub fn new(hold: Duration, workers: usize) -> Self {
        Self {
            hold,
            barrier: Barrier::new(workers.max(1)),
            deadline: OnceLock::new(),
        }
    }

    /// Wait for every worker. Returns `false` if the run was aborted first.
    pub async fn arrive(&self, abort: &AbortHandle) -> bool {
        tokio::select! {
            _ = self.barrier.wait() => {
                self.deadline.get_or_init(|| Instant::now() + self.hold);
                !abort.is_aborted()
            }
            _ = abort.cancelled() => false,
        }
    }

    /// Whether another pass may start. Checked between passes, so a pass that
    /// starts just before the deadline still runs to the end.
    pub fn is_open(&self) -> bool {
        self.deadline
            .get()
            .is_some_and(|deadline| Instant::now() < *deadline)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn opens_after_all_workers_arrive_and_closes_at_deadline() {
        let gate = Arc::new(HoldGate::new(Duration::from_secs(3), 2));
        let abort = AbortHandle::new();
        assert!(!gate.is_open());

        let early = {
            let gate = gate.clone();
            let abort = abort.clone();
            tokio::spawn(async move { gate.arrive(&abort).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!gate.is_open());

        assert!(gate.arrive(&abort).await);
        assert!(matches!(early.await, Ok(true)));
        assert!(gate.is_open());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!gate.is_open());
    }

    #[tokio::test]
    async fn abort_releases_waiting_workers() {
        let gate = HoldGate::new(Duration::from_secs(3), 2);
        let abort = AbortHandle::new();
        abort.abort();
        assert!(!gate.arrive(&abort).await);
        assert!(!gate.is_open());
    }
}
