use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Coalesces bursts of change notifications into one recompute after a
/// quiet period. Scheduling again moves the deadline; cancelling drops it.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the current deadline passes. Pends forever when
    /// nothing is scheduled. Cancel-safe: dropping it keeps the deadline.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rescheduling_pushes_the_deadline_back() {
        let mut d = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();
        d.schedule();
        tokio::time::advance(Duration::from_millis(60)).await;
        d.schedule();

        d.fired().await;

        assert!(start.elapsed() >= Duration::from_millis(160));
        assert!(!d.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_debouncer_never_fires() {
        let mut d = Debouncer::new(Duration::from_millis(100));
        d.schedule();
        d.cancel();
        let res = tokio::time::timeout(Duration::from_secs(5), d.fired()).await;
        assert!(res.is_err());
    }
}
