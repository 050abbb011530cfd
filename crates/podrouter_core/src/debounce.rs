//! Debounce Scheduler
//!
//! Coalesces bursts of routing requests into a single application that runs
//! once a quiet interval has passed without further requests. The scheduler
//! only tracks a deadline; the control loop decides when to poll it.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Cancel any pending run and schedule one for `now + interval`
    pub fn request(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    /// Drop the pending run, if any
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Consume the pending run if its deadline has been reached
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(350);

    #[test]
    fn test_fires_once_after_quiet_interval() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(INTERVAL);
        debouncer.request(start);

        assert!(!debouncer.fire_if_due(start + Duration::from_millis(349)));
        assert!(debouncer.fire_if_due(start + INTERVAL));
        assert!(!debouncer.fire_if_due(start + INTERVAL * 2));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_requests_push_deadline_back() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(INTERVAL);

        let mut fired = 0;
        for i in 0..10u32 {
            let now = start + Duration::from_millis(100) * i;
            if debouncer.fire_if_due(now) {
                fired += 1;
            }
            debouncer.request(now);
        }
        assert_eq!(fired, 0);

        let last = start + Duration::from_millis(900);
        assert_eq!(debouncer.deadline(), Some(last + INTERVAL));
        assert!(debouncer.fire_if_due(last + INTERVAL));
    }

    #[test]
    fn test_cancel_prevents_run() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(INTERVAL);
        debouncer.request(start);

        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        assert!(!debouncer.fire_if_due(start + INTERVAL * 4));
    }
}
