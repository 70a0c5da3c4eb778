use std::time::{Duration, Instant};

/// A single pending deadline. Re-arming moves the deadline, so a burst of
/// events collapses into one firing `delay` after the last of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Clears and reports a deadline that has been reached.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// An edge-triggered "ignore for a while" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionWindow {
    window: Duration,
    until: Option<Instant>,
}

impl SuppressionWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            until: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.until = Some(now + self.window);
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_coalesces_into_the_last_deadline() {
        let start = Instant::now();
        let mut debounce = Debouncer::new(Duration::from_millis(100));
        debounce.schedule(start);
        debounce.schedule(start + Duration::from_millis(60));

        assert!(!debounce.take_due(start + Duration::from_millis(100)));
        assert!(debounce.take_due(start + Duration::from_millis(160)));
        assert!(!debounce.is_pending());
        assert!(!debounce.take_due(start + Duration::from_millis(500)));
    }

    #[test]
    fn zero_delay_fires_on_the_same_tick() {
        let now = Instant::now();
        let mut debounce = Debouncer::new(Duration::ZERO);
        debounce.schedule(now);
        assert!(debounce.take_due(now));
    }

    #[test]
    fn suppression_expires() {
        let now = Instant::now();
        let mut window = SuppressionWindow::new(Duration::from_millis(100));
        assert!(!window.is_active(now));
        window.arm(now);
        assert!(window.is_active(now + Duration::from_millis(99)));
        assert!(!window.is_active(now + Duration::from_millis(100)));
    }
}
