//! Bounded delays expressed in seconds and frame ticks.

/// A delay that elapses once a deadline has passed *and* a number of further
/// ticks have been observed.
///
/// The orchestrator uses this instead of timers so tests can advance a fake
/// clock deterministically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Wait {
    until: f32,
    ticks_left: u32,
}

impl Wait {
    /// Wait `seconds` from `now` and at least `ticks` subsequent ticks.
    pub fn new(now: f32, seconds: f32, ticks: u32) -> Self {
        Self {
            until: now + seconds.max(0.0),
            ticks_left: ticks,
        }
    }

    /// Wait for `ticks` subsequent ticks only.
    pub fn ticks(now: f32, ticks: u32) -> Self {
        Self::new(now, 0.0, ticks)
    }

    /// Record a tick at `now`. Returns `true` once the wait has elapsed.
    pub fn tick(&mut self, now: f32) -> bool {
        self.ticks_left = self.ticks_left.saturating_sub(1);
        self.ticks_left == 0 && now >= self.until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_both_time_and_ticks() {
        let mut wait = Wait::new(1.0, 0.1, 3);
        assert!(!wait.tick(2.0));
        assert!(!wait.tick(2.0));
        assert!(wait.tick(2.0));
    }

    #[test]
    fn ticks_alone_do_not_skip_the_deadline() {
        let mut wait = Wait::new(0.0, 0.5, 1);
        assert!(!wait.tick(0.1));
        assert!(!wait.tick(0.4));
        assert!(wait.tick(0.5));
    }

    #[test]
    fn tick_only_wait() {
        let mut wait = Wait::ticks(0.0, 2);
        assert!(!wait.tick(0.0));
        assert!(wait.tick(0.0));
    }
}
