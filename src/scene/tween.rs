//! Time-based interpolation of the transition progress value.
//!
//! [`Tween`] is a pure description of an eased interpolation. [`Animator`] is the
//! animation-timing facility: it owns running tweens, advances them once per
//! [`tick`](Animator::tick), and reports values through callbacks.

use std::cell::Cell;
use std::rc::Rc;

/// Easing functions for smooth transitions.
///
/// These control the acceleration curve of transition animations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Easing {
    /// Constant speed throughout.
    Linear,
    /// Start slow, accelerate.
    EaseIn,
    /// Start fast, decelerate.
    EaseOut,
    /// Start slow, speed up, then slow down.
    #[default]
    EaseInOut,
}

impl Easing {
    /// Apply the easing function to a linear progress value (0.0 to 1.0).
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

/// An eased interpolation from `from` to `to` starting at `start` seconds.
#[derive(Clone, Copy, Debug)]
pub struct Tween {
    pub from: f32,
    pub to: f32,
    pub start: f32,
    pub duration: f32,
    pub easing: Easing,
}

impl Tween {
    /// An ease-in-out tween. Negative durations are treated as 0.
    pub fn new(from: f32, to: f32, start: f32, duration: f32) -> Self {
        Self {
            from,
            to,
            start,
            duration: duration.max(0.0),
            easing: Easing::EaseInOut,
        }
    }

    /// Set the easing function for this tween.
    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Linear (un-eased) completion fraction at `now`.
    pub fn fraction(&self, now: f32) -> f32 {
        if self.duration <= f32::EPSILON {
            return 1.0;
        }
        ((now - self.start) / self.duration).clamp(0.0, 1.0)
    }

    /// Interpolated value at `now`. Exactly `to` once finished.
    pub fn value_at(&self, now: f32) -> f32 {
        let t = self.fraction(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from + (self.to - self.from) * self.easing.apply(t)
    }

    /// Whether the tween has reached `to` at `now`.
    pub fn is_finished(&self, now: f32) -> bool {
        self.fraction(now) >= 1.0
    }
}

/// Stops a tween started by [`Animator::animate`].
///
/// Dropping the handle does not cancel the tween.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    cancelled: Rc<Cell<bool>>,
}

impl CancelHandle {
    /// Stop the tween immediately. No further updates are reported and the
    /// completion callback never fires.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

struct Running {
    tween: Tween,
    /// Value most recently passed to `on_update`.
    last: f32,
    on_update: Box<dyn FnMut(f32)>,
    on_complete: Option<Box<dyn FnOnce()>>,
    cancelled: Rc<Cell<bool>>,
}

/// Drives tweens from the host's frame clock.
#[derive(Default)]
pub struct Animator {
    now: f32,
    running: Vec<Running>,
}

impl Animator {
    /// An animator with no tweens, at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the most recent tick, in seconds.
    pub fn now(&self) -> f32 {
        self.now
    }

    /// Number of tweens still scheduled.
    pub fn active(&self) -> usize {
        self.running
            .iter()
            .filter(|r| !r.cancelled.get())
            .count()
    }

    /// Interpolate from `from` to `to` over `duration` seconds, starting at the
    /// time of the most recent tick.
    ///
    /// `on_update` receives the eased value on every tick; `on_complete` fires
    /// once, after the final update, when `to` is reached.
    pub fn animate(
        &mut self,
        from: f32,
        to: f32,
        duration: f32,
        on_update: impl FnMut(f32) + 'static,
        on_complete: impl FnOnce() + 'static,
    ) -> CancelHandle {
        let cancelled = Rc::new(Cell::new(false));
        self.running.push(Running {
            tween: Tween::new(from, to, self.now, duration),
            last: from,
            on_update: Box::new(on_update),
            on_complete: Some(Box::new(on_complete)),
            cancelled: Rc::clone(&cancelled),
        });
        CancelHandle { cancelled }
    }

    /// Redirect a running tween towards `to`, arriving after `duration` seconds.
    ///
    /// The new leg starts from the last reported value at the time of the most
    /// recent tick, so reported values stay continuous. The tween keeps its
    /// easing and its single `on_complete`. Returns `false` if the tween has
    /// already completed or was cancelled.
    ///
    /// # Example
    ///
    /// ```
    /// use veil::scene::Animator;
    ///
    /// let mut animator = Animator::new();
    /// let handle = animator.animate(0.0, 1.0, 1.0, |_| {}, || {});
    /// animator.tick(0.5);
    /// assert!(animator.retarget(&handle, 2.0, 1.0));
    /// ```
    pub fn retarget(&mut self, handle: &CancelHandle, to: f32, duration: f32) -> bool {
        let now = self.now;
        let Some(running) = self
            .running
            .iter_mut()
            .find(|r| Rc::ptr_eq(&r.cancelled, &handle.cancelled) && !r.cancelled.get())
        else {
            return false;
        };
        running.tween = Tween::new(running.last, to, now, duration).easing(running.tween.easing);
        true
    }

    /// Advance every running tween to `now`.
    pub fn tick(&mut self, now: f32) {
        self.now = self.now.max(now);
        let now = self.now;

        self.running.retain_mut(|running| {
            if running.cancelled.get() {
                return false;
            }

            running.last = running.tween.value_at(now);
            (running.on_update)(running.last);

            if running.tween.is_finished(now) {
                if let Some(on_complete) = running.on_complete.take() {
                    on_complete();
                }
                return false;
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn ease_in_out_is_symmetric() {
        let e = Easing::EaseInOut;
        assert_eq!(e.apply(0.0), 0.0);
        assert_eq!(e.apply(1.0), 1.0);
        assert!((e.apply(0.5) - 0.5).abs() < 1e-6);
        assert!((e.apply(0.25) + e.apply(0.75) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tween_hits_target_exactly() {
        let tween = Tween::new(1.0, 2.0, 10.0, 0.5);
        assert_eq!(tween.value_at(9.0), 1.0);
        assert_eq!(tween.value_at(10.5), 2.0);
        assert_eq!(tween.value_at(99.0), 2.0);
        assert!(tween.is_finished(10.5));
        assert!(!tween.is_finished(10.4));
    }

    #[test]
    fn animator_reports_monotonic_values_and_completes_once() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let completions = Rc::new(Cell::new(0));

        let mut animator = Animator::new();
        animator.tick(0.0);
        let sink = Rc::clone(&seen);
        let done = Rc::clone(&completions);
        animator.animate(
            0.0,
            1.0,
            1.0,
            move |v| sink.borrow_mut().push(v),
            move || done.set(done.get() + 1),
        );

        for step in 1..=15 {
            animator.tick(step as f32 * 0.1);
        }

        let seen = seen.borrow();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 1.0);
        assert_eq!(completions.get(), 1);
        assert_eq!(animator.active(), 0);
    }

    #[test]
    fn cancel_stops_updates_without_completing() {
        let last = Rc::new(Cell::new(-1.0));
        let completed = Rc::new(Cell::new(false));

        let mut animator = Animator::new();
        let sink = Rc::clone(&last);
        let done = Rc::clone(&completed);
        let handle = animator.animate(
            0.0,
            1.0,
            1.0,
            move |v| sink.set(v),
            move || done.set(true),
        );

        animator.tick(0.5);
        let before = last.get();
        handle.cancel();
        animator.tick(2.0);

        assert_eq!(last.get(), before);
        assert!(!completed.get());
        assert_eq!(animator.active(), 0);
    }

    #[test]
    fn retarget_continues_from_last_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let completions = Rc::new(Cell::new(0));

        let mut animator = Animator::new();
        let sink = Rc::clone(&seen);
        let done = Rc::clone(&completions);
        let handle = animator.animate(
            0.0,
            1.0,
            1.0,
            move |v| sink.borrow_mut().push(v),
            move || done.set(done.get() + 1),
        );

        for step in 1..=5 {
            animator.tick(step as f32 * 0.1);
        }
        let before = *seen.borrow().last().unwrap();
        assert!(animator.retarget(&handle, 2.0, 1.0));

        for step in 6..=20 {
            animator.tick(step as f32 * 0.1);
        }

        let seen = seen.borrow();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        let after = seen[5];
        assert!(after >= before && after - before < 0.1, "jumped {before} -> {after}");
        assert_eq!(*seen.last().unwrap(), 2.0);
        assert_eq!(completions.get(), 1);
    }

    #[test]
    fn retarget_ignores_finished_and_cancelled_tweens() {
        let mut animator = Animator::new();
        let finished = animator.animate(0.0, 1.0, 0.1, |_| {}, || {});
        let cancelled = animator.animate(0.0, 1.0, 1.0, |_| {}, || {});
        animator.tick(0.2);
        cancelled.cancel();

        assert!(!animator.retarget(&finished, 2.0, 1.0));
        assert!(!animator.retarget(&cancelled, 2.0, 1.0));
    }

    #[test]
    fn zero_duration_completes_on_next_tick() {
        let completed = Rc::new(Cell::new(false));
        let mut animator = Animator::new();
        let done = Rc::clone(&completed);
        animator.animate(0.0, 1.0, 0.0, |_| {}, move || done.set(true));
        animator.tick(0.0);
        assert!(completed.get());
    }
}
