//! The transition state machine.
//!
//! A transition runs through these phases:
//!
//! ```text
//! Idle -> CapturingBefore -> Covering -> Switching -> CapturingAfter -> Revealing -> Idle
//! ```
//!
//! The outgoing scene is snapshotted, covered by the effect as progress runs
//! 0 -> 1, the host switches scenes while the screen is fully covered, the
//! incoming scene is snapshotted, and progress runs 1 -> 2 to reveal it.
//!
//! The engine is driven entirely by [`TransitionEngine::tick`]; it owns no
//! timers. Capture failures never surface to the caller: a failed "before"
//! capture switches scenes immediately without an effect, and a failed
//! "after" capture reveals over snapshot A instead.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::effect::{EffectConfig, EffectKind, EffectOverrides};
use super::request::{SceneId, TransitionRequest};
use super::snapshot::{CaptureError, CaptureOutcome, Generation, Snapshot, Snapshotter};
use super::tween::{Animator, CancelHandle};
use super::wait::Wait;

/// Externally visible state-machine node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    Idle,
    CapturingBefore,
    Covering,
    Switching,
    CapturingAfter,
    Revealing,
}

type SceneCallback = Box<dyn FnMut(&SceneId)>;

/// Host hooks invoked as a transition progresses.
///
/// # Example
///
/// ```
/// use veil::scene::TransitionCallbacks;
///
/// let callbacks = TransitionCallbacks::new()
///     .on_section_change(|scene| println!("now showing {scene}"))
///     .on_transition_end(|scene| println!("arrived at {scene}"));
/// ```
#[derive(Default)]
pub struct TransitionCallbacks {
    on_transition_start: Option<Box<dyn FnMut(&SceneId, EffectKind)>>,
    on_section_change: Option<SceneCallback>,
    on_transition_mid: Option<SceneCallback>,
    on_transition_end: Option<SceneCallback>,
}

impl TransitionCallbacks {
    /// Callbacks that do nothing; add hooks with the `on_*` builders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a transition is accepted.
    pub fn on_transition_start<F: FnMut(&SceneId, EffectKind) + 'static>(mut self, f: F) -> Self {
        self.on_transition_start = Some(Box::new(f));
        self
    }

    /// Called to make the target scene the visible one.
    pub fn on_section_change<F: FnMut(&SceneId) + 'static>(mut self, f: F) -> Self {
        self.on_section_change = Some(Box::new(f));
        self
    }

    /// Called right after the scene switch, for chrome that must re-theme.
    pub fn on_transition_mid<F: FnMut(&SceneId) + 'static>(mut self, f: F) -> Self {
        self.on_transition_mid = Some(Box::new(f));
        self
    }

    /// Called when a transition finishes. Not called on cancel.
    pub fn on_transition_end<F: FnMut(&SceneId) + 'static>(mut self, f: F) -> Self {
        self.on_transition_end = Some(Box::new(f));
        self
    }

    fn start(&mut self, target: &SceneId, kind: EffectKind) {
        if let Some(ref mut callback) = self.on_transition_start {
            callback(target, kind);
        }
    }

    fn section_change(&mut self, target: &SceneId) {
        if let Some(ref mut callback) = self.on_section_change {
            callback(target);
        }
    }

    fn mid(&mut self, target: &SceneId) {
        if let Some(ref mut callback) = self.on_transition_mid {
            callback(target);
        }
    }

    fn end(&mut self, target: &SceneId) {
        if let Some(ref mut callback) = self.on_transition_end {
            callback(target);
        }
    }
}

/// Internal stage; finer-grained than [`TransitionPhase`].
#[derive(Clone, Copy, Debug)]
enum Stage {
    Idle,
    /// The deadline is armed on the first tick after the request.
    CapturingBefore { deadline: Option<f32> },
    Covering,
    /// Fully covered, before the scene switch.
    Holding(Wait),
    /// After the scene switch, letting the new scene render.
    Settling(Wait),
    CapturingAfter { deadline: Option<f32> },
    Revealing,
}

impl Stage {
    fn phase(self) -> TransitionPhase {
        match self {
            Stage::Idle => TransitionPhase::Idle,
            Stage::CapturingBefore { .. } => TransitionPhase::CapturingBefore,
            Stage::Covering => TransitionPhase::Covering,
            Stage::Holding(_) | Stage::Settling(_) => TransitionPhase::Switching,
            Stage::CapturingAfter { .. } => TransitionPhase::CapturingAfter,
            Stage::Revealing => TransitionPhase::Revealing,
        }
    }
}

/// Resources held by the transition in flight.
struct Active<T> {
    request: TransitionRequest,
    snapshot_a: Option<Snapshot<T>>,
    snapshot_b: Option<Snapshot<T>>,
    driver: Option<CancelHandle>,
}

/// What the compositing pass needs to draw the current frame.
pub struct Overlay<'a, T> {
    pub kind: EffectKind,
    pub config: &'a EffectConfig,
    /// Progress in `[0, 2]`.
    pub progress: f32,
    pub snapshot_a: &'a Snapshot<T>,
    /// Present once the incoming scene has been captured.
    pub snapshot_b: Option<&'a Snapshot<T>>,
}

/// Coordinates snapshots, the progress driver, and the host's scene switch.
///
/// Only one transition runs at a time; [`start`](Self::start) is rejected
/// while one is active.
pub struct TransitionEngine<S: Snapshotter> {
    snapshotter: S,
    config: EngineConfig,
    callbacks: TransitionCallbacks,
    animator: Animator,
    stage: Stage,
    active: Option<Active<S::Texture>>,
    generation: Generation,
    progress: Rc<Cell<f32>>,
    driver_done: Rc<Cell<bool>>,
}

impl<S: Snapshotter> TransitionEngine<S> {
    /// Create an idle engine.
    ///
    /// `config` is sanitised on the way in, so every wait the engine performs
    /// is bounded.
    ///
    /// # Example
    ///
    /// ```
    /// use veil::scene::{EngineConfig, GpuSnapshotter, TransitionCallbacks, TransitionEngine, TransitionPhase};
    ///
    /// let engine = TransitionEngine::new(
    ///     GpuSnapshotter::new(),
    ///     EngineConfig::new().hold_pause(0.2),
    ///     TransitionCallbacks::new(),
    /// );
    /// assert_eq!(engine.phase(), TransitionPhase::Idle);
    /// assert!(!engine.is_transitioning());
    /// ```
    pub fn new(snapshotter: S, config: EngineConfig, callbacks: TransitionCallbacks) -> Self {
        Self {
            snapshotter,
            config: config.sanitized(),
            callbacks,
            animator: Animator::new(),
            stage: Stage::Idle,
            active: None,
            generation: 0,
            progress: Rc::new(Cell::new(0.0)),
            driver_done: Rc::new(Cell::new(false)),
        }
    }

    /// Start a transition to `target`. Returns `false` if one is already running.
    pub fn start_transition(
        &mut self,
        target: impl Into<SceneId>,
        kind: EffectKind,
        overrides: &EffectOverrides,
    ) -> bool {
        self.start(TransitionRequest::new(target, kind, overrides))
    }

    /// Start a prepared transition. Returns `false` if one is already running.
    pub fn start(&mut self, request: TransitionRequest) -> bool {
        if self.is_transitioning() {
            debug!(
                scene = %request.target(),
                active = ?self.phase(),
                "transition rejected: busy"
            );
            return false;
        }

        self.generation += 1;
        info!(
            scene = %request.target(),
            effect = %request.kind(),
            duration = request.config().duration,
            generation = self.generation,
            "transition started"
        );

        self.callbacks.start(request.target(), request.kind());
        self.snapshotter.request_capture(self.generation);
        self.set_stage(Stage::CapturingBefore { deadline: None });
        self.active = Some(Active {
            request,
            snapshot_a: None,
            snapshot_b: None,
            driver: None,
        });
        true
    }

    /// Abort the running transition.
    ///
    /// Stops the progress driver, releases snapshots, resets progress and
    /// returns to idle within this call. The end callback is not invoked.
    pub fn cancel(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        info!(
            scene = %active.request.target(),
            phase = ?self.phase(),
            generation = self.generation,
            "transition cancelled"
        );
        self.generation += 1;
        self.teardown(active);
    }

    /// Whether a transition is in flight, i.e. the phase is not `Idle`.
    pub fn is_transitioning(&self) -> bool {
        !matches!(self.stage, Stage::Idle)
    }

    /// The externally visible phase.
    pub fn phase(&self) -> TransitionPhase {
        self.stage.phase()
    }

    /// Current progress in `[0, 2]`; 0 while idle.
    pub fn progress(&self) -> f32 {
        self.progress.get()
    }

    /// Counter identifying the current (or most recent) transition.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The transition in flight, if any.
    pub fn request(&self) -> Option<&TransitionRequest> {
        self.active.as_ref().map(|active| &active.request)
    }

    /// Timing configuration, after sanitising.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The snapshotter the engine captures frames through.
    pub fn snapshotter(&self) -> &S {
        &self.snapshotter
    }

    /// Mutable access to the snapshotter.
    ///
    /// Hosts use this to report rendered frames, e.g.
    /// [`GpuSnapshotter::frame_rendered`](super::GpuSnapshotter::frame_rendered).
    pub fn snapshotter_mut(&mut self) -> &mut S {
        &mut self.snapshotter
    }

    /// Inputs for the compositing pass, while the overlay is mounted.
    pub fn overlay(&self) -> Option<Overlay<'_, S::Texture>> {
        if matches!(self.stage, Stage::Idle | Stage::CapturingBefore { .. }) {
            return None;
        }
        let active = self.active.as_ref()?;
        Some(Overlay {
            kind: active.request.kind(),
            config: active.request.config(),
            progress: self.progress.get(),
            snapshot_a: active.snapshot_a.as_ref()?,
            snapshot_b: active.snapshot_b.as_ref(),
        })
    }

    /// Advance the state machine to time `now` (seconds). Call once per frame.
    pub fn tick(&mut self, now: f32) {
        self.animator.tick(now);
        self.collect_captures();
        self.advance(now);
    }

    fn collect_captures(&mut self) {
        while let Some(CaptureOutcome { generation, result }) = self.snapshotter.poll_capture() {
            let current = generation == self.generation;
            match self.stage {
                Stage::CapturingBefore { .. } if current => self.captured_before(result),
                Stage::CapturingAfter { .. } if current => self.captured_after(result),
                _ => {
                    debug!(
                        generation,
                        current = self.generation,
                        "discarding stale capture"
                    );
                    if let Ok(snapshot) = result {
                        self.snapshotter.release(snapshot);
                    }
                }
            }
        }
    }

    fn advance(&mut self, now: f32) {
        match self.stage {
            Stage::Idle => {}
            Stage::CapturingBefore { deadline } => match deadline {
                None => {
                    self.stage = Stage::CapturingBefore {
                        deadline: Some(now + self.config.capture_timeout),
                    }
                }
                Some(deadline) if now >= deadline => {
                    self.captured_before(Err(CaptureError::TimedOut))
                }
                Some(_) => {}
            },
            Stage::Covering => {
                if self.driver_done.replace(false) {
                    self.set_stage(Stage::Holding(Wait::new(now, self.config.hold_pause, 0)));
                }
            }
            Stage::Holding(mut wait) => {
                if wait.tick(now) {
                    self.switch_scene();
                    self.set_stage(Stage::Settling(Wait::new(
                        now,
                        self.config.settle_delay,
                        self.config.settle_ticks,
                    )));
                } else {
                    self.stage = Stage::Holding(wait);
                }
            }
            Stage::Settling(mut wait) => {
                if wait.tick(now) {
                    self.snapshotter.request_capture(self.generation);
                    self.set_stage(Stage::CapturingAfter { deadline: None });
                } else {
                    self.stage = Stage::Settling(wait);
                }
            }
            Stage::CapturingAfter { deadline } => match deadline {
                None => {
                    self.stage = Stage::CapturingAfter {
                        deadline: Some(now + self.config.capture_timeout),
                    }
                }
                Some(deadline) if now >= deadline => self.captured_after(Err(CaptureError::TimedOut)),
                Some(_) => {}
            },
            Stage::Revealing => {
                if self.driver_done.replace(false) {
                    self.complete();
                }
            }
        }
    }

    fn captured_before(&mut self, result: Result<Snapshot<S::Texture>, CaptureError>) {
        match result {
            Ok(snapshot) => {
                if let Some(active) = self.active.as_mut() {
                    active.snapshot_a = Some(snapshot);
                }
                self.set_stage(Stage::Covering);
                self.drive(0.0, 1.0);
            }
            Err(error) => {
                warn!(%error, "could not capture outgoing scene; switching without effect");
                self.switch_scene();
                self.complete();
            }
        }
    }

    fn captured_after(&mut self, result: Result<Snapshot<S::Texture>, CaptureError>) {
        match result {
            Ok(snapshot) => {
                if let Some(active) = self.active.as_mut() {
                    active.snapshot_b = Some(snapshot);
                }
            }
            Err(error) => {
                warn!(%error, "could not capture incoming scene; revealing over the old frame");
            }
        }
        self.set_stage(Stage::Revealing);
        self.drive(1.0, 2.0);
    }

    /// Run the progress driver over one half of the transition.
    fn drive(&mut self, from: f32, to: f32) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let half = active.request.config().half_duration();

        self.driver_done.set(false);
        let progress = Rc::clone(&self.progress);
        let done = Rc::clone(&self.driver_done);
        let handle = self.animator.animate(
            from,
            to,
            half,
            move |value| progress.set(progress.get().max(value)),
            move || done.set(true),
        );
        if let Some(previous) = active.driver.replace(handle) {
            previous.cancel();
        }
    }

    fn switch_scene(&mut self) {
        if let Some(active) = self.active.as_ref() {
            let target = active.request.target();
            debug!(scene = %target, "switching scene");
            self.callbacks.section_change(target);
            self.callbacks.mid(target);
        }
    }

    fn complete(&mut self) {
        let Some(active) = self.active.take() else {
            self.set_stage(Stage::Idle);
            return;
        };
        let target = active.request.target().clone();
        self.teardown(active);
        info!(scene = %target, generation = self.generation, "transition finished");
        self.callbacks.end(&target);
    }

    /// Release everything the transition holds and return to idle.
    fn teardown(&mut self, mut active: Active<S::Texture>) {
        if let Some(driver) = active.driver.take() {
            driver.cancel();
        }
        for snapshot in [active.snapshot_a.take(), active.snapshot_b.take()]
            .into_iter()
            .flatten()
        {
            self.snapshotter.release(snapshot);
        }
        self.driver_done.set(false);
        self.progress.set(0.0);
        self.set_stage(Stage::Idle);
    }

    fn set_stage(&mut self, stage: Stage) {
        if stage.phase() != self.stage.phase() {
            debug!(from = ?self.stage.phase(), to = ?stage.phase(), "phase change");
        }
        self.stage = stage;
    }
}

impl<S: Snapshotter> Drop for TransitionEngine<S> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            self.teardown(active);
        }
    }
}
