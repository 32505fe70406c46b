//! Scene transitions.
//!
//! A transition replaces what is on screen with another scene through a
//! full-screen effect. The outgoing frame is snapshotted and covered, the host
//! switches scenes behind the cover, and the incoming frame is snapshotted and
//! revealed.
//!
//! # Example
//!
//! ```no_run
//! use veil::scene::{
//!     EffectKind, EffectOverrides, EngineConfig, GpuSnapshotter, TransitionCallbacks,
//!     TransitionEngine,
//! };
//!
//! let callbacks = TransitionCallbacks::new()
//!     .on_section_change(|scene| println!("switch to {scene}"));
//! let mut engine = TransitionEngine::new(GpuSnapshotter::new(), EngineConfig::default(), callbacks);
//!
//! engine.start_transition("gallery", EffectKind::Grid, &EffectOverrides::new().cell_size(48.0));
//!
//! // Each frame: render the scene, report it to the snapshotter, then tick.
//! engine.tick(0.016);
//! ```

pub mod composite;
mod composite_pass;
mod config;
mod effect;
mod orchestrator;
mod request;
mod snapshot;
mod tween;
mod wait;

pub use composite::{FrameInputs, Sampler, composite};
pub use composite_pass::CompositePass;
pub use config::{ConfigError, EngineConfig};
pub use effect::{
    DEFAULT_DURATION, EffectConfig, EffectKind, EffectOverrides, MaskError, MaskImage,
    UnknownEffect,
};
pub use orchestrator::{Overlay, TransitionCallbacks, TransitionEngine, TransitionPhase};
pub use request::{SceneId, TransitionRequest};
pub use snapshot::{
    CaptureError, CaptureOutcome, FrameSource, Generation, GpuSnapshotter, Snapshot,
    SnapshotTexture, Snapshotter,
};
pub use tween::{Animator, CancelHandle, Easing, Tween};
pub use wait::Wait;
