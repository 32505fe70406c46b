//! # Veil
//!
//! **Full-screen scene transitions for wgpu applications.**
//!
//! Veil snapshots the frame you are leaving, covers it with an effect, lets
//! you swap scenes while the screen is hidden, then reveals the new scene.
//! Five effects share one compositing shader: fade, noise dissolve, grid,
//! directional wipe, and an image-driven mask.
//!
//! ## Quick Start
//!
//! ```no_run
//! use veil::scene::{EffectKind, EffectOverrides, GpuSnapshotter, TransitionCallbacks, TransitionEngine};
//!
//! let mut engine = TransitionEngine::new(
//!     GpuSnapshotter::new(),
//!     Default::default(),
//!     TransitionCallbacks::new().on_section_change(|scene| println!("now on {scene}")),
//! );
//!
//! let accepted = engine.start_transition(
//!     "about",
//!     EffectKind::Wipe,
//!     &EffectOverrides::new().direction(1.0, 0.0).duration(1.0),
//! );
//! assert!(accepted);
//! ```
//!
//! The host owns the frame loop. Each frame it renders the current scene,
//! reports the frame to [`GpuSnapshotter::frame_rendered`](scene::GpuSnapshotter::frame_rendered),
//! calls [`TransitionEngine::tick`](scene::TransitionEngine::tick), and, while
//! [`overlay`](scene::TransitionEngine::overlay) returns something, draws it
//! with a [`CompositePass`](scene::CompositePass) instead of the live scene.

mod color;
mod gpu;
mod render_target;
pub mod scene;

pub use color::Color;
pub use gpu::{GpuContext, GpuInitError};
pub use render_target::RenderTarget;

// Re-export math types used in the public API.
pub use glam::{Vec2, Vec3};
