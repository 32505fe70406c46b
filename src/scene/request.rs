//! Scene identifiers and transition requests.

use super::effect::{EffectConfig, EffectKind, EffectOverrides};

/// Unique identifier for a scene.
///
/// The engine never interprets scene ids; it only hands them back to the
/// host's callbacks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SceneId(pub(crate) String);

impl SceneId {
    /// Create a new scene ID from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the scene ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SceneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A request to navigate to another scene with a given effect.
///
/// Immutable once built; consumed by
/// [`TransitionEngine::start`](super::TransitionEngine::start).
///
/// # Example
///
/// ```
/// use veil::scene::{EffectKind, EffectOverrides, TransitionRequest};
///
/// let request = TransitionRequest::new(
///     "about",
///     EffectKind::Wipe,
///     &EffectOverrides::new().duration(1.0).direction(1.0, 0.0),
/// );
/// assert_eq!(request.config().half_duration(), 0.5);
/// ```
#[derive(Clone, Debug)]
pub struct TransitionRequest {
    target: SceneId,
    kind: EffectKind,
    config: EffectConfig,
}

impl TransitionRequest {
    /// Resolve `overrides` against the defaults for `kind`.
    pub fn new(target: impl Into<SceneId>, kind: EffectKind, overrides: &EffectOverrides) -> Self {
        Self {
            target: target.into(),
            kind,
            config: EffectConfig::resolve(kind, overrides),
        }
    }

    /// A request using the kind's default configuration.
    pub fn with_defaults(target: impl Into<SceneId>, kind: EffectKind) -> Self {
        Self::new(target, kind, &EffectOverrides::default())
    }

    /// The scene to navigate to.
    pub fn target(&self) -> &SceneId {
        &self.target
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }
}
