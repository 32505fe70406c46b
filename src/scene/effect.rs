//! Effect kinds and their configuration.
//!
//! Every kind has a default [`EffectConfig`]. Callers pass [`EffectOverrides`]
//! (all fields optional) which are merged over the defaults by
//! [`EffectConfig::resolve`]. Options a kind does not recognise are ignored.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::config::ConfigError;
use crate::color::Color;

/// Total transition length used when a request does not specify one.
pub const DEFAULT_DURATION: f32 = 1.2;

const MIN_SOFTNESS: f32 = 1e-3;

/// The closed set of compositing algorithms.
///
/// The discriminant is the selector value the compositing shader branches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum EffectKind {
    /// Blend through a flat color.
    Fade = 0,
    /// Procedural-noise threshold dissolve.
    Dissolve = 1,
    /// Radial cell-by-cell wave.
    Grid = 2,
    /// Directional linear sweep.
    Wipe = 3,
    /// Luminance threshold of an external mask image.
    Mask = 4,
}

impl EffectKind {
    /// Every kind, in selector order.
    pub const ALL: [EffectKind; 5] = [
        EffectKind::Fade,
        EffectKind::Dissolve,
        EffectKind::Grid,
        EffectKind::Wipe,
        EffectKind::Mask,
    ];

    /// Shader selector index.
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Lowercase name, as used in config files and by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Fade => "fade",
            EffectKind::Dissolve => "dissolve",
            EffectKind::Grid => "grid",
            EffectKind::Wipe => "wipe",
            EffectKind::Mask => "mask",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown effect name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown effect kind `{0}`")]
pub struct UnknownEffect(pub String);

impl FromStr for EffectKind {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEffect(s.to_string()))
    }
}

/// Error loading a mask image.
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("failed to decode mask image")]
    Decode(#[from] image::ImageError),
    #[error("mask image has zero size")]
    Empty,
}

static NEXT_MASK_ID: AtomicU64 = AtomicU64::new(1);

/// A grayscale image whose luminance orders the Mask reveal.
///
/// Cheap to clone; the pixels are shared. Each distinct image carries an id so
/// the renderer can upload it once and reuse the texture.
#[derive(Clone)]
pub struct MaskImage {
    id: u64,
    pixels: Arc<GrayImage>,
}

impl MaskImage {
    /// Wrap an 8-bit grayscale image. Empty images are rejected.
    pub fn from_gray(pixels: GrayImage) -> Result<Self, MaskError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(MaskError::Empty);
        }
        Ok(Self {
            id: NEXT_MASK_ID.fetch_add(1, Ordering::Relaxed),
            pixels: Arc::new(pixels),
        })
    }

    /// Load a mask from an image file; color images are converted to luma.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MaskError> {
        Self::from_gray(image::open(path)?.to_luma8())
    }

    /// Load a mask from encoded image bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MaskError> {
        Self::from_gray(image::load_from_memory(bytes)?.to_luma8())
    }

    /// Build a mask by evaluating `f(uv)` at every pixel center.
    pub fn generate(width: u32, height: u32, f: impl Fn(Vec2) -> f32) -> Result<Self, MaskError> {
        let pixels = GrayImage::from_fn(width, height, |x, y| {
            let uv = Vec2::new(
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            );
            image::Luma([(f(uv).clamp(0.0, 1.0) * 255.0).round() as u8])
        });
        Self::from_gray(pixels)
    }

    /// Identity of this image, shared by its clones.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Row-major luma bytes, one per pixel.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Nearest-neighbour luminance in [0, 1] at `uv`, clamped to the edges.
    pub fn sample(&self, uv: Vec2) -> f32 {
        let w = self.width();
        let h = self.height();
        let x = ((uv.x.clamp(0.0, 1.0) * w as f32) as u32).min(w - 1);
        let y = ((uv.y.clamp(0.0, 1.0) * h as f32) as u32).min(h - 1);
        self.pixels.get_pixel(x, y).0[0] as f32 / 255.0
    }
}

impl fmt::Debug for MaskImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskImage")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Resolved options for one transition.
///
/// All options are present; those a kind does not use keep their defaults and
/// are ignored by the compositor.
#[derive(Clone, Debug)]
pub struct EffectConfig {
    /// Total duration in seconds, split evenly between covering and revealing.
    pub duration: f32,
    /// Flat color shown at the fully-covered midpoint.
    pub color: Color,
    /// Dissolve soft-threshold width.
    pub edge: f32,
    /// Grid cell edge length in pixels.
    pub cell_size: f32,
    /// Grid wave origin in uv space.
    pub center: Vec2,
    /// Wipe sweep direction (normalised).
    pub direction: Vec2,
    /// Wipe and Mask soft-edge width.
    pub softness: f32,
    /// Mask source image.
    pub mask: Option<MaskImage>,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            color: Color::BLACK,
            edge: 0.1,
            cell_size: 64.0,
            center: Vec2::splat(0.5),
            direction: Vec2::X,
            softness: 0.1,
            mask: None,
        }
    }
}

impl EffectConfig {
    /// Default configuration for `kind`.
    pub fn defaults(kind: EffectKind) -> Self {
        let base = Self::default();
        match kind {
            EffectKind::Dissolve => Self {
                duration: 1.6,
                ..base
            },
            EffectKind::Wipe => Self {
                softness: 0.05,
                ..base
            },
            EffectKind::Fade | EffectKind::Grid | EffectKind::Mask => base,
        }
    }

    /// Merge `overrides` over the defaults for `kind`.
    ///
    /// Options not recognised by `kind` are ignored and degenerate values are
    /// replaced with safe ones.
    pub fn resolve(kind: EffectKind, overrides: &EffectOverrides) -> Self {
        let mut config = Self::defaults(kind);

        if let Some(duration) = overrides.duration.filter(|d| d.is_finite() && *d > 0.0) {
            config.duration = duration;
        }
        if let Some(color) = overrides.color {
            config.color = color.into();
        }

        match kind {
            EffectKind::Fade => {}
            EffectKind::Dissolve => {
                if let Some(edge) = overrides.edge {
                    config.edge = edge;
                }
            }
            EffectKind::Grid => {
                if let Some(cell_size) = overrides.cell_size {
                    config.cell_size = cell_size;
                }
                if let Some(center) = overrides.center {
                    config.center = Vec2::from(center);
                }
            }
            EffectKind::Wipe => {
                if let Some(direction) = overrides.direction {
                    config.direction = Vec2::from(direction);
                }
                if let Some(softness) = overrides.softness {
                    config.softness = softness;
                }
            }
            EffectKind::Mask => {
                if let Some(softness) = overrides.softness {
                    config.softness = softness;
                }
                config.mask = overrides.mask.clone();
            }
        }

        config.sanitized()
    }

    fn sanitized(mut self) -> Self {
        self.edge = finite_or(self.edge, 0.1).max(MIN_SOFTNESS);
        self.softness = finite_or(self.softness, 0.1).max(MIN_SOFTNESS);
        self.cell_size = finite_or(self.cell_size, 64.0).max(1.0);
        self.direction = self.direction.try_normalize().unwrap_or(Vec2::X);
        if !self.center.is_finite() {
            self.center = Vec2::splat(0.5);
        }
        self
    }

    /// Length of each half (covering, revealing) in seconds.
    pub fn half_duration(&self) -> f32 {
        self.duration * 0.5
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

/// Caller-supplied partial configuration.
///
/// Deserializes from JSON with camelCase keys; unknown keys are ignored.
///
/// ```
/// use veil::scene::EffectOverrides;
///
/// let overrides = EffectOverrides::new().duration(1.0).direction(1.0, 0.0);
/// assert_eq!(overrides.duration, Some(1.0));
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectOverrides {
    pub duration: Option<f32>,
    pub color: Option<[f32; 3]>,
    pub edge: Option<f32>,
    pub cell_size: Option<f32>,
    pub center: Option<[f32; 2]>,
    pub direction: Option<[f32; 2]>,
    pub softness: Option<f32>,
    #[serde(skip)]
    pub mask: Option<MaskImage>,
}

impl EffectOverrides {
    /// No overrides; every option keeps its kind default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse overrides from a JSON object.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Total duration in seconds.
    pub fn duration(mut self, seconds: f32) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Flat color shown at the midpoint.
    pub fn color(mut self, color: Color) -> Self {
        self.color = Some([color.r, color.g, color.b]);
        self
    }

    pub fn edge(mut self, edge: f32) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn cell_size(mut self, pixels: f32) -> Self {
        self.cell_size = Some(pixels);
        self
    }

    pub fn center(mut self, x: f32, y: f32) -> Self {
        self.center = Some([x, y]);
        self
    }

    pub fn direction(mut self, x: f32, y: f32) -> Self {
        self.direction = Some([x, y]);
        self
    }

    pub fn softness(mut self, softness: f32) -> Self {
        self.softness = Some(softness);
        self
    }

    /// Mask image for [`EffectKind::Mask`].
    pub fn mask(mut self, mask: MaskImage) -> Self {
        self.mask = Some(mask);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Wipe".parse::<EffectKind>(), Ok(EffectKind::Wipe));
        assert_eq!("dissolve".parse::<EffectKind>(), Ok(EffectKind::Dissolve));
        assert!("spiral".parse::<EffectKind>().is_err());
    }

    #[test]
    fn selector_indices_are_stable() {
        let indices: Vec<u32> = EffectKind::ALL.iter().map(|k| k.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overrides_apply_only_to_recognised_kinds() {
        let overrides = EffectOverrides::new().edge(0.4).softness(0.3).duration(2.0);

        let fade = EffectConfig::resolve(EffectKind::Fade, &overrides);
        assert_eq!(fade.edge, 0.1);
        assert_eq!(fade.softness, 0.1);
        assert_eq!(fade.duration, 2.0);

        let dissolve = EffectConfig::resolve(EffectKind::Dissolve, &overrides);
        assert_eq!(dissolve.edge, 0.4);
        assert_eq!(dissolve.softness, 0.1);

        let wipe = EffectConfig::resolve(EffectKind::Wipe, &overrides);
        assert_eq!(wipe.softness, 0.3);
    }

    #[test]
    fn degenerate_values_are_sanitized() {
        let overrides = EffectOverrides::new()
            .duration(-1.0)
            .direction(0.0, 0.0)
            .softness(0.0);
        let config = EffectConfig::resolve(EffectKind::Wipe, &overrides);
        assert_eq!(config.duration, DEFAULT_DURATION);
        assert_eq!(config.direction, Vec2::X);
        assert!(config.softness > 0.0);
    }

    #[test]
    fn json_overrides_ignore_unknown_keys() {
        let overrides = EffectOverrides::from_json_str(
            r#"{ "duration": 1.0, "direction": [0, 1], "cellSize": 32, "sparkle": true }"#,
        )
        .unwrap();
        assert_eq!(overrides.duration, Some(1.0));
        assert_eq!(overrides.direction, Some([0.0, 1.0]));
        assert_eq!(overrides.cell_size, Some(32.0));

        let grid = EffectConfig::resolve(EffectKind::Grid, &overrides);
        assert_eq!(grid.cell_size, 32.0);
        assert_eq!(grid.direction, Vec2::X);
    }

    #[test]
    fn generated_mask_samples_luminance() {
        let mask = MaskImage::generate(4, 1, |uv| uv.x).unwrap();
        assert!(mask.sample(Vec2::new(0.0, 0.5)) < 0.2);
        assert!(mask.sample(Vec2::new(1.0, 0.5)) > 0.8);
        assert!(MaskImage::generate(0, 4, |_| 0.0).is_err());
    }
}
