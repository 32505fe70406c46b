//! CPU reference implementation of the compositing effects.
//!
//! The compositing shader in [`composite_pass`](super::composite_pass) runs the
//! same formulas per pixel on the GPU. This module is what the formulas are
//! tested against, and it also bakes the noise texture the shader samples.
//!
//! Every effect maps progress `p` in `[0, 2]` to a color:
//!
//! - `p` in `[0, 1]`: snapshot A is covered by the flat color, `mix(A, color, k)`.
//! - `p` in `[1, 2]`: the flat color is revealed into snapshot B, `mix(color, B, r)`.
//!
//! `k` and `r` are per-pixel weights that are exactly 0 at the start of their
//! half and exactly 1 at its end, for every pixel.

use glam::{Vec2, Vec3};

use super::effect::{EffectConfig, EffectKind};

/// Edge length of the baked noise texture in texels.
pub const NOISE_SIZE: u32 = 256;
/// How many noise tiles span the screen.
pub const NOISE_SCALE: f32 = 2.0;
/// Noise scroll speed in tiles per second.
pub const NOISE_DRIFT: Vec2 = Vec2::new(0.02, 0.013);

const NOISE_BASE_CELLS: u32 = 8;
const NOISE_OCTAVES: u32 = 4;
const NOISE_SEED: u32 = 0x5eed;

const GRID_SEED: u32 = 0x9e1d;
/// Fade width of an individual grid cell, in progress units.
const GRID_CELL_FADE: f32 = 0.1;
const GRID_JITTER: f32 = 0.15;

/// Anything that yields an RGB color for a uv coordinate.
pub trait Sampler {
    fn sample(&self, uv: Vec2) -> Vec3;
}

impl<F: Fn(Vec2) -> Vec3> Sampler for F {
    fn sample(&self, uv: Vec2) -> Vec3 {
        self(uv)
    }
}

/// Per-frame inputs shared by all effects.
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs {
    /// Output size in pixels.
    pub resolution: Vec2,
    /// Seconds since the renderer started; animates the dissolve noise.
    pub time: f32,
}

/// Which half of the transition a weight is computed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Half {
    Cover,
    Reveal,
}

/// Composite one pixel.
pub fn composite(
    kind: EffectKind,
    uv: Vec2,
    progress: f32,
    snapshot_a: &impl Sampler,
    snapshot_b: &impl Sampler,
    config: &EffectConfig,
    inputs: FrameInputs,
) -> Vec3 {
    let p = progress.clamp(0.0, 2.0);
    let color = config.color.to_vec3();

    if p <= 1.0 {
        let k = weight(kind, uv, p, Half::Cover, config, inputs);
        snapshot_a.sample(uv).lerp(color, k)
    } else {
        let r = weight(kind, uv, p - 1.0, Half::Reveal, config, inputs);
        color.lerp(snapshot_b.sample(uv), r)
    }
}

fn weight(
    kind: EffectKind,
    uv: Vec2,
    t: f32,
    half: Half,
    config: &EffectConfig,
    inputs: FrameInputs,
) -> f32 {
    match kind {
        EffectKind::Fade => t,
        EffectKind::Dissolve => sweep(dissolve_field(uv, inputs.time), t, config.edge),
        EffectKind::Grid => sweep(grid_field(uv, half, config, inputs), t, GRID_CELL_FADE),
        EffectKind::Wipe => sweep(wipe_field(uv, config.direction), t, config.softness),
        EffectKind::Mask => {
            let f = config.mask.as_ref().map_or(0.0, |mask| mask.sample(uv));
            sweep(f, t, config.softness)
        }
    }
}

/// Soft threshold of a per-pixel field value `f` against half-progress `t`.
///
/// Pixels with a low field value switch first. Returns 0 at `t = 0` and 1 at
/// `t = 1` for any `f` in `[0, 1]`.
pub fn sweep(f: f32, t: f32, softness: f32) -> f32 {
    let s = softness.max(1e-3);
    let f = f.clamp(0.0, 1.0);
    smoothstep(((t * (1.0 + s) - f) / s).clamp(0.0, 1.0))
}

fn smoothstep(x: f32) -> f32 {
    x * x * (3.0 - 2.0 * x)
}

fn dissolve_field(uv: Vec2, time: f32) -> f32 {
    let p = uv * NOISE_SCALE + NOISE_DRIFT * time;
    fbm(p - p.floor())
}

/// Position along the wipe direction, 0 where the sweep enters and 1 where it leaves.
fn wipe_field(uv: Vec2, direction: Vec2) -> f32 {
    let half_extent = 0.5 * (direction.x.abs() + direction.y.abs());
    if half_extent <= f32::EPSILON {
        return 0.0;
    }
    let position = (uv - Vec2::splat(0.5)).dot(direction);
    (position + half_extent) / (2.0 * half_extent)
}

fn grid_field(uv: Vec2, half: Half, config: &EffectConfig, inputs: FrameInputs) -> f32 {
    let resolution = inputs.resolution.max(Vec2::ONE);
    let cell = (uv * resolution / config.cell_size).floor().max(Vec2::ZERO);
    let cell_center = (cell + Vec2::splat(0.5)) * config.cell_size;
    let center = config.center * resolution;

    let farthest = [
        Vec2::ZERO,
        Vec2::new(resolution.x, 0.0),
        Vec2::new(0.0, resolution.y),
        resolution,
    ]
    .into_iter()
    .map(|corner| corner.distance(center))
    .fold(1.0_f32, f32::max);

    let distance = (cell_center.distance(center) / farthest).clamp(0.0, 1.0);
    let jitter = hash01(cell.x as u32, cell.y as u32, GRID_SEED);
    let order = match half {
        Half::Cover => 1.0 - distance,
        Half::Reveal => distance,
    };
    order * (1.0 - GRID_JITTER) + jitter * GRID_JITTER
}

/// Integer hash mapped to `[0, 1)`.
pub fn hash01(x: u32, y: u32, seed: u32) -> f32 {
    let mut h = seed;
    h = h.wrapping_add(x.wrapping_mul(374761393));
    h = h.wrapping_add(y.wrapping_mul(668265263));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    (h & 0x00FF_FFFF) as f32 / 16_777_216.0
}

/// Tileable value noise on a `period` x `period` lattice; `p` is in lattice units.
fn value_noise(p: Vec2, period: u32, seed: u32) -> f32 {
    let cell = p.floor();
    let frac = p - cell;
    let x0 = (cell.x as i64).rem_euclid(period as i64) as u32;
    let y0 = (cell.y as i64).rem_euclid(period as i64) as u32;
    let x1 = (x0 + 1) % period;
    let y1 = (y0 + 1) % period;

    let u = frac * frac * (Vec2::splat(3.0) - 2.0 * frac);
    let a = hash01(x0, y0, seed);
    let b = hash01(x1, y0, seed);
    let c = hash01(x0, y1, seed);
    let d = hash01(x1, y1, seed);

    let top = a + (b - a) * u.x;
    let bottom = c + (d - c) * u.x;
    top + (bottom - top) * u.y
}

/// Fractal noise in `[0, 1]` over one tile; `p` in `[0, 1)` wraps seamlessly.
pub fn fbm(p: Vec2) -> f32 {
    let mut sum = 0.0;
    let mut norm = 0.0;
    let mut amplitude = 1.0;
    for octave in 0..NOISE_OCTAVES {
        let cells = NOISE_BASE_CELLS << octave;
        sum += amplitude * value_noise(p * cells as f32, cells, NOISE_SEED + octave);
        norm += amplitude;
        amplitude *= 0.5;
    }
    sum / norm
}

/// Bake the fractal noise tile as `NOISE_SIZE`² single-channel bytes.
pub fn noise_texture_data() -> Vec<u8> {
    let size = NOISE_SIZE as usize;
    let mut data = Vec::with_capacity(size * size);
    for y in 0..NOISE_SIZE {
        for x in 0..NOISE_SIZE {
            let p = Vec2::new(
                (x as f32 + 0.5) / NOISE_SIZE as f32,
                (y as f32 + 0.5) / NOISE_SIZE as f32,
            );
            data.push((fbm(p).clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::scene::effect::{EffectOverrides, MaskImage};

    const RED: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    const BLUE: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    fn inputs() -> FrameInputs {
        FrameInputs {
            resolution: Vec2::new(640.0, 360.0),
            time: 3.7,
        }
    }

    fn config(kind: EffectKind) -> EffectConfig {
        let overrides = EffectOverrides::new()
            .color(Color::rgb(0.2, 0.9, 0.3))
            .direction(0.6, -0.8)
            .cell_size(40.0)
            .center(0.3, 0.7);
        let overrides = match MaskImage::generate(16, 16, |uv| uv.x * uv.y) {
            Ok(mask) => overrides.mask(mask),
            Err(_) => overrides,
        };
        EffectConfig::resolve(kind, &overrides)
    }

    fn gradient_a(uv: Vec2) -> Vec3 {
        Vec3::new(uv.x, uv.y, 0.5)
    }

    fn gradient_b(uv: Vec2) -> Vec3 {
        Vec3::new(1.0 - uv.y, 0.25, uv.x)
    }

    fn uv_grid() -> impl Iterator<Item = Vec2> {
        (0..=10).flat_map(|y| (0..=10).map(move |x| Vec2::new(x as f32 / 10.0, y as f32 / 10.0)))
    }

    fn assert_close(actual: Vec3, expected: Vec3, context: &str) {
        assert!(
            actual.abs_diff_eq(expected, 1e-5),
            "{context}: expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn boundaries_show_the_snapshots_and_the_cover() {
        for kind in EffectKind::ALL {
            let config = config(kind);
            let cover = config.color.to_vec3();
            for uv in uv_grid() {
                let at = |p| composite(kind, uv, p, &gradient_a, &gradient_b, &config, inputs());
                assert_close(at(0.0), gradient_a(uv), &format!("{kind} p=0 {uv}"));
                assert_close(at(1.0), cover, &format!("{kind} p=1 {uv}"));
                assert_close(at(2.0), gradient_b(uv), &format!("{kind} p=2 {uv}"));
            }
        }
    }

    #[test]
    fn covering_half_never_samples_snapshot_b() {
        let poisoned = |_: Vec2| Vec3::splat(f32::NAN);
        for kind in EffectKind::ALL {
            let config = config(kind);
            for uv in uv_grid() {
                let out = composite(kind, uv, 0.6, &gradient_a, &poisoned, &config, inputs());
                assert!(out.is_finite(), "{kind} sampled B during cover");
            }
        }
    }

    #[test]
    fn coverage_grows_with_progress() {
        for kind in EffectKind::ALL {
            let config = config(kind);
            for uv in uv_grid() {
                let mut last = 0.0;
                for step in 0..=20 {
                    let p = step as f32 / 10.0;
                    let out = composite(kind, uv, p, &|_| RED, &|_| BLUE, &config, inputs());
                    // Distance travelled away from A, then towards B.
                    let travelled = if p <= 1.0 {
                        out.distance(RED) / config.color.to_vec3().distance(RED)
                    } else {
                        1.0 + 1.0 - out.distance(BLUE) / config.color.to_vec3().distance(BLUE)
                    };
                    assert!(travelled + 1e-4 >= last, "{kind} at {uv} regressed at p={p}");
                    last = travelled;
                }
            }
        }
    }

    #[test]
    fn wipe_sweeps_along_its_direction() {
        let config = EffectConfig::resolve(EffectKind::Wipe, &EffectOverrides::new().direction(1.0, 0.0));
        let at = |x: f32, p: f32| {
            composite(EffectKind::Wipe, Vec2::new(x, 0.5), p, &|_| RED, &|_| BLUE, &config, inputs())
        };
        // Black cover: the leading edge is darker than the trailing edge.
        assert!(at(0.1, 0.5).x < at(0.9, 0.5).x);
        // Reveal follows the same direction.
        assert!(at(0.1, 1.5).z > at(0.9, 1.5).z);
    }

    #[test]
    fn grid_covers_outside_in_and_reveals_center_out() {
        let config = EffectConfig::resolve(EffectKind::Grid, &EffectOverrides::new().cell_size(32.0));
        let corner = Vec2::new(0.02, 0.02);
        let middle = Vec2::new(0.5, 0.5);
        let at = |uv, p| composite(EffectKind::Grid, uv, p, &|_| RED, &|_| BLUE, &config, inputs());

        assert!(at(corner, 0.5).x < at(middle, 0.5).x);
        assert!(at(middle, 1.5).z > at(corner, 1.5).z);
    }

    #[test]
    fn mask_orders_reveal_by_luminance() {
        let mask = MaskImage::generate(8, 8, |uv| uv.x).unwrap();
        let config = EffectConfig::resolve(EffectKind::Mask, &EffectOverrides::new().mask(mask));
        let at = |x: f32| {
            composite(EffectKind::Mask, Vec2::new(x, 0.5), 1.5, &|_| RED, &|_| BLUE, &config, inputs())
        };
        assert!(at(0.05).z > at(0.95).z);
    }

    #[test]
    fn noise_tile_is_in_range_and_varied() {
        let data = noise_texture_data();
        assert_eq!(data.len(), (NOISE_SIZE * NOISE_SIZE) as usize);
        let min = *data.iter().min().unwrap();
        let max = *data.iter().max().unwrap();
        assert!(max - min > 64);
    }

    #[test]
    fn noise_tile_wraps_seamlessly() {
        for i in 0..16 {
            let y = i as f32 / 16.0;
            assert!((fbm(Vec2::new(0.0, y)) - fbm(Vec2::new(0.9999, y))).abs() < 0.02);
        }
    }
}
