//! GPU compositing pass for transition overlays.
//!
//! A single pipeline draws every effect; the effect is picked per frame by an
//! integer selector in the uniforms. The shader is a per-pixel port of
//! [`composite`](super::composite), which holds the tested reference formulas.

use tracing::debug;
use wgpu::util::DeviceExt;

use super::composite::{NOISE_DRIFT, NOISE_SCALE, NOISE_SIZE, noise_texture_data};
use super::effect::MaskImage;
use super::orchestrator::Overlay;
use super::snapshot::SnapshotTexture;
use crate::gpu::GpuContext;

/// Uniforms for the compositing shader. Layout matches `Uniforms` in WGSL.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeUniforms {
    /// Output size in pixels.
    resolution: [f32; 2],
    /// Transition progress in [0, 2].
    progress: f32,
    /// Seconds since start, drives the dissolve drift.
    time: f32,
    /// Flat midpoint color (RGBA).
    color: [f32; 4],
    /// Grid wave origin in uv space.
    center: [f32; 2],
    /// Wipe direction.
    direction: [f32; 2],
    /// Effect selector, see [`EffectKind::index`](super::EffectKind::index).
    effect: u32,
    edge: f32,
    cell_size: f32,
    softness: f32,
    has_mask: u32,
    _pad: [u32; 3],
}

/// A mask uploaded to the GPU, keyed by [`MaskImage::id`].
struct MaskTexture {
    id: u64,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// GPU resources for drawing a transition overlay.
pub struct CompositePass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    /// Clamped linear sampler for the snapshots.
    sampler: wgpu::Sampler,
    /// Repeating linear sampler for the noise tile.
    noise_sampler: wgpu::Sampler,
    noise_view: wgpu::TextureView,
    /// 1x1 black texture bound wherever an input is missing.
    blank_view: wgpu::TextureView,
    mask: Option<MaskTexture>,
}

impl CompositePass {
    /// Create the pipeline for output `format` and bake the noise texture.
    pub fn new(gpu: &GpuContext, format: wgpu::TextureFormat) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITE_SHADER.as_str().into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Composite Uniforms"),
            size: std::mem::size_of::<CompositeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Composite Snapshot Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let noise_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Composite Noise Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let noise_view = upload_r8(gpu, "Dissolve Noise", NOISE_SIZE, NOISE_SIZE, &noise_texture_data());
        let blank_view = upload_blank(gpu);

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bind Group Layout"),
            entries: &[
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Snapshot A, snapshot B, noise, mask
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                texture_entry(4),
                sampler_entry(5),
                sampler_entry(6),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Composite Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            sampler,
            noise_sampler,
            noise_view,
            blank_view,
            mask: None,
        }
    }

    /// Draw one overlay frame into `target`.
    ///
    /// Snapshots are only read; their lifetime stays with the engine. When the
    /// incoming snapshot is missing, the outgoing one is shown in its place.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        overlay: &Overlay<'_, SnapshotTexture>,
        time: f32,
    ) {
        let config = overlay.config;
        if let Some(mask) = &config.mask {
            self.ensure_mask(gpu, mask);
        }
        let mask_view = match (&config.mask, &self.mask) {
            (Some(_), Some(cached)) => &cached.view,
            _ => &self.blank_view,
        };

        let uniforms = CompositeUniforms {
            resolution: [gpu.width() as f32, gpu.height() as f32],
            progress: overlay.progress.clamp(0.0, 2.0),
            time,
            color: config.color.to_array(),
            center: config.center.to_array(),
            direction: config.direction.to_array(),
            effect: overlay.kind.index(),
            edge: config.edge,
            cell_size: config.cell_size,
            softness: config.softness,
            has_mask: config.mask.is_some() as u32,
            _pad: [0; 3],
        };
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let view_a = &overlay.snapshot_a.texture().view;
        let view_b = overlay
            .snapshot_b
            .map_or(view_a, |snapshot| &snapshot.texture().view);

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view_a),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view_b),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.noise_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(mask_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(&self.noise_sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn ensure_mask(&mut self, gpu: &GpuContext, mask: &MaskImage) {
        if self.mask.as_ref().is_some_and(|cached| cached.id == mask.id()) {
            return;
        }
        debug!(id = mask.id(), width = mask.width(), height = mask.height(), "uploading mask");
        let texture = create_r8(gpu, "Transition Mask", mask.width(), mask.height(), mask.as_bytes());
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.mask = Some(MaskTexture {
            id: mask.id(),
            _texture: texture,
            view,
        });
    }
}

fn create_r8(gpu: &GpuContext, label: &str, width: u32, height: u32, data: &[u8]) -> wgpu::Texture {
    gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        data,
    )
}

fn upload_r8(gpu: &GpuContext, label: &str, width: u32, height: u32, data: &[u8]) -> wgpu::TextureView {
    create_r8(gpu, label, width, height, data).create_view(&wgpu::TextureViewDescriptor::default())
}

fn upload_blank(gpu: &GpuContext) -> wgpu::TextureView {
    upload_r8(gpu, "Composite Blank", 1, 1, &[0])
}

/// Builds the WGSL source, splicing in the noise constants shared with the
/// CPU reference.
static COMPOSITE_SHADER: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    format!(
        "const NOISE_SCALE: f32 = {scale:?};\nconst NOISE_DRIFT: vec2f = vec2f({dx:?}, {dy:?});\n{body}",
        scale = NOISE_SCALE,
        dx = NOISE_DRIFT.x,
        dy = NOISE_DRIFT.y,
        body = COMPOSITE_SHADER_BODY,
    )
});

const COMPOSITE_SHADER_BODY: &str = r#"
const GRID_SEED: u32 = 0x9e1du;
const GRID_CELL_FADE: f32 = 0.1;
const GRID_JITTER: f32 = 0.15;

struct Uniforms {
    resolution: vec2f,
    progress: f32,
    time: f32,
    color: vec4f,
    center: vec2f,
    direction: vec2f,
    effect: u32,
    edge: f32,
    cell_size: f32,
    softness: f32,
    has_mask: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var snapshot_a: texture_2d<f32>;
@group(0) @binding(2) var snapshot_b: texture_2d<f32>;
@group(0) @binding(3) var noise_texture: texture_2d<f32>;
@group(0) @binding(4) var mask_texture: texture_2d<f32>;
@group(0) @binding(5) var snapshot_sampler: sampler;
@group(0) @binding(6) var noise_sampler: sampler;

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4f {
    // Fullscreen triangle
    let uv = vec2f(f32((vi << 1u) & 2u), f32(vi & 2u));
    return vec4f(uv * 2.0 - 1.0, 0.0, 1.0);
}

fn hash01(x: u32, y: u32, seed: u32) -> f32 {
    var h = seed;
    h = h + x * 374761393u;
    h = h + y * 668265263u;
    h = h ^ (h >> 13u);
    h = h * 1274126177u;
    h = h ^ (h >> 16u);
    return f32(h & 0x00FFFFFFu) / 16777216.0;
}

// 0 at t = 0 and 1 at t = 1 for any f in [0, 1].
fn sweep(f: f32, t: f32, softness: f32) -> f32 {
    let s = max(softness, 1e-3);
    let x = clamp((t * (1.0 + s) - clamp(f, 0.0, 1.0)) / s, 0.0, 1.0);
    return x * x * (3.0 - 2.0 * x);
}

fn dissolve_field(uv: vec2f) -> f32 {
    let p = uv * NOISE_SCALE + NOISE_DRIFT * u.time;
    return textureSampleLevel(noise_texture, noise_sampler, fract(p), 0.0).r;
}

fn wipe_field(uv: vec2f) -> f32 {
    let half_extent = 0.5 * (abs(u.direction.x) + abs(u.direction.y));
    if half_extent <= 1.1920929e-7 {
        return 0.0;
    }
    let position = dot(uv - vec2f(0.5), u.direction);
    return (position + half_extent) / (2.0 * half_extent);
}

fn grid_field(uv: vec2f, reveal: bool) -> f32 {
    let resolution = max(u.resolution, vec2f(1.0));
    let cell = max(floor(uv * resolution / u.cell_size), vec2f(0.0));
    let cell_center = (cell + vec2f(0.5)) * u.cell_size;
    let center = u.center * resolution;

    var farthest = 1.0;
    farthest = max(farthest, distance(vec2f(0.0, 0.0), center));
    farthest = max(farthest, distance(vec2f(resolution.x, 0.0), center));
    farthest = max(farthest, distance(vec2f(0.0, resolution.y), center));
    farthest = max(farthest, distance(resolution, center));

    let d = clamp(distance(cell_center, center) / farthest, 0.0, 1.0);
    let jitter = hash01(u32(cell.x), u32(cell.y), GRID_SEED);
    var order = 1.0 - d;
    if reveal {
        order = d;
    }
    return order * (1.0 - GRID_JITTER) + jitter * GRID_JITTER;
}

fn mask_field(uv: vec2f) -> f32 {
    if u.has_mask == 0u {
        return 0.0;
    }
    let size = textureDimensions(mask_texture);
    let texel = min(vec2u(clamp(uv, vec2f(0.0), vec2f(1.0)) * vec2f(size)), size - vec2u(1u));
    return textureLoad(mask_texture, texel, 0).r;
}

fn weight(uv: vec2f, t: f32, reveal: bool) -> f32 {
    switch u.effect {
        case 1u: { return sweep(dissolve_field(uv), t, u.edge); }
        case 2u: { return sweep(grid_field(uv, reveal), t, GRID_CELL_FADE); }
        case 3u: { return sweep(wipe_field(uv), t, u.softness); }
        case 4u: { return sweep(mask_field(uv), t, u.softness); }
        default: { return t; }
    }
}

@fragment
fn fs(@builtin(position) pos: vec4f) -> @location(0) vec4f {
    let uv = pos.xy / u.resolution;
    // Sample both up front; textureSample must stay in uniform control flow.
    let a = textureSample(snapshot_a, snapshot_sampler, uv).rgb;
    let b = textureSample(snapshot_b, snapshot_sampler, uv).rgb;
    let p = clamp(u.progress, 0.0, 2.0);

    var rgb: vec3f;
    if p <= 1.0 {
        rgb = mix(a, u.color.rgb, weight(uv, p, false));
    } else {
        rgb = mix(u.color.rgb, b, weight(uv, p - 1.0, true));
    }
    return vec4f(rgb, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_match_wgsl_layout() {
        // WGSL rounds the struct up to a multiple of 16 bytes.
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 80);
        assert_eq!(std::mem::offset_of!(CompositeUniforms, color), 16);
        assert_eq!(std::mem::offset_of!(CompositeUniforms, effect), 48);
        assert_eq!(std::mem::offset_of!(CompositeUniforms, has_mask), 64);
    }

    #[test]
    fn shader_source_declares_shared_constants() {
        let source: &str = &COMPOSITE_SHADER;
        assert!(source.starts_with("const NOISE_SCALE: f32 = 2.0;"));
        assert!(source.contains("const NOISE_DRIFT: vec2f = vec2f(0.02, 0.013);"));
        assert!(source.contains("fn fs("));
    }
}
