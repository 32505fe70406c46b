//! Interactive demo: two procedural scenes and every transition effect.
//!
//! Keys `1`-`5` transition with Fade, Dissolve, Grid, Wipe, and Mask.
//! `Escape` cancels a running transition. Set `RUST_LOG=veil=debug` to trace
//! phase changes.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use veil::scene::{
    CompositePass, EffectKind, EffectOverrides, EngineConfig, FrameSource, GpuSnapshotter,
    MaskImage, TransitionCallbacks, TransitionEngine,
};
use veil::{Color, GpuContext, RenderTarget, Vec2};

const SCENES: [&str; 2] = ["stripes", "rings"];
const TARGET_LABEL: &str = "Demo Scene Target";

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniforms {
    resolution: [f32; 2],
    time: f32,
    scene: u32,
}

/// Draws one of the procedural demo scenes as a full-screen triangle.
struct ScenePass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ScenePass {
    fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Demo Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_SHADER.into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Demo Scene Uniforms"),
            size: std::mem::size_of::<SceneUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Demo Scene Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Demo Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Demo Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Demo Scene Pipeline"),
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
                    format: gpu.format(),
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
            uniform_buffer,
            bind_group,
        }
    }

    fn render(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        scene: usize,
        time: f32,
    ) {
        let uniforms = SceneUniforms {
            resolution: [gpu.width() as f32, gpu.height() as f32],
            time,
            scene: scene as u32,
        };
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Demo Scene Pass"),
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
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// Everything that needs a live GPU context.
struct Demo {
    gpu: GpuContext,
    target: RenderTarget,
    scenes: ScenePass,
    composite: CompositePass,
    engine: TransitionEngine<GpuSnapshotter>,
    mask: Option<MaskImage>,
}

impl Demo {
    fn new(gpu: GpuContext, current: Rc<Cell<usize>>) -> Self {
        let callbacks = TransitionCallbacks::new()
            .on_transition_start(|scene, kind| info!(%scene, %kind, "transition started"))
            .on_section_change(move |scene| {
                if let Some(index) = SCENES.iter().position(|name| *name == scene.as_str()) {
                    current.set(index);
                }
            })
            .on_transition_end(|scene| info!(%scene, "transition ended"));

        let mask = MaskImage::generate(256, 256, |uv| {
            uv.distance(Vec2::splat(0.5)) / std::f32::consts::FRAC_1_SQRT_2
        })
        .inspect_err(|error| warn!(%error, "could not build demo mask"))
        .ok();

        Self {
            target: RenderTarget::new(&gpu, TARGET_LABEL),
            scenes: ScenePass::new(&gpu),
            composite: CompositePass::new(&gpu, gpu.format()),
            engine: TransitionEngine::new(GpuSnapshotter::new(), EngineConfig::default(), callbacks),
            mask,
            gpu,
        }
    }

    fn start(&mut self, kind: EffectKind, current: usize) {
        let target = SCENES[(current + 1) % SCENES.len()];
        let overrides = match kind {
            EffectKind::Fade => EffectOverrides::new().color(Color::rgb(0.05, 0.05, 0.08)),
            EffectKind::Dissolve => EffectOverrides::new().edge(0.08),
            EffectKind::Grid => EffectOverrides::new().cell_size(48.0).center(0.3, 0.6),
            EffectKind::Wipe => EffectOverrides::new().direction(1.0, 0.0).duration(1.0),
            EffectKind::Mask => match &self.mask {
                Some(mask) => EffectOverrides::new().mask(mask.clone()),
                None => EffectOverrides::new(),
            },
        };
        if !self.engine.start_transition(target, kind, &overrides) {
            info!(%kind, "transition already running");
        }
    }

    fn frame(&mut self, scene: usize, time: f32) {
        let Some(surface) = &self.gpu.surface else {
            return;
        };
        let output = match surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = (self.gpu.width(), self.gpu.height());
                self.gpu.resize(width, height);
                return;
            }
            Err(error) => {
                warn!(%error, "skipping frame");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // The scene always renders off-screen so it can be snapshotted.
        self.target.ensure_size(&self.gpu, TARGET_LABEL);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Demo Scene Encoder"),
            });
        self.scenes
            .render(&self.gpu, &mut encoder, &self.target.view, scene, time);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        self.engine
            .snapshotter_mut()
            .frame_rendered(&self.gpu, Some(FrameSource::Target(&self.target)));
        self.engine.tick(time);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Demo Present Encoder"),
            });
        match self.engine.overlay() {
            Some(overlay) => self
                .composite
                .render(&self.gpu, &mut encoder, &view, &overlay, time),
            None => self.scenes.render(&self.gpu, &mut encoder, &view, scene, time),
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

struct App {
    window: Option<Arc<Window>>,
    demo: Option<Demo>,
    current: Rc<Cell<usize>>,
    start_time: Instant,
}

impl Default for App {
    fn default() -> Self {
        Self {
            window: None,
            demo: None,
            current: Rc::new(Cell::new(0)),
            start_time: Instant::now(),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes().with_title("veil");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                error!(%error, "failed to create window");
                event_loop.exit();
                return;
            }
        };

        match GpuContext::new(window.clone()) {
            Ok(gpu) => self.demo = Some(Demo::new(gpu, Rc::clone(&self.current))),
            Err(error) => {
                error!(%error, "failed to initialise GPU");
                event_loop.exit();
                return;
            }
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(demo) = &mut self.demo else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => demo.gpu.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                let kind = match key {
                    KeyCode::Digit1 => EffectKind::Fade,
                    KeyCode::Digit2 => EffectKind::Dissolve,
                    KeyCode::Digit3 => EffectKind::Grid,
                    KeyCode::Digit4 => EffectKind::Wipe,
                    KeyCode::Digit5 => EffectKind::Mask,
                    KeyCode::Escape => {
                        demo.engine.cancel();
                        return;
                    }
                    _ => return,
                };
                demo.start(kind, self.current.get());
            }
            WindowEvent::RedrawRequested => {
                demo.frame(self.current.get(), self.start_time.elapsed().as_secs_f32());
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(error) => {
            error!(%error, "failed to create event loop");
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(error) = event_loop.run_app(&mut app) {
        error!(%error, "event loop exited with an error");
    }
}

const SCENE_SHADER: &str = r#"
struct Uniforms {
    resolution: vec2f,
    time: f32,
    scene: u32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4f {
    let uv = vec2f(f32((vi << 1u) & 2u), f32(vi & 2u));
    return vec4f(uv * 2.0 - 1.0, 0.0, 1.0);
}

fn stripes(uv: vec2f) -> vec3f {
    let band = 0.5 + 0.5 * sin((uv.x + uv.y) * 24.0 - u.time * 2.0);
    return mix(vec3f(0.9, 0.45, 0.2), vec3f(0.95, 0.85, 0.4), band);
}

fn rings(uv: vec2f) -> vec3f {
    let aspect = u.resolution.x / max(u.resolution.y, 1.0);
    let p = (uv - vec2f(0.5)) * vec2f(aspect, 1.0);
    let ring = 0.5 + 0.5 * cos(length(p) * 40.0 - u.time * 3.0);
    return mix(vec3f(0.1, 0.2, 0.5), vec3f(0.3, 0.8, 0.9), ring);
}

@fragment
fn fs(@builtin(position) pos: vec4f) -> @location(0) vec4f {
    let uv = pos.xy / u.resolution;
    if u.scene == 0u {
        return vec4f(stripes(uv), 1.0);
    }
    return vec4f(rings(uv), 1.0);
}
"#;
