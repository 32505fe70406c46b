//! Frame snapshots: immutable GPU copies of a scene's last completed frame.
//!
//! The orchestrator talks to a [`Snapshotter`], which resolves capture
//! requests asynchronously. [`GpuSnapshotter`] is the wgpu implementation: a
//! request is fulfilled by the next frame the host reports as rendered, so a
//! snapshot never reads a frame that was still being drawn.

use std::collections::VecDeque;

use tracing::debug;
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::render_target::RenderTarget;

/// Snapshots are sampled by the compositor and may be copied out again.
const SNAPSHOT_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::COPY_DST)
    .union(wgpu::TextureUsages::COPY_SRC);

/// Identifies the transition a capture was requested for.
pub type Generation = u64;

/// Why a frame could not be captured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("no rendering surface to capture")]
    SurfaceUnavailable,
    #[error("rendering surface is empty ({width}x{height})")]
    EmptySurface { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    PixelBufferSize { expected: usize, actual: usize },
    #[error("capture did not complete in time")]
    TimedOut,
}

/// An owned GPU copy of one frame.
///
/// Snapshots are not `Clone`: exactly one owner must hand each back to
/// [`Snapshotter::release`].
#[derive(Debug)]
pub struct Snapshot<T> {
    texture: T,
    width: u32,
    height: u32,
}

impl<T> Snapshot<T> {
    /// Wrap a captured texture and its pixel size.
    pub fn new(texture: T, width: u32, height: u32) -> Self {
        Self {
            texture,
            width,
            height,
        }
    }

    /// The GPU resource holding the pixels.
    pub fn texture(&self) -> &T {
        &self.texture
    }

    /// Give up the wrapper, keeping the texture.
    pub fn into_texture(self) -> T {
        self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the snapshot holds any pixels.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// A resolved capture request.
#[derive(Debug)]
pub struct CaptureOutcome<T> {
    pub generation: Generation,
    pub result: Result<Snapshot<T>, CaptureError>,
}

/// Source of frame snapshots.
pub trait Snapshotter {
    /// The GPU resource a snapshot owns.
    type Texture;

    /// Ask for a copy of the next completed frame.
    fn request_capture(&mut self, generation: Generation);

    /// Take one resolved request, if any.
    fn poll_capture(&mut self) -> Option<CaptureOutcome<Self::Texture>>;

    /// Free the GPU memory behind a snapshot.
    fn release(&mut self, snapshot: Snapshot<Self::Texture>);

    /// Number of snapshots handed out and not yet released.
    fn live_snapshots(&self) -> usize;
}

/// Texture and view backing a GPU snapshot.
#[derive(Debug)]
pub struct SnapshotTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// What the host rendered this frame.
pub enum FrameSource<'a> {
    /// A GPU render target; copied texture-to-texture.
    Target(&'a RenderTarget),
    /// Tightly packed RGBA8 pixels; uploaded into a new texture.
    Pixels {
        rgba: &'a [u8],
        width: u32,
        height: u32,
    },
}

/// wgpu-backed [`Snapshotter`].
///
/// The host must call [`frame_rendered`](Self::frame_rendered) once per frame,
/// after the scene has finished drawing.
#[derive(Default)]
pub struct GpuSnapshotter {
    pending: Vec<Generation>,
    ready: VecDeque<CaptureOutcome<SnapshotTexture>>,
    live: usize,
}

impl GpuSnapshotter {
    /// A snapshotter with no pending requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any request is waiting for a frame.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Fulfil every pending request from the frame that just finished.
    ///
    /// `None` means the host has no readable surface this frame; pending
    /// requests then resolve to [`CaptureError::SurfaceUnavailable`].
    pub fn frame_rendered(&mut self, gpu: &GpuContext, source: Option<FrameSource<'_>>) {
        if self.pending.is_empty() {
            return;
        }

        for generation in std::mem::take(&mut self.pending) {
            let result = match &source {
                Some(source) => copy_frame(gpu, source),
                None => Err(CaptureError::SurfaceUnavailable),
            };
            if result.is_ok() {
                self.live += 1;
            }
            debug!(generation, ok = result.is_ok(), "frame captured");
            self.ready.push_back(CaptureOutcome { generation, result });
        }
    }
}

impl Snapshotter for GpuSnapshotter {
    type Texture = SnapshotTexture;

    fn request_capture(&mut self, generation: Generation) {
        self.pending.push(generation);
    }

    fn poll_capture(&mut self) -> Option<CaptureOutcome<SnapshotTexture>> {
        self.ready.pop_front()
    }

    fn release(&mut self, snapshot: Snapshot<SnapshotTexture>) {
        snapshot.into_texture().texture.destroy();
        self.live = self.live.saturating_sub(1);
    }

    fn live_snapshots(&self) -> usize {
        self.live
    }
}

fn copy_frame(
    gpu: &GpuContext,
    source: &FrameSource<'_>,
) -> Result<Snapshot<SnapshotTexture>, CaptureError> {
    match *source {
        FrameSource::Target(target) => copy_target(gpu, target),
        FrameSource::Pixels {
            rgba,
            width,
            height,
        } => upload_pixels(gpu, rgba, width, height),
    }
}

fn copy_target(
    gpu: &GpuContext,
    target: &RenderTarget,
) -> Result<Snapshot<SnapshotTexture>, CaptureError> {
    let (width, height) = (target.width(), target.height());
    check_extent(width, height)?;

    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Scene Snapshot"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: target.format(),
        usage: SNAPSHOT_USAGE,
        view_formats: &[],
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Snapshot Copy Encoder"),
        });
    encoder.copy_texture_to_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        size,
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(Snapshot::new(SnapshotTexture { texture, view }, width, height))
}

fn upload_pixels(
    gpu: &GpuContext,
    rgba: &[u8],
    width: u32,
    height: u32,
) -> Result<Snapshot<SnapshotTexture>, CaptureError> {
    check_pixels(rgba, width, height)?;

    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("Scene Snapshot"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: SNAPSHOT_USAGE,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        rgba,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(Snapshot::new(SnapshotTexture { texture, view }, width, height))
}

fn check_extent(width: u32, height: u32) -> Result<(), CaptureError> {
    if width == 0 || height == 0 {
        return Err(CaptureError::EmptySurface { width, height });
    }
    Ok(())
}

fn check_pixels(rgba: &[u8], width: u32, height: u32) -> Result<(), CaptureError> {
    check_extent(width, height)?;
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(CaptureError::PixelBufferSize {
            expected,
            actual: rgba.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_buffers_must_match_their_extent() {
        assert_eq!(check_pixels(&[0; 16], 2, 2), Ok(()));
        assert_eq!(
            check_pixels(&[0; 15], 2, 2),
            Err(CaptureError::PixelBufferSize {
                expected: 16,
                actual: 15
            })
        );
        assert_eq!(
            check_pixels(&[], 0, 4),
            Err(CaptureError::EmptySurface {
                width: 0,
                height: 4
            })
        );
    }

    #[test]
    fn snapshot_validity_follows_size() {
        assert!(Snapshot::new((), 4, 4).is_valid());
        assert!(!Snapshot::new((), 0, 4).is_valid());
    }

    /// A 4x4 headless context, or `None` on machines without a GPU adapter.
    fn headless() -> Option<GpuContext> {
        GpuContext::headless(4, 4).ok()
    }

    fn clear(gpu: &GpuContext, target: &RenderTarget, color: wgpu::Color) {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Test Clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Read back the first pixel of an RGBA8 texture.
    fn first_pixel(gpu: &GpuContext, texture: &wgpu::Texture) -> [u8; 4] {
        let bytes_per_row = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Test Readback"),
            size: (bytes_per_row * texture.height()) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(texture.height()),
                },
            },
            texture.size(),
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.device.poll(wgpu::PollType::wait_indefinitely()).unwrap();
        rx.recv().unwrap().unwrap();

        let mapped = slice.get_mapped_range();
        [mapped[0], mapped[1], mapped[2], mapped[3]]
    }

    #[test]
    fn pixel_frames_resolve_pending_requests() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut snapshotter = GpuSnapshotter::new();
        let rgba = [200u8, 10, 20, 255].repeat(16);
        let frame = || FrameSource::Pixels {
            rgba: &rgba,
            width: 4,
            height: 4,
        };

        // Frames with nothing pending are ignored.
        snapshotter.frame_rendered(&gpu, Some(frame()));
        assert!(snapshotter.poll_capture().is_none());

        snapshotter.request_capture(7);
        assert!(snapshotter.has_pending());
        snapshotter.frame_rendered(&gpu, Some(frame()));
        assert!(!snapshotter.has_pending());

        let outcome = snapshotter.poll_capture().unwrap();
        assert_eq!(outcome.generation, 7);
        let snapshot = outcome.result.unwrap();
        assert_eq!((snapshot.width(), snapshot.height()), (4, 4));
        assert_eq!(first_pixel(&gpu, &snapshot.texture().texture), [200, 10, 20, 255]);
        assert_eq!(snapshotter.live_snapshots(), 1);

        snapshotter.release(snapshot);
        assert_eq!(snapshotter.live_snapshots(), 0);
    }

    #[test]
    fn missing_surface_resolves_to_an_error() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut snapshotter = GpuSnapshotter::new();
        snapshotter.request_capture(3);
        snapshotter.frame_rendered(&gpu, None);

        let outcome = snapshotter.poll_capture().unwrap();
        assert_eq!(outcome.generation, 3);
        assert_eq!(outcome.result.err(), Some(CaptureError::SurfaceUnavailable));
        assert_eq!(snapshotter.live_snapshots(), 0);
    }

    #[test]
    fn mismatched_pixels_resolve_to_an_error() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut snapshotter = GpuSnapshotter::new();
        snapshotter.request_capture(1);
        snapshotter.frame_rendered(
            &gpu,
            Some(FrameSource::Pixels {
                rgba: &[0; 8],
                width: 4,
                height: 4,
            }),
        );

        let outcome = snapshotter.poll_capture().unwrap();
        assert!(matches!(
            outcome.result,
            Err(CaptureError::PixelBufferSize {
                expected: 64,
                actual: 8
            })
        ));
        assert_eq!(snapshotter.live_snapshots(), 0);
    }

    #[test]
    fn target_copies_outlive_later_frames() {
        let Some(gpu) = headless() else {
            return;
        };
        let target = RenderTarget::new(&gpu, "Test Target");
        let mut snapshotter = GpuSnapshotter::new();

        clear(&gpu, &target, wgpu::Color::RED);
        snapshotter.request_capture(1);
        snapshotter.frame_rendered(&gpu, Some(FrameSource::Target(&target)));
        let snapshot = snapshotter.poll_capture().unwrap().result.unwrap();

        // The next frame overwrites the target; the snapshot keeps its own copy.
        clear(&gpu, &target, wgpu::Color::BLUE);
        assert_eq!(first_pixel(&gpu, &target.texture), [0, 0, 255, 255]);
        assert_eq!(first_pixel(&gpu, &snapshot.texture().texture), [255, 0, 0, 255]);

        snapshotter.release(snapshot);
        assert_eq!(snapshotter.live_snapshots(), 0);
    }
}
