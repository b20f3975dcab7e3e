mod ambience_pass;
mod gpu_textures;
mod tile_pass;
mod window_surface;

pub use ambience_pass::AmbiencePass;
pub use gpu_textures::GpuTextureRegistry;
pub use tile_pass::{TileDraw, TileInstance, TilePass};
pub use window_surface::{SurfaceFrame, WindowSurface};

use crate::camera3d::Camera3D;
use crate::config::WindowConfig;
use crate::scene::{Ambience, GlobeScene};
use anyhow::{Context, Result};
use glam::{Mat4, Vec3, Vec4};
use std::collections::HashSet;
use std::time::Instant;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };

/// Soft white ambient plus one white point light above and in front of the globe.
const AMBIENT: f32 = 0.5;
const LIGHT_POSITION: Vec3 = Vec3::new(10.0, 10.0, 10.0);
const LIGHT_INTENSITY: f32 = 2.0;
const LIGHT_RANGE: f32 = 100.0;
const FOG_COLOR: Vec3 = Vec3::ZERO;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneGlobals {
    view_proj: [[f32; 4]; 4],
    ambience_model: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    light_pos: [f32; 4],
    light: [f32; 4],
    fog: [f32; 4],
}

impl SceneGlobals {
    fn new(view_proj: Mat4, camera: &Camera3D, ambience: &Ambience) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            ambience_model: ambience.model_matrix().to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
            light_pos: LIGHT_POSITION.extend(LIGHT_RANGE).to_array(),
            light: Vec3::splat(LIGHT_INTENSITY).extend(AMBIENT).to_array(),
            fog: FOG_COLOR.extend(ambience.fog_density).to_array(),
        }
    }
}

struct Pipelines {
    globals_buf: wgpu::Buffer,
    globals_bg: wgpu::BindGroup,
    tiles: TilePass,
    ambience: AmbiencePass,
}

/// Draws a [`GlobeScene`] into the window.
pub struct GlobeRenderer {
    surface: WindowSurface,
    pipelines: Option<Pipelines>,
    textures: GpuTextureRegistry,
}

impl GlobeRenderer {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self { surface: WindowSurface::new(window_cfg), pipelines: None, textures: GpuTextureRegistry::new() }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.surface.ensure_window(event_loop)? {
            self.init_pipelines()?;
        }
        Ok(())
    }

    fn init_pipelines(&mut self) -> Result<()> {
        let format = self.surface.surface_format()?;
        let (device, queue) = self.surface.device_and_queue()?;
        let globals_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Globals BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Globals Buffer"),
            size: std::mem::size_of::<SceneGlobals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Globals BG"),
            layout: &globals_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: globals_buf.as_entire_binding() }],
        });
        let tiles = TilePass::new(device, queue, format, &globals_bgl);
        let ambience = AmbiencePass::new(device, format, &globals_bgl);
        self.pipelines = Some(Pipelines { globals_buf, globals_bg, tiles, ambience });
        tracing::debug!(?format, "globe pipelines ready");
        Ok(())
    }

    pub fn surface(&self) -> &WindowSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut WindowSurface {
        &mut self.surface
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.surface.size()
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface.resize(size);
    }

    pub fn request_redraw(&self) {
        self.surface.request_redraw();
    }

    /// Replaces the starfield and wireframe with those of a new activation.
    pub fn load_ambience(&mut self, ambience: &Ambience) -> Result<()> {
        let device = self.surface.device()?;
        let pipelines = self.pipelines.as_mut().context("Globe pipelines not initialized")?;
        pipelines.ambience.clear();
        pipelines.ambience.load(device, ambience);
        Ok(())
    }

    pub fn gpu_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Drops every GPU texture and the ambience geometry. Returns how many
    /// textures were released.
    pub fn release_scene(&mut self) -> usize {
        if let Some(pipelines) = self.pipelines.as_mut() {
            pipelines.ambience.clear();
        }
        self.textures.release_all()
    }

    pub fn render(&mut self, scene: &GlobeScene, camera: &Camera3D, now: Instant) -> Result<()> {
        let size = self.surface.size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        let frame = self.surface.acquire_surface_frame()?;
        let depth_view = self.surface.depth_view()?;
        let (device, queue) = self.surface.device_and_queue()?;
        let pipelines = self.pipelines.as_mut().context("Globe pipelines not initialized")?;

        let globals = SceneGlobals::new(camera.view_projection(size), camera, &scene.ambience);
        queue.write_buffer(&pipelines.globals_buf, 0, bytemuck::bytes_of(&globals));

        let mut instances = Vec::with_capacity(scene.len() * 2);
        let mut draws = Vec::with_capacity(scene.len() * 2);
        for tile in scene.tiles() {
            if let Some((model, color)) = tile.backing_matrix() {
                draws.push(TileDraw { instance: instances.len() as u32, texture: None });
                instances.push(TileInstance::new(model, color));
            }
            let layout = pipelines.tiles.texture_layout();
            let sampler = pipelines.tiles.sampler();
            if self.textures.sync(device, queue, layout, sampler, &tile.texture, now) {
                draws.push(TileDraw { instance: instances.len() as u32, texture: Some(tile.uri().to_string()) });
                instances.push(TileInstance::new(tile.model_matrix(), Vec4::ONE));
            }
        }
        let live: HashSet<&str> = scene.tiles().iter().map(|tile| tile.uri()).collect();
        self.textures.retain(|uri| live.contains(uri));
        pipelines.tiles.upload_instances(device, queue, &instances)?;

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Globe Encoder") });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Globe Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(CLEAR_COLOR), store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            // Tiles first so the ambience is depth tested against them.
            pipelines.tiles.encode_pass(&mut pass, &pipelines.globals_bg, &draws, &self.textures)?;
            pipelines.ambience.encode_pass(&mut pass, &pipelines.globals_bg);
        }
        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}
