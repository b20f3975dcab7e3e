use anyhow::{Context, Result};
use glam::{Mat4, Vec4};
use wgpu::util::DeviceExt;

use super::gpu_textures::GpuTextureRegistry;
use super::DEPTH_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileInstance {
    pub model: [[f32; 4]; 4],
    pub tint: [f32; 4],
}

impl TileInstance {
    pub fn new(model: Mat4, tint: Vec4) -> Self {
        Self { model: model.to_cols_array_2d(), tint: tint.to_array() }
    }
}

/// One draw: an instance index and the identifier whose texture it samples.
/// `None` draws with the plain white texture (tile backings).
#[derive(Debug, Clone)]
pub struct TileDraw {
    pub instance: u32,
    pub texture: Option<String>,
}

/// Textured, double-sided, depth-tested quads.
pub struct TilePass {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    texture_bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    blank_bg: wgpu::BindGroup,
    instance_buffer: Option<wgpu::Buffer>,
    instance_capacity: usize,
}

impl TilePass {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        globals_bgl: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tile Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/tile.wgsl").into()),
        });

        let (texture_bgl, sampler) = texture_binding(device);
        let blank_bg = blank_bind_group(device, queue, &texture_bgl, &sampler);

        // Unit quad in the local XY plane, uv origin top-left.
        let vertices: [[f32; 5]; 4] = [
            [-0.5, 0.5, 0.0, 0.0, 0.0],
            [0.5, 0.5, 0.0, 1.0, 0.0],
            [0.5, -0.5, 0.0, 1.0, 1.0],
            [-0.5, -0.5, 0.0, 0.0, 1.0],
        ];
        let indices: [u16; 6] = [0, 2, 1, 0, 3, 2];
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tile VB"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tile IB"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tile Pipeline Layout"),
            bind_group_layouts: &[globals_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });
        let instance_attributes = wgpu::vertex_attr_array![
            2 => Float32x4,
            3 => Float32x4,
            4 => Float32x4,
            5 => Float32x4,
            6 => Float32x4
        ];
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Tile Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 5]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                shader_location: 0,
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 1,
                                format: wgpu::VertexFormat::Float32x2,
                                offset: 12,
                            },
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<TileInstance>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &instance_attributes,
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            texture_bgl,
            sampler,
            blank_bg,
            instance_buffer: None,
            instance_capacity: 0,
        }
    }

    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_bgl
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn upload_instances(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, instances: &[TileInstance]) -> Result<()> {
        if instances.is_empty() {
            return Ok(());
        }
        self.ensure_instance_capacity(device, instances.len());
        let buffer = self.instance_buffer.as_ref().context("Tile instance buffer missing")?;
        queue.write_buffer(buffer, 0, bytemuck::cast_slice(instances));
        Ok(())
    }

    pub fn encode_pass(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        globals_bg: &wgpu::BindGroup,
        draws: &[TileDraw],
        textures: &GpuTextureRegistry,
    ) -> Result<()> {
        if draws.is_empty() {
            return Ok(());
        }
        let instance_buffer = self.instance_buffer.as_ref().context("Tile instance buffer missing")?;
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, globals_bg, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, instance_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        for draw in draws {
            let bind_group = match draw.texture.as_deref() {
                Some(uri) => match textures.bind_group(uri) {
                    Some(bind_group) => bind_group,
                    None => continue,
                },
                None => &self.blank_bg,
            };
            pass.set_bind_group(1, bind_group, &[]);
            pass.draw_indexed(0..6, 0, draw.instance..draw.instance + 1);
        }
        Ok(())
    }

    fn ensure_instance_capacity(&mut self, device: &wgpu::Device, count: usize) {
        if self.instance_capacity >= count && self.instance_buffer.is_some() {
            return;
        }
        let mut capacity = self.instance_capacity.max(64);
        while capacity < count {
            capacity *= 2;
        }
        self.instance_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Instance Buffer"),
            size: (capacity * std::mem::size_of::<TileInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.instance_capacity = capacity;
    }
}

/// Layout and sampler every tile texture bind group is built against.
pub(super) fn texture_binding(device: &wgpu::Device) -> (wgpu::BindGroupLayout, wgpu::Sampler) {
    let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Tile Texture BGL"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Tile Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    (texture_bgl, sampler)
}

fn blank_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("Blank Tile Texture"),
            size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &[255, 255, 255, 255],
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Blank Tile BG"),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    })
}
