use crate::scene::Ambience;
use glam::{Vec3, Vec4};
use wgpu::util::DeviceExt;

use super::DEPTH_FORMAT;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct AmbienceVertex {
    position: [f32; 3],
    color: [f32; 4],
}

impl AmbienceVertex {
    fn new(position: Vec3, color: Vec4) -> Self {
        Self { position: position.to_array(), color: color.to_array() }
    }
}

struct GeometryBuffer {
    buffer: wgpu::Buffer,
    vertices: u32,
}

/// Starfield as a point list and the wireframe sphere as a line list. Both
/// share the ambience transform from the globals block.
pub struct AmbiencePass {
    points: wgpu::RenderPipeline,
    lines: wgpu::RenderPipeline,
    stars: Option<GeometryBuffer>,
    wireframe: Option<GeometryBuffer>,
}

impl AmbiencePass {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat, globals_bgl: &wgpu::BindGroupLayout) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ambience Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/ambience.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ambience Pipeline Layout"),
            bind_group_layouts: &[globals_bgl],
            push_constant_ranges: &[],
        });
        let points = build_pipeline(device, &shader, &layout, surface_format, wgpu::PrimitiveTopology::PointList);
        let lines = build_pipeline(device, &shader, &layout, surface_format, wgpu::PrimitiveTopology::LineList);
        Self { points, lines, stars: None, wireframe: None }
    }

    /// Uploads the geometry of a fresh activation.
    pub fn load(&mut self, device: &wgpu::Device, ambience: &Ambience) {
        self.stars = ambience.stars.as_ref().and_then(|stars| {
            let vertices: Vec<AmbienceVertex> =
                stars.points.iter().map(|point| AmbienceVertex::new(*point, stars.color)).collect();
            upload(device, "Starfield VB", &vertices)
        });
        self.wireframe = ambience.wireframe.as_ref().and_then(|wire| {
            let vertices: Vec<AmbienceVertex> = wire
                .segments
                .iter()
                .flat_map(|segment| segment.iter().map(|point| AmbienceVertex::new(*point, wire.color)))
                .collect();
            upload(device, "Wireframe VB", &vertices)
        });
    }

    pub fn clear(&mut self) {
        for geometry in [self.stars.take(), self.wireframe.take()].into_iter().flatten() {
            geometry.buffer.destroy();
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.stars.is_some() || self.wireframe.is_some()
    }

    pub fn encode_pass(&self, pass: &mut wgpu::RenderPass<'_>, globals_bg: &wgpu::BindGroup) {
        for (pipeline, geometry) in [(&self.points, &self.stars), (&self.lines, &self.wireframe)] {
            let Some(geometry) = geometry else {
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, globals_bg, &[]);
            pass.set_vertex_buffer(0, geometry.buffer.slice(..));
            pass.draw(0..geometry.vertices, 0..1);
        }
    }
}

fn upload(device: &wgpu::Device, label: &str, vertices: &[AmbienceVertex]) -> Option<GeometryBuffer> {
    if vertices.is_empty() {
        return None;
    }
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    Some(GeometryBuffer { buffer, vertices: vertices.len() as u32 })
}

fn build_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    surface_format: wgpu::TextureFormat,
    topology: wgpu::PrimitiveTopology,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(match topology {
            wgpu::PrimitiveTopology::PointList => "Starfield Pipeline",
            _ => "Wireframe Pipeline",
        }),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<AmbienceVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute { shader_location: 0, format: wgpu::VertexFormat::Float32x3, offset: 0 },
                    wgpu::VertexAttribute { shader_location: 1, format: wgpu::VertexFormat::Float32x4, offset: 12 },
                ],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState { topology, ..Default::default() },
        // Depth tested so tiles occlude, but never written.
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_shader_offsets() {
        assert_eq!(std::mem::size_of::<AmbienceVertex>(), 28);
        let vertex = AmbienceVertex::new(Vec3::new(1.0, 2.0, 3.0), Vec4::ONE);
        let raw: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&vertex));
        assert_eq!(&raw[..3], &[1.0, 2.0, 3.0]);
    }
}
