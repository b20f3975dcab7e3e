use crate::cache::{CachedTexture, SampleMode, TextureFrame};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadPlan {
    /// Nothing to sample yet and nothing uploaded.
    Skip,
    /// Reuse what is on the GPU.
    Keep,
    /// Same size, new pixels.
    Write,
    /// First upload or the source changed size.
    Create,
}

/// Decides what a frame needs for one texture, given what is already
/// uploaded as `(size, version)`.
pub(crate) fn plan_upload(
    uploaded: Option<((u32, u32), u64)>,
    mode: SampleMode,
    frame: Option<((u32, u32), u64)>,
) -> UploadPlan {
    match (uploaded, frame) {
        (Some(_), _) if mode == SampleMode::Fixed => UploadPlan::Keep,
        (None, None) => UploadPlan::Skip,
        (Some(_), None) => UploadPlan::Keep,
        (None, Some(_)) => UploadPlan::Create,
        (Some((size, version)), Some((frame_size, frame_version))) => {
            if size != frame_size {
                UploadPlan::Create
            } else if version != frame_version {
                UploadPlan::Write
            } else {
                UploadPlan::Keep
            }
        }
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
    version: u64,
}

/// One GPU texture per cached identifier, refreshed as its source changes.
#[derive(Default)]
pub struct GpuTextureRegistry {
    entries: HashMap<String, GpuTexture>,
    uploads: u64,
}

impl GpuTextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn bind_group(&self, uri: &str) -> Option<&wgpu::BindGroup> {
        self.entries.get(uri).map(|entry| &entry.bind_group)
    }

    /// Brings the GPU copy of `texture` up to date. Returns whether there is
    /// anything to draw.
    pub fn sync(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        texture: &CachedTexture,
        now: Instant,
    ) -> bool {
        let uploaded = self.entries.get(texture.uri()).map(|entry| (entry.size, entry.version));
        let mode = texture.sample_mode();
        let frame = if uploaded.is_some() && mode == SampleMode::Fixed { None } else { texture.sample(now) };
        let frame_key = frame.as_ref().map(|frame| (frame.pixels.dimensions(), frame.version));
        match (plan_upload(uploaded, mode, frame_key), frame) {
            (UploadPlan::Skip, _) => false,
            (UploadPlan::Keep, _) => true,
            (UploadPlan::Write, Some(frame)) => {
                if let Some(entry) = self.entries.get_mut(texture.uri()) {
                    write_pixels(queue, &entry.texture, &frame);
                    entry.version = frame.version;
                    self.uploads += 1;
                }
                true
            }
            (UploadPlan::Create, Some(frame)) => {
                let entry = create_texture(device, queue, layout, sampler, texture.uri(), &frame);
                if let Some(previous) = self.entries.insert(texture.uri().to_string(), entry) {
                    previous.texture.destroy();
                }
                self.uploads += 1;
                true
            }
            (UploadPlan::Write | UploadPlan::Create, None) => uploaded.is_some(),
        }
    }

    /// Drops textures whose identifier no longer has a tile.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let stale: Vec<String> = self.entries.keys().filter(|uri| !keep(uri)).cloned().collect();
        for uri in &stale {
            if let Some(entry) = self.entries.remove(uri) {
                entry.texture.destroy();
            }
        }
        stale.len()
    }

    pub fn release_all(&mut self) -> usize {
        let released = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.texture.destroy();
        }
        released
    }
}

fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    uri: &str,
    frame: &TextureFrame,
) -> GpuTexture {
    let (width, height) = frame.pixels.dimensions();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(uri),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_pixels(queue, &texture, frame);
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Tile Texture BG"),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    });
    GpuTexture { texture, bind_group, size: (width, height), version: frame.version }
}

fn write_pixels(queue: &wgpu::Queue, texture: &wgpu::Texture, frame: &TextureFrame) {
    let (width, height) = frame.pixels.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        frame.pixels.as_raw(),
        wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
}
