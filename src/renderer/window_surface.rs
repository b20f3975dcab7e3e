use crate::config::WindowConfig;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

use super::DEPTH_FORMAT;

#[derive(Debug)]
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    surface: wgpu::SurfaceTexture,
}

impl SurfaceFrame {
    fn new(surface: wgpu::SurfaceTexture) -> Self {
        let view = surface.texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { view, surface }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        self.surface.present();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceErrorAction {
    Reconfigure,
    SkipFrame,
    OutOfMemory,
    Unknown,
}

/// Window plus the wgpu objects bound to it. The depth buffer always matches
/// the surface size.
pub struct WindowSurface {
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    title: String,
    vsync: bool,
    fullscreen: bool,
    depth_view: Option<wgpu::TextureView>,
    present_modes: Vec<wgpu::PresentMode>,
    #[cfg(test)]
    resize_invocations: usize,
}

impl WindowSurface {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            surface: None,
            device: None,
            queue: None,
            config: None,
            size: PhysicalSize::new(window_cfg.width, window_cfg.height),
            window: None,
            title: window_cfg.title.clone(),
            vsync: window_cfg.vsync,
            fullscreen: window_cfg.fullscreen,
            depth_view: None,
            present_modes: Vec::new(),
            #[cfg(test)]
            resize_invocations: 0,
        }
    }

    /// Creates the window and GPU objects on first call.
    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<bool> {
        if self.window.is_some() {
            return Ok(false);
        }
        let mut attrs = Window::default_attributes().with_title(self.title.clone()).with_inner_size(self.size);
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        pollster::block_on(self.init_wgpu(&window))?;
        self.window = Some(window);
        Ok(true)
    }

    pub fn device_and_queue(&self) -> Result<(&wgpu::Device, &wgpu::Queue)> {
        Ok((self.device()?, self.queue()?))
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        self.device.as_ref().context("GPU device not initialized")
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        self.queue.as_ref().context("GPU queue not initialized")
    }

    pub fn depth_view(&self) -> Result<&wgpu::TextureView> {
        self.depth_view.as_ref().context("Depth texture missing")
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        Ok(self.config.as_ref().context("Surface configuration missing")?.format)
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    pub fn request_redraw(&self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    pub fn set_title(&mut self, title: &str) {
        if self.title == title {
            return;
        }
        self.title = title.to_string();
        if let Some(window) = self.window.as_ref() {
            window.set_title(title);
        }
    }

    pub fn vsync_enabled(&self) -> bool {
        self.vsync
    }

    pub fn set_vsync(&mut self, enabled: bool) -> Result<()> {
        if self.vsync == enabled {
            return Ok(());
        }
        self.vsync = enabled;
        self.reconfigure_present_mode()
    }

    /// Reconfigures the swapchain and depth buffer. Zero-sized (minimised)
    /// windows only record the size.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        #[cfg(test)]
        {
            self.resize_invocations += 1;
        }
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(config) = self.config.as_mut() {
            config.width = new_size.width;
            config.height = new_size.height;
            if let Err(err) = self.configure_surface() {
                tracing::warn!("surface resize failed: {err:#}");
            }
        }
        if self.device.is_some() {
            if let Err(err) = self.recreate_depth_texture() {
                tracing::warn!("depth texture resize failed: {err:#}");
            }
        }
    }

    pub fn acquire_surface_frame(&mut self) -> Result<SurfaceFrame> {
        let surface = self.surface.as_ref().ok_or_else(|| anyhow!("Surface not initialized"))?;
        match surface.get_current_texture() {
            Ok(frame) => Ok(SurfaceFrame::new(frame)),
            Err(err) => Err(self.handle_surface_error(&err)),
        }
    }

    pub fn handle_surface_error(&mut self, error: &wgpu::SurfaceError) -> anyhow::Error {
        match Self::surface_error_action(error) {
            SurfaceErrorAction::Reconfigure => {
                self.resize(self.size);
                anyhow!("Surface lost or outdated; reconfigured surface")
            }
            SurfaceErrorAction::SkipFrame => anyhow!("Surface acquisition timed out"),
            SurfaceErrorAction::OutOfMemory => anyhow!("Surface out of memory"),
            SurfaceErrorAction::Unknown => anyhow!("Surface reported an unknown error"),
        }
    }

    fn configure_surface(&mut self) -> Result<()> {
        let surface = self.surface.as_ref().context("Surface not initialized")?;
        let device = self.device.as_ref().context("GPU device not initialized")?;
        let config = self.config.as_ref().context("Surface configuration missing")?;
        surface.configure(device, config);
        Ok(())
    }

    fn recreate_depth_texture(&mut self) -> Result<()> {
        let device = self.device.as_ref().context("GPU device not initialized")?;
        self.depth_view = Some(create_depth_view(device, self.size));
        Ok(())
    }

    fn select_present_mode(&self, modes: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        if self.vsync {
            return wgpu::PresentMode::Fifo;
        }
        [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
            .into_iter()
            .find(|mode| modes.contains(mode))
            .unwrap_or(wgpu::PresentMode::Fifo)
    }

    fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Result<wgpu::TextureFormat> {
        formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| formats.first().copied())
            .context("Surface reports no supported formats")
    }

    pub fn reconfigure_present_mode(&mut self) -> Result<()> {
        if self.surface.is_none() {
            return Ok(());
        }
        let present_mode = self.select_present_mode(&self.present_modes);
        self.config.as_mut().context("Surface configuration missing")?.present_mode = present_mode;
        tracing::debug!(?present_mode, "present mode updated");
        self.configure_surface()
    }

    /// Device and queue without a window or surface. Fails when the host has
    /// no usable adapter.
    pub async fn init_headless_for_test(&mut self) -> Result<()> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request headless WGPU adapter")?;
        let (device, queue) = adapter
            .request_device(&device_descriptor("Headless Device", &adapter))
            .await
            .context("Failed to request headless WGPU device")?;
        self.device = Some(device);
        self.queue = Some(queue);
        Ok(())
    }

    async fn init_wgpu(&mut self, window: &Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create WGPU surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request WGPU adapter")?;
        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "GPU adapter selected");
        let (device, queue) = adapter
            .request_device(&device_descriptor("Globe Device", &adapter))
            .await
            .context("Failed to request WGPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = Self::choose_surface_format(&caps.formats)?;
        let alpha_mode = caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: self.select_present_mode(&caps.present_modes),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        self.depth_view = Some(create_depth_view(&device, size));
        self.size = size;
        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        self.present_modes = caps.present_modes;
        Ok(())
    }

    fn surface_error_action(error: &wgpu::SurfaceError) -> SurfaceErrorAction {
        match error {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
            wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
            wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::OutOfMemory,
            wgpu::SurfaceError::Other => SurfaceErrorAction::Unknown,
        }
    }
}

fn device_descriptor<'a>(label: &'a str, adapter: &wgpu::Adapter) -> wgpu::DeviceDescriptor<'a> {
    wgpu::DeviceDescriptor {
        label: Some(label),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
        experimental_features: wgpu::ExperimentalFeatures::default(),
        memory_hints: wgpu::MemoryHints::default(),
        trace: wgpu::Trace::default(),
    }
}

fn create_depth_view(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Globe Depth Texture"),
        size: wgpu::Extent3d { width: size.width.max(1), height: size.height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_mode_respects_vsync_flag() {
        let mut cfg = WindowConfig::default();
        cfg.vsync = false;
        let surface = WindowSurface::new(&cfg);
        let modes = [wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo];
        assert_eq!(surface.select_present_mode(&modes), wgpu::PresentMode::Immediate);
        assert_eq!(surface.select_present_mode(&[wgpu::PresentMode::Fifo]), wgpu::PresentMode::Fifo);

        cfg.vsync = true;
        let vsync_surface = WindowSurface::new(&cfg);
        assert_eq!(vsync_surface.select_present_mode(&modes), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn surface_errors_map_to_recovery() {
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::Lost),
            SurfaceErrorAction::Reconfigure
        );
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::Outdated),
            SurfaceErrorAction::Reconfigure
        );
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::Timeout),
            SurfaceErrorAction::SkipFrame
        );
        assert_eq!(
            WindowSurface::surface_error_action(&wgpu::SurfaceError::OutOfMemory),
            SurfaceErrorAction::OutOfMemory
        );
    }

    #[test]
    fn lost_surface_reconfigures_at_current_size() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        let err = surface.handle_surface_error(&wgpu::SurfaceError::Lost);
        assert!(err.to_string().contains("Surface lost"));
        assert_eq!(surface.resize_invocations, 1);
        assert_eq!(surface.size(), PhysicalSize::new(1280, 720));
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb];
        assert_eq!(WindowSurface::choose_surface_format(&formats).ok(), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert!(WindowSurface::choose_surface_format(&[]).is_err());
    }

    #[test]
    fn title_updates_without_window() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        surface.set_title("Memory Globe (loading)");
        assert_eq!(surface.title, "Memory Globe (loading)");
        surface.resize(PhysicalSize::new(0, 0));
        assert_eq!(surface.size(), PhysicalSize::new(0, 0));
    }
}
