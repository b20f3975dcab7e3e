use crate::camera3d::OrbitControls;
use crate::catalog::MediaCatalog;
use crate::cli::CliOverrides;
use crate::config::{AppConfig, AppConfigOverrides};
use crate::input::{Input, InputEvent};
use crate::media::{FsMediaSource, MediaSource};
use crate::renderer::GlobeRenderer;
use crate::session::{GlobeSession, TeardownReport};
use crate::time::Time;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::WindowId;

/// Loads configuration, starts the loader runtime and runs the window until
/// the user exits.
pub fn run(cli: CliOverrides) -> Result<()> {
    let config_path = cli.config_path();
    run_with_overrides(&config_path, cli.into_config_overrides())
}

pub fn run_with_overrides(config_path: &Path, overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default(config_path);
    if !overrides.is_empty() {
        tracing::info!(fields = ?overrides.applied_fields(), "applying command line overrides");
        config.apply_overrides(&overrides);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("globe-loader")
        .enable_all()
        .build()
        .context("Failed to start loader runtime")?;
    let catalog = MediaCatalog::load_or_default(&config.media.catalog, &config.media.video_extensions);
    tracing::info!(
        catalog = %config.media.catalog.display(),
        images = catalog.images().count(),
        videos = catalog.videos().count(),
        "media catalog loaded"
    );
    let source: Arc<dyn MediaSource> =
        Arc::new(FsMediaSource::new(config.media.root.clone(), runtime.handle().clone(), config.media.autoplay));
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config, catalog, source, runtime.handle().clone());
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    drop(app);
    runtime.shutdown_timeout(Duration::from_millis(500));
    Ok(())
}

pub struct App {
    config: AppConfig,
    catalog: MediaCatalog,
    source: Arc<dyn MediaSource>,
    runtime: Handle,
    renderer: GlobeRenderer,
    controls: OrbitControls,
    input: Input,
    time: Time,
    session: Option<GlobeSession>,
    rng: StdRng,
    should_close: bool,
    title_loading: Option<bool>,
}

impl App {
    pub fn new(config: AppConfig, catalog: MediaCatalog, source: Arc<dyn MediaSource>, runtime: Handle) -> Self {
        let renderer = GlobeRenderer::new(&config.window);
        let controls = OrbitControls::new(&config.camera);
        Self {
            config,
            catalog,
            source,
            runtime,
            renderer,
            controls,
            input: Input::new(),
            time: Time::new(),
            session: None,
            rng: StdRng::from_entropy(),
            should_close: false,
            title_loading: None,
        }
    }

    fn activate(&mut self) {
        self.teardown();
        let now = Instant::now();
        let session = GlobeSession::activate(
            &self.config,
            &self.catalog,
            Arc::clone(&self.source),
            &self.runtime,
            &mut self.rng,
            now,
        );
        if let Err(err) = self.renderer.load_ambience(&session.scene().ambience) {
            tracing::warn!("ambience upload failed: {err:#}");
        }
        self.controls = OrbitControls::new(&self.config.camera);
        self.input.reset();
        self.time = Time::starting_at(now);
        self.title_loading = None;
        self.session = Some(session);
        self.update_title();
    }

    /// Tears the active globe down. Does nothing when none is active.
    fn teardown(&mut self) -> Option<TeardownReport> {
        let mut session = self.session.take()?;
        let before = session.resource_counts();
        let report = session.teardown();
        let gpu_before = self.renderer.gpu_texture_count();
        let released = self.renderer.release_scene();
        tracing::debug!(
            ?before,
            gpu_before,
            released,
            gpu_after = self.renderer.gpu_texture_count(),
            remaining = ?session.resource_counts(),
            "GPU textures released"
        );
        Some(report)
    }

    fn update_title(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let loading = session.is_loading();
        if self.title_loading == Some(loading) && !loading {
            return;
        }
        let title = if loading {
            let counts = session.load_counts();
            let settled = counts.ready + counts.failed + counts.timed_out;
            format!("{} (loading {settled}/{})", self.config.window.title, session.slots().len())
        } else {
            self.config.window.title.clone()
        };
        self.title_loading = Some(loading);
        self.renderer.surface_mut().set_title(&title);
    }

    fn frame(&mut self) {
        let now = self.time.tick();
        let dt = self.time.delta_seconds();

        if self.input.take_exit_request() {
            self.should_close = true;
            return;
        }
        if self.input.take_restart_request() {
            tracing::info!("restarting globe");
            self.activate();
            return;
        }
        if self.input.take_vsync_toggle() {
            let surface = self.renderer.surface_mut();
            let enabled = !surface.vsync_enabled();
            match surface.set_vsync(enabled) {
                Ok(()) => tracing::info!(vsync = enabled, "present mode toggled"),
                Err(err) => tracing::warn!("vsync toggle failed: {err:#}"),
            }
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if self.input.take_gesture() {
            session.resume_playback();
        }

        if self.input.pointer_held() {
            self.controls.begin_interaction();
        } else {
            self.controls.end_interaction();
        }
        self.controls.drag(self.input.take_drag());
        self.controls.zoom(self.input.take_wheel());
        self.controls.update(dt);

        session.pump(now);
        session.scene_mut().advance(dt);

        let camera = self.controls.camera();
        if let Err(err) = self.renderer.render(session.scene(), &camera, now) {
            tracing::warn!("frame skipped: {err:#}");
        }
        self.update_title();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.ensure_window(event_loop) {
            tracing::error!("renderer initialization error: {err:#}");
            self.should_close = true;
            return;
        }
        if self.session.is_none() {
            self.activate();
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => {
                // Only an active globe follows the window size.
                if self.session.as_ref().is_some_and(GlobeSession::is_active) {
                    self.renderer.resize(*size);
                }
            }
            WindowEvent::RedrawRequested => self.frame(),
            _ => self.input.push(InputEvent::from_window_event(&event)),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            self.teardown();
            event_loop.exit();
            return;
        }
        if self.session.as_ref().is_some_and(GlobeSession::is_active) {
            self.renderer.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.teardown();
    }
}
