use crate::catalog::DEFAULT_VIDEO_EXTENSIONS;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobeConfig {
    #[serde(default = "GlobeConfig::default_tile_count")]
    pub tile_count: usize,
    #[serde(default = "GlobeConfig::default_radius")]
    pub radius: f32,
    /// Longest side of a tile in world units.
    #[serde(default = "GlobeConfig::default_tile_max_extent")]
    pub tile_max_extent: f32,
    #[serde(default = "GlobeConfig::default_max_roll")]
    pub max_roll_radians: f32,
    #[serde(default = "GlobeConfig::default_border")]
    pub border: bool,
    #[serde(default = "GlobeConfig::default_border_width")]
    pub border_width: f32,
    #[serde(default = "GlobeConfig::default_border_color")]
    pub border_color: [f32; 4],
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_fov")]
    pub fov_y_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
    #[serde(default = "CameraConfig::default_distance")]
    pub distance: f32,
    #[serde(default = "CameraConfig::default_min_distance")]
    pub min_distance: f32,
    #[serde(default = "CameraConfig::default_max_distance")]
    pub max_distance: f32,
    #[serde(default = "CameraConfig::default_damping")]
    pub damping: f32,
    /// Radians per pixel of pointer drag.
    #[serde(default = "CameraConfig::default_rotate_speed")]
    pub rotate_speed: f32,
    /// Distance multiplier per wheel notch.
    #[serde(default = "CameraConfig::default_zoom_step")]
    pub zoom_step: f32,
    /// 1.0 is one revolution per minute.
    #[serde(default = "CameraConfig::default_auto_rotate_speed")]
    pub auto_rotate_speed: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmbienceConfig {
    #[serde(default = "AmbienceConfig::default_star_count")]
    pub star_count: usize,
    #[serde(default = "AmbienceConfig::default_star_shell")]
    pub star_shell: [f32; 2],
    #[serde(default = "AmbienceConfig::default_star_color")]
    pub star_color: [f32; 4],
    #[serde(default = "AmbienceConfig::default_wireframe")]
    pub wireframe: bool,
    /// Wireframe radius as a fraction of the globe radius.
    #[serde(default = "AmbienceConfig::default_wireframe_scale")]
    pub wireframe_scale: f32,
    #[serde(default = "AmbienceConfig::default_wireframe_color")]
    pub wireframe_color: [f32; 4],
    /// Radians per second.
    #[serde(default = "AmbienceConfig::default_rotation_speed")]
    pub rotation_speed: f32,
    #[serde(default = "AmbienceConfig::default_fog_density")]
    pub fog_density: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadingConfig {
    #[serde(default = "LoadingConfig::default_video_ready_ms")]
    pub video_ready_timeout_ms: u64,
    #[serde(default = "LoadingConfig::default_global_ready_ms")]
    pub global_ready_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "MediaConfig::default_root")]
    pub root: PathBuf,
    #[serde(default = "MediaConfig::default_catalog")]
    pub catalog: PathBuf,
    #[serde(default = "MediaConfig::default_video_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default = "MediaConfig::default_autoplay")]
    pub autoplay: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub globe: GlobeConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub ambience: AmbienceConfig,
    #[serde(default)]
    pub loading: LoadingConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub tile_count: Option<usize>,
    pub catalog: Option<PathBuf>,
    pub media_root: Option<PathBuf>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Memory Globe".to_string(), width: 1280, height: 720, vsync: true, fullscreen: false }
    }
}

impl GlobeConfig {
    const fn default_tile_count() -> usize {
        50
    }

    const fn default_radius() -> f32 {
        10.0
    }

    const fn default_tile_max_extent() -> f32 {
        3.0
    }

    const fn default_max_roll() -> f32 {
        0.25
    }

    const fn default_border() -> bool {
        true
    }

    const fn default_border_width() -> f32 {
        0.08
    }

    const fn default_border_color() -> [f32; 4] {
        [1.0, 1.0, 1.0, 0.9]
    }
}

impl Default for GlobeConfig {
    fn default() -> Self {
        Self {
            tile_count: Self::default_tile_count(),
            radius: Self::default_radius(),
            tile_max_extent: Self::default_tile_max_extent(),
            max_roll_radians: Self::default_max_roll(),
            border: Self::default_border(),
            border_width: Self::default_border_width(),
            border_color: Self::default_border_color(),
        }
    }
}

impl CameraConfig {
    const fn default_fov() -> f32 {
        75.0
    }

    const fn default_near() -> f32 {
        0.1
    }

    const fn default_far() -> f32 {
        1000.0
    }

    const fn default_distance() -> f32 {
        20.0
    }

    const fn default_min_distance() -> f32 {
        0.1
    }

    const fn default_max_distance() -> f32 {
        100.0
    }

    const fn default_damping() -> f32 {
        0.05
    }

    const fn default_rotate_speed() -> f32 {
        0.005
    }

    const fn default_zoom_step() -> f32 {
        0.95
    }

    const fn default_auto_rotate_speed() -> f32 {
        0.5
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: Self::default_fov(),
            near: Self::default_near(),
            far: Self::default_far(),
            distance: Self::default_distance(),
            min_distance: Self::default_min_distance(),
            max_distance: Self::default_max_distance(),
            damping: Self::default_damping(),
            rotate_speed: Self::default_rotate_speed(),
            zoom_step: Self::default_zoom_step(),
            auto_rotate_speed: Self::default_auto_rotate_speed(),
        }
    }
}

impl AmbienceConfig {
    const fn default_star_count() -> usize {
        2500
    }

    const fn default_star_shell() -> [f32; 2] {
        [60.0, 120.0]
    }

    const fn default_star_color() -> [f32; 4] {
        [1.0, 1.0, 1.0, 0.8]
    }

    const fn default_wireframe() -> bool {
        true
    }

    const fn default_wireframe_scale() -> f32 {
        0.95
    }

    const fn default_wireframe_color() -> [f32; 4] {
        [0.45, 0.6, 1.0, 0.15]
    }

    const fn default_rotation_speed() -> f32 {
        0.03
    }

    const fn default_fog_density() -> f32 {
        0.002
    }
}

impl Default for AmbienceConfig {
    fn default() -> Self {
        Self {
            star_count: Self::default_star_count(),
            star_shell: Self::default_star_shell(),
            star_color: Self::default_star_color(),
            wireframe: Self::default_wireframe(),
            wireframe_scale: Self::default_wireframe_scale(),
            wireframe_color: Self::default_wireframe_color(),
            rotation_speed: Self::default_rotation_speed(),
            fog_density: Self::default_fog_density(),
        }
    }
}

impl LoadingConfig {
    const fn default_video_ready_ms() -> u64 {
        6_000
    }

    const fn default_global_ready_ms() -> u64 {
        12_000
    }

    pub fn video_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.video_ready_timeout_ms)
    }

    pub fn global_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.global_ready_timeout_ms)
    }
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            video_ready_timeout_ms: Self::default_video_ready_ms(),
            global_ready_timeout_ms: Self::default_global_ready_ms(),
        }
    }
}

impl MediaConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("assets/media")
    }

    fn default_catalog() -> PathBuf {
        PathBuf::from("assets/media/catalog.json")
    }

    fn default_video_extensions() -> Vec<String> {
        DEFAULT_VIDEO_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
    }

    const fn default_autoplay() -> bool {
        true
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            catalog: Self::default_catalog(),
            video_extensions: Self::default_video_extensions(),
            autoplay: Self::default_autoplay(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut cfg: AppConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(tiles) = overrides.tile_count {
            self.globe.tile_count = tiles;
        }
        if let Some(catalog) = &overrides.catalog {
            self.media.catalog = catalog.clone();
        }
        if let Some(root) = &overrides.media_root {
            self.media.root = root.clone();
        }
        self.sanitize();
    }

    /// Clamps values the renderer cannot work with, logging each correction.
    pub fn sanitize(&mut self) {
        if !(self.globe.radius > 0.0) {
            tracing::warn!(radius = self.globe.radius, "globe radius must be positive; using default");
            self.globe.radius = GlobeConfig::default_radius();
        }
        if !(self.globe.tile_max_extent > 0.0) {
            tracing::warn!("tile_max_extent must be positive; using default");
            self.globe.tile_max_extent = GlobeConfig::default_tile_max_extent();
        }
        let cam = &mut self.camera;
        if !(cam.near > 0.0) || cam.far <= cam.near {
            tracing::warn!(near = cam.near, far = cam.far, "invalid clip planes; using defaults");
            cam.near = CameraConfig::default_near();
            cam.far = CameraConfig::default_far();
        }
        if !(cam.min_distance > 0.0) || cam.max_distance < cam.min_distance {
            tracing::warn!("invalid zoom range; using defaults");
            cam.min_distance = CameraConfig::default_min_distance();
            cam.max_distance = CameraConfig::default_max_distance();
        }
        cam.fov_y_degrees = cam.fov_y_degrees.clamp(1.0, 170.0);
        cam.damping = cam.damping.clamp(0.0, 1.0);
        cam.distance = cam.distance.clamp(cam.min_distance, cam.max_distance);
        if !(cam.zoom_step > 0.0 && cam.zoom_step < 1.0) {
            tracing::warn!(zoom_step = cam.zoom_step, "zoom_step must be in (0, 1); using default");
            cam.zoom_step = CameraConfig::default_zoom_step();
        }
        let [inner, outer] = self.ambience.star_shell;
        if !(inner > 0.0) || outer < inner {
            self.ambience.star_shell = AmbienceConfig::default_star_shell();
        }
        if self.loading.global_ready_timeout_ms == 0 {
            self.loading.global_ready_timeout_ms = LoadingConfig::default_global_ready_ms();
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.vsync.is_none()
            && self.tile_count.is_none()
            && self.catalog.is_none()
            && self.media_root.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.tile_count.is_some() {
            fields.push("tiles");
        }
        if self.catalog.is_some() {
            fields.push("catalog");
        }
        if self.media_root.is_some() {
            fields.push("media-root");
        }
        fields
    }
}
