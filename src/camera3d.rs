use crate::config::CameraConfig;
use glam::{Mat4, Vec2, Vec3};
use winit::dpi::PhysicalSize;

const DEFAULT_UP: Vec3 = Vec3::Y;
/// Keeps the orbit off the poles where the view basis degenerates.
const POLAR_MARGIN: f32 = 0.01;
/// Damping factors are tuned per 60 Hz frame.
const REFERENCE_FPS: f32 = 60.0;

/// Perspective camera looking at a target.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        self.projection_matrix(aspect_of(viewport)) * self.view_matrix()
    }
}

pub fn aspect_of(viewport: PhysicalSize<u32>) -> f32 {
    if viewport.height > 0 {
        viewport.width as f32 / viewport.height as f32
    } else {
        1.0
    }
}

/// Damped orbit/zoom controller with idle auto-rotation.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    distance: f32,
    /// Angle around the world up axis.
    azimuth: f32,
    /// Angle down from the world up axis.
    polar: f32,
    azimuth_velocity: f32,
    polar_velocity: f32,
    pending_zoom: f32,
    interacting: bool,
    min_distance: f32,
    max_distance: f32,
    damping: f32,
    rotate_speed: f32,
    zoom_step: f32,
    auto_rotate_speed: f32,
    fov_y_radians: f32,
    near: f32,
    far: f32,
}

impl OrbitControls {
    pub fn new(cfg: &CameraConfig) -> Self {
        Self {
            target: Vec3::ZERO,
            distance: cfg.distance.clamp(cfg.min_distance, cfg.max_distance),
            azimuth: 0.0,
            polar: std::f32::consts::FRAC_PI_2,
            azimuth_velocity: 0.0,
            polar_velocity: 0.0,
            pending_zoom: 1.0,
            interacting: false,
            min_distance: cfg.min_distance,
            max_distance: cfg.max_distance,
            damping: cfg.damping,
            rotate_speed: cfg.rotate_speed,
            zoom_step: cfg.zoom_step,
            auto_rotate_speed: cfg.auto_rotate_speed,
            fov_y_radians: cfg.fov_y_degrees.to_radians(),
            near: cfg.near,
            far: cfg.far,
        }
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    pub fn polar(&self) -> f32 {
        self.polar
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    pub fn begin_interaction(&mut self) {
        self.interacting = true;
    }

    pub fn end_interaction(&mut self) {
        self.interacting = false;
    }

    /// Feeds a pointer drag in pixels. The motion keeps coasting after release
    /// until damping bleeds it off.
    pub fn drag(&mut self, delta_pixels: Vec2) {
        let delta = delta_pixels * self.rotate_speed;
        if self.damping > 0.0 {
            self.azimuth_velocity -= delta.x;
            self.polar_velocity -= delta.y;
        } else {
            self.azimuth -= delta.x;
            self.polar = clamp_polar(self.polar - delta.y);
        }
    }

    /// Positive notches zoom in.
    pub fn zoom(&mut self, notches: f32) {
        self.pending_zoom *= self.zoom_step.powf(notches);
    }

    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        if !self.interacting && self.auto_rotate_speed != 0.0 {
            self.azimuth += std::f32::consts::TAU / 60.0 * self.auto_rotate_speed * dt;
        }

        if self.damping > 0.0 {
            let frames = dt * REFERENCE_FPS;
            let step = self.damping.min(1.0);
            // Each 60 Hz frame applies `damping` of the remaining velocity.
            let applied = 1.0 - (1.0 - step).powf(frames);
            self.azimuth += self.azimuth_velocity * applied;
            self.polar = clamp_polar(self.polar + self.polar_velocity * applied);
            self.azimuth_velocity *= 1.0 - applied;
            self.polar_velocity *= 1.0 - applied;
        }

        self.distance = (self.distance * self.pending_zoom).clamp(self.min_distance, self.max_distance);
        self.pending_zoom = 1.0;
        self.azimuth = crate::wrap_angle(self.azimuth);
    }

    pub fn position(&self) -> Vec3 {
        let (sin_polar, cos_polar) = self.polar.sin_cos();
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        self.target + Vec3::new(sin_polar * sin_az, cos_polar, sin_polar * cos_az) * self.distance
    }

    pub fn camera(&self) -> Camera3D {
        Camera3D::new(self.position(), self.target, self.fov_y_radians, self.near, self.far)
    }
}

fn clamp_polar(polar: f32) -> f32 {
    polar.clamp(POLAR_MARGIN, std::f32::consts::PI - POLAR_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> OrbitControls {
        OrbitControls::new(&CameraConfig::default())
    }

    #[test]
    fn camera3d_view_projection_is_finite() {
        let camera = controls().camera();
        let vp = camera.view_projection(PhysicalSize::new(1280, 720));
        assert!(!vp.to_cols_array().iter().any(|v| v.is_nan() || v.is_infinite()));
        assert!((camera.position.length() - 20.0).abs() < 1e-4);
    }

    #[test]
    fn zoom_respects_bounds() {
        let mut orbit = controls();
        orbit.zoom(-500.0);
        orbit.update(0.016);
        assert!((orbit.distance() - 100.0).abs() < 1e-3);
        orbit.zoom(5_000.0);
        orbit.update(0.016);
        assert!((orbit.distance() - 0.1).abs() < 1e-5);
    }

    #[test]
    fn auto_rotation_pauses_while_interacting() {
        let mut orbit = controls();
        orbit.update(1.0);
        let idle = orbit.azimuth();
        assert!(idle > 0.0);
        orbit.begin_interaction();
        orbit.update(1.0);
        assert!((orbit.azimuth() - idle).abs() < 1e-6);
    }

    #[test]
    fn drag_coasts_and_settles() {
        let mut cfg = CameraConfig::default();
        cfg.auto_rotate_speed = 0.0;
        let mut orbit = OrbitControls::new(&cfg);
        orbit.drag(Vec2::new(-100.0, 0.0));
        orbit.update(1.0 / 60.0);
        let first = orbit.azimuth();
        assert!(first > 0.0);
        for _ in 0..600 {
            orbit.update(1.0 / 60.0);
        }
        let settled = orbit.azimuth();
        orbit.update(1.0 / 60.0);
        assert!((orbit.azimuth() - settled).abs() < 1e-5);
        assert!((settled - 0.5).abs() < 1e-3);
    }

    #[test]
    fn polar_angle_stays_off_the_poles() {
        let mut cfg = CameraConfig::default();
        cfg.damping = 0.0;
        let mut orbit = OrbitControls::new(&cfg);
        orbit.drag(Vec2::new(0.0, 10_000.0));
        orbit.update(0.0);
        assert!(orbit.polar() >= POLAR_MARGIN);
        assert!(orbit.position().is_finite());
    }
}
