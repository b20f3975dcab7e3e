//! CPU-side scene graph of the globe: tiles plus the passive ambience.

use crate::cache::CachedTexture;
use crate::config::{AmbienceConfig, GlobeConfig};
use crate::layout::Placement;
use glam::{Mat4, Vec2, Vec3, Vec4};
use rand::Rng;
use std::sync::Arc;

/// Offset of the backing card behind its tile, in world units.
const BACKING_OFFSET: f32 = 0.02;
const WIREFRAME_SEGMENTS: usize = 48;
const WIREFRAME_PARALLELS: usize = 12;
const WIREFRAME_MERIDIANS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBorder {
    pub width: f32,
    pub color: Vec4,
}

/// One media item attached to its slot on the sphere.
#[derive(Debug, Clone)]
pub struct Tile {
    pub placement: Placement,
    pub size: Vec2,
    pub texture: Arc<CachedTexture>,
    pub border: Option<TileBorder>,
}

impl Tile {
    pub fn slot(&self) -> usize {
        self.placement.index
    }

    pub fn uri(&self) -> &str {
        self.texture.uri()
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.placement.model_matrix(self.size)
    }

    /// Backing card, slightly larger and pushed toward the centre so it never
    /// z-fights with the picture.
    pub fn backing_matrix(&self) -> Option<(Mat4, Vec4)> {
        let border = self.border?;
        let mut placement = self.placement;
        placement.position -= placement.outward() * BACKING_OFFSET;
        let size = self.size + Vec2::splat(border.width * 2.0);
        Some((placement.model_matrix(size), border.color))
    }
}

/// Tile dimensions for media of `aspect` (width / height), longest side
/// capped at `max_extent`.
pub fn tile_size(aspect: f32, max_extent: f32) -> Vec2 {
    let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { crate::cache::FALLBACK_ASPECT };
    if aspect >= 1.0 {
        Vec2::new(max_extent, max_extent / aspect)
    } else {
        Vec2::new(max_extent * aspect, max_extent)
    }
}

#[derive(Debug, Clone)]
pub struct Starfield {
    pub points: Vec<Vec3>,
    pub color: Vec4,
}

impl Starfield {
    /// `count` points uniformly distributed by volume in the shell between
    /// `inner` and `outer`.
    pub fn generate<R: Rng + ?Sized>(count: usize, inner: f32, outer: f32, color: Vec4, rng: &mut R) -> Self {
        let (inner3, outer3) = (inner.powi(3), outer.powi(3));
        let points = (0..count)
            .map(|_| {
                let z: f32 = rng.gen_range(-1.0..=1.0);
                let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
                let ring = (1.0 - z * z).max(0.0).sqrt();
                let direction = Vec3::new(ring * angle.cos(), ring * angle.sin(), z);
                let radius = if outer3 > inner3 { rng.gen_range(inner3..outer3).cbrt() } else { inner };
                direction * radius
            })
            .collect();
        Self { points, color }
    }
}

/// Latitude/longitude line segments of a sphere, as pairs of endpoints.
#[derive(Debug, Clone)]
pub struct Wireframe {
    pub segments: Vec<[Vec3; 2]>,
    pub color: Vec4,
}

impl Wireframe {
    pub fn sphere(radius: f32, color: Vec4) -> Self {
        let mut segments = Vec::new();
        let tau = std::f32::consts::TAU;
        let pi = std::f32::consts::PI;
        for p in 1..WIREFRAME_PARALLELS {
            let polar = pi * p as f32 / WIREFRAME_PARALLELS as f32;
            let (ring, y) = (polar.sin() * radius, polar.cos() * radius);
            for s in 0..WIREFRAME_SEGMENTS {
                let a0 = tau * s as f32 / WIREFRAME_SEGMENTS as f32;
                let a1 = tau * (s + 1) as f32 / WIREFRAME_SEGMENTS as f32;
                segments.push([
                    Vec3::new(ring * a0.cos(), y, ring * a0.sin()),
                    Vec3::new(ring * a1.cos(), y, ring * a1.sin()),
                ]);
            }
        }
        for m in 0..WIREFRAME_MERIDIANS {
            let azimuth = tau * m as f32 / WIREFRAME_MERIDIANS as f32;
            let half = WIREFRAME_SEGMENTS / 2;
            for s in 0..half {
                let p0 = pi * s as f32 / half as f32;
                let p1 = pi * (s + 1) as f32 / half as f32;
                let point = |polar: f32| {
                    Vec3::new(polar.sin() * azimuth.cos(), polar.cos(), polar.sin() * azimuth.sin()) * radius
                };
                segments.push([point(p0), point(p1)]);
            }
        }
        Self { segments, color }
    }
}

#[derive(Debug, Clone)]
pub struct Ambience {
    pub stars: Option<Starfield>,
    pub wireframe: Option<Wireframe>,
    /// Radians per second applied to both.
    pub rotation_speed: f32,
    pub rotation: f32,
    pub fog_density: f32,
}

impl Ambience {
    pub fn from_config<R: Rng + ?Sized>(ambience: &AmbienceConfig, globe: &GlobeConfig, rng: &mut R) -> Self {
        let stars = (ambience.star_count > 0).then(|| {
            let [inner, outer] = ambience.star_shell;
            Starfield::generate(ambience.star_count, inner, outer, Vec4::from_array(ambience.star_color), rng)
        });
        let wireframe = ambience.wireframe.then(|| {
            Wireframe::sphere(globe.radius * ambience.wireframe_scale, Vec4::from_array(ambience.wireframe_color))
        });
        Self {
            stars,
            wireframe,
            rotation_speed: ambience.rotation_speed,
            rotation: 0.0,
            fog_density: ambience.fog_density,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.rotation = crate::wrap_angle(self.rotation + self.rotation_speed * dt);
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_y(self.rotation)
    }
}

/// Everything drawn for one activation. Only mutated from the render loop.
#[derive(Debug)]
pub struct GlobeScene {
    tiles: Vec<Tile>,
    pub ambience: Ambience,
    tile_max_extent: f32,
    border: Option<TileBorder>,
}

impl GlobeScene {
    pub fn new(globe: &GlobeConfig, ambience: Ambience) -> Self {
        let border = globe
            .border
            .then(|| TileBorder { width: globe.border_width, color: Vec4::from_array(globe.border_color) });
        Self { tiles: Vec::new(), ambience, tile_max_extent: globe.tile_max_extent, border }
    }

    /// Builds and attaches the tile for `placement`. A slot holds at most one
    /// tile; attaching twice keeps the first.
    pub fn attach(&mut self, placement: Placement, texture: Arc<CachedTexture>) -> bool {
        if self.tile_for_slot(placement.index).is_some() {
            return false;
        }
        let size = tile_size(texture.aspect_ratio(), self.tile_max_extent);
        self.tiles.push(Tile { placement, size, texture, border: self.border });
        true
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile_for_slot(&self, slot: usize) -> Option<&Tile> {
        self.tiles.iter().find(|tile| tile.slot() == slot)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn advance(&mut self, dt: f32) {
        self.ambience.advance(dt);
    }

    /// Detaches every tile, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.tiles.len();
        self.tiles.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MediaRef;
    use crate::layout::placement;
    use image::RgbaImage;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn texture(w: u32, h: u32) -> Arc<CachedTexture> {
        Arc::new(CachedTexture::still(MediaRef::image("a.png"), Arc::new(RgbaImage::new(w, h))))
    }

    #[test]
    fn tile_size_preserves_aspect_and_caps_extent() {
        assert_eq!(tile_size(2.0, 3.0), Vec2::new(3.0, 1.5));
        assert_eq!(tile_size(0.5, 3.0), Vec2::new(1.5, 3.0));
        let fallback = tile_size(f32::NAN, 3.0);
        assert!((fallback.x / fallback.y - 16.0 / 9.0).abs() < 1e-5);
    }

    #[test]
    fn starfield_stays_in_shell() {
        let mut rng = StdRng::seed_from_u64(1);
        let stars = Starfield::generate(500, 60.0, 120.0, Vec4::ONE, &mut rng);
        assert_eq!(stars.points.len(), 500);
        assert!(stars.points.iter().all(|p| p.length() >= 59.99 && p.length() <= 120.01));
    }

    #[test]
    fn wireframe_lies_on_sphere() {
        let wire = Wireframe::sphere(9.5, Vec4::ONE);
        assert!(!wire.segments.is_empty());
        assert!(wire.segments.iter().flatten().all(|p| (p.length() - 9.5).abs() < 1e-3));
    }

    #[test]
    fn attach_is_once_per_slot() {
        let mut rng = StdRng::seed_from_u64(2);
        let globe = GlobeConfig::default();
        let ambience = Ambience::from_config(&AmbienceConfig::default(), &globe, &mut rng);
        let mut scene = GlobeScene::new(&globe, ambience);
        let slot = placement(0, 4, 10.0);
        assert!(scene.attach(slot, texture(400, 200)));
        assert!(!scene.attach(slot, texture(10, 10)));
        assert_eq!(scene.len(), 1);
        let tile = scene.tile_for_slot(0).expect("tile");
        assert_eq!(tile.size, Vec2::new(3.0, 1.5));
        assert!(tile.backing_matrix().is_some());
        assert_eq!(scene.clear(), 1);
        assert!(scene.is_empty());
    }
}
