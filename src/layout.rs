//! Fibonacci-sphere placement of globe tiles.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use rand::Rng;

/// Position and orientation of one globe slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub index: usize,
    pub position: Vec3,
    /// Rotates the tile's local +Z onto the direction of the sphere centre.
    pub facing: Quat,
    /// In-plane roll around the facing axis, purely cosmetic.
    pub roll: f32,
}

impl Placement {
    pub fn rotation(&self) -> Quat {
        self.facing * Quat::from_rotation_z(self.roll)
    }

    /// Tile transform for a unit quad in the local XY plane scaled to `size`.
    pub fn model_matrix(&self, size: Vec2) -> Mat4 {
        Mat4::from_scale_rotation_translation(size.extend(1.0), self.rotation(), self.position)
    }

    /// Unit vector from the sphere centre through this slot.
    pub fn outward(&self) -> Vec3 {
        self.position.normalize_or_zero()
    }
}

/// Deterministic point `index` of `count` on a sphere of `radius`.
pub fn fibonacci_point(index: usize, count: usize, radius: f32) -> Vec3 {
    let n = count.max(1) as f64;
    let i = index as f64 + 0.5;
    let phi = (1.0 - 2.0 * i / n).clamp(-1.0, 1.0).acos();
    let theta = std::f64::consts::PI * (1.0 + 5.0_f64.sqrt()) * i;
    let r = radius as f64;
    Vec3::new(
        (r * theta.cos() * phi.sin()) as f32,
        (r * theta.sin() * phi.sin()) as f32,
        (r * phi.cos()) as f32,
    )
}

/// Rotation taking local +Z toward the origin while keeping local +Y as close
/// to world up as the position allows.
pub fn facing_origin(position: Vec3) -> Quat {
    let forward = (-position).normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let reference = if forward.cross(Vec3::Y).length_squared() < 1e-6 { Vec3::X } else { Vec3::Y };
    let right = reference.cross(forward).normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

pub fn placement(index: usize, count: usize, radius: f32) -> Placement {
    let position = fibonacci_point(index, count, radius);
    Placement { index, position, facing: facing_origin(position), roll: 0.0 }
}

/// All `count` placements with a random roll in `[-max_roll, max_roll]`.
pub fn layout<R: Rng + ?Sized>(count: usize, radius: f32, max_roll: f32, rng: &mut R) -> Vec<Placement> {
    let max_roll = max_roll.abs();
    (0..count)
        .map(|index| {
            let mut slot = placement(index, count, radius);
            if max_roll > 0.0 {
                slot.roll = rng.gen_range(-max_roll..=max_roll);
            }
            slot
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn single_point_sits_on_equator() {
        let p = fibonacci_point(0, 1, 10.0);
        assert!(p.z.abs() < 1e-4);
        assert!((p.length() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn facing_points_local_z_at_centre() {
        for index in 0..32 {
            let slot = placement(index, 32, 10.0);
            let forward = slot.facing * Vec3::Z;
            assert!(forward.dot(-slot.outward()) > 0.999, "slot {index} faces {forward:?}");
        }
    }

    #[test]
    fn facing_handles_vertical_axis() {
        let q = facing_origin(Vec3::new(0.0, 5.0, 0.0));
        assert!((q * Vec3::Z).dot(Vec3::NEG_Y) > 0.999);
        assert!(q.is_finite());
    }

    #[test]
    fn roll_is_bounded_and_positions_unchanged() {
        let mut rng = StdRng::seed_from_u64(7);
        let slots = layout(40, 10.0, 0.25, &mut rng);
        for slot in &slots {
            assert!(slot.roll.abs() <= 0.25);
            assert_eq!(slot.position, fibonacci_point(slot.index, 40, 10.0));
        }
    }

    #[test]
    fn model_matrix_places_quad_at_slot() {
        let slot = placement(3, 10, 10.0);
        let model = slot.model_matrix(Vec2::new(3.0, 2.0));
        let centre = model.transform_point3(Vec3::ZERO);
        assert!(centre.distance(slot.position) < 1e-4);
    }
}
