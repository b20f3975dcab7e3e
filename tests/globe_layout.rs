use glam::{Vec2, Vec3};
use memory_globe::layout::{fibonacci_point, layout, placement};
use memory_globe::scene::tile_size;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn fibonacci_points_sit_on_the_sphere_and_are_distinct() {
    let radius = 10.0;
    for count in 1..=200 {
        let points: Vec<Vec3> = (0..count).map(|i| fibonacci_point(i, count, radius)).collect();
        for (i, point) in points.iter().enumerate() {
            assert!(
                (point.length() - radius).abs() < 1e-3,
                "point {i} of {count} has norm {}",
                point.length()
            );
            for other in &points[i + 1..] {
                assert!(point.distance(*other) > 1e-4, "duplicate point for count {count}");
            }
        }
    }
}

#[test]
fn positions_depend_only_on_index_and_count() {
    let mut first = StdRng::seed_from_u64(1);
    let mut second = StdRng::seed_from_u64(99);
    let a = layout(40, 10.0, 0.3, &mut first);
    let b = layout(40, 10.0, 0.3, &mut second);
    for (left, right) in a.iter().zip(&b) {
        assert_eq!(left.index, right.index);
        assert_eq!(left.position, right.position);
        assert_eq!(left.position, fibonacci_point(left.index, 40, 10.0));
    }
}

#[test]
fn first_and_last_points_approach_the_poles() {
    let count = 50;
    let first = fibonacci_point(0, count, 10.0);
    let last = fibonacci_point(count - 1, count, 10.0);
    assert!((first.z - 9.8).abs() < 1e-4);
    assert!((last.z + 9.8).abs() < 1e-4);
}

#[test]
fn every_tile_faces_the_centre() {
    let mut rng = StdRng::seed_from_u64(7);
    for slot in layout(30, 10.0, 0.25, &mut rng) {
        let normal = slot.facing * Vec3::Z;
        let to_centre = (-slot.position).normalize();
        assert!(normal.dot(to_centre) > 0.999, "slot {} looks away from the origin", slot.index);
        assert!(slot.roll.abs() <= 0.25 + 1e-6);
        assert!(slot.outward().dot(slot.position.normalize()) > 0.999);
    }
}

#[test]
fn placement_centres_the_quad_on_its_slot() {
    let slot = placement(3, 12, 10.0);
    let model = slot.model_matrix(Vec2::new(1.6, 0.9));
    let centre = model.transform_point3(Vec3::ZERO);
    assert!(centre.distance(slot.position) < 1e-4);
}

#[test]
fn tile_size_keeps_aspect_within_extent() {
    let wide = tile_size(2.0, 3.0);
    assert!((wide.x - 3.0).abs() < 1e-6 && (wide.y - 1.5).abs() < 1e-6);
    let tall = tile_size(0.5, 3.0);
    assert!((tall.y - 3.0).abs() < 1e-6 && (tall.x - 1.5).abs() < 1e-6);
    let unknown = tile_size(f32::NAN, 3.0);
    assert!((unknown.x / unknown.y - 16.0 / 9.0).abs() < 1e-4);
}
