use super::*;
use crate::entity::InkPoint;

fn bounds() -> Rect {
    Rect::new(0.0, 0.0, 100.0, 50.0)
}

// =============================================================
// ResizeAnchor
// =============================================================

#[test]
fn anchors_sit_on_bounds() {
    let b = bounds();
    assert_eq!(ResizeAnchor::Nw.point_on(b), Point::new(0.0, 0.0));
    assert_eq!(ResizeAnchor::E.point_on(b), Point::new(100.0, 25.0));
    assert_eq!(ResizeAnchor::S.point_on(b), Point::new(50.0, 50.0));
}

#[test]
fn opposite_is_involution() {
    for a in ResizeAnchor::ALL {
        assert_eq!(a.opposite().opposite(), a);
        assert_ne!(a.opposite(), a);
    }
}

#[test]
fn corners_change_both_axes() {
    let corners: Vec<ResizeAnchor> = ResizeAnchor::ALL.into_iter().filter(|a| a.is_corner()).collect();
    assert_eq!(corners, vec![ResizeAnchor::Ne, ResizeAnchor::Se, ResizeAnchor::Sw, ResizeAnchor::Nw]);
}

// =============================================================
// Handles
// =============================================================

#[test]
fn hit_handle_prefers_handles_over_body() {
    assert_eq!(hit_handle(Point::new(1.0, 1.0), bounds(), 1.0), Some(Handle::Resize(ResizeAnchor::Nw)));
    assert_eq!(hit_handle(Point::new(50.0, 25.0), bounds(), 1.0), Some(Handle::Body));
    assert_eq!(hit_handle(Point::new(500.0, 25.0), bounds(), 1.0), None);
}

#[test]
fn rotate_handle_offset_is_screen_constant() {
    let at_1 = rotate_handle_point(bounds(), 1.0);
    let at_2 = rotate_handle_point(bounds(), 2.0);
    assert_eq!(at_1.y, -ROTATE_HANDLE_OFFSET_PX);
    assert_eq!(at_2.y, -ROTATE_HANDLE_OFFSET_PX / 2.0);
    assert_eq!(hit_handle(at_2, bounds(), 2.0), Some(Handle::Rotate));
}

#[test]
fn handle_points_lists_nine() {
    assert_eq!(handle_points(bounds(), 1.0).len(), 9);
}

// =============================================================
// Entities
// =============================================================

#[test]
fn hit_entity_returns_topmost() {
    let mut store = EntityStore::default();
    store.upsert(Entity::rect("below", 0.0, 0.0, 100.0, 100.0));
    store.upsert(Entity::rect("above", 50.0, 50.0, 100.0, 100.0));
    assert_eq!(hit_entity(&store, Point::new(75.0, 75.0), 1.0), Some(EntityId::from("above")));
    assert_eq!(hit_entity(&store, Point::new(10.0, 10.0), 1.0), Some(EntityId::from("below")));
    assert_eq!(hit_entity(&store, Point::new(500.0, 500.0), 1.0), None);
}

#[test]
fn rotated_rect_uses_local_frame() {
    let e = Entity::rect("r", 0.0, 0.0, 100.0, 10.0).with_rotation(90.0);
    // Rotated about (50, 5): now spans x 45..55, y -45..55.
    assert!(entity_contains(&e, Point::new(50.0, -40.0), 0.0));
    assert!(!entity_contains(&e, Point::new(5.0, 5.0), 0.0));
}

#[test]
fn circle_hit_is_radial() {
    let e = Entity::circle("c", 0.0, 0.0, 10.0);
    assert!(entity_contains(&e, Point::new(6.0, 6.0), 0.0));
    assert!(!entity_contains(&e, Point::new(9.0, 9.0), 0.0));
}

#[test]
fn ink_hit_follows_stroke() {
    let e = Entity::ink("i", 10.0, 10.0, vec![InkPoint::new(0.0, 0.0, 0.5), InkPoint::new(100.0, 0.0, 0.5)]);
    assert!(entity_contains(&e, Point::new(60.0, 12.0), 3.0));
    assert!(!entity_contains(&e, Point::new(60.0, 40.0), 3.0));
}
