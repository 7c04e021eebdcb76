#![allow(clippy::float_cmp)]

use super::*;

const EPSILON: f64 = 1e-10;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn point_approx_eq(a: Point, b: Point) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
}

// --- Defaults ---

#[test]
fn default_is_identity() {
    let v = Viewport::default();
    assert_eq!(v, Viewport::new(0.0, 0.0, 1.0));
    assert_eq!(v.to_affine(), Affine::IDENTITY);
}

// --- Conversions ---

#[test]
fn screen_to_world_identity() {
    let v = Viewport::default();
    let p = v.screen_to_world(Point::new(100.0, 200.0));
    assert!(point_approx_eq(p, Point::new(100.0, 200.0)));
}

#[test]
fn screen_to_world_with_pan_and_zoom() {
    let v = Viewport::new(100.0, 50.0, 2.0);
    let p = v.screen_to_world(Point::new(300.0, 250.0));
    assert!(point_approx_eq(p, Point::new(100.0, 100.0)));
}

#[test]
fn world_screen_roundtrip() {
    let v = Viewport::new(-37.5, 12.25, 1.75);
    let world = Point::new(42.0, -17.0);
    let back = v.screen_to_world(v.world_to_screen(world));
    assert!(point_approx_eq(back, world));
}

#[test]
fn affine_matches_world_to_screen() {
    let v = Viewport::new(10.0, 20.0, 3.0);
    let world = Point::new(5.0, 7.0);
    assert!(point_approx_eq(v.to_affine() * world, v.world_to_screen(world)));
}

#[test]
fn screen_dist_scales_inverse() {
    let v = Viewport::new(0.0, 0.0, 4.0);
    assert_eq!(v.screen_dist_to_world(8.0), 2.0);
}

// --- Visible rect ---

#[test]
fn visible_rect_without_padding() {
    let v = Viewport::new(-100.0, 0.0, 2.0);
    let r = v.visible_world_rect(200.0, 100.0, 0.0);
    assert_eq!(r, Rect::new(50.0, 0.0, 150.0, 50.0));
}

#[test]
fn visible_rect_padding_is_screen_space() {
    let v = Viewport::new(0.0, 0.0, 2.0);
    let r = v.visible_world_rect(100.0, 100.0, 20.0);
    assert_eq!(r, Rect::new(-10.0, -10.0, 60.0, 60.0));
}

// --- Patching ---

#[test]
fn patched_keeps_absent_fields() {
    let v = Viewport::new(1.0, 2.0, 3.0);
    let next = v.patched(&ViewportPatch { x: Some(9.0), ..ViewportPatch::default() }, 0.1, 10.0);
    assert_eq!(next, Viewport::new(9.0, 2.0, 3.0));
}

#[test]
fn patched_clamps_scale() {
    let v = Viewport::default();
    assert_eq!(v.patched(&ViewportPatch::scale(50.0), 0.1, 10.0).scale, 10.0);
    assert_eq!(v.patched(&ViewportPatch::scale(0.0), 0.1, 10.0).scale, 0.1);
}

#[test]
fn patched_ignores_non_finite() {
    let v = Viewport::new(1.0, 1.0, 1.0);
    let next = v.patched(&ViewportPatch { x: Some(f64::NAN), y: Some(f64::INFINITY), scale: Some(f64::NAN) }, 0.1, 10.0);
    assert_eq!(next, v);
}

#[test]
fn zoom_about_keeps_anchor_fixed() {
    let v = Viewport::new(30.0, -20.0, 1.5);
    let anchor = Point::new(400.0, 300.0);
    let before = v.screen_to_world(anchor);
    let next = v.patched(&v.zoom_about(anchor, 2.0, 0.1, 10.0), 0.1, 10.0);
    assert!(approx_eq(next.scale, 3.0));
    assert!(point_approx_eq(next.screen_to_world(anchor), before));
}

#[test]
fn zoom_about_at_limit_keeps_anchor_fixed() {
    let v = Viewport::new(0.0, 0.0, 8.0);
    let anchor = Point::new(100.0, 100.0);
    let before = v.screen_to_world(anchor);
    let next = v.patched(&v.zoom_about(anchor, 4.0, 0.1, 10.0), 0.1, 10.0);
    assert_eq!(next.scale, 10.0);
    assert!(point_approx_eq(next.screen_to_world(anchor), before));
}

#[test]
fn clamp_tolerates_inverted_range() {
    let v = Viewport::new(0.0, 0.0, 1.0);
    assert_eq!(v.patched(&ViewportPatch::scale(9.0), 4.0, 2.0).scale, 4.0);
    assert_eq!(v.zoom_about(Point::new(0.0, 0.0), 0.01, 4.0, 2.0).scale, Some(2.0));
    assert_eq!(clamp_scale(f64::NAN, 0.5, 3.0), 0.5);
    assert_eq!(scale_range(0.0, f64::INFINITY), (DEFAULT_MIN_SCALE, DEFAULT_MAX_SCALE));
}

#[test]
fn pan_by_offsets_position() {
    let v = Viewport::new(5.0, 5.0, 2.0);
    assert_eq!(v.pan_by(10.0, -5.0), ViewportPatch::position(15.0, 0.0));
}

#[test]
fn viewport_tolerates_partial_json() {
    let v: Viewport = serde_json::from_str(r#"{"x": 4}"#).unwrap();
    assert_eq!(v, Viewport::new(4.0, 0.0, 1.0));
}
