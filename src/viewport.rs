#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;

use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE};

/// Pan/zoom state for the infinite canvas.
///
/// `x` / `y` are the screen-space offset of the world origin in CSS pixels.
/// `scale` is the zoom factor (1.0 = no zoom).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, scale: 1.0 }
    }
}

impl Viewport {
    #[must_use]
    pub fn new(x: f64, y: f64, scale: f64) -> Self {
        Self { x, y, scale }
    }

    /// Convert a screen-space point (CSS pixels) to world coordinates.
    #[must_use]
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new((screen.x - self.x) / self.scale, (screen.y - self.y) / self.scale)
    }

    /// Convert a world-space point to screen coordinates (CSS pixels).
    #[must_use]
    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new(world.x * self.scale + self.x, world.y * self.scale + self.y)
    }

    /// Convert a screen-space distance (pixels) to world-space distance.
    #[must_use]
    pub fn screen_dist_to_world(&self, screen_dist: f64) -> f64 {
        screen_dist / self.scale
    }

    /// World-to-screen affine applied to the scene root.
    #[must_use]
    pub fn to_affine(&self) -> Affine {
        Affine::translate((self.x, self.y)) * Affine::scale(self.scale)
    }

    /// World-space rectangle covered by a `width` × `height` surface, grown by
    /// `padding_px` screen pixels on every side.
    #[must_use]
    pub fn visible_world_rect(&self, width: f64, height: f64, padding_px: f64) -> Rect {
        let top_left = self.screen_to_world(Point::new(-padding_px, -padding_px));
        let bottom_right = self.screen_to_world(Point::new(width + padding_px, height + padding_px));
        Rect::from_points(top_left, bottom_right)
    }

    /// Merge a patch into this viewport, clamping scale to `[min_scale, max_scale]`.
    ///
    /// Non-finite patch values are ignored.
    #[must_use]
    pub fn patched(&self, patch: &ViewportPatch, min_scale: f64, max_scale: f64) -> Viewport {
        let mut next = *self;
        if let Some(x) = patch.x.filter(|v| v.is_finite()) {
            next.x = x;
        }
        if let Some(y) = patch.y.filter(|v| v.is_finite()) {
            next.y = y;
        }
        if let Some(scale) = patch.scale.filter(|v| v.is_finite()) {
            next.scale = scale;
        }
        next.scale = clamp_scale(next.scale, min_scale, max_scale);
        next
    }

    /// Patch that zooms by `factor` while keeping `anchor` (screen space) fixed.
    ///
    /// The resulting scale is clamped, and the offset is derived from the
    /// clamped scale so the anchor stays put even at the zoom limits.
    #[must_use]
    pub fn zoom_about(&self, anchor: Point, factor: f64, min_scale: f64, max_scale: f64) -> ViewportPatch {
        let world = self.screen_to_world(anchor);
        let scale = clamp_scale(self.scale * factor, min_scale, max_scale);
        ViewportPatch {
            x: Some(anchor.x - world.x * scale),
            y: Some(anchor.y - world.y * scale),
            scale: Some(scale),
        }
    }

    /// Patch that pans by a screen-space delta.
    #[must_use]
    pub fn pan_by(&self, dx: f64, dy: f64) -> ViewportPatch {
        ViewportPatch::position(self.x + dx, self.y + dy)
    }
}

/// Partial viewport update; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl ViewportPatch {
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), scale: None }
    }

    #[must_use]
    pub fn scale(scale: f64) -> Self {
        Self { scale: Some(scale), ..Self::default() }
    }
}

impl From<Viewport> for ViewportPatch {
    fn from(v: Viewport) -> Self {
        Self { x: Some(v.x), y: Some(v.y), scale: Some(v.scale) }
    }
}

/// Normalize a zoom range. A non-finite or non-positive bound falls back to
/// its default; an inverted range is swapped.
#[must_use]
pub fn scale_range(min_scale: f64, max_scale: f64) -> (f64, f64) {
    let lo = if min_scale.is_finite() && min_scale > 0.0 { min_scale } else { DEFAULT_MIN_SCALE };
    let hi = if max_scale.is_finite() && max_scale > 0.0 { max_scale } else { DEFAULT_MAX_SCALE };
    if lo <= hi { (lo, hi) } else { (hi, lo) }
}

/// Clamp `scale` into the normalized `[min_scale, max_scale]` range.
#[must_use]
pub fn clamp_scale(scale: f64, min_scale: f64, max_scale: f64) -> f64 {
    let (lo, hi) = scale_range(min_scale, max_scale);
    scale.max(lo).min(hi)
}
