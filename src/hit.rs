#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use kurbo::{Affine, Line, ParamCurveNearest, Point, Rect};

use crate::consts::{HANDLE_RADIUS_PX, HIT_REGION_SLOP, ROTATE_HANDLE_OFFSET_PX};
use crate::entity::{Entity, EntityId, Shape};
use crate::store::EntityStore;

/// Which part of the transform widget was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    /// Inside the selection bounds.
    Body,
    Resize(ResizeAnchor),
    Rotate,
}

/// Anchor position for resize handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeAnchor {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl ResizeAnchor {
    pub const ALL: [ResizeAnchor; 8] = [
        ResizeAnchor::N,
        ResizeAnchor::Ne,
        ResizeAnchor::E,
        ResizeAnchor::Se,
        ResizeAnchor::S,
        ResizeAnchor::Sw,
        ResizeAnchor::W,
        ResizeAnchor::Nw,
    ];

    /// Horizontal direction of the anchor: -1 west, 0 centre, 1 east.
    #[must_use]
    pub fn x_sign(self) -> f64 {
        match self {
            Self::Nw | Self::W | Self::Sw => -1.0,
            Self::N | Self::S => 0.0,
            Self::Ne | Self::E | Self::Se => 1.0,
        }
    }

    /// Vertical direction of the anchor: -1 north, 0 centre, 1 south.
    #[must_use]
    pub fn y_sign(self) -> f64 {
        match self {
            Self::Nw | Self::N | Self::Ne => -1.0,
            Self::W | Self::E => 0.0,
            Self::Sw | Self::S | Self::Se => 1.0,
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::N => Self::S,
            Self::Ne => Self::Sw,
            Self::E => Self::W,
            Self::Se => Self::Nw,
            Self::S => Self::N,
            Self::Sw => Self::Ne,
            Self::W => Self::E,
            Self::Nw => Self::Se,
        }
    }

    /// Whether dragging this anchor changes both axes.
    #[must_use]
    pub fn is_corner(self) -> bool {
        self.x_sign() != 0.0 && self.y_sign() != 0.0
    }

    /// Position of this anchor on `rect`.
    #[must_use]
    pub fn point_on(self, rect: Rect) -> Point {
        let c = rect.center();
        Point::new(
            c.x + self.x_sign() * rect.width() / 2.0,
            c.y + self.y_sign() * rect.height() / 2.0,
        )
    }
}

/// World-space position of the rotate handle for `bounds` at zoom `scale`.
#[must_use]
pub fn rotate_handle_point(bounds: Rect, scale: f64) -> Point {
    Point::new(bounds.center().x, bounds.y0 - ROTATE_HANDLE_OFFSET_PX / scale)
}

/// All handle positions for `bounds`, rotate first.
#[must_use]
pub fn handle_points(bounds: Rect, scale: f64) -> Vec<(Handle, Point)> {
    let mut out = Vec::with_capacity(9);
    out.push((Handle::Rotate, rotate_handle_point(bounds, scale)));
    out.extend(ResizeAnchor::ALL.iter().map(|a| (Handle::Resize(*a), a.point_on(bounds))));
    out
}

/// Which part of the transform widget around `bounds` is under `world_pt`.
///
/// Handles win over the body; handle radius is constant in screen pixels.
#[must_use]
pub fn hit_handle(world_pt: Point, bounds: Rect, scale: f64) -> Option<Handle> {
    let radius = HANDLE_RADIUS_PX / scale;
    let handle = handle_points(bounds, scale)
        .into_iter()
        .find(|(_, p)| p.distance(world_pt) <= radius)
        .map(|(h, _)| h);
    handle.or_else(|| bounds.contains(world_pt).then_some(Handle::Body))
}

/// Topmost entity under `world_pt`, honouring rotation.
///
/// `scale` converts the hit slop from screen pixels to world units.
#[must_use]
pub fn hit_entity(store: &EntityStore, world_pt: Point, scale: f64) -> Option<EntityId> {
    let slop = HIT_REGION_SLOP / scale;
    store
        .z_order()
        .iter()
        .rev()
        .filter_map(|id| store.get(id))
        .find(|e| entity_contains(e, world_pt, slop))
        .map(|e| e.id.clone())
}

/// Whether `world_pt` lies on `entity`, within `slop` world units.
#[must_use]
pub fn entity_contains(entity: &Entity, world_pt: Point, slop: f64) -> bool {
    let local = if entity.rotation == 0.0 {
        world_pt
    } else {
        Affine::rotate_about(-entity.rotation.to_radians(), entity.center()) * world_pt
    };
    match &entity.shape {
        Shape::Circle { radius } => local.distance(Point::new(entity.x, entity.y)) <= radius.abs() + slop,
        Shape::Ink { points } => {
            let reach = slop + entity.style.stroke_width() / 2.0;
            let rel = Point::new(local.x - entity.x, local.y - entity.y);
            match points.as_slice() {
                [] => false,
                [only] => Point::new(only.x, only.y).distance(rel) <= reach,
                _ => points.windows(2).any(|w| {
                    let seg = Line::new((w[0].x, w[0].y), (w[1].x, w[1].y));
                    seg.nearest(rel, 1e-6).distance_sq <= reach * reach
                }),
            }
        }
        _ => entity.local_bounds().inflate(slop, slop).contains(local),
    }
}
