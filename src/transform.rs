//! Transform controller: interactive move/resize/rotate of the selection.
//!
//! DESIGN
//! ======
//! ```text
//! Idle ──attach(non-empty)──▶ Attached ──transform_start──▶ Transforming
//!  ▲                             │  ▲                            │
//!  └────attach(empty)/detach─────┘  └──transform_end / cancel────┘
//! ```
//!
//! While transforming, only scene nodes move: each selected entity's primary
//! node gets a preview transform computed from the captured pre-transform
//! geometry. The store is untouched until `transform_end`, which writes one
//! patch per entity inside a single undoable batch. `transform_cancel` puts
//! the captured node transforms back and never touches the store.
//!
//! The handle widget (selection outline plus nine handles) lives on the
//! overlay layer and is redrawn around the preview bounds on every step.

#[cfg(test)]
#[path = "transform_test.rs"]
mod transform_test;

use kurbo::{Affine, Point, Rect, Vec2};

use crate::consts::HANDLE_RADIUS_PX;
use crate::document::Document;
use crate::entity::{Entity, EntityId, EntityPatch, Shape};
use crate::hit::{Handle, handle_points};
use crate::reconcile::entity_transform;
use crate::scene::{LayerKind, NodeId, NodeKind, NodeTransform, Paint, SceneGraph};
use crate::store::EntityStore;

const HANDLE_FILL: &str = "#FFFFFF";
const HANDLE_STROKE: &str = "#2F80ED";

/// Rigid-plus-scale transform applied to the whole selection.
///
/// Maps `p` to `origin + R(S(p - origin)) + translation`, where `S` scales
/// by `scale` and `R` rotates clockwise by `rotation` degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupTransform {
    pub translation: Vec2,
    pub scale: Vec2,
    pub rotation: f64,
    pub origin: Point,
}

impl Default for GroupTransform {
    fn default() -> Self {
        Self { translation: Vec2::ZERO, scale: Vec2::new(1.0, 1.0), rotation: 0.0, origin: Point::ORIGIN }
    }
}

impl GroupTransform {
    #[must_use]
    pub fn translate(dx: f64, dy: f64) -> Self {
        Self { translation: Vec2::new(dx, dy), ..Self::default() }
    }

    #[must_use]
    pub fn scale_about(sx: f64, sy: f64, origin: Point) -> Self {
        Self { scale: Vec2::new(sx, sy), origin, ..Self::default() }
    }

    #[must_use]
    pub fn rotate_about(degrees: f64, origin: Point) -> Self {
        Self { rotation: degrees, origin, ..Self::default() }
    }

    #[must_use]
    pub fn affine(&self) -> Affine {
        Affine::translate(self.translation + self.origin.to_vec2())
            * Affine::rotate(self.rotation.to_radians())
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
            * Affine::translate(-self.origin.to_vec2())
    }

    fn scales(&self) -> bool {
        self.scale != Vec2::new(1.0, 1.0)
    }

    fn rotates(&self) -> bool {
        self.rotation != 0.0
    }

    fn translates(&self) -> bool {
        self.translation != Vec2::ZERO
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        !self.scales() && !self.rotates() && !self.translates()
    }

    /// History label describing what this transform does.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match (self.translates(), self.scales(), self.rotates()) {
            (_, false, false) => "move",
            (false, true, false) => "resize",
            (false, false, true) => "rotate",
            _ => "transform",
        }
    }

    /// Patch that puts `entity` where this transform sends it.
    ///
    /// Pure translations add the offset directly. Otherwise the bounds centre
    /// is mapped through the transform, sizes scale by the absolute factors
    /// (never below `min_size`), rotation accumulates, and ink points scale
    /// about the stroke's own centre.
    #[must_use]
    pub fn patch_for(&self, entity: &Entity, min_size: f64) -> EntityPatch {
        if !self.scales() && !self.rotates() {
            return EntityPatch::position(entity.x + self.translation.x, entity.y + self.translation.y);
        }
        let center = self.affine() * entity.center();
        let (sx, sy) = (self.scale.x.abs(), self.scale.y.abs());
        let mut patch = EntityPatch::default();
        if self.rotates() {
            patch.rotation = Some(entity.rotation + self.rotation);
        }
        match &entity.shape {
            Shape::Circle { radius } => {
                let r = (radius.abs() * (sx + sy) / 2.0).max(min_size / 2.0);
                patch.radius = Some(r);
                patch.x = Some(center.x);
                patch.y = Some(center.y);
            }
            Shape::Ink { points } => {
                let local = entity.center() - Point::new(entity.x, entity.y);
                let scaled = points
                    .iter()
                    .map(|p| {
                        let mut q = *p;
                        q.x = local.x + (p.x - local.x) * sx;
                        q.y = local.y + (p.y - local.y) * sy;
                        q
                    })
                    .collect();
                patch.points = Some(scaled);
                patch.x = Some(center.x - local.x);
                patch.y = Some(center.y - local.y);
            }
            #[allow(clippy::cast_precision_loss)]
            Shape::Table { rows, cols, cell_width, cell_height, .. } => {
                let cw = (cell_width * sx).max(min_size);
                let ch = (cell_height * sy).max(min_size);
                patch.cell_width = Some(cw);
                patch.cell_height = Some(ch);
                patch.x = Some(center.x - *cols as f64 * cw / 2.0);
                patch.y = Some(center.y - *rows as f64 * ch / 2.0);
            }
            shape => {
                let (w, h) = shape.box_size().unwrap_or((0.0, 0.0));
                let w = (w.abs() * sx).max(min_size);
                let h = (h.abs() * sy).max(min_size);
                patch.width = Some(w);
                patch.height = Some(h);
                patch.x = Some(center.x - w / 2.0);
                patch.y = Some(center.y - h / 2.0);
            }
        }
        patch
    }
}

/// Node transform previewing `entity` moved to `patched`: the node keeps its
/// sub-nodes and is scaled by the size ratio.
fn preview_transform(entity: &Entity, patched: &Entity) -> NodeTransform {
    let before = entity.local_bounds();
    let after = patched.local_bounds();
    let ratio = |a: f64, b: f64| if a.abs() > f64::EPSILON { b / a } else { 1.0 };
    NodeTransform {
        scale: Vec2::new(ratio(before.width(), after.width()), ratio(before.height(), after.height())),
        ..entity_transform(patched)
    }
}

fn preview(entity: &Entity, transform: &GroupTransform, min_size: f64) -> Entity {
    let mut next = entity.clone();
    next.apply_patch(&transform.patch_for(entity, min_size));
    next
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Attached,
    Transforming,
}

#[derive(Debug, Clone)]
struct Captured {
    entity: Entity,
    node: Option<(NodeId, NodeTransform)>,
}

/// See the module docs.
#[derive(Debug)]
pub struct TransformController {
    state: ControllerState,
    targets: Vec<EntityId>,
    captured: Vec<Captured>,
    current: GroupTransform,
    handles: Option<NodeId>,
    min_size: f64,
    view_scale: f64,
}

impl TransformController {
    #[must_use]
    pub fn new(min_size: f64) -> Self {
        Self {
            state: ControllerState::Idle,
            targets: Vec::new(),
            captured: Vec::new(),
            current: GroupTransform::default(),
            handles: None,
            min_size,
            view_scale: 1.0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Entities the handles are bound to, back to front.
    #[must_use]
    pub fn targets(&self) -> &[EntityId] {
        &self.targets
    }

    /// Root of the handle widget on the overlay layer.
    #[must_use]
    pub fn handles_node(&self) -> Option<NodeId> {
        self.handles
    }

    /// Union of the targets' bounds (preview bounds while transforming).
    #[must_use]
    pub fn bounds(&self, store: &EntityStore) -> Option<Rect> {
        if self.state == ControllerState::Transforming {
            return union(self.captured.iter().map(|c| preview(&c.entity, &self.current, self.min_size).bounds()));
        }
        union(self.targets.iter().filter_map(|id| store.get(id)).map(Entity::bounds))
    }

    /// Bind the handles to the store's current selection. An empty selection
    /// detaches. Ignored mid-transform.
    pub fn attach(&mut self, store: &EntityStore, scene: &mut SceneGraph) -> ControllerState {
        if self.state == ControllerState::Transforming {
            tracing::debug!("selection changed mid-transform; handles keep their targets");
            return self.state;
        }
        self.view_scale = store.viewport().scale;
        self.targets = store.z_order().iter().filter(|id| store.is_selected(id)).cloned().collect();
        if self.targets.is_empty() {
            self.detach(scene);
            return self.state;
        }
        self.state = ControllerState::Attached;
        self.redraw_handles(store, scene);
        self.state
    }

    /// Drop the handles and return to idle.
    pub fn detach(&mut self, scene: &mut SceneGraph) {
        if let Some(node) = self.handles.take() {
            scene.destroy(node);
        }
        self.targets.clear();
        self.captured.clear();
        self.current = GroupTransform::default();
        self.state = ControllerState::Idle;
    }

    /// Capture pre-transform geometry. `primary` resolves an entity to its
    /// rendered node, if any.
    pub fn transform_start<F>(&mut self, store: &EntityStore, scene: &SceneGraph, primary: F) -> bool
    where
        F: Fn(&EntityId) -> Option<NodeId>,
    {
        if self.state != ControllerState::Attached {
            return false;
        }
        self.captured = self
            .targets
            .iter()
            .filter_map(|id| store.get(id))
            .map(|entity| Captured {
                entity: entity.clone(),
                node: primary(&entity.id).and_then(|n| scene.get(n).map(|node| (n, node.transform))),
            })
            .collect();
        if self.captured.is_empty() {
            return false;
        }
        self.current = GroupTransform::default();
        self.state = ControllerState::Transforming;
        true
    }

    /// Preview `transform` on the scene nodes only.
    pub fn transform(&mut self, transform: GroupTransform, store: &EntityStore, scene: &mut SceneGraph) -> bool {
        if self.state != ControllerState::Transforming {
            return false;
        }
        self.current = transform;
        for c in &self.captured {
            if let Some((node, _)) = c.node {
                let patched = preview(&c.entity, &transform, self.min_size);
                scene.set_transform(node, preview_transform(&c.entity, &patched));
            }
        }
        self.redraw_handles(store, scene);
        true
    }

    /// Commit the current transform to the store as one undoable step.
    /// Returns `true` if the store changed.
    pub fn transform_end(&mut self, doc: &mut Document, scene: &mut SceneGraph) -> bool {
        if self.state != ControllerState::Transforming {
            return false;
        }
        let transform = self.current;
        let captured = std::mem::take(&mut self.captured);
        self.current = GroupTransform::default();
        self.state = ControllerState::Attached;
        if transform.is_identity() {
            restore(&captured, scene);
            return false;
        }
        let min_size = self.min_size;
        let changed = doc.with_undo(transform.label(), |d| {
            captured
                .iter()
                .map(|c| d.update(&c.entity.id, transform.patch_for(&c.entity, min_size)))
                .fold(false, |acc, changed| acc | changed)
        });
        tracing::debug!(label = transform.label(), entities = captured.len(), changed, "transform committed");
        self.redraw_handles(doc.store(), scene);
        changed
    }

    /// Abort the transform, restoring node transforms. The store is untouched.
    pub fn transform_cancel(&mut self, store: &EntityStore, scene: &mut SceneGraph) -> bool {
        if self.state != ControllerState::Transforming {
            return false;
        }
        restore(&self.captured, scene);
        self.captured.clear();
        self.current = GroupTransform::default();
        self.state = ControllerState::Attached;
        self.redraw_handles(store, scene);
        true
    }

    fn redraw_handles(&mut self, store: &EntityStore, scene: &mut SceneGraph) {
        let Some(bounds) = self.bounds(store) else {
            if let Some(node) = self.handles.take() {
                scene.destroy(node);
            }
            return;
        };
        let overlay = scene.layer_node(LayerKind::Overlay);
        let group = match self.handles {
            Some(node) if scene.get(node).is_some_and(|n| n.parent() == Some(overlay)) => node,
            stale => {
                if let Some(node) = stale {
                    scene.destroy(node);
                }
                let node = scene.create(NodeKind::Group);
                scene.append_child(overlay, node);
                node
            }
        };
        self.handles = Some(group);
        scene.clear_children(group);

        let outline_paint = Paint {
            fill: None,
            stroke: Some(HANDLE_STROKE.to_owned()),
            stroke_width: 1.0 / self.view_scale,
            opacity: 1.0,
        };
        let outline = scene.create(NodeKind::Rect { width: bounds.width(), height: bounds.height(), corner_radius: 0.0 });
        scene.set_transform(outline, NodeTransform::translate(bounds.x0, bounds.y0));
        scene.set_paint(outline, outline_paint.clone());
        scene.append_child(group, outline);

        let r = HANDLE_RADIUS_PX / self.view_scale;
        for (handle, at) in handle_points(bounds, self.view_scale) {
            let node = scene.create(NodeKind::Ellipse { width: 2.0 * r, height: 2.0 * r });
            scene.set_transform(node, NodeTransform::translate(at.x - r, at.y - r));
            let fill = match handle {
                Handle::Rotate => HANDLE_STROKE,
                Handle::Resize(_) | Handle::Body => HANDLE_FILL,
            };
            scene.set_paint(node, Paint { fill: Some(fill.to_owned()), ..outline_paint.clone() });
            scene.append_child(group, node);
        }
    }
}

fn restore(captured: &[Captured], scene: &mut SceneGraph) {
    for c in captured {
        if let Some((node, original)) = c.node {
            scene.set_transform(node, original);
        }
    }
}

fn union<I: Iterator<Item = Rect>>(mut rects: I) -> Option<Rect> {
    let first = rects.next()?;
    Some(rects.fold(first, |acc, r| acc.union(r)))
}

/// Converts a pointer drag on a transform handle into [`GroupTransform`]s.
#[derive(Debug, Clone, Copy)]
pub struct TransformGesture {
    handle: Handle,
    start: Point,
    bounds: Rect,
    keep_ratio: bool,
    min_size: f64,
}

impl TransformGesture {
    /// Start a gesture on `handle` at `start` (world space) over the
    /// selection `bounds`.
    #[must_use]
    pub fn new(handle: Handle, start: Point, bounds: Rect, min_size: f64) -> Self {
        Self { handle, start, bounds, keep_ratio: false, min_size }
    }

    /// Lock the aspect ratio on corner drags.
    #[must_use]
    pub fn keep_ratio(mut self, keep: bool) -> Self {
        self.keep_ratio = keep;
        self
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Transform for the pointer now at `world`.
    #[must_use]
    pub fn update(&self, world: Point) -> GroupTransform {
        match self.handle {
            Handle::Body => GroupTransform::translate(world.x - self.start.x, world.y - self.start.y),
            Handle::Rotate => {
                let c = self.bounds.center();
                let from = (self.start - c).atan2();
                let to = (world - c).atan2();
                GroupTransform::rotate_about((to - from).to_degrees(), c)
            }
            Handle::Resize(anchor) => {
                let origin = anchor.opposite().point_on(self.bounds);
                let axis = |sign: f64, extent: f64, pointer: f64, origin: f64| {
                    if sign == 0.0 || extent <= f64::EPSILON {
                        return 1.0;
                    }
                    ((pointer - origin) * sign).max(self.min_size) / extent
                };
                let mut sx = axis(anchor.x_sign(), self.bounds.width(), world.x, origin.x);
                let mut sy = axis(anchor.y_sign(), self.bounds.height(), world.y, origin.y);
                if self.keep_ratio && anchor.is_corner() {
                    let s = sx.max(sy);
                    sx = s;
                    sy = s;
                }
                GroupTransform::scale_about(sx, sy, origin)
            }
        }
    }
}
