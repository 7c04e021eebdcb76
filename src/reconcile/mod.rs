//! Reconcilers: per-category modules that map entities onto scene nodes.
//!
//! DESIGN
//! ======
//! Each reconciler owns the scene nodes for the categories it declares and
//! keeps them in a private [`NodePool`]. `render` is idempotent: it creates
//! the entity's primary node on first sight and mutates it in place after
//! that. Visual sub-nodes are rebuilt on every render; the primary node (and
//! everything other subsystems hold a reference to) survives.
//!
//! A pooled node that is no longer attached to the reconciler's layer is
//! stale (someone cleared the layer, or the node was destroyed). It is
//! destroyed and recreated, never reparented.
//!
//! Off-screen entities are culled: no node is created for an entity that is
//! outside the padded visible rect, and an existing node is hidden rather
//! than destroyed.

mod ink;
mod node;
mod shape;
mod table;
mod text;


use std::collections::HashMap;

use kurbo::{Point, Rect, Vec2};

pub use ink::InkReconciler;
pub use node::NodeReconciler;
pub use shape::ShapeReconciler;
pub use table::TableReconciler;
pub use text::TextReconciler;

use crate::config::EngineConfig;
use crate::entity::{Category, Entity, EntityId, Style};
use crate::scene::{Interaction, LayerKind, NodeId, NodeKind, NodeTransform, Paint, SceneGraph};
use crate::store::EntityStore;

/// Marker guarding the select/drag bindings on a primary node.
pub(crate) const SELECT_MARKER: &str = "bind:select";
/// Marker guarding the edit-on-double-click binding.
pub(crate) const EDIT_MARKER: &str = "bind:edit";

/// Errors reported by a reconciler for one entity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("entity {id} ({category:?}) routed to a reconciler that does not draw it")]
    WrongCategory { id: EntityId, category: Category },
    #[error("entity {id} has invalid geometry: {reason}")]
    InvalidGeometry { id: EntityId, reason: String },
}

/// Everything a reconciler may touch while rendering one entity.
pub struct RenderContext<'a> {
    pub scene: &'a mut SceneGraph,
    /// Read-only board state, for entities that draw relations.
    pub store: &'a EntityStore,
    pub config: &'a EngineConfig,
    /// Padded visible world rect; `None` disables culling.
    pub visible: Option<Rect>,
}

impl RenderContext<'_> {
    /// Whether `bounds` intersects the visible rect.
    #[must_use]
    pub fn is_visible(&self, bounds: Rect) -> bool {
        self.visible.is_none_or(|v| rects_touch(v, bounds))
    }
}

pub(crate) fn rects_touch(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// A rendering module for a set of entity categories.
pub trait Reconciler {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Categories this module draws.
    fn categories(&self) -> &'static [Category];

    /// Layer its primary nodes live on.
    fn layer(&self) -> LayerKind;

    /// Create or update the nodes for `entity`. Must be idempotent.
    fn render(&mut self, entity: &Entity, cx: &mut RenderContext<'_>) -> Result<(), RenderError>;

    /// Destroy every node owned for `id`. Returns `false` if there were none.
    fn remove(&mut self, id: &EntityId, scene: &mut SceneGraph) -> bool;

    /// Destroy every node this module owns.
    fn clear(&mut self, scene: &mut SceneGraph);

    /// The primary node for `id`, if one exists.
    fn primary_node(&self, id: &EntityId) -> Option<NodeId>;

    /// Number of entities with a primary node.
    fn node_count(&self) -> usize;
}

/// Entity-to-node map private to one reconciler.
#[derive(Debug)]
pub struct NodePool {
    layer: LayerKind,
    nodes: HashMap<EntityId, NodeId>,
}

impl NodePool {
    #[must_use]
    pub fn new(layer: LayerKind) -> Self {
        Self { layer, nodes: HashMap::new() }
    }

    #[must_use]
    pub fn layer(&self) -> LayerKind {
        self.layer
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<NodeId> {
        self.nodes.get(id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Return the live primary node for `id`, creating one from `make` when
    /// missing or stale.
    pub fn ensure<F>(&mut self, id: &EntityId, scene: &mut SceneGraph, make: F) -> NodeId
    where
        F: FnOnce() -> NodeKind,
    {
        let layer_node = scene.layer_node(self.layer);
        if let Some(node) = self.get(id) {
            let attached = scene.get(node).is_some_and(|n| n.parent() == Some(layer_node));
            if attached {
                return node;
            }
            tracing::debug!(entity = %id, layer = ?self.layer, "stale scene node recreated");
            scene.destroy(node);
        }
        let node = scene.create(make());
        scene.set_owner(node, Some(id.clone()));
        scene.append_child(layer_node, node);
        self.nodes.insert(id.clone(), node);
        node
    }

    /// Cull check plus `ensure`. Returns `None` when the entity is off-screen;
    /// an existing node is hidden in that case, never created.
    pub fn begin_render<F>(&mut self, entity: &Entity, cx: &mut RenderContext<'_>, make: F) -> Option<NodeId>
    where
        F: FnOnce() -> NodeKind,
    {
        if !cx.is_visible(entity.bounds()) {
            if let Some(node) = self.get(&entity.id) {
                cx.scene.set_visible(node, false);
            }
            return None;
        }
        let node = self.ensure(&entity.id, cx.scene, make);
        cx.scene.set_visible(node, true);
        Some(node)
    }

    pub fn remove(&mut self, id: &EntityId, scene: &mut SceneGraph) -> bool {
        match self.nodes.remove(id) {
            Some(node) => {
                scene.destroy(node);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, scene: &mut SceneGraph) {
        for (_, node) in self.nodes.drain() {
            scene.destroy(node);
        }
    }
}

// --- Shared helpers for the built-in modules ---

/// Reject entities whose geometry cannot be drawn.
pub(crate) fn check_geometry(entity: &Entity) -> Result<(), RenderError> {
    let finite = [entity.x, entity.y, entity.rotation].iter().all(|v| v.is_finite());
    let bounds = entity.local_bounds();
    if !finite || !(bounds.width().is_finite() && bounds.height().is_finite()) {
        return Err(RenderError::InvalidGeometry { id: entity.id.clone(), reason: "non-finite coordinates".into() });
    }
    Ok(())
}

pub(crate) fn check_category(entity: &Entity, accepted: &[Category]) -> Result<(), RenderError> {
    if accepted.contains(&entity.category()) {
        Ok(())
    } else {
        Err(RenderError::WrongCategory { id: entity.id.clone(), category: entity.category() })
    }
}

/// Node transform placing local `(0, 0)` at the entity origin, rotated about
/// the entity's bounds centre.
pub(crate) fn entity_transform(entity: &Entity) -> NodeTransform {
    let center = entity.center();
    let pivot = Point::new(center.x - entity.x, center.y - entity.y);
    NodeTransform { translation: Vec2::new(entity.x, entity.y), ..NodeTransform::default() }
        .with_rotation(entity.rotation, pivot)
}

pub(crate) fn fill_paint(style: &Style) -> Paint {
    Paint {
        fill: Some(style.fill().to_owned()),
        stroke: Some(style.stroke().to_owned()),
        stroke_width: style.stroke_width(),
        opacity: style.opacity(),
    }
}

pub(crate) fn stroke_paint(style: &Style) -> Paint {
    Paint { fill: None, ..fill_paint(style) }
}

/// Append a child of `kind` with `paint` under `parent`.
pub(crate) fn add_child(scene: &mut SceneGraph, parent: NodeId, kind: NodeKind, paint: Paint) -> NodeId {
    let child = scene.create(kind);
    scene.set_paint(child, paint);
    scene.append_child(parent, child);
    child
}

/// Invisible pointer target covering `rect` grown by `slop`.
pub(crate) fn add_hit_region(scene: &mut SceneGraph, parent: NodeId, rect: Rect, slop: f64) -> NodeId {
    add_child(scene, parent, NodeKind::HitRegion { rect: rect.inflate(slop, slop) }, Paint::default())
}

/// Attach select/drag (and optionally edit) bindings once.
pub(crate) fn bind_entity(scene: &mut SceneGraph, node: NodeId, editable: bool) {
    scene.bind_once(node, SELECT_MARKER, &[Interaction::SelectOnClick, Interaction::DragToMove]);
    if editable {
        scene.bind_once(node, EDIT_MARKER, &[Interaction::EditOnDoubleClick]);
    }
}

/// The default module set, one per category group.
#[must_use]
pub fn builtin() -> Vec<Box<dyn Reconciler>> {
    vec![
        Box::new(ShapeReconciler::new()),
        Box::new(TextReconciler::new()),
        Box::new(InkReconciler::new()),
        Box::new(TableReconciler::new()),
        Box::new(NodeReconciler::new()),
    ]
}
