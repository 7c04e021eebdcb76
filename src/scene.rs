//! Retained-mode scene graph.
//!
//! DESIGN
//! ======
//! Nodes live in a slot map and are addressed by [`NodeId`]; a destroyed id
//! never aliases a later node. The root carries the view transform (world to
//! screen) and owns five layer nodes in fixed compositing order:
//!
//! ```text
//! root ── Background ── Content ── Ink ── Preview ── Overlay
//! ```
//!
//! Nodes are persistent across frames. Reconcilers create a node the first
//! time they see an entity and mutate it in place afterwards; tools only reach
//! the preview layers through opaque [`LayerHandle`]s held by the engine.
//!
//! The view transform may only be written by whoever holds a
//! [`ViewCapability`]. The crate mints exactly one, owned by the viewport
//! synchronizer.
//!
//! Every structural or visual mutation marks its layer for repaint; the
//! engine hands the set to its presenter after each frame.

#[cfg(test)]
#[path = "scene_test.rs"]
mod scene_test;

use std::collections::BTreeSet;

use kurbo::{Affine, Point, Rect, Vec2};
use slotmap::SlotMap;

use crate::entity::EntityId;

slotmap::new_key_type! {
    /// Identifies one scene-graph node.
    pub struct NodeId;
}

/// The five compositing layers, back to front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    /// Grid, backdrop.
    Background,
    /// Committed entities.
    Content,
    /// Freehand strokes.
    Ink,
    /// Ephemeral tool previews (rubber bands, in-progress shapes).
    Preview,
    /// Selection handles and other UI chrome.
    Overlay,
}

impl LayerKind {
    /// All layers in compositing order.
    pub const ALL: [LayerKind; 5] =
        [LayerKind::Background, LayerKind::Content, LayerKind::Ink, LayerKind::Preview, LayerKind::Overlay];

    fn index(self) -> usize {
        match self {
            Self::Background => 0,
            Self::Content => 1,
            Self::Ink => 2,
            Self::Preview => 3,
            Self::Overlay => 4,
        }
    }

    /// Whether tools may place ephemeral content on this layer.
    #[must_use]
    pub fn accepts_previews(self) -> bool {
        matches!(self, Self::Ink | Self::Preview)
    }
}

/// Opaque handle to one compositing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerHandle {
    kind: LayerKind,
    node: NodeId,
}

impl LayerHandle {
    #[must_use]
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub(crate) fn node(&self) -> NodeId {
        self.node
    }
}

/// Permission to write the scene's view transform.
#[derive(Debug)]
pub struct ViewCapability {
    _private: (),
}

impl ViewCapability {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Geometry carried by a node. Coordinates are in the node's local space.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Layer(LayerKind),
    /// Pure container; carries only a transform.
    Group,
    Rect { width: f64, height: f64, corner_radius: f64 },
    /// Ellipse inscribed in the `width` x `height` box at the origin.
    Ellipse { width: f64, height: f64 },
    Text { text: String, font_size: f64, max_width: f64 },
    /// Polyline with a per-point stroke width.
    Path { points: Vec<Point>, widths: Vec<f64> },
    Line { from: Point, to: Point },
    /// Invisible pointer target.
    HitRegion { rect: Rect },
}

/// Fill and stroke of a drawable node.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: f64,
    pub opacity: f64,
}

impl Default for Paint {
    fn default() -> Self {
        Self { fill: None, stroke: None, stroke_width: 1.0, opacity: 1.0 }
    }
}

/// Local transform: scale about the origin, rotate about `pivot`, then
/// translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    pub translation: Vec2,
    /// Clockwise degrees.
    pub rotation: f64,
    pub pivot: Point,
    pub scale: Vec2,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self { translation: Vec2::ZERO, rotation: 0.0, pivot: Point::ORIGIN, scale: Vec2::new(1.0, 1.0) }
    }
}

impl NodeTransform {
    #[must_use]
    pub fn translate(x: f64, y: f64) -> Self {
        Self { translation: Vec2::new(x, y), ..Self::default() }
    }

    #[must_use]
    pub fn with_rotation(mut self, degrees: f64, pivot: Point) -> Self {
        self.rotation = degrees;
        self.pivot = pivot;
        self
    }

    #[must_use]
    pub fn affine(&self) -> Affine {
        Affine::translate(self.translation)
            * Affine::rotate_about(self.rotation.to_radians(), self.pivot)
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
    }
}

/// Pointer behaviours a node can respond to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    SelectOnClick,
    DragToMove,
    EditOnDoubleClick,
}

/// One scene-graph node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub transform: NodeTransform,
    pub paint: Paint,
    pub visible: bool,
    /// Entity this node renders, if any.
    pub owner: Option<EntityId>,
    interactions: Vec<Interaction>,
    markers: BTreeSet<&'static str>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            transform: NodeTransform::default(),
            paint: Paint::default(),
            visible: true,
            owner: None,
            interactions: Vec::new(),
            markers: BTreeSet::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    #[must_use]
    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }
}

/// The scene graph. See the module docs.
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    layers: [NodeId; 5],
    view: Affine,
    view_writes: usize,
    repaint: BTreeSet<LayerKind>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodeKind::Root));
        let layers = LayerKind::ALL.map(|kind| {
            let mut layer = Node::new(NodeKind::Layer(kind));
            layer.parent = Some(root);
            nodes.insert(layer)
        });
        if let Some(r) = nodes.get_mut(root) {
            r.children = layers.to_vec();
        }
        Self { nodes, root, layers, view: Affine::IDENTITY, view_writes: 0, repaint: BTreeSet::new() }
    }

    // --- Queries ---

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn layer_node(&self, kind: LayerKind) -> NodeId {
        self.layers[kind.index()]
    }

    pub(crate) fn layer_handle(&self, kind: LayerKind) -> LayerHandle {
        LayerHandle { kind, node: self.layer_node(kind) }
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Total live nodes, including the root and the layer nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Layer a node is (transitively) attached to. `None` for detached
    /// nodes and the root.
    #[must_use]
    pub fn layer_of(&self, id: NodeId) -> Option<LayerKind> {
        let mut current = Some(id);
        while let Some(n) = current.and_then(|c| self.nodes.get(c)) {
            if let NodeKind::Layer(kind) = n.kind {
                return Some(kind);
            }
            current = n.parent;
        }
        None
    }

    /// Number of nodes in the subtree under `id`, excluding `id` itself.
    #[must_use]
    pub fn descendant_count(&self, id: NodeId) -> usize {
        self.nodes
            .get(id)
            .map_or(0, |n| n.children.iter().map(|c| 1 + self.descendant_count(*c)).sum())
    }

    /// Whether `id` is attached under the root with every node on its
    /// ancestor chain visible.
    #[must_use]
    pub fn is_rendered(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current.and_then(|c| self.nodes.get(c)) {
            if !n.visible {
                return false;
            }
            if n.kind == NodeKind::Root {
                return true;
            }
            current = n.parent;
        }
        false
    }

    // --- Structure ---

    /// Create a detached node.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.insert(Node::new(kind))
    }

    /// Attach `child` as the topmost child of `parent`, detaching it from any
    /// previous parent. Returns `false` for missing nodes, the root, or a move
    /// that would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if child == self.root || !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return false;
        }
        if self.is_ancestor(child, parent) {
            return false;
        }
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
        self.touch(parent);
        true
    }

    fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        self.touch(parent);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|c| *c != id);
        }
    }

    /// Destroy a node and its whole subtree. The root and layer nodes cannot
    /// be destroyed. Returns the number of nodes removed.
    pub fn destroy(&mut self, id: NodeId) -> usize {
        if id == self.root || self.layers.contains(&id) || !self.nodes.contains_key(id) {
            return 0;
        }
        self.detach(id);
        self.destroy_subtree(id)
    }

    fn destroy_subtree(&mut self, id: NodeId) -> usize {
        let Some(node) = self.nodes.remove(id) else {
            return 0;
        };
        1 + node.children.into_iter().map(|c| self.destroy_subtree(c)).sum::<usize>()
    }

    /// Destroy every child of `id`. Returns the number of nodes removed.
    pub fn clear_children(&mut self, id: NodeId) -> usize {
        let Some(children) = self.nodes.get_mut(id).map(|n| std::mem::take(&mut n.children)) else {
            return 0;
        };
        self.touch(id);
        children.into_iter().map(|c| self.destroy_subtree(c)).sum()
    }

    /// Destroy everything placed on a layer.
    pub fn clear_layer(&mut self, kind: LayerKind) -> usize {
        self.clear_children(self.layer_node(kind))
    }

    /// Reorder the children of `parent`. Children not listed keep their
    /// relative order behind the listed ones; ids that are not children of
    /// `parent` are ignored.
    pub fn reorder_children(&mut self, parent: NodeId, order: &[NodeId]) -> bool {
        let Some(p) = self.nodes.get_mut(parent) else {
            return false;
        };
        let mut next: Vec<NodeId> = p.children.iter().filter(|c| !order.contains(c)).copied().collect();
        for id in order {
            if p.children.contains(id) && !next.contains(id) {
                next.push(*id);
            }
        }
        if next == p.children {
            return false;
        }
        p.children = next;
        self.touch(parent);
        true
    }

    // --- Node mutation ---

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) -> bool {
        self.mutate(id, |n| n.kind = kind)
    }

    pub fn set_transform(&mut self, id: NodeId, transform: NodeTransform) -> bool {
        self.mutate(id, |n| n.transform = transform)
    }

    pub fn set_paint(&mut self, id: NodeId, paint: Paint) -> bool {
        self.mutate(id, |n| n.paint = paint)
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> bool {
        self.mutate(id, |n| n.visible = visible)
    }

    pub fn set_owner(&mut self, id: NodeId, owner: Option<EntityId>) -> bool {
        self.mutate(id, |n| n.owner = owner)
    }

    /// Replace a path node's geometry in place. Points already present are
    /// kept; only the differing tail is rewritten. Returns `false` if `id`
    /// is not a path node.
    pub fn set_path(&mut self, id: NodeId, points: &[Point], widths: &[f64]) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let NodeKind::Path { points: current, widths: current_widths } = &mut node.kind else {
            return false;
        };
        let keep = current
            .iter()
            .zip(current_widths.iter())
            .zip(points.iter().zip(widths.iter()))
            .take_while(|(a, b)| a == b)
            .count();
        current.truncate(keep);
        current_widths.truncate(keep);
        current.extend_from_slice(&points[keep.min(points.len())..]);
        current_widths.extend_from_slice(&widths[keep.min(widths.len())..]);
        self.touch(id);
        true
    }

    /// Attach `interactions` to a node unless `marker` is already set on it.
    /// Returns `true` when the bindings were attached by this call.
    pub fn bind_once(&mut self, id: NodeId, marker: &'static str, interactions: &[Interaction]) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if !node.markers.insert(marker) {
            return false;
        }
        node.interactions.extend_from_slice(interactions);
        true
    }

    fn mutate<F: FnOnce(&mut Node)>(&mut self, id: NodeId, f: F) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        f(node);
        self.touch(id);
        true
    }

    // --- View transform ---

    /// Set the world-to-screen transform on the root.
    pub fn set_view_transform(&mut self, _cap: &ViewCapability, view: Affine) {
        self.view = view;
        self.view_writes += 1;
    }

    #[must_use]
    pub fn view_transform(&self) -> Affine {
        self.view
    }

    /// How many times the view transform has been written.
    #[must_use]
    pub fn view_writes(&self) -> usize {
        self.view_writes
    }

    // --- Repaint ---

    pub fn request_repaint(&mut self, kind: LayerKind) {
        self.repaint.insert(kind);
    }

    #[must_use]
    pub fn needs_repaint(&self) -> bool {
        !self.repaint.is_empty()
    }

    /// Take the set of layers needing repaint.
    pub fn take_repaint(&mut self) -> BTreeSet<LayerKind> {
        std::mem::take(&mut self.repaint)
    }

    fn touch(&mut self, id: NodeId) {
        if let Some(kind) = self.layer_of(id) {
            self.repaint.insert(kind);
        }
    }
}
