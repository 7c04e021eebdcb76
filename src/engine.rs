//! Engine: wires the document, scheduler, reconcilers, viewport sync and
//! transform controller together.
//!
//! DESIGN
//! ======
//! The engine subscribes to the store once. Every notification becomes a
//! [`FrameTask`] on the shared scheduler; nothing renders synchronously.
//! The host calls [`Engine::flush`] at each frame boundary (after the clock
//! fired). A flush:
//!
//! 1. repairs store invariants if anything is pending,
//! 2. drains the frame batch (viewport first, then entity reconciles),
//! 3. runs the epilogue: restack layers, re-bind transform handles,
//! 4. hands the dirty layers to the presenter.
//!
//! Tools get `&mut Document` and opaque [`LayerHandle`]s only; the scene
//! graph is read-only from outside.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use kurbo::{Point, Rect};

use crate::config::EngineConfig;
use crate::document::Document;
use crate::entity::{Category, Entity, EntityId};
use crate::hit::{Handle, hit_entity, hit_handle};
use crate::persist::BoardSnapshot;
use crate::reconcile::{self, Reconciler, RenderContext, RenderError};
use crate::scene::{LayerHandle, LayerKind, NodeId, NodeKind, NodeTransform, Paint, SceneGraph};
use crate::scheduler::{FlushReport, FrameClock, FrameScheduler, Priority};
use crate::store::{StoreEvent, SubscriptionId};
use crate::sync::ViewportSync;
use crate::transform::{ControllerState, GroupTransform, TransformController, TransformGesture};

/// Work the engine defers to the next frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameTask {
    /// Write the store's viewport into the scene.
    ApplyViewport,
    /// Create, update or destroy the nodes for one entity.
    Reconcile(EntityId),
    /// Reconcile every entity (after a reset or a renderer change).
    ReconcileAll,
    /// Reorder layer children to match the z-order.
    Restack,
    /// Re-evaluate culling after the visible rect moved.
    Recull,
    /// Re-bind the transform handles to the selection.
    SyncSelection,
}

/// Backend that draws the scene graph.
pub trait Presenter {
    /// Called after each flush that left layers needing repaint.
    fn present(&mut self, scene: &SceneGraph, dirty: &BTreeSet<LayerKind>);
}

/// Ephemeral geometry a tool can place on a preview layer (world space).
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewShape {
    Rect(Rect),
    Ellipse(Rect),
    Line(Point, Point),
    Path { points: Vec<Point>, width: f64 },
    Text { at: Point, text: String, font_size: f64 },
}

impl PreviewShape {
    fn into_node(self) -> (NodeKind, NodeTransform) {
        match self {
            Self::Rect(r) => (
                NodeKind::Rect { width: r.width(), height: r.height(), corner_radius: 0.0 },
                NodeTransform::translate(r.x0, r.y0),
            ),
            Self::Ellipse(r) => {
                (NodeKind::Ellipse { width: r.width(), height: r.height() }, NodeTransform::translate(r.x0, r.y0))
            }
            Self::Line(from, to) => (NodeKind::Line { from, to }, NodeTransform::default()),
            Self::Path { points, width } => {
                let widths = vec![width; points.len()];
                (NodeKind::Path { points, widths }, NodeTransform::default())
            }
            Self::Text { at, text, font_size } => {
                (NodeKind::Text { text, font_size, max_width: f64::INFINITY }, NodeTransform::translate(at.x, at.y))
            }
        }
    }
}

type SharedScheduler = Rc<RefCell<FrameScheduler<FrameTask>>>;

/// Primary node of `id` through the routing tables.
fn lookup_primary(
    routes: &HashMap<Category, usize>,
    rendered: &HashMap<EntityId, Category>,
    modules: &[Box<dyn Reconciler>],
    id: &EntityId,
) -> Option<NodeId> {
    let category = rendered.get(id)?;
    let index = routes.get(category)?;
    modules.get(*index)?.primary_node(id)
}

/// See the module docs.
pub struct Engine {
    config: EngineConfig,
    doc: Document,
    scene: SceneGraph,
    scheduler: SharedScheduler,
    modules: Vec<Box<dyn Reconciler>>,
    routes: HashMap<Category, usize>,
    rendered: HashMap<EntityId, Category>,
    sync: ViewportSync,
    transform: TransformController,
    gesture: Option<TransformGesture>,
    previews: HashMap<LayerKind, Vec<NodeId>>,
    surface: Option<(f64, f64)>,
    presenter: Option<Box<dyn Presenter>>,
    restack_pending: bool,
    handles_pending: bool,
    subscription: SubscriptionId,
}

impl Engine {
    /// Create an engine with the built-in reconcilers registered.
    #[must_use]
    pub fn new(config: EngineConfig, clock: Box<dyn FrameClock>) -> Self {
        let mut engine = Self::bare(config, clock);
        for module in reconcile::builtin() {
            engine.register(module);
        }
        engine
    }

    /// Create an engine with no reconcilers.
    #[must_use]
    pub fn bare(config: EngineConfig, clock: Box<dyn FrameClock>) -> Self {
        let scheduler: SharedScheduler = Rc::new(RefCell::new(FrameScheduler::new(clock)));
        let mut doc = Document::new(&config);
        let listener = Rc::clone(&scheduler);
        let subscription = doc.subscribe(move |event| on_store_event(&listener, event));
        let transform = TransformController::new(config.min_entity_size);
        let engine = Self {
            config,
            doc,
            scene: SceneGraph::new(),
            scheduler,
            modules: Vec::new(),
            routes: HashMap::new(),
            rendered: HashMap::new(),
            sync: ViewportSync::new(),
            transform,
            gesture: None,
            previews: HashMap::new(),
            surface: None,
            presenter: None,
            restack_pending: false,
            handles_pending: false,
            subscription,
        };
        engine.schedule(FrameTask::ApplyViewport, Priority::High);
        engine
    }

    // --- Accessors ---

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The document handed to tools.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Read-only scene graph, for presenters and inspection.
    #[must_use]
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    #[must_use]
    pub fn viewport_sync(&self) -> &ViewportSync {
        &self.sync
    }

    #[must_use]
    pub fn transform_controller(&self) -> &TransformController {
        &self.transform
    }

    /// Primary scene node rendered for `id`.
    #[must_use]
    pub fn primary_node(&self, id: &EntityId) -> Option<NodeId> {
        lookup_primary(&self.routes, &self.rendered, &self.modules, id)
    }

    /// Tasks waiting for the next flush.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.try_borrow().map_or(0, |s| s.pending_len())
    }

    #[must_use]
    pub fn is_pending(&self, task: &FrameTask) -> bool {
        self.scheduler.try_borrow().is_ok_and(|s| s.is_pending(task))
    }

    pub fn set_presenter(&mut self, presenter: Box<dyn Presenter>) {
        self.presenter = Some(presenter);
    }

    /// Set the drawing surface size in screen pixels; enables culling.
    pub fn set_surface_size(&mut self, width: f64, height: f64) {
        self.surface = Some((width, height));
        self.schedule(FrameTask::Recull, Priority::Normal);
    }

    fn visible_rect(&self) -> Option<Rect> {
        let (w, h) = self.surface?;
        Some(self.doc.viewport().visible_world_rect(w, h, self.config.cull_padding_px))
    }

    fn schedule(&self, task: FrameTask, priority: Priority) {
        schedule_on(&self.scheduler, task, priority);
    }

    // --- Registration ---

    /// Register a reconciler. It takes over its categories from any earlier
    /// owner; the earlier owner's nodes for those categories are destroyed
    /// and everything is reconciled again next frame.
    pub fn register(&mut self, module: Box<dyn Reconciler>) {
        let index = self.modules.len();
        for category in module.categories() {
            if let Some(old) = self.routes.insert(*category, index) {
                let ids: Vec<EntityId> =
                    self.rendered.iter().filter(|(_, c)| *c == category).map(|(id, _)| id.clone()).collect();
                if let Some(previous) = self.modules.get_mut(old) {
                    for id in &ids {
                        previous.remove(id, &mut self.scene);
                    }
                    tracing::debug!(category = ?category, from = previous.name(), to = module.name(), "renderer replaced");
                }
                for id in &ids {
                    self.rendered.remove(id);
                }
            }
        }
        self.modules.push(module);
        self.schedule(FrameTask::ReconcileAll, Priority::Normal);
    }

    // --- Frame ---

    /// Run everything scheduled for this frame.
    pub fn flush(&mut self) -> FlushReport {
        if self.pending_tasks() > 0 {
            let fixes = self.doc.repair();
            if fixes > 0 {
                tracing::debug!(fixes, "store repaired before reconcile");
            }
        }
        let batch = match self.scheduler.try_borrow_mut() {
            Ok(mut scheduler) => scheduler.begin_frame(),
            Err(e) => {
                tracing::warn!(error = %e, "scheduler busy; frame skipped");
                return FlushReport::default();
            }
        };

        let mut report = FlushReport::default();
        for task in &batch {
            let result = self.run(task);
            report.record(task, result);
        }

        if std::mem::take(&mut self.restack_pending) {
            self.restack();
        }
        if std::mem::take(&mut self.handles_pending) {
            self.transform.attach(self.doc.store(), &mut self.scene);
        }

        if let Some(presenter) = self.presenter.as_mut() {
            let dirty = self.scene.take_repaint();
            if !dirty.is_empty() {
                presenter.present(&self.scene, &dirty);
            }
        }
        if report.executed + report.failed > 0 {
            tracing::debug!(executed = report.executed, failed = report.failed, "frame flushed");
        }
        report
    }

    fn run(&mut self, task: &FrameTask) -> Result<(), RenderError> {
        match task {
            FrameTask::ApplyViewport => {
                self.sync.apply(self.doc.viewport(), &mut self.scene);
                if self.transform.state() != ControllerState::Idle {
                    self.handles_pending = true;
                }
                Ok(())
            }
            FrameTask::Reconcile(id) => self.reconcile(id),
            FrameTask::ReconcileAll => self.reconcile_all(),
            FrameTask::Restack => {
                self.restack_pending = true;
                Ok(())
            }
            FrameTask::Recull => self.recull(),
            FrameTask::SyncSelection => {
                self.handles_pending = true;
                Ok(())
            }
        }
    }

    fn reconcile(&mut self, id: &EntityId) -> Result<(), RenderError> {
        let Some(category) = self.doc.get(id).map(Entity::category) else {
            self.forget(id);
            return Ok(());
        };
        if self.rendered.get(id).is_some_and(|prev| *prev != category) {
            self.forget(id);
        }
        if self.transform.targets().contains(id) {
            self.handles_pending = true;
        }
        let visible = self.visible_rect();
        let Some(entity) = self.doc.get(id) else {
            return Ok(());
        };
        let Some(module) = self.routes.get(&category).and_then(|i| self.modules.get_mut(*i)) else {
            tracing::debug!(entity = %id, category = ?category, "no renderer registered");
            return Ok(());
        };
        let before = module.primary_node(id);
        let mut cx = RenderContext { scene: &mut self.scene, store: self.doc.store(), config: &self.config, visible };
        module.render(entity, &mut cx)?;
        if module.primary_node(id) != before {
            self.restack_pending = true;
        }
        self.rendered.insert(id.clone(), category);
        Ok(())
    }

    /// Destroy whatever was rendered for `id`.
    fn forget(&mut self, id: &EntityId) {
        let Some(category) = self.rendered.remove(id) else {
            return;
        };
        if let Some(module) = self.routes.get(&category).and_then(|i| self.modules.get_mut(*i)) {
            module.remove(id, &mut self.scene);
        }
    }

    fn reconcile_all(&mut self) -> Result<(), RenderError> {
        let gone: Vec<EntityId> = self.rendered.keys().filter(|id| self.doc.get(id).is_none()).cloned().collect();
        for id in &gone {
            self.forget(id);
        }
        let ids: Vec<EntityId> = self.doc.z_order().to_vec();
        let mut first_error = None;
        for id in &ids {
            if let Err(e) = self.reconcile(id) {
                tracing::warn!(entity = %id, error = %e, "entity failed to render");
                first_error.get_or_insert(e);
            }
        }
        self.restack_pending = true;
        first_error.map_or(Ok(()), Err)
    }

    /// Create nodes for entities that scrolled into view; hide the ones that
    /// left it.
    fn recull(&mut self) -> Result<(), RenderError> {
        let Some(visible) = self.visible_rect() else {
            return Ok(());
        };
        let mut rerender = Vec::new();
        for entity in self.doc.entities() {
            let node = lookup_primary(&self.routes, &self.rendered, &self.modules, &entity.id);
            let in_view = reconcile::rects_touch(visible, entity.bounds());
            match node.and_then(|n| self.scene.get(n).map(|node| (n, node.visible))) {
                Some((n, true)) if !in_view => {
                    self.scene.set_visible(n, false);
                }
                Some((_, false)) | None if in_view => rerender.push(entity.id.clone()),
                _ => {}
            }
        }
        let mut first_error = None;
        for id in &rerender {
            if let Err(e) = self.reconcile(id) {
                tracing::warn!(entity = %id, error = %e, "entity failed to render");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reorder each layer's primary nodes to follow the z-order.
    fn restack(&mut self) {
        let mut per_layer: HashMap<LayerKind, Vec<NodeId>> = HashMap::new();
        for id in self.doc.z_order() {
            let Some(module) = self.rendered.get(id).and_then(|c| self.routes.get(c)).and_then(|i| self.modules.get(*i))
            else {
                continue;
            };
            if let Some(node) = module.primary_node(id) {
                per_layer.entry(module.layer()).or_default().push(node);
            }
        }
        for (kind, order) in per_layer {
            let layer = self.scene.layer_node(kind);
            self.scene.reorder_children(layer, &order);
        }
    }

    // --- Layers & previews ---

    /// Opaque handle to one compositing layer.
    #[must_use]
    pub fn layer(&self, kind: LayerKind) -> LayerHandle {
        self.scene.layer_handle(kind)
    }

    /// Place ephemeral geometry on a preview-capable layer. Returns `None`
    /// for layers that do not accept previews.
    pub fn place_preview(&mut self, layer: LayerHandle, shape: PreviewShape, paint: Paint) -> Option<NodeId> {
        let kind = layer.kind();
        if !kind.accepts_previews() || self.scene.layer_node(kind) != layer.node() {
            tracing::warn!(layer = ?kind, "layer does not accept previews");
            return None;
        }
        let (node_kind, transform) = shape.into_node();
        let node = self.scene.create(node_kind);
        self.scene.set_transform(node, transform);
        self.scene.set_paint(node, paint);
        self.scene.append_child(layer.node(), node);
        self.previews.entry(kind).or_default().push(node);
        Some(node)
    }

    /// Replace a preview node's geometry in place.
    pub fn update_preview(&mut self, node: NodeId, shape: PreviewShape) -> bool {
        if !self.previews.values().any(|nodes| nodes.contains(&node)) {
            return false;
        }
        let (node_kind, transform) = shape.into_node();
        self.scene.set_kind(node, node_kind) && self.scene.set_transform(node, transform)
    }

    /// Destroy every preview placed on `layer`. Entity nodes are untouched.
    pub fn clear_layer(&mut self, layer: LayerHandle) -> usize {
        let nodes = self.previews.remove(&layer.kind()).unwrap_or_default();
        nodes.into_iter().map(|n| self.scene.destroy(n)).sum()
    }

    // --- Hit testing & transforms ---

    /// Topmost entity under a screen point.
    #[must_use]
    pub fn hit_test(&self, screen: Point) -> Option<EntityId> {
        let viewport = self.doc.viewport();
        hit_entity(self.doc.store(), viewport.screen_to_world(screen), viewport.scale)
    }

    /// Capture the selection for an explicit transform. See
    /// [`TransformController::transform_start`].
    pub fn begin_transform(&mut self) -> bool {
        let (routes, rendered, modules) = (&self.routes, &self.rendered, &self.modules);
        self.transform.attach(self.doc.store(), &mut self.scene);
        self.transform.transform_start(self.doc.store(), &self.scene, |id| lookup_primary(routes, rendered, modules, id))
    }

    pub fn update_transform(&mut self, transform: GroupTransform) -> bool {
        self.transform.transform(transform, self.doc.store(), &mut self.scene)
    }

    pub fn end_transform(&mut self) -> bool {
        self.gesture = None;
        self.transform.transform_end(&mut self.doc, &mut self.scene)
    }

    pub fn cancel_transform(&mut self) -> bool {
        self.gesture = None;
        self.transform.transform_cancel(self.doc.store(), &mut self.scene)
    }

    /// Pointer down in screen space: starts a handle gesture when the point
    /// is on the selection's handles or body.
    pub fn begin_gesture(&mut self, screen: Point) -> Option<Handle> {
        let viewport = self.doc.viewport();
        let world = viewport.screen_to_world(screen);
        // Selection may have changed since the last flush.
        self.transform.attach(self.doc.store(), &mut self.scene);
        let bounds = self.transform.bounds(self.doc.store())?;
        let handle = hit_handle(world, bounds, viewport.scale)?;
        if !self.begin_transform() {
            return None;
        }
        self.gesture = Some(TransformGesture::new(handle, world, bounds, self.config.min_entity_size));
        Some(handle)
    }

    /// Pointer move during a gesture.
    pub fn drag_gesture(&mut self, screen: Point, keep_ratio: bool) -> bool {
        let Some(gesture) = self.gesture else {
            return false;
        };
        let world = self.doc.viewport().screen_to_world(screen);
        let transform = gesture.keep_ratio(keep_ratio).update(world);
        self.update_transform(transform)
    }

    /// Pointer up: commit the gesture.
    pub fn end_gesture(&mut self) -> bool {
        if self.gesture.is_none() {
            return false;
        }
        self.end_transform()
    }

    // --- Persistence ---

    /// Replace the board with a snapshot. Returns the number of entities
    /// that could not be decoded.
    pub fn load(&mut self, snapshot: &BoardSnapshot) -> usize {
        self.gesture = None;
        self.transform.detach(&mut self.scene);
        self.doc.load(snapshot)
    }

    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        self.doc.snapshot()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.doc.unsubscribe(self.subscription);
    }
}

fn schedule_on(scheduler: &SharedScheduler, task: FrameTask, priority: Priority) {
    match scheduler.try_borrow_mut() {
        Ok(mut s) => {
            s.schedule(task, priority);
        }
        Err(e) => tracing::warn!(task = ?task, error = %e, "scheduler busy; task dropped"),
    }
}

fn on_store_event(scheduler: &SharedScheduler, event: &StoreEvent) {
    match event {
        StoreEvent::EntityChanged { id, .. } | StoreEvent::EntityRemoved { id, .. } => {
            schedule_on(scheduler, FrameTask::Reconcile(id.clone()), Priority::Normal);
        }
        StoreEvent::ZOrderChanged => schedule_on(scheduler, FrameTask::Restack, Priority::Normal),
        StoreEvent::SelectionChanged => schedule_on(scheduler, FrameTask::SyncSelection, Priority::Normal),
        StoreEvent::ViewportChanged(_) => {
            schedule_on(scheduler, FrameTask::ApplyViewport, Priority::High);
            schedule_on(scheduler, FrameTask::Recull, Priority::Normal);
        }
        StoreEvent::Reset => {
            schedule_on(scheduler, FrameTask::ApplyViewport, Priority::High);
            schedule_on(scheduler, FrameTask::ReconcileAll, Priority::Normal);
            schedule_on(scheduler, FrameTask::SyncSelection, Priority::Normal);
        }
    }
}
