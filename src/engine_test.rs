#![allow(clippy::float_cmp)]

use std::cell::Cell;

use kurbo::Vec2;

use super::*;
use crate::entity::{EntityPatch, InkPoint, Shape};
use crate::history::{Command, EntityDelta, ListDelta};
use crate::scheduler::ManualClock;
use crate::viewport::{Viewport, ViewportPatch};

fn engine() -> (Engine, ManualClock) {
    let clock = ManualClock::new();
    (Engine::new(EngineConfig::default(), Box::new(clock.clone())), clock)
}

fn id(s: &str) -> EntityId {
    EntityId::from(s)
}

fn content_children(engine: &Engine) -> Vec<NodeId> {
    let layer = engine.scene().layer_node(LayerKind::Content);
    engine.scene().get(layer).unwrap().children().to_vec()
}

/// Records every present call.
struct RecordingPresenter(Rc<RefCell<Vec<BTreeSet<LayerKind>>>>);

impl Presenter for RecordingPresenter {
    fn present(&mut self, _scene: &SceneGraph, dirty: &BTreeSet<LayerKind>) {
        self.0.borrow_mut().push(dirty.clone());
    }
}

/// Rect renderer that only counts calls.
struct CountingRects(Rc<Cell<usize>>);

impl Reconciler for CountingRects {
    fn name(&self) -> &'static str {
        "counting"
    }
    fn categories(&self) -> &'static [Category] {
        &[Category::Rect]
    }
    fn layer(&self) -> LayerKind {
        LayerKind::Content
    }
    fn render(&mut self, _entity: &Entity, _cx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
    fn remove(&mut self, _id: &EntityId, _scene: &mut SceneGraph) -> bool {
        false
    }
    fn clear(&mut self, _scene: &mut SceneGraph) {}
    fn primary_node(&self, _id: &EntityId) -> Option<NodeId> {
        None
    }
    fn node_count(&self) -> usize {
        0
    }
}

// =============================================================
// Scheduling
// =============================================================

#[test]
fn first_flush_applies_viewport() {
    let (mut engine, clock) = engine();
    assert_eq!(clock.requests(), 1);
    assert!(engine.is_pending(&FrameTask::ApplyViewport));

    engine.flush();
    assert_eq!(engine.viewport_sync().applications(), 1);
    assert_eq!(engine.scene().view_transform(), Viewport::default().to_affine());
    assert_eq!(engine.pending_tasks(), 0);
}

#[test]
fn mutations_render_only_on_flush() {
    let (mut engine, _clock) = engine();
    engine.flush();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 10.0, 10.0));
    assert!(engine.primary_node(&id("a")).is_none());
    assert!(engine.is_pending(&FrameTask::Reconcile(id("a"))));

    engine.flush();
    let node = engine.primary_node(&id("a")).unwrap();
    assert_eq!(engine.scene().layer_of(node), Some(LayerKind::Content));
}

#[test]
fn repeated_updates_coalesce_into_one_task() {
    let (mut engine, clock) = engine();
    engine.flush();
    let requests = clock.requests();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 10.0, 10.0));
    engine.flush();

    for i in 0..10 {
        engine.document_mut().update(&id("a"), EntityPatch::position(f64::from(i), 0.0));
    }
    assert_eq!(engine.pending_tasks(), 1);
    assert_eq!(clock.requests(), requests + 2);

    let report = engine.flush();
    assert_eq!(report.executed, 1);
    let node = engine.primary_node(&id("a")).unwrap();
    assert_eq!(engine.scene().get(node).unwrap().transform.translation, Vec2::new(9.0, 0.0));
}

#[test]
fn removed_entity_loses_its_nodes() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::note("n", 0.0, 0.0, 50.0, 50.0, "hi"));
    engine.flush();
    let node = engine.primary_node(&id("n")).unwrap();

    engine.document_mut().remove(&id("n"));
    engine.flush();
    assert!(!engine.scene().contains(node));
    assert!(engine.primary_node(&id("n")).is_none());
}

#[test]
fn category_change_moves_entity_between_renderers() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 10.0, 10.0));
    engine.flush();
    let rect_node = engine.primary_node(&id("a")).unwrap();

    let points = vec![InkPoint::new(0.0, 0.0, 0.5), InkPoint::new(20.0, 0.0, 0.5)];
    engine.document_mut().upsert(Entity::ink("a", 0.0, 0.0, points));
    engine.flush();

    assert!(!engine.scene().contains(rect_node));
    let ink_node = engine.primary_node(&id("a")).unwrap();
    assert_eq!(engine.scene().layer_of(ink_node), Some(LayerKind::Ink));
}

#[test]
fn failed_render_does_not_block_siblings() {
    let (mut engine, _clock) = engine();
    engine.flush();
    engine.document_mut().upsert(Entity::rect("bad", f64::NAN, 0.0, 10.0, 10.0));
    engine.document_mut().upsert(Entity::rect("good", 0.0, 0.0, 10.0, 10.0));

    let report = engine.flush();
    assert_eq!(report.failed, 1);
    assert!(engine.primary_node(&id("good")).is_some());
    assert!(engine.primary_node(&id("bad")).is_none());
}

// =============================================================
// Z-order & selection
// =============================================================

#[test]
fn restack_follows_z_order() {
    let (mut engine, _clock) = engine();
    for name in ["a", "b", "c"] {
        engine.document_mut().upsert(Entity::rect(name, 0.0, 0.0, 10.0, 10.0));
    }
    engine.flush();
    let nodes: Vec<NodeId> = ["a", "b", "c"].iter().map(|n| engine.primary_node(&id(n)).unwrap()).collect();
    assert_eq!(content_children(&engine), nodes);

    engine.document_mut().bring_to_front(&id("a"));
    engine.flush();
    assert_eq!(content_children(&engine), vec![nodes[1], nodes[2], nodes[0]]);

    engine.document_mut().undo();
    engine.flush();
    assert_eq!(content_children(&engine), nodes);
}

#[test]
fn selection_binds_handles_after_flush() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 10.0, 10.0));
    engine.document_mut().set_selection([id("a")]);
    assert_eq!(engine.transform_controller().state(), ControllerState::Idle);

    engine.flush();
    assert_eq!(engine.transform_controller().state(), ControllerState::Attached);
    let handles = engine.transform_controller().handles_node().unwrap();
    assert_eq!(engine.scene().layer_of(handles), Some(LayerKind::Overlay));

    engine.document_mut().set_selection(Vec::<EntityId>::new());
    engine.flush();
    assert_eq!(engine.transform_controller().state(), ControllerState::Idle);
    assert!(!engine.scene().contains(handles));
}

// =============================================================
// Viewport & culling
// =============================================================

#[test]
fn viewport_change_is_high_priority_and_single_writer() {
    let (mut engine, _clock) = engine();
    engine.flush();
    engine.document_mut().set_viewport(ViewportPatch { x: Some(10.0), y: Some(20.0), scale: Some(2.0) });
    engine.document_mut().set_viewport(ViewportPatch::scale(3.0));
    engine.flush();

    assert_eq!(engine.viewport_sync().applications(), 2);
    assert_eq!(engine.scene().view_writes(), engine.viewport_sync().applications());
    assert_eq!(engine.scene().view_transform(), Viewport::new(10.0, 20.0, 3.0).to_affine());
}

#[test]
fn unvalidated_scale_range_does_not_panic() {
    let config = EngineConfig { min_scale: 5.0, max_scale: 0.5, ..EngineConfig::default() };
    let mut engine = Engine::new(config, Box::new(ManualClock::new()));
    engine.document_mut().set_viewport(ViewportPatch::scale(100.0));
    engine.flush();
    assert_eq!(engine.document().viewport().scale, 5.0);
    assert_eq!(engine.document().store().scale_range(), (0.5, 5.0));
}

#[test]
fn offscreen_entities_render_when_panned_into_view() {
    let (mut engine, _clock) = engine();
    engine.set_surface_size(100.0, 100.0);
    engine.document_mut().upsert(Entity::rect("far", 1000.0, 1000.0, 10.0, 10.0));
    engine.document_mut().upsert(Entity::rect("near", 10.0, 10.0, 10.0, 10.0));
    engine.flush();
    assert!(engine.primary_node(&id("far")).is_none());
    let near = engine.primary_node(&id("near")).unwrap();

    engine.document_mut().set_viewport(ViewportPatch::position(-900.0, -900.0));
    engine.flush();
    let far = engine.primary_node(&id("far")).unwrap();
    assert!(engine.scene().get(far).unwrap().visible);
    assert!(!engine.scene().get(near).unwrap().visible);
}

// =============================================================
// Layers & previews
// =============================================================

#[test]
fn previews_only_on_preview_layers() {
    let (mut engine, _clock) = engine();
    let content = engine.layer(LayerKind::Content);
    let preview = engine.layer(LayerKind::Preview);
    let rect = Rect::new(0.0, 0.0, 10.0, 10.0);

    assert!(engine.place_preview(content, PreviewShape::Rect(rect), Paint::default()).is_none());
    let node = engine.place_preview(preview, PreviewShape::Rect(rect), Paint::default()).unwrap();
    assert_eq!(engine.scene().layer_of(node), Some(LayerKind::Preview));

    assert!(engine.update_preview(node, PreviewShape::Line(Point::ORIGIN, Point::new(5.0, 5.0))));
    assert_eq!(engine.clear_layer(preview), 1);
    assert!(!engine.scene().contains(node));
}

#[test]
fn clearing_ink_previews_keeps_entity_strokes() {
    let (mut engine, _clock) = engine();
    let points = vec![InkPoint::new(0.0, 0.0, 0.5), InkPoint::new(20.0, 0.0, 0.5)];
    engine.document_mut().upsert(Entity::ink("i", 0.0, 0.0, points));
    engine.flush();
    let ink = engine.layer(LayerKind::Ink);
    let live = PreviewShape::Path { points: vec![Point::ORIGIN, Point::new(3.0, 3.0)], width: 2.0 };
    engine.place_preview(ink, live, Paint::default()).unwrap();

    assert_eq!(engine.clear_layer(ink), 1);
    assert!(engine.primary_node(&id("i")).is_some_and(|n| engine.scene().contains(n)));
}

#[test]
fn presenter_sees_dirty_layers() {
    let (mut engine, _clock) = engine();
    let log = Rc::new(RefCell::new(Vec::new()));
    engine.set_presenter(Box::new(RecordingPresenter(Rc::clone(&log))));
    engine.flush();
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].len(), LayerKind::ALL.len());

    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 10.0, 10.0));
    engine.flush();
    assert!(log.borrow()[1].contains(&LayerKind::Content));
    assert!(!log.borrow()[1].contains(&LayerKind::Overlay));

    engine.flush();
    assert_eq!(log.borrow().len(), 2);
}

// =============================================================
// Registration
// =============================================================

#[test]
fn registering_replaces_category_owner() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("r", 0.0, 0.0, 10.0, 10.0));
    engine.document_mut().upsert(Entity::circle("c", 0.0, 0.0, 5.0));
    engine.flush();
    let old = engine.primary_node(&id("r")).unwrap();

    let calls = Rc::new(Cell::new(0));
    engine.register(Box::new(CountingRects(Rc::clone(&calls))));
    assert!(!engine.scene().contains(old));
    engine.flush();

    assert_eq!(calls.get(), 1);
    assert!(engine.primary_node(&id("c")).is_some());
}

#[test]
fn bare_engine_skips_unrouted_entities() {
    let mut engine = Engine::bare(EngineConfig::default(), Box::new(ManualClock::new()));
    engine.document_mut().upsert(Entity::rect("r", 0.0, 0.0, 10.0, 10.0));
    let report = engine.flush();
    assert_eq!(report.failed, 0);
    assert!(engine.primary_node(&id("r")).is_none());
}

// =============================================================
// Gestures
// =============================================================

#[test]
fn body_gesture_moves_selection_with_one_undo_entry() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 100.0, 50.0));
    engine.document_mut().set_selection([id("a")]);
    engine.flush();
    let undo_before = engine.document().history().undo_len();

    assert_eq!(engine.begin_gesture(Point::new(50.0, 25.0)), Some(Handle::Body));
    assert!(engine.drag_gesture(Point::new(55.0, 35.0), false));
    assert!(engine.drag_gesture(Point::new(60.0, 45.0), false));
    assert!(engine.end_gesture());
    engine.flush();

    let a = engine.document().get(&id("a")).unwrap();
    assert_eq!((a.x, a.y), (10.0, 20.0));
    assert_eq!(engine.document().history().undo_len(), undo_before + 1);
    assert_eq!(engine.document().history().undo_label(), Some("move"));
    let node = engine.primary_node(&id("a")).unwrap();
    assert_eq!(engine.scene().get(node).unwrap().transform.translation, Vec2::new(10.0, 20.0));
}

#[test]
fn gesture_follows_selection_changed_since_last_flush() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 100.0, 50.0));
    engine.flush();

    engine.document_mut().set_selection([id("a")]);
    assert_eq!(engine.begin_gesture(Point::new(50.0, 25.0)), Some(Handle::Body));
    assert!(engine.drag_gesture(Point::new(60.0, 25.0), false));
    assert!(engine.end_gesture());
    engine.flush();
    assert_eq!(engine.document().get(&id("a")).unwrap().x, 10.0);

    engine.document_mut().upsert(Entity::rect("b", 300.0, 0.0, 50.0, 50.0));
    engine.document_mut().set_selection([id("b")]);
    assert!(engine.begin_gesture(Point::new(60.0, 25.0)).is_none());
    assert_eq!(engine.begin_gesture(Point::new(325.0, 25.0)), Some(Handle::Body));
}

#[test]
fn cancelled_transform_restores_nodes() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 100.0, 50.0));
    engine.document_mut().set_selection([id("a")]);
    engine.flush();
    let undo_before = engine.document().history().undo_len();
    let node = engine.primary_node(&id("a")).unwrap();

    assert!(engine.begin_transform());
    assert!(engine.update_transform(GroupTransform::translate(30.0, 0.0)));
    assert_eq!(engine.scene().get(node).unwrap().transform.translation, Vec2::new(30.0, 0.0));
    assert!(engine.cancel_transform());

    assert_eq!(engine.scene().get(node).unwrap().transform.translation, Vec2::ZERO);
    assert_eq!(engine.document().get(&id("a")).unwrap().x, 0.0);
    assert_eq!(engine.document().history().undo_len(), undo_before);
    assert_eq!(engine.transform_controller().state(), ControllerState::Attached);
}

#[test]
fn gesture_outside_selection_does_nothing() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 100.0, 50.0));
    engine.document_mut().set_selection([id("a")]);
    engine.flush();
    assert!(engine.begin_gesture(Point::new(500.0, 500.0)).is_none());
    assert!(!engine.drag_gesture(Point::new(600.0, 600.0), false));
    assert!(!engine.end_gesture());
}

#[test]
fn hit_test_uses_screen_space() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 10.0, 10.0));
    engine.document_mut().set_viewport(ViewportPatch { x: Some(100.0), y: Some(100.0), scale: Some(2.0) });
    assert_eq!(engine.hit_test(Point::new(110.0, 110.0)), Some(id("a")));
    assert_eq!(engine.hit_test(Point::new(10.0, 10.0)), None);
}

// =============================================================
// History
// =============================================================

#[test]
fn flush_repairs_store_left_by_partial_undo() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("a", 0.0, 0.0, 10.0, 10.0));
    let b = Entity::rect("b", 20.0, 0.0, 10.0, 10.0);
    engine.document_mut().upsert(b.clone());
    engine.flush();
    assert!(engine.primary_node(&id("b")).is_some());

    let corrupt = Command::default().with_z_order(ListDelta::new(vec![id("ghost")], vec![id("a"), id("b")]));
    let drop_b = Command::entity(EntityDelta::new(id("b"), None, Some(b)));
    engine.document_mut().history_mut().push_raw("partial", vec![corrupt, drop_b]);

    assert!(!engine.document_mut().undo());
    assert!(engine.document().get(&id("b")).is_none());
    assert!(!engine.document().store().is_consistent());
    assert!(engine.document().history_fault().is_some());

    engine.flush();
    assert!(engine.document().store().is_consistent());
    assert_eq!(engine.document().z_order(), &[id("a")]);
    assert!(engine.primary_node(&id("b")).is_none());
}

// =============================================================
// Persistence
// =============================================================

#[test]
fn load_renders_snapshot_and_reports_skips() {
    let (mut engine, _clock) = engine();
    engine.document_mut().upsert(Entity::rect("old", 0.0, 0.0, 10.0, 10.0));
    engine.flush();
    let old = engine.primary_node(&id("old")).unwrap();

    let raw = r#"{
        "entities": {
            "t": { "category": "table", "rows": 2, "cols": 2, "cell_width": 10, "cell_height": 10 },
            "x": { "category": "unknown" }
        },
        "zOrder": ["t", "x"],
        "selection": ["t"],
        "viewport": { "x": 5, "y": 5, "scale": 2 }
    }"#;
    let snap = BoardSnapshot::from_json(raw).unwrap();
    assert_eq!(engine.load(&snap), 1);
    engine.flush();

    assert!(!engine.scene().contains(old));
    assert!(engine.primary_node(&id("t")).is_some());
    assert_eq!(engine.scene().view_transform(), Viewport::new(5.0, 5.0, 2.0).to_affine());
    assert_eq!(engine.transform_controller().targets(), &[id("t")]);
    assert!(!engine.document().can_undo());
    assert!(matches!(engine.document().get(&id("t")).unwrap().shape, Shape::Table { rows: 2, .. }));
}
