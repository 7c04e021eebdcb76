use kurbo::Point;

use super::{NodePool, Reconciler, RenderContext, RenderError, bind_entity, check_category, check_geometry, entity_transform, stroke_paint};
use crate::config::InkConfig;
use crate::entity::{Category, Entity, EntityId, InkPoint, Shape, ink_length};
use crate::scene::{LayerKind, NodeId, NodeKind, SceneGraph};

const CATEGORIES: &[Category] = &[Category::Ink];

/// Freehand strokes on the ink layer.
///
/// The primary node is the path itself; its points are updated in place so
/// a stroke that grows point by point only appends. Strokes shorter than
/// [`InkConfig::min_length`] are not drawn.
#[derive(Debug)]
pub struct InkReconciler {
    pool: NodePool,
}

impl InkReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self { pool: NodePool::new(LayerKind::Ink) }
    }
}

impl Default for InkReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-point stroke width: pressure scaled by the configured width, never
/// thinner than the style's base width.
fn stroke_widths(points: &[InkPoint], base: f64, config: &InkConfig) -> Vec<f64> {
    points.iter().map(|p| (p.pressure.clamp(0.0, 1.0) * config.pressure_width).max(base)).collect()
}

impl Reconciler for InkReconciler {
    fn name(&self) -> &'static str {
        "ink"
    }

    fn categories(&self) -> &'static [Category] {
        CATEGORIES
    }

    fn layer(&self) -> LayerKind {
        self.pool.layer()
    }

    fn render(&mut self, entity: &Entity, cx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        check_category(entity, CATEGORIES)?;
        check_geometry(entity)?;
        let Shape::Ink { points } = &entity.shape else {
            return Err(RenderError::WrongCategory { id: entity.id.clone(), category: entity.category() });
        };
        if ink_length(points) < cx.config.ink.min_length {
            if self.pool.remove(&entity.id, cx.scene) {
                tracing::debug!(entity = %entity.id, "tiny stroke dropped");
            }
            return Ok(());
        }
        let empty = || NodeKind::Path { points: Vec::new(), widths: Vec::new() };
        let Some(path) = self.pool.begin_render(entity, cx, empty) else {
            return Ok(());
        };
        let scene = &mut *cx.scene;
        let coords: Vec<Point> = points.iter().map(|p| Point::new(p.x, p.y)).collect();
        let widths = stroke_widths(points, entity.style.stroke_width(), &cx.config.ink);
        scene.set_path(path, &coords, &widths);
        scene.set_transform(path, entity_transform(entity));
        scene.set_paint(path, stroke_paint(&entity.style));
        bind_entity(scene, path, false);
        Ok(())
    }

    fn remove(&mut self, id: &EntityId, scene: &mut SceneGraph) -> bool {
        self.pool.remove(id, scene)
    }

    fn clear(&mut self, scene: &mut SceneGraph) {
        self.pool.clear(scene);
    }

    fn primary_node(&self, id: &EntityId) -> Option<NodeId> {
        self.pool.get(id)
    }

    fn node_count(&self) -> usize {
        self.pool.len()
    }
}
