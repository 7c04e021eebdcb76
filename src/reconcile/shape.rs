use kurbo::{Point, Rect};

use super::{
    NodePool, Reconciler, RenderContext, RenderError, add_child, add_hit_region, bind_entity, check_category,
    check_geometry, entity_transform, fill_paint,
};
use crate::consts::HIT_REGION_SLOP;
use crate::entity::{Category, Entity, EntityId, Shape};
use crate::scene::{LayerKind, NodeId, NodeKind, NodeTransform, SceneGraph};

const CATEGORIES: &[Category] = &[Category::Rect, Category::Ellipse, Category::Circle];

/// Rectangles, ellipses and circles on the content layer.
#[derive(Debug)]
pub struct ShapeReconciler {
    pool: NodePool,
}

impl ShapeReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self { pool: NodePool::new(LayerKind::Content) }
    }
}

impl Default for ShapeReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler for ShapeReconciler {
    fn name(&self) -> &'static str {
        "shape"
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
        let Some(group) = self.pool.begin_render(entity, cx, || NodeKind::Group) else {
            return Ok(());
        };
        let scene = &mut *cx.scene;
        scene.set_transform(group, entity_transform(entity));
        scene.clear_children(group);

        let (body, local) = match &entity.shape {
            Shape::Rect { width, height } => (
                NodeKind::Rect { width: *width, height: *height, corner_radius: 0.0 },
                Rect::new(0.0, 0.0, *width, *height),
            ),
            Shape::Ellipse { width, height } => {
                (NodeKind::Ellipse { width: *width, height: *height }, Rect::new(0.0, 0.0, *width, *height))
            }
            Shape::Circle { radius } => {
                let r = radius.abs();
                (NodeKind::Ellipse { width: 2.0 * r, height: 2.0 * r }, Rect::from_center_size(Point::ORIGIN, (2.0 * r, 2.0 * r)))
            }
            _ => return Err(RenderError::WrongCategory { id: entity.id.clone(), category: entity.category() }),
        };
        let body = add_child(scene, group, body, fill_paint(&entity.style));
        // Ellipse nodes draw in a box at the origin; circles are centred on it.
        if local.x0 != 0.0 || local.y0 != 0.0 {
            scene.set_transform(body, NodeTransform::translate(local.x0, local.y0));
        }
        add_hit_region(scene, group, local.abs(), HIT_REGION_SLOP);
        bind_entity(scene, group, false);
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
