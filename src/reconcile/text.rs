use kurbo::Rect;

use super::{
    NodePool, Reconciler, RenderContext, RenderError, add_child, add_hit_region, bind_entity, check_category,
    check_geometry, entity_transform, fill_paint,
};
use crate::consts::{DEFAULT_FONT_SIZE, HIT_REGION_SLOP, NODE_CORNER_RADIUS};
use crate::entity::{Category, Entity, EntityId, Shape};
use crate::scene::{LayerKind, NodeId, NodeKind, NodeTransform, Paint, SceneGraph};

const CATEGORIES: &[Category] = &[Category::Text, Category::Note];

/// Inner padding between a note's edge and its label.
const NOTE_PADDING: f64 = 8.0;

/// Free text and sticky notes.
///
/// A note gets a filled background behind its label; plain text draws the
/// label alone in the stroke colour.
#[derive(Debug)]
pub struct TextReconciler {
    pool: NodePool,
}

impl TextReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self { pool: NodePool::new(LayerKind::Content) }
    }
}

impl Default for TextReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler for TextReconciler {
    fn name(&self) -> &'static str {
        "text"
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

        let (width, height, text, is_note) = match &entity.shape {
            Shape::Note { width, height, text } => (*width, *height, text.clone(), true),
            Shape::Text { width, height, text } => (*width, *height, text.clone(), false),
            _ => return Err(RenderError::WrongCategory { id: entity.id.clone(), category: entity.category() }),
        };
        let font_size = entity.style.font_size.unwrap_or(DEFAULT_FONT_SIZE);

        let padding = if is_note {
            add_child(
                scene,
                group,
                NodeKind::Rect { width, height, corner_radius: NODE_CORNER_RADIUS },
                fill_paint(&entity.style),
            );
            NOTE_PADDING
        } else {
            0.0
        };
        let label_paint = Paint {
            fill: Some(entity.style.stroke().to_owned()),
            opacity: entity.style.opacity(),
            ..Paint::default()
        };
        let label = add_child(
            scene,
            group,
            NodeKind::Text { text, font_size, max_width: (width - 2.0 * padding).max(0.0) },
            label_paint,
        );
        if padding > 0.0 {
            scene.set_transform(label, NodeTransform::translate(padding, padding));
        }
        add_hit_region(scene, group, Rect::new(0.0, 0.0, width, height).abs(), HIT_REGION_SLOP);
        bind_entity(scene, group, true);
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
