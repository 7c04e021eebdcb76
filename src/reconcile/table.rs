use kurbo::{Point, Rect};

use super::{
    NodePool, Reconciler, RenderContext, RenderError, add_child, add_hit_region, bind_entity, check_category,
    check_geometry, entity_transform, fill_paint, stroke_paint,
};
use crate::consts::{DEFAULT_FONT_SIZE, HIT_REGION_SLOP, MAX_TABLE_DIMENSION};
use crate::entity::{Category, Entity, EntityId, Shape};
use crate::scene::{LayerKind, NodeId, NodeKind, NodeTransform, Paint, SceneGraph};

const CATEGORIES: &[Category] = &[Category::Table];

const CELL_PADDING: f64 = 4.0;

/// Tables: background, interior grid lines and one label per non-empty cell.
#[derive(Debug)]
pub struct TableReconciler {
    pool: NodePool,
}

impl TableReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self { pool: NodePool::new(LayerKind::Content) }
    }
}

impl Default for TableReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler for TableReconciler {
    fn name(&self) -> &'static str {
        "table"
    }

    fn categories(&self) -> &'static [Category] {
        CATEGORIES
    }

    fn layer(&self) -> LayerKind {
        self.pool.layer()
    }

    #[allow(clippy::cast_precision_loss)]
    fn render(&mut self, entity: &Entity, cx: &mut RenderContext<'_>) -> Result<(), RenderError> {
        check_category(entity, CATEGORIES)?;
        check_geometry(entity)?;
        let Shape::Table { rows, cols, cell_width, cell_height, cells } = &entity.shape else {
            return Err(RenderError::WrongCategory { id: entity.id.clone(), category: entity.category() });
        };
        let (rows, cols, cw, ch) = (*rows, *cols, *cell_width, *cell_height);
        if cw < 0.0 || ch < 0.0 {
            return Err(RenderError::InvalidGeometry { id: entity.id.clone(), reason: "negative cell size".into() });
        }
        if rows > MAX_TABLE_DIMENSION || cols > MAX_TABLE_DIMENSION {
            return Err(RenderError::InvalidGeometry {
                id: entity.id.clone(),
                reason: format!("{rows}x{cols} table exceeds {MAX_TABLE_DIMENSION} rows or columns"),
            });
        }
        let Some(group) = self.pool.begin_render(entity, cx, || NodeKind::Group) else {
            return Ok(());
        };
        let scene = &mut *cx.scene;
        scene.set_transform(group, entity_transform(entity));
        scene.clear_children(group);

        let width = cols as f64 * cw;
        let height = rows as f64 * ch;
        add_child(scene, group, NodeKind::Rect { width, height, corner_radius: 0.0 }, fill_paint(&entity.style));

        let grid = stroke_paint(&entity.style);
        for r in 1..rows {
            let y = r as f64 * ch;
            add_child(scene, group, NodeKind::Line { from: Point::new(0.0, y), to: Point::new(width, y) }, grid.clone());
        }
        for c in 1..cols {
            let x = c as f64 * cw;
            add_child(scene, group, NodeKind::Line { from: Point::new(x, 0.0), to: Point::new(x, height) }, grid.clone());
        }

        let font_size = entity.style.font_size.unwrap_or(DEFAULT_FONT_SIZE);
        let label_paint = Paint { fill: Some(entity.style.stroke().to_owned()), ..Paint::default() };
        for (r, row) in cells.iter().take(rows).enumerate() {
            for (c, text) in row.iter().take(cols).enumerate() {
                if text.is_empty() {
                    continue;
                }
                let label = add_child(
                    scene,
                    group,
                    NodeKind::Text { text: text.clone(), font_size, max_width: (cw - 2.0 * CELL_PADDING).max(0.0) },
                    label_paint.clone(),
                );
                scene.set_transform(
                    label,
                    NodeTransform::translate(c as f64 * cw + CELL_PADDING, r as f64 * ch + CELL_PADDING),
                );
            }
        }

        add_hit_region(scene, group, Rect::new(0.0, 0.0, width, height), HIT_REGION_SLOP);
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
