use std::collections::HashMap;

use kurbo::{Point, Rect};

use super::{
    NodePool, Reconciler, RenderContext, RenderError, add_child, add_hit_region, bind_entity, check_category,
    check_geometry, entity_transform, fill_paint, stroke_paint,
};
use crate::consts::{DEFAULT_FONT_SIZE, HIT_REGION_SLOP, NODE_CORNER_RADIUS};
use crate::entity::{Category, Entity, EntityId, Shape};
use crate::scene::{LayerKind, NodeId, NodeKind, NodeTransform, Paint, SceneGraph};

const CATEGORIES: &[Category] = &[Category::Node];

const LABEL_PADDING: f64 = 8.0;

/// One connector line, keyed by the child it points at.
#[derive(Debug, Clone, Copy)]
struct Connector {
    node: NodeId,
}

/// Mind-map nodes plus the connector lines between parents and children.
///
/// Connectors sit directly on the content layer. Restacking lists only
/// primary nodes, so connectors stay behind every entity. Both endpoints
/// redraw the connector: a parent for each of its children, a child for the
/// link to its parent.
#[derive(Debug)]
pub struct NodeReconciler {
    pool: NodePool,
    connectors: HashMap<EntityId, (EntityId, Connector)>,
}

impl NodeReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self { pool: NodePool::new(LayerKind::Content), connectors: HashMap::new() }
    }

    /// Number of live connector lines.
    #[must_use]
    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    /// Draw or update the connector from `parent` to `child`. Drops it when
    /// either end is missing.
    fn link(&mut self, parent: &EntityId, child: &EntityId, cx: &mut RenderContext<'_>) {
        let ends = cx.store.get(parent).zip(cx.store.get(child));
        let Some((p, c)) = ends else {
            self.unlink(child, cx.scene);
            return;
        };
        let from = anchor(p.local_bounds(), true);
        let to = anchor(c.local_bounds(), false);
        let layer = cx.scene.layer_node(self.pool.layer());

        let existing = self.connectors.get(child).filter(|(owner, conn)| {
            owner == parent && cx.scene.get(conn.node).is_some_and(|n| n.parent() == Some(layer))
        });
        let node = if let Some((_, conn)) = existing {
            conn.node
        } else {
            self.unlink(child, cx.scene);
            let node = cx.scene.create(NodeKind::Line { from, to });
            cx.scene.append_child(layer, node);
            self.connectors.insert(child.clone(), (parent.clone(), Connector { node }));
            node
        };
        cx.scene.set_kind(node, NodeKind::Line { from, to });
        cx.scene.set_paint(node, stroke_paint(&p.style));
    }

    fn unlink(&mut self, child: &EntityId, scene: &mut SceneGraph) {
        if let Some((_, conn)) = self.connectors.remove(child) {
            scene.destroy(conn.node);
        }
    }
}

impl Default for NodeReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Right-centre of a parent box or left-centre of a child box.
fn anchor(bounds: Rect, outgoing: bool) -> Point {
    let x = if outgoing { bounds.x1 } else { bounds.x0 };
    Point::new(x, bounds.center().y)
}

impl Reconciler for NodeReconciler {
    fn name(&self) -> &'static str {
        "node"
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
        let Shape::Node { width, height, text, parent, children } = &entity.shape else {
            return Err(RenderError::WrongCategory { id: entity.id.clone(), category: entity.category() });
        };

        if let Some(group) = self.pool.begin_render(entity, cx, || NodeKind::Group) {
            let scene = &mut *cx.scene;
            scene.set_transform(group, entity_transform(entity));
            scene.clear_children(group);
            add_child(
                scene,
                group,
                NodeKind::Rect { width: *width, height: *height, corner_radius: NODE_CORNER_RADIUS },
                fill_paint(&entity.style),
            );
            let font_size = entity.style.font_size.unwrap_or(DEFAULT_FONT_SIZE);
            let label = add_child(
                scene,
                group,
                NodeKind::Text {
                    text: text.clone(),
                    font_size,
                    max_width: (width - 2.0 * LABEL_PADDING).max(0.0),
                },
                Paint { fill: Some(entity.style.stroke().to_owned()), ..Paint::default() },
            );
            scene.set_transform(label, NodeTransform::translate(LABEL_PADDING, LABEL_PADDING));
            add_hit_region(scene, group, Rect::new(0.0, 0.0, *width, *height).abs(), HIT_REGION_SLOP);
            bind_entity(scene, group, true);
        }

        // Connectors are cheap lines; they follow the hierarchy even when culled.
        match parent {
            Some(p) => self.link(p, &entity.id, cx),
            None => self.unlink(&entity.id, cx.scene),
        }
        for child in children {
            self.link(&entity.id, child, cx);
        }
        let dropped: Vec<EntityId> = self
            .connectors
            .iter()
            .filter(|(child, (owner, _))| *owner == entity.id && !children.contains(*child))
            .map(|(child, _)| child.clone())
            .collect();
        for child in dropped {
            // Child still names this parent; its own render relinks it.
            if !cx.store.get(&child).is_some_and(|c| names_parent(c, &entity.id)) {
                self.unlink(&child, cx.scene);
            }
        }
        Ok(())
    }

    fn remove(&mut self, id: &EntityId, scene: &mut SceneGraph) -> bool {
        let linked: Vec<EntityId> = self
            .connectors
            .iter()
            .filter(|(child, (owner, _))| *child == id || owner == id)
            .map(|(child, _)| child.clone())
            .collect();
        for child in &linked {
            self.unlink(child, scene);
        }
        self.pool.remove(id, scene)
    }

    fn clear(&mut self, scene: &mut SceneGraph) {
        for (_, (_, conn)) in self.connectors.drain() {
            scene.destroy(conn.node);
        }
        self.pool.clear(scene);
    }

    fn primary_node(&self, id: &EntityId) -> Option<NodeId> {
        self.pool.get(id)
    }

    fn node_count(&self) -> usize {
        self.pool.len()
    }
}

fn names_parent(entity: &Entity, parent: &EntityId) -> bool {
    matches!(&entity.shape, Shape::Node { parent: Some(p), .. } if p == parent)
}
