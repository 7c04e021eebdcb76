//! Entity model: canvas objects, their categories, styles and sparse patches.
//!
//! This module defines what lives in the store (`Entity`, `Shape`), the
//! sparse-update type used by `update` (`EntityPatch`), and the merge rules
//! used by `upsert` on an existing id. Data flows into this layer from tools
//! (mutations) and from persisted snapshots (JSON deserialization). The
//! reconcilers read entities to build scene nodes.

#[cfg(test)]
#[path = "entity_test.rs"]
mod entity_test;

use std::borrow::Borrow;
use std::fmt;

use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::consts::DEFAULT_INK_PRESSURE;

/// Stable identifier for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The category of an entity; each category is drawn by one reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Axis-aligned rectangle.
    Rect,
    /// Ellipse inscribed within the bounding box.
    Ellipse,
    /// Circle described by centre and radius.
    Circle,
    /// Free-standing text box.
    Text,
    /// Sticky note: filled box with wrapped text.
    Note,
    /// Freehand pen stroke.
    Ink,
    /// Grid of text cells.
    Table,
    /// Mind-map node linked to a parent and children.
    Node,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 8] = [
        Self::Rect,
        Self::Ellipse,
        Self::Circle,
        Self::Text,
        Self::Note,
        Self::Ink,
        Self::Table,
        Self::Node,
    ];

    /// Wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Ellipse => "ellipse",
            Self::Circle => "circle",
            Self::Text => "text",
            Self::Note => "note",
            Self::Ink => "ink",
            Self::Table => "table",
            Self::Node => "node",
        }
    }
}

/// One sampled point of a freehand stroke, relative to the entity origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkPoint {
    pub x: f64,
    pub y: f64,
    /// Pen pressure in `0.0..=1.0`.
    #[serde(default = "default_pressure")]
    pub pressure: f64,
}

impl InkPoint {
    #[must_use]
    pub fn new(x: f64, y: f64, pressure: f64) -> Self {
        Self { x, y, pressure }
    }
}

fn default_pressure() -> f64 {
    DEFAULT_INK_PRESSURE
}

/// Category-specific payload. Serialized with an inline `"category"` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum Shape {
    Rect {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
    },
    Ellipse {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
    },
    /// `x`/`y` of the owning entity is the centre.
    Circle {
        #[serde(default)]
        radius: f64,
    },
    Text {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
        #[serde(default)]
        text: String,
    },
    Note {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
        #[serde(default)]
        text: String,
    },
    /// Points are relative to the owning entity's `x`/`y`.
    Ink {
        #[serde(default)]
        points: Vec<InkPoint>,
    },
    Table {
        #[serde(default)]
        rows: usize,
        #[serde(default)]
        cols: usize,
        #[serde(default)]
        cell_width: f64,
        #[serde(default)]
        cell_height: f64,
        /// Row-major cell text; short rows read as empty cells.
        #[serde(default)]
        cells: Vec<Vec<String>>,
    },
    Node {
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<EntityId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<EntityId>,
    },
}

impl Shape {
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Rect { .. } => Category::Rect,
            Self::Ellipse { .. } => Category::Ellipse,
            Self::Circle { .. } => Category::Circle,
            Self::Text { .. } => Category::Text,
            Self::Note { .. } => Category::Note,
            Self::Ink { .. } => Category::Ink,
            Self::Table { .. } => Category::Table,
            Self::Node { .. } => Category::Node,
        }
    }

    /// Width and height of the local box, or `None` for centre/point based shapes.
    #[must_use]
    pub fn box_size(&self) -> Option<(f64, f64)> {
        match self {
            Self::Rect { width, height }
            | Self::Ellipse { width, height }
            | Self::Text { width, height, .. }
            | Self::Note { width, height, .. }
            | Self::Node { width, height, .. } => Some((*width, *height)),
            #[allow(clippy::cast_precision_loss)]
            Self::Table { rows, cols, cell_width, cell_height, .. } => {
                Some((*cols as f64 * cell_width, *rows as f64 * cell_height))
            }
            Self::Circle { .. } | Self::Ink { .. } => None,
        }
    }

    /// Label text carried by the shape, if the category has one.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } | Self::Note { text, .. } | Self::Node { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Visual style. Absent fields fall back to the accessor defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

impl Style {
    /// Fill color as a CSS color string. Defaults to `"#D94B4B"` when absent.
    #[must_use]
    pub fn fill(&self) -> &str {
        self.fill.as_deref().unwrap_or("#D94B4B")
    }

    /// Stroke color as a CSS color string. Defaults to `"#1F1A17"` when absent.
    #[must_use]
    pub fn stroke(&self) -> &str {
        self.stroke.as_deref().unwrap_or("#1F1A17")
    }

    /// Stroke width in world units. Defaults to `1.0` when absent.
    #[must_use]
    pub fn stroke_width(&self) -> f64 {
        self.stroke_width.unwrap_or(1.0)
    }

    /// Opacity in `0.0..=1.0`. Defaults to fully opaque.
    #[must_use]
    pub fn opacity(&self) -> f64 {
        self.opacity.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    /// Overlay every field `other` sets onto `self`.
    pub fn merge(&mut self, other: &Style) {
        if let Some(fill) = &other.fill {
            self.fill = Some(fill.clone());
        }
        if let Some(stroke) = &other.stroke {
            self.stroke = Some(stroke.clone());
        }
        if let Some(w) = other.stroke_width {
            self.stroke_width = Some(w);
        }
        if let Some(o) = other.opacity {
            self.opacity = Some(o);
        }
        if let Some(s) = other.font_size {
            self.font_size = Some(s);
        }
    }
}

/// A canvas entity as stored in the board and in persisted snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier.
    pub id: EntityId,
    /// Left edge of the box (centre for circles, origin for ink) in world coordinates.
    #[serde(default)]
    pub x: f64,
    /// Top edge of the box (centre for circles, origin for ink) in world coordinates.
    #[serde(default)]
    pub y: f64,
    /// Clockwise rotation in degrees around the bounds centre.
    #[serde(default)]
    pub rotation: f64,
    /// Category and payload.
    #[serde(flatten)]
    pub shape: Shape,
    #[serde(default)]
    pub style: Style,
    /// Open-ended collaborator data; merged key-wise, null values delete keys.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub props: Value,
}

impl Entity {
    /// Create an entity with default style and no props.
    #[must_use]
    pub fn new(id: impl Into<EntityId>, x: f64, y: f64, shape: Shape) -> Self {
        Self { id: id.into(), x, y, rotation: 0.0, shape, style: Style::default(), props: Value::Null }
    }

    /// Shorthand for a rectangle.
    #[must_use]
    pub fn rect(id: impl Into<EntityId>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(id, x, y, Shape::Rect { width, height })
    }

    /// Shorthand for a circle centred on `(cx, cy)`.
    #[must_use]
    pub fn circle(id: impl Into<EntityId>, cx: f64, cy: f64, radius: f64) -> Self {
        Self::new(id, cx, cy, Shape::Circle { radius })
    }

    /// Shorthand for a sticky note.
    #[must_use]
    pub fn note(id: impl Into<EntityId>, x: f64, y: f64, width: f64, height: f64, text: &str) -> Self {
        Self::new(id, x, y, Shape::Note { width, height, text: text.to_owned() })
    }

    /// Shorthand for a freehand stroke.
    #[must_use]
    pub fn ink(id: impl Into<EntityId>, x: f64, y: f64, points: Vec<InkPoint>) -> Self {
        Self::new(id, x, y, Shape::Ink { points })
    }

    #[must_use]
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = degrees;
        self
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.shape.category()
    }

    /// Unrotated bounds in world coordinates.
    #[must_use]
    pub fn local_bounds(&self) -> Rect {
        match &self.shape {
            Shape::Circle { radius } => {
                let r = radius.abs();
                Rect::new(self.x - r, self.y - r, self.x + r, self.y + r)
            }
            Shape::Ink { points } => ink_extent(points).map_or(Rect::new(self.x, self.y, self.x, self.y), |r| {
                Rect::new(r.x0 + self.x, r.y0 + self.y, r.x1 + self.x, r.y1 + self.y)
            }),
            shape => {
                let (w, h) = shape.box_size().unwrap_or((0.0, 0.0));
                Rect::new(self.x, self.y, self.x + w, self.y + h).abs()
            }
        }
    }

    /// Centre of the unrotated bounds; the rotation pivot.
    #[must_use]
    pub fn center(&self) -> Point {
        self.local_bounds().center()
    }

    /// Axis-aligned bounds after rotation, in world coordinates.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        let local = self.local_bounds();
        if self.rotation == 0.0 {
            return local;
        }
        Affine::rotate_about(self.rotation.to_radians(), local.center()).transform_rect_bbox(local)
    }

    /// Merge an incoming full record into this one (`upsert` on an existing id).
    ///
    /// Geometry and payload come from `incoming`; style fields merge with
    /// `incoming` winning; `props` merge key-wise with null deleting.
    pub fn merge_from(&mut self, incoming: Entity) {
        self.x = incoming.x;
        self.y = incoming.y;
        self.rotation = incoming.rotation;
        self.shape = incoming.shape;
        self.style.merge(&incoming.style);
        merge_props(&mut self.props, &incoming.props);
    }

    /// Merge a sparse JSON record over this entity at the field level.
    ///
    /// Keys the record omits keep their current value; `style` and `props`
    /// merge key-wise (null deletes); `id` is ignored. A record naming a
    /// different `category` drops the current payload, keeping position,
    /// rotation, style and props.
    ///
    /// # Errors
    ///
    /// Returns the decode error if `record` is not an object or the merged
    /// record is not a valid entity.
    pub fn merged_with(&self, record: &Value) -> Result<Entity, serde_json::Error> {
        let Some(incoming) = record.as_object() else {
            return Err(serde::de::Error::custom("entity record must be a JSON object"));
        };
        let Value::Object(mut base) = serde_json::to_value(self)? else {
            return Err(serde::de::Error::custom("entity did not serialize to an object"));
        };
        let category = self.category().as_str();
        if incoming.get("category").is_some_and(|c| c.as_str() != Some(category)) {
            base.retain(|key, _| COMMON_KEYS.contains(&key.as_str()));
        }
        for (key, value) in incoming {
            match key.as_str() {
                "id" => {}
                "style" | "props" => merge_props(base.entry(key.clone()).or_insert(Value::Null), value),
                _ => {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        serde_json::from_value(Value::Object(base))
    }

    /// Apply a sparse patch. Fields that do not fit the category are ignored.
    pub fn apply_patch(&mut self, patch: &EntityPatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(r) = patch.rotation {
            self.rotation = r;
        }
        match &mut self.shape {
            Shape::Rect { width, height } | Shape::Ellipse { width, height } => {
                patch_size(width, height, patch);
            }
            Shape::Text { width, height, text } | Shape::Note { width, height, text } => {
                patch_size(width, height, patch);
                if let Some(t) = &patch.text {
                    text.clone_from(t);
                }
            }
            Shape::Node { width, height, text, parent, children } => {
                patch_size(width, height, patch);
                if let Some(t) = &patch.text {
                    text.clone_from(t);
                }
                if let Some(p) = &patch.parent {
                    *parent = Some(p.clone());
                }
                if let Some(c) = &patch.children {
                    children.clone_from(c);
                }
            }
            Shape::Circle { radius } => {
                if let Some(r) = patch.radius {
                    *radius = r;
                }
            }
            Shape::Ink { points } => {
                if let Some(p) = &patch.points {
                    points.clone_from(p);
                }
            }
            Shape::Table { cell_width, cell_height, cells, .. } => {
                if let Some(w) = patch.cell_width {
                    *cell_width = w;
                }
                if let Some(h) = patch.cell_height {
                    *cell_height = h;
                }
                if let Some(c) = &patch.cells {
                    cells.clone_from(c);
                }
            }
        }
        if let Some(style) = &patch.style {
            self.style.merge(style);
        }
        if let Some(props) = &patch.props {
            merge_props(&mut self.props, props);
        }
    }
}

/// Record keys shared by every category.
const COMMON_KEYS: [&str; 6] = ["id", "x", "y", "rotation", "style", "props"];

fn patch_size(width: &mut f64, height: &mut f64, patch: &EntityPatch) {
    if let Some(w) = patch.width {
        *width = w;
    }
    if let Some(h) = patch.height {
        *height = h;
    }
}

/// Bounding box of ink points in the stroke's local space.
#[must_use]
pub fn ink_extent(points: &[InkPoint]) -> Option<Rect> {
    let first = points.first()?;
    let mut rect = Rect::new(first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        rect = rect.union_pt(Point::new(p.x, p.y));
    }
    Some(rect)
}

/// Total polyline length of a stroke.
#[must_use]
pub fn ink_length(points: &[InkPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
        .sum()
}

/// Merge `incoming` props into `existing`. Null values delete keys.
///
/// Non-object `incoming` values are ignored; a non-object `existing` value is
/// replaced by an empty object before merging.
pub fn merge_props(existing: &mut Value, incoming: &Value) {
    let Some(incoming) = incoming.as_object() else {
        return;
    };
    if !existing.is_object() {
        *existing = Value::Object(serde_json::Map::new());
    }
    if let Some(target) = existing.as_object_mut() {
        for (k, v) in incoming {
            if v.is_null() {
                target.remove(k);
            } else {
                target.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Sparse update for an entity. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// Box width (rect, ellipse, text, note, node).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Box height (rect, ellipse, text, note, node).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Circle radius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    /// Label text (text, note, node).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Replacement stroke points (ink).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<InkPoint>>,
    /// Table cell size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_height: Option<f64>,
    /// Replacement cell grid (table).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<Vec<String>>>,
    /// New parent link (node).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityId>,
    /// Replacement child links (node).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<EntityId>>,
    /// Style fields to overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    /// Props keys to merge or remove (null values delete keys).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
}

impl EntityPatch {
    /// Patch moving the entity to `(x, y)`.
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    /// Patch replacing the label text.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self { text: Some(text.to_owned()), ..Self::default() }
    }
}
