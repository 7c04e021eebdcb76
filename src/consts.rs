//! Shared numeric constants for the engine.

// ── Viewport ────────────────────────────────────────────────────

/// Smallest zoom factor accepted by default.
pub const DEFAULT_MIN_SCALE: f64 = 0.1;

/// Largest zoom factor accepted by default.
pub const DEFAULT_MAX_SCALE: f64 = 10.0;

/// Screen-space padding around the visible area inside which entities still
/// count as on-screen for culling.
pub const DEFAULT_CULL_PADDING_PX: f64 = 256.0;

// ── History ─────────────────────────────────────────────────────

/// Maximum number of undo entries retained by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Label used for mutations recorded outside an explicit batch.
pub const IMPLICIT_LABEL: &str = "edit";

// ── Ink ─────────────────────────────────────────────────────────

/// Strokes with a path length below this (world units) are not drawn.
pub const DEFAULT_INK_MIN_LENGTH: f64 = 2.0;

/// Stroke width at full pen pressure; never thinner than the style stroke width.
pub const DEFAULT_INK_PRESSURE_WIDTH: f64 = 4.0;

/// Pressure assumed for points recorded without one.
pub const DEFAULT_INK_PRESSURE: f64 = 0.5;

// ── Geometry / hit-testing ──────────────────────────────────────

/// Minimum width/height an entity can be resized to, in world units.
pub const DEFAULT_MIN_ENTITY_SIZE: f64 = 4.0;

/// Screen-space hit slop in pixels for transform handles.
pub const HANDLE_RADIUS_PX: f64 = 8.0;

/// Distance from the selection box edge to the rotate handle, in screen pixels.
pub const ROTATE_HANDLE_OFFSET_PX: f64 = 24.0;

/// World-space padding of the invisible hit region drawn behind each entity.
pub const HIT_REGION_SLOP: f64 = 6.0;

/// Corner radius of mind-map node boxes.
pub const NODE_CORNER_RADIUS: f64 = 8.0;

/// Default label font size when the style does not set one.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;

/// Largest row or column count a table renders; each one adds a grid line.
pub const MAX_TABLE_DIMENSION: usize = 1_000;
