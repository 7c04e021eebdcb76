//! Engine configuration parsed from environment variables or JSON.
//!
//! Everything here is tunable policy rather than invariant: zoom limits,
//! culling padding, history depth and the freehand-ink heuristics.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CULL_PADDING_PX, DEFAULT_HISTORY_LIMIT, DEFAULT_INK_MIN_LENGTH, DEFAULT_INK_PRESSURE_WIDTH,
    DEFAULT_MAX_SCALE, DEFAULT_MIN_ENTITY_SIZE, DEFAULT_MIN_SCALE,
};
use crate::viewport;

/// Errors produced while building or validating an [`EngineConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Parse { var: &'static str, value: String },

    /// The zoom range is empty or not positive.
    #[error("invalid scale range: min {min} max {max}")]
    ScaleRange { min: f64, max: f64 },

    /// A value that must be non-negative and finite was not.
    #[error("{field} must be a finite non-negative number, got {value}")]
    Negative { field: &'static str, value: f64 },

    /// History must retain at least one entry.
    #[error("history_limit must be at least 1")]
    EmptyHistory,

    /// A JSON config document could not be parsed.
    #[error("config json: {0}")]
    Json(String),
}

/// Freehand ink heuristics applied by the ink reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InkConfig {
    /// Strokes whose total path length is below this are not drawn.
    pub min_length: f64,
    /// Stroke width at full pressure; never thinner than the style stroke width.
    pub pressure_width: f64,
}

impl Default for InkConfig {
    fn default() -> Self {
        Self { min_length: DEFAULT_INK_MIN_LENGTH, pressure_width: DEFAULT_INK_PRESSURE_WIDTH }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lower bound for `Viewport::scale`.
    pub min_scale: f64,
    /// Upper bound for `Viewport::scale`.
    pub max_scale: f64,
    /// Screen-space padding around the visible rect used for culling.
    pub cull_padding_px: f64,
    /// Maximum retained undo entries.
    pub history_limit: usize,
    /// Smallest width/height a transform may shrink an entity to.
    pub min_entity_size: f64,
    /// Freehand ink heuristics.
    pub ink: InkConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            cull_padding_px: DEFAULT_CULL_PADDING_PX,
            history_limit: DEFAULT_HISTORY_LIMIT,
            min_entity_size: DEFAULT_MIN_ENTITY_SIZE,
            ink: InkConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// Optional:
    /// - `BOARD_MIN_SCALE` / `BOARD_MAX_SCALE`: zoom range (default 0.1 to 10)
    /// - `BOARD_CULL_PADDING`: culling padding in screen pixels (default 256)
    /// - `BOARD_HISTORY_LIMIT`: retained undo entries (default 200)
    /// - `BOARD_MIN_ENTITY_SIZE`: resize floor in world units (default 4)
    /// - `BOARD_INK_MIN_LENGTH`: tiny-stroke drop threshold (default 2)
    /// - `BOARD_INK_PRESSURE_WIDTH`: stroke width at full pressure (default 4)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for unparsable values and the
    /// validation errors of [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Build a config from an arbitrary key lookup (used by [`Self::from_env`]).
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            min_scale: parse_f64(&lookup, "BOARD_MIN_SCALE", defaults.min_scale)?,
            max_scale: parse_f64(&lookup, "BOARD_MAX_SCALE", defaults.max_scale)?,
            cull_padding_px: parse_f64(&lookup, "BOARD_CULL_PADDING", defaults.cull_padding_px)?,
            history_limit: parse_usize(&lookup, "BOARD_HISTORY_LIMIT", defaults.history_limit)?,
            min_entity_size: parse_f64(&lookup, "BOARD_MIN_ENTITY_SIZE", defaults.min_entity_size)?,
            ink: InkConfig {
                min_length: parse_f64(&lookup, "BOARD_INK_MIN_LENGTH", defaults.ink.min_length)?,
                pressure_width: parse_f64(&lookup, "BOARD_INK_PRESSURE_WIDTH", defaults.ink.pressure_width)?,
            },
        };
        config.validate()
    }

    /// Parse a JSON config document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON and the validation
    /// errors of [`EngineConfig::validate`].
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()
    }

    /// Check cross-field constraints, returning the config unchanged when valid.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(self) -> Result<Self, ConfigError> {
        let scale_ok = self.min_scale.is_finite()
            && self.max_scale.is_finite()
            && self.min_scale > 0.0
            && self.min_scale <= self.max_scale;
        if !scale_ok {
            return Err(ConfigError::ScaleRange { min: self.min_scale, max: self.max_scale });
        }
        non_negative("cull_padding_px", self.cull_padding_px)?;
        non_negative("min_entity_size", self.min_entity_size)?;
        non_negative("ink.min_length", self.ink.min_length)?;
        non_negative("ink.pressure_width", self.ink.pressure_width)?;
        if self.history_limit == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        Ok(self)
    }

    /// Clamp a zoom factor into the configured range.
    #[must_use]
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        viewport::clamp_scale(scale, self.min_scale, self.max_scale)
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn parse_f64<F>(lookup: &F, var: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::Parse { var, value: raw }),
    }
}

fn parse_usize<F>(lookup: &F, var: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::Parse { var, value: raw }),
    }
}
