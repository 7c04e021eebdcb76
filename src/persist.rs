//! Persisted board layout.
//!
//! ```json
//! {
//!   "entities": { "<id>": { "category": "rect", "x": 0, ... } },
//!   "z_order": ["<id>", ...],
//!   "selection": ["<id>", ...],
//!   "viewport": { "x": 0, "y": 0, "scale": 1 }
//! }
//! ```
//!
//! Loading is tolerant: missing fields default, unknown fields are ignored,
//! and an entity that fails to decode is skipped with a warning instead of
//! failing the whole board. Z-order and selection are repaired by the store.

#[cfg(test)]
#[path = "persist_test.rs"]
mod persist_test;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{Entity, EntityId};
use crate::store::EntityStore;
use crate::viewport::Viewport;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("invalid board json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized board state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    #[serde(default)]
    pub entities: Map<String, Value>,
    #[serde(default, alias = "zOrder")]
    pub z_order: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

impl BoardSnapshot {
    /// Parse a snapshot from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Json`] if `raw` is not a JSON object of the
    /// expected shape. Individual bad entities are not errors.
    pub fn from_json(raw: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Capture `store` in persisted layout.
    #[must_use]
    pub fn capture(store: &EntityStore) -> Self {
        let mut entities = Map::new();
        for entity in store.entities() {
            match serde_json::to_value(entity) {
                Ok(value) => {
                    entities.insert(entity.id.to_string(), value);
                }
                Err(e) => tracing::warn!(entity = %entity.id, error = %e, "entity not serializable; left out of snapshot"),
            }
        }
        Self {
            entities,
            z_order: store.z_order().to_vec(),
            selection: Some(store.selection().iter().cloned().collect()),
            viewport: Some(store.viewport()),
        }
    }

    /// Decode the entity map. Returns the decoded entities (in map order) and
    /// the number skipped.
    ///
    /// The map key is the authoritative id and overrides any `id` field in
    /// the record.
    #[must_use]
    pub fn decode_entities(&self) -> (Vec<Entity>, usize) {
        let mut out = Vec::with_capacity(self.entities.len());
        let mut skipped = 0;
        for (key, raw) in &self.entities {
            let mut raw = raw.clone();
            if let Some(obj) = raw.as_object_mut() {
                obj.insert("id".to_owned(), Value::String(key.clone()));
            }
            match serde_json::from_value::<Entity>(raw) {
                Ok(entity) => out.push(entity),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(entity = %key, error = %e, "skipping undecodable entity");
                }
            }
        }
        (out, skipped)
    }
}
