//! Document: the entity store paired with its history, as handed to tools.
//!
//! This is the whole mutation/query/history contract tool collaborators see.
//! It carries no scene-graph handle, so tools cannot bypass the store to
//! touch rendering state.

#[cfg(test)]
#[path = "document_test.rs"]
mod document_test;

use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::entity::{Entity, EntityId, EntityPatch};
use crate::history::{Command, History, HistoryError};
use crate::persist::BoardSnapshot;
use crate::store::{EntityStore, StoreError, StoreEvent, SubscriptionId};
use crate::viewport::{Viewport, ViewportPatch};

/// Store plus history. All mutations are synchronous and history-aware.
pub struct Document {
    store: EntityStore,
    history: History,
}

impl Document {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            store: EntityStore::new(config.min_scale, config.max_scale),
            history: History::new(config.history_limit),
        }
    }

    /// Read-only access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Read-only access to the history stacks.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    // --- Query API ---

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.store.get(id)
    }

    /// Entities back to front.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.store.entities()
    }

    #[must_use]
    pub fn z_order(&self) -> &[EntityId] {
        self.store.z_order()
    }

    #[must_use]
    pub fn selection(&self) -> &BTreeSet<EntityId> {
        self.store.selection()
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.store.viewport()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // --- Mutation API ---

    /// Insert or merge-patch an entity. Returns `true` if anything changed.
    pub fn upsert(&mut self, entity: Entity) -> bool {
        let command = self.store.upsert(entity);
        self.record("upsert", command)
    }

    /// Upsert a raw JSON record; omitted keys keep their stored values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record has no id or does not decode.
    pub fn upsert_record(&mut self, record: &Value) -> Result<bool, StoreError> {
        let command = self.store.upsert_record(record)?;
        Ok(self.record("upsert", command))
    }

    /// Patch an entity. Missing ids are a no-op returning `false`.
    pub fn update(&mut self, id: &EntityId, patch: EntityPatch) -> bool {
        let command = self.store.update(id, &patch);
        self.record("update", command)
    }

    /// Delete an entity and drop it from z-order and selection.
    pub fn remove(&mut self, id: &EntityId) -> bool {
        let command = self.store.remove(id);
        self.record("remove", command)
    }

    pub fn set_z_order(&mut self, ids: &[EntityId]) -> bool {
        let command = self.store.set_z_order(ids);
        self.record("reorder", command)
    }

    pub fn bring_to_front(&mut self, id: &EntityId) -> bool {
        let command = self.store.bring_to_front(id);
        self.record("bring to front", command)
    }

    pub fn send_to_back(&mut self, id: &EntityId) -> bool {
        let command = self.store.send_to_back(id);
        self.record("send to back", command)
    }

    pub fn set_selection<I>(&mut self, ids: I) -> bool
    where
        I: IntoIterator<Item = EntityId>,
    {
        let command = self.store.set_selection(ids);
        self.record("select", command)
    }

    /// Pan/zoom. Not recorded in history.
    pub fn set_viewport(&mut self, patch: ViewportPatch) -> bool {
        self.store.set_viewport(&patch)
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    fn record(&mut self, label: &str, command: Option<Command>) -> bool {
        match command {
            Some(command) => {
                self.history.record(label, command);
                true
            }
            None => false,
        }
    }

    // --- History API ---

    /// Run `f` as one undoable step labeled `label`.
    ///
    /// Reentrant: when a batch is already open, `f`'s mutations fold into it
    /// and `label` is discarded.
    pub fn with_undo<R, F>(&mut self, label: &str, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.begin_batch(label);
        let result = f(self);
        self.end_batch(true);
        result
    }

    /// Open (or nest into) a batch.
    pub fn begin_batch(&mut self, label: &str) {
        self.history.begin(label);
    }

    /// Close one nesting level. At the outermost level, `commit` seals the
    /// batch as one entry; otherwise its mutations are rolled back.
    ///
    /// Returns `true` when the outermost batch closed cleanly.
    pub fn end_batch(&mut self, commit: bool) -> bool {
        let Some((entry, commit)) = self.history.end(commit) else {
            return false;
        };
        if commit {
            self.history.seal(entry);
            return true;
        }
        match entry.revert(&mut self.store) {
            Ok(()) => {
                tracing::debug!(label = entry.label(), "batch rolled back");
                true
            }
            Err(e) => {
                self.history.fail(entry.label(), e);
                false
            }
        }
    }

    /// Revert the newest entry. Returns `true` if an entry was fully reverted.
    ///
    /// A no-op while a batch is open or when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        if self.history.is_batching() {
            tracing::warn!("undo ignored while a batch is open");
            return false;
        }
        let Some(entry) = self.history.pop_undo() else {
            return false;
        };
        match entry.revert(&mut self.store) {
            Ok(()) => {
                self.history.push_redo(entry);
                true
            }
            Err(e) => {
                self.history.fail(entry.label(), e);
                false
            }
        }
    }

    /// Re-apply the newest undone entry. Returns `true` on success.
    pub fn redo(&mut self) -> bool {
        if self.history.is_batching() {
            tracing::warn!("redo ignored while a batch is open");
            return false;
        }
        let Some(entry) = self.history.pop_redo() else {
            return false;
        };
        match entry.reapply(&mut self.store) {
            Ok(()) => {
                self.history.push_undo(entry);
                true
            }
            Err(e) => {
                self.history.fail(entry.label(), e);
                false
            }
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Why undo is unavailable, if a replay failed.
    #[must_use]
    pub fn history_fault(&self) -> Option<&HistoryError> {
        self.history.fault()
    }

    // --- Persistence ---

    /// Replace the board with a snapshot. Clears history.
    ///
    /// Entities that fail to decode (e.g. unknown categories) are skipped.
    /// Returns the number of skipped entities.
    pub fn load(&mut self, snapshot: &BoardSnapshot) -> usize {
        let (entities, skipped) = snapshot.decode_entities();
        let selection = snapshot.selection.clone().unwrap_or_default();
        let viewport = snapshot.viewport.unwrap_or_default();
        self.history.clear();
        self.store.reset(entities, snapshot.z_order.clone(), selection, viewport);
        skipped
    }

    /// Capture the current board in persisted layout.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot::capture(&self.store)
    }

    /// Restore store invariants; see [`EntityStore::repair`].
    pub(crate) fn repair(&mut self) -> usize {
        self.store.repair()
    }

    #[cfg(test)]
    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }
}
