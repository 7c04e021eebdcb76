//! Entity store: the canonical board state.
//!
//! The store owns the entity map, the z-order list, the selection set and the
//! viewport. Every mutating method is synchronous, touches only store state,
//! and returns the [`Command`] describing what changed so the history engine
//! can record it. Subscribers are notified after each mutation has fully
//! applied, so they never observe a half-cascaded state (e.g. an entity gone
//! from the map but still selected).
//!
//! Missing ids are never errors: `update`/`remove` on an unknown id return
//! `None` and leave the store untouched.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;

use crate::entity::{Category, Entity, EntityId, EntityPatch};
use crate::history::{Command, EntityDelta, HistoryError, ListDelta};
use crate::viewport::{Viewport, ViewportPatch, scale_range};

/// Rejection of a raw entity record.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entity record has no string id")]
    MissingId,
    #[error("invalid entity record: {0}")]
    Json(#[from] serde_json::Error),
}

/// A change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// An entity was created or modified.
    EntityChanged { id: EntityId, category: Category },
    /// An entity was deleted.
    EntityRemoved { id: EntityId, category: Category },
    /// The z-order list changed.
    ZOrderChanged,
    /// The selection set changed.
    SelectionChanged,
    /// The viewport changed; carries the new value.
    ViewportChanged(Viewport),
    /// The whole store was replaced (snapshot load).
    Reset,
}

/// Handle returned by [`EntityStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&StoreEvent)>;

/// In-memory store of board state.
pub struct EntityStore {
    entities: HashMap<EntityId, Entity>,
    z_order: Vec<EntityId>,
    selection: BTreeSet<EntityId>,
    viewport: Viewport,
    min_scale: f64,
    max_scale: f64,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl EntityStore {
    /// Create an empty store whose viewport scale is clamped to `[min_scale, max_scale]`.
    ///
    /// An inverted or non-finite range is normalized rather than rejected.
    #[must_use]
    pub fn new(min_scale: f64, max_scale: f64) -> Self {
        let (lo, hi) = scale_range(min_scale, max_scale);
        let valid = min_scale.is_finite() && max_scale.is_finite() && min_scale > 0.0 && min_scale <= max_scale;
        if !valid {
            tracing::warn!(min_scale, max_scale, lo, hi, "invalid viewport scale range normalized");
        }
        Self {
            entities: HashMap::new(),
            z_order: Vec::new(),
            selection: BTreeSet::new(),
            viewport: Viewport::default(),
            min_scale: lo,
            max_scale: hi,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Entities in paint order, back to front.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.z_order.iter().filter_map(|id| self.entities.get(id))
    }

    #[must_use]
    pub fn z_order(&self) -> &[EntityId] {
        &self.z_order
    }

    #[must_use]
    pub fn selection(&self) -> &BTreeSet<EntityId> {
        &self.selection
    }

    #[must_use]
    pub fn is_selected(&self, id: &EntityId) -> bool {
        self.selection.contains(id)
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn scale_range(&self) -> (f64, f64) {
        (self.min_scale, self.max_scale)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // --- Subscription ---

    /// Register a listener called synchronously after every state change.
    ///
    /// Listeners receive only the event; they cannot reach back into the store.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, events: &[StoreEvent]) {
        for event in events {
            for (_, listener) in &mut self.listeners {
                listener(event);
            }
        }
    }

    // --- Mutations ---

    /// Insert a new entity, or merge-patch an existing one.
    ///
    /// New entities are appended to the top of the z-order.
    pub fn upsert(&mut self, entity: Entity) -> Option<Command> {
        match self.entities.get(&entity.id) {
            Some(existing) => {
                let mut after = existing.clone();
                after.merge_from(entity);
                self.replace_entity(after)
            }
            None => Some(self.insert_entity(entity)),
        }
    }

    /// Upsert from a raw JSON record, merging at the field level.
    ///
    /// Keys the record omits keep their stored values (see
    /// [`Entity::merged_with`]); a record for an unknown id must decode as a
    /// full entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingId`] when the record has no string `id`;
    /// [`StoreError::Json`] when the merged record is not a valid entity.
    pub fn upsert_record(&mut self, record: &Value) -> Result<Option<Command>, StoreError> {
        let id = record.get("id").and_then(Value::as_str).ok_or(StoreError::MissingId)?;
        match self.entities.get(id) {
            Some(existing) => {
                let after = existing.merged_with(record)?;
                Ok(self.replace_entity(after))
            }
            None => {
                let entity: Entity = serde_json::from_value(record.clone())?;
                Ok(Some(self.insert_entity(entity)))
            }
        }
    }

    fn replace_entity(&mut self, after: Entity) -> Option<Command> {
        let id = after.id.clone();
        let before = self.entities.get(&id)?.clone();
        if after == before {
            return None;
        }
        let category = after.category();
        self.entities.insert(id.clone(), after.clone());
        self.emit(&[StoreEvent::EntityChanged { id: id.clone(), category }]);
        Some(Command::entity(EntityDelta::new(id, Some(before), Some(after))))
    }

    fn insert_entity(&mut self, entity: Entity) -> Command {
        let id = entity.id.clone();
        let category = entity.category();
        let z_before = self.z_order.clone();
        self.entities.insert(id.clone(), entity.clone());
        self.z_order.push(id.clone());
        let z_after = self.z_order.clone();
        self.emit(&[StoreEvent::EntityChanged { id: id.clone(), category }, StoreEvent::ZOrderChanged]);
        Command::entity(EntityDelta::new(id, None, Some(entity))).with_z_order(ListDelta::new(z_before, z_after))
    }

    /// Apply a sparse patch to an existing entity. Missing ids are a no-op.
    pub fn update(&mut self, id: &EntityId, patch: &EntityPatch) -> Option<Command> {
        let existing = self.entities.get_mut(id)?;
        let before = existing.clone();
        existing.apply_patch(patch);
        if *existing == before {
            return None;
        }
        let after = existing.clone();
        let category = after.category();
        self.emit(&[StoreEvent::EntityChanged { id: id.clone(), category }]);
        Some(Command::entity(EntityDelta::new(id.clone(), Some(before), Some(after))))
    }

    /// Delete an entity, cascading through z-order and selection atomically.
    pub fn remove(&mut self, id: &EntityId) -> Option<Command> {
        let before = self.entities.remove(id)?;
        let category = before.category();

        let z_before = self.z_order.clone();
        self.z_order.retain(|z| z != id);
        let mut command = Command::entity(EntityDelta::new(id.clone(), Some(before), None))
            .with_z_order(ListDelta::new(z_before, self.z_order.clone()));

        let mut events = vec![StoreEvent::EntityRemoved { id: id.clone(), category }, StoreEvent::ZOrderChanged];
        if self.selection.contains(id) {
            let sel_before = self.selection_vec();
            self.selection.remove(id);
            command = command.with_selection(ListDelta::new(sel_before, self.selection_vec()));
            events.push(StoreEvent::SelectionChanged);
        }
        self.emit(&events);
        Some(command)
    }

    /// Replace the z-order.
    ///
    /// Unknown ids and duplicates are dropped; live ids the caller omitted
    /// are appended after the listed ones in their previous relative order.
    pub fn set_z_order(&mut self, ids: &[EntityId]) -> Option<Command> {
        let mut seen = HashSet::new();
        let mut next: Vec<EntityId> = Vec::with_capacity(self.z_order.len());
        for id in ids {
            if self.entities.contains_key(id) && seen.insert(id.clone()) {
                next.push(id.clone());
            }
        }
        for id in &self.z_order {
            if seen.insert(id.clone()) {
                next.push(id.clone());
            }
        }
        self.replace_z_order(next)
    }

    /// Move an entity to the top of the z-order.
    pub fn bring_to_front(&mut self, id: &EntityId) -> Option<Command> {
        if !self.entities.contains_key(id) {
            return None;
        }
        let mut next: Vec<EntityId> = self.z_order.iter().filter(|z| *z != id).cloned().collect();
        next.push(id.clone());
        self.replace_z_order(next)
    }

    /// Move an entity to the bottom of the z-order.
    pub fn send_to_back(&mut self, id: &EntityId) -> Option<Command> {
        if !self.entities.contains_key(id) {
            return None;
        }
        let mut next = Vec::with_capacity(self.z_order.len());
        next.push(id.clone());
        next.extend(self.z_order.iter().filter(|z| *z != id).cloned());
        self.replace_z_order(next)
    }

    fn replace_z_order(&mut self, next: Vec<EntityId>) -> Option<Command> {
        if next == self.z_order {
            return None;
        }
        let before = std::mem::replace(&mut self.z_order, next);
        self.emit(&[StoreEvent::ZOrderChanged]);
        Some(Command::default().with_z_order(ListDelta::new(before, self.z_order.clone())))
    }

    /// Replace the selection. Ids that are not live are dropped.
    pub fn set_selection<I>(&mut self, ids: I) -> Option<Command>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let next: BTreeSet<EntityId> = ids.into_iter().filter(|id| self.entities.contains_key(id)).collect();
        if next == self.selection {
            return None;
        }
        let before = self.selection_vec();
        self.selection = next;
        self.emit(&[StoreEvent::SelectionChanged]);
        Some(Command::default().with_selection(ListDelta::new(before, self.selection_vec())))
    }

    /// Merge a viewport patch. Returns `true` if the viewport changed.
    ///
    /// Viewport state is navigation, not document content, so no command is
    /// produced.
    pub fn set_viewport(&mut self, patch: &ViewportPatch) -> bool {
        let next = self.viewport.patched(patch, self.min_scale, self.max_scale);
        if next == self.viewport {
            return false;
        }
        self.viewport = next;
        self.emit(&[StoreEvent::ViewportChanged(next)]);
        true
    }

    /// Replace the whole state (snapshot load). Invariants are repaired before
    /// the single `Reset` notification.
    pub fn reset(&mut self, entities: Vec<Entity>, z_order: Vec<EntityId>, selection: Vec<EntityId>, viewport: Viewport) {
        self.entities = entities.into_iter().map(|e| (e.id.clone(), e)).collect();
        self.z_order = z_order;
        self.selection = selection.into_iter().collect();
        self.viewport = self.viewport.patched(&viewport.into(), self.min_scale, self.max_scale);
        let corrections = self.fix_invariants();
        if corrections > 0 {
            tracing::debug!(corrections, "snapshot repaired on load");
        }
        self.emit(&[StoreEvent::Reset]);
    }

    /// Restore z-order/selection invariants after an inconsistent state
    /// (caller bug or partial history replay). Returns the number of fixes.
    pub fn repair(&mut self) -> usize {
        let z_before = self.z_order.clone();
        let sel_before = self.selection.clone();
        let corrections = self.fix_invariants();
        if corrections > 0 {
            tracing::debug!(corrections, "store invariants repaired");
            let mut events = Vec::new();
            if self.z_order != z_before {
                events.push(StoreEvent::ZOrderChanged);
            }
            if self.selection != sel_before {
                events.push(StoreEvent::SelectionChanged);
            }
            self.emit(&events);
        }
        corrections
    }

    fn fix_invariants(&mut self) -> usize {
        let mut corrections = 0;
        let mut seen = HashSet::new();
        let before_len = self.z_order.len();
        let entities = &self.entities;
        self.z_order.retain(|id| entities.contains_key(id) && seen.insert(id.clone()));
        corrections += before_len - self.z_order.len();

        let mut missing: Vec<&EntityId> = self.entities.keys().filter(|id| !seen.contains(*id)).collect();
        missing.sort();
        corrections += missing.len();
        self.z_order.extend(missing.into_iter().cloned());

        let sel_len = self.selection.len();
        self.selection.retain(|id| entities.contains_key(id));
        corrections += sel_len - self.selection.len();
        corrections
    }

    /// Check the z-order/selection invariants without changing anything.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        let z_ok = self.z_order.len() == self.entities.len()
            && self.z_order.iter().all(|id| self.entities.contains_key(id) && seen.insert(id));
        z_ok && self.selection.iter().all(|id| self.entities.contains_key(id))
    }

    fn selection_vec(&self) -> Vec<EntityId> {
        self.selection.iter().cloned().collect()
    }

    // --- History replay ---

    /// Put the store into the `before` (undo) or `after` (redo) state of a command.
    ///
    /// Entity records are restored first, then z-order, then selection. A
    /// captured list that references an id missing from the map is a corrupt
    /// capture: the entity changes already applied stay applied and the error
    /// is returned. Notifications for whatever did apply are still emitted.
    pub(crate) fn replay(&mut self, command: &Command, forward: bool) -> Result<(), HistoryError> {
        let mut events = Vec::new();
        let result = self.replay_inner(command, forward, &mut events);
        self.emit(&events);
        result
    }

    fn replay_inner(&mut self, command: &Command, forward: bool, events: &mut Vec<StoreEvent>) -> Result<(), HistoryError> {
        let deltas: Box<dyn Iterator<Item = &EntityDelta>> = if forward {
            Box::new(command.entities.iter())
        } else {
            Box::new(command.entities.iter().rev())
        };
        for delta in deltas {
            let target = if forward { &delta.after } else { &delta.before };
            match target {
                Some(entity) => {
                    if entity.id != delta.id {
                        return Err(HistoryError::CorruptCapture(format!(
                            "entity capture for {} holds id {}",
                            delta.id, entity.id
                        )));
                    }
                    events.push(StoreEvent::EntityChanged { id: delta.id.clone(), category: entity.category() });
                    self.entities.insert(delta.id.clone(), entity.clone());
                }
                None => {
                    if let Some(old) = self.entities.remove(&delta.id) {
                        events.push(StoreEvent::EntityRemoved { id: delta.id.clone(), category: old.category() });
                    }
                }
            }
        }

        if let Some(z) = &command.z_order {
            let target = if forward { &z.after } else { &z.before };
            let mut seen = HashSet::new();
            if let Some(bad) = target
                .iter()
                .find(|id| !self.entities.contains_key(*id) || !seen.insert(*id))
            {
                return Err(HistoryError::CorruptCapture(format!("z-order capture references {bad}")));
            }
            if *target != self.z_order {
                self.z_order.clone_from(target);
                events.push(StoreEvent::ZOrderChanged);
            }
        }

        if let Some(sel) = &command.selection {
            let target = if forward { &sel.after } else { &sel.before };
            if let Some(bad) = target.iter().find(|id| !self.entities.contains_key(*id)) {
                return Err(HistoryError::CorruptCapture(format!("selection capture references {bad}")));
            }
            let next: BTreeSet<EntityId> = target.iter().cloned().collect();
            if next != self.selection {
                self.selection = next;
                events.push(StoreEvent::SelectionChanged);
            }
        }
        Ok(())
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new(crate::consts::DEFAULT_MIN_SCALE, crate::consts::DEFAULT_MAX_SCALE)
    }
}
