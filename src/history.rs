//! History engine: undoable entries, nested batching, replay.
//!
//! DESIGN
//! ======
//! Every store mutation yields a [`Command`] capturing the before/after state
//! of whatever it touched: entity records, and the full z-order and selection
//! lists whenever those changed. Commands accumulate in the open batch while
//! batching; outside a batch each command is sealed into its own entry, so no
//! mutation is ever invisible to undo.
//!
//! Batches nest by depth. Only the outermost `end_batch` decides between
//! sealing (commit) and rolling back; inner labels are discarded.
//!
//! A replay that hits a corrupt capture stops at that command, leaves the
//! store as far as it got, and drops both stacks: the recorded states no
//! longer describe reachable store states. [`History::fault`] reports the
//! failure until the next entry is sealed.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use crate::consts::IMPLICIT_LABEL;
use crate::entity::{Entity, EntityId};
use crate::store::EntityStore;

/// Errors raised while replaying history.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryError {
    /// A captured state cannot be applied to the store.
    #[error("corrupt history capture: {0}")]
    CorruptCapture(String),
}

/// Before/after capture of one entity record. `None` means absent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EntityDelta {
    pub(crate) id: EntityId,
    pub(crate) before: Option<Entity>,
    pub(crate) after: Option<Entity>,
}

impl EntityDelta {
    pub(crate) fn new(id: EntityId, before: Option<Entity>, after: Option<Entity>) -> Self {
        Self { id, before, after }
    }
}

/// Before/after capture of an ordered id list (z-order or selection).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListDelta {
    pub(crate) before: Vec<EntityId>,
    pub(crate) after: Vec<EntityId>,
}

impl ListDelta {
    pub(crate) fn new(before: Vec<EntityId>, after: Vec<EntityId>) -> Self {
        Self { before, after }
    }
}

/// One atomic store mutation with enough state to replay it either way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub(crate) entities: Vec<EntityDelta>,
    pub(crate) z_order: Option<ListDelta>,
    pub(crate) selection: Option<ListDelta>,
}

impl Command {
    pub(crate) fn entity(delta: EntityDelta) -> Self {
        Self { entities: vec![delta], ..Self::default() }
    }

    pub(crate) fn with_z_order(mut self, delta: ListDelta) -> Self {
        self.z_order = Some(delta);
        self
    }

    pub(crate) fn with_selection(mut self, delta: ListDelta) -> Self {
        self.selection = Some(delta);
        self
    }

    /// Ids of the entities this command touched.
    pub fn touched(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.iter().map(|d| &d.id)
    }

    /// Whether the command changed the z-order.
    #[must_use]
    pub fn touches_z_order(&self) -> bool {
        self.z_order.is_some()
    }

    /// Whether the command changed the selection.
    #[must_use]
    pub fn touches_selection(&self) -> bool {
        self.selection.is_some()
    }
}

/// A labeled, sealed group of commands undone and redone as one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    label: String,
    commands: Vec<Command>,
}

impl Entry {
    fn new(label: &str) -> Self {
        Self { label: label.to_owned(), commands: Vec::new() }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Revert all commands, newest first.
    pub(crate) fn revert(&self, store: &mut EntityStore) -> Result<(), HistoryError> {
        for command in self.commands.iter().rev() {
            store.replay(command, false)?;
        }
        Ok(())
    }

    /// Re-apply all commands, oldest first.
    pub(crate) fn reapply(&self, store: &mut EntityStore) -> Result<(), HistoryError> {
        for command in &self.commands {
            store.replay(command, true)?;
        }
        Ok(())
    }
}

/// Undo/redo stacks plus the open batch.
#[derive(Debug)]
pub struct History {
    undo: Vec<Entry>,
    redo: Vec<Entry>,
    open: Option<Entry>,
    depth: usize,
    limit: usize,
    fault: Option<HistoryError>,
}

impl History {
    /// Create an empty history retaining at most `limit` undo entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { undo: Vec::new(), redo: Vec::new(), open: None, depth: 0, limit: limit.max(1), fault: None }
    }

    /// Whether a batch is open.
    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.depth > 0
    }

    /// Current nesting depth (0 when idle).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Label of the entry `undo` would revert.
    #[must_use]
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.last().map(Entry::label)
    }

    /// Label of the entry `redo` would re-apply.
    #[must_use]
    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(Entry::label)
    }

    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// The last replay failure, if undo is currently unavailable because of one.
    #[must_use]
    pub fn fault(&self) -> Option<&HistoryError> {
        self.fault.as_ref()
    }

    /// Drop all entries, the open batch and any fault.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.open = None;
        self.depth = 0;
        self.fault = None;
    }

    /// Open or nest a batch. An empty label falls back to a generic one.
    pub(crate) fn begin(&mut self, label: &str) {
        if self.depth == 0 {
            let label = if label.is_empty() { IMPLICIT_LABEL } else { label };
            self.open = Some(Entry::new(label));
        }
        self.depth += 1;
    }

    /// Close one nesting level. At depth 0 returns the finished entry and
    /// whether it was committed; `None` while still nested or when unbalanced.
    pub(crate) fn end(&mut self, commit: bool) -> Option<(Entry, bool)> {
        if self.depth == 0 {
            tracing::warn!("end_batch without matching begin_batch");
            return None;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return None;
        }
        self.open.take().map(|entry| (entry, commit))
    }

    /// Record a command into the open batch, or seal it as its own entry.
    pub(crate) fn record(&mut self, label: &str, command: Command) {
        match self.open.as_mut() {
            Some(entry) => entry.commands.push(command),
            None => {
                let mut entry = Entry::new(label);
                entry.commands.push(command);
                self.seal(entry);
            }
        }
    }

    /// Push a finished entry onto the undo stack, clearing redo.
    pub(crate) fn seal(&mut self, entry: Entry) {
        if entry.commands.is_empty() {
            return;
        }
        tracing::debug!(label = %entry.label, commands = entry.commands.len(), "history entry sealed");
        self.undo.push(entry);
        if self.undo.len() > self.limit {
            let overflow = self.undo.len() - self.limit;
            self.undo.drain(..overflow);
        }
        self.redo.clear();
        self.fault = None;
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Entry> {
        self.undo.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Entry> {
        self.redo.pop()
    }

    pub(crate) fn push_undo(&mut self, entry: Entry) {
        self.undo.push(entry);
    }

    pub(crate) fn push_redo(&mut self, entry: Entry) {
        self.redo.push(entry);
    }

    /// Mark history unavailable after a failed replay.
    pub(crate) fn fail(&mut self, label: &str, error: HistoryError) {
        tracing::error!(label = %label, error = %error, "history replay failed; undo unavailable");
        self.undo.clear();
        self.redo.clear();
        self.fault = Some(error);
    }

    #[cfg(test)]
    pub(crate) fn push_raw(&mut self, label: &str, commands: Vec<Command>) {
        self.undo.push(Entry { label: label.to_owned(), commands });
    }
}
