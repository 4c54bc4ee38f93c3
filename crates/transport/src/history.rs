//! Linear undo/redo log over the ensemble's editable state.
//!
//! Unlike a two-stack undo manager, the log keeps every entry in one vector
//! with a cursor pointing at the visible state. Pushing while the cursor is
//! behind the end throws the redo tail away, so history never branches.
//! The first entry is the initial empty state and is never removed.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::markers::MarkerStore;

/// Names of the muted tracks.
pub type MuteSet = BTreeSet<String>;

/// Immutable snapshot of the editable state.
///
/// Parts a push does not touch are shared with the previous entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    label: String,
    muted: Arc<MuteSet>,
    markers: MarkerStore,
}

impl HistoryEntry {
    fn initial() -> Self {
        Self {
            label: "Initial state".to_string(),
            muted: Arc::new(MuteSet::new()),
            markers: MarkerStore::new(),
        }
    }

    /// What produced this entry, for display ("Mute Drums", "Add marker").
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn muted(&self) -> &MuteSet {
        &self.muted
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }
}

/// Fields to overwrite when pushing; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct HistoryPatch {
    pub muted: Option<MuteSet>,
    pub markers: Option<MarkerStore>,
}

impl HistoryPatch {
    pub fn muted(muted: MuteSet) -> Self {
        Self {
            muted: Some(muted),
            markers: None,
        }
    }

    pub fn markers(markers: MarkerStore) -> Self {
        Self {
            muted: None,
            markers: Some(markers),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    cursor: usize,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self {
            entries: vec![HistoryEntry::initial()],
            cursor: 0,
        }
    }

    /// The visible state.
    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.cursor]
    }

    /// Merge `patch` over the visible state and make the result current.
    pub fn push(&mut self, label: &str, patch: HistoryPatch) {
        let base = self.current();
        let entry = HistoryEntry {
            label: label.to_string(),
            muted: match patch.muted {
                Some(muted) => Arc::new(muted),
                None => Arc::clone(&base.muted),
            },
            markers: patch.markers.unwrap_or_else(|| base.markers.clone()),
        };

        let discarded = self.entries.len() - self.cursor - 1;
        self.entries.truncate(self.cursor + 1);
        self.entries.push(entry);
        self.cursor = self.entries.len() - 1;

        tracing::debug!(
            label,
            cursor = self.cursor,
            discarded,
            "History entry pushed"
        );
    }

    /// Step back one entry. Returns `false` at the start of the log.
    pub fn undo(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        tracing::debug!(label = %self.entries[self.cursor].label, "Undo");
        self.cursor -= 1;
        true
    }

    /// Step forward one entry. Returns `false` at the end of the log.
    pub fn redo(&mut self) -> bool {
        if self.cursor + 1 >= self.entries.len() {
            return false;
        }
        self.cursor += 1;
        tracing::debug!(label = %self.entries[self.cursor].label, "Redo");
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Label of the action `undo` would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.can_undo().then(|| self.entries[self.cursor].label())
    }

    /// Label of the action `redo` would reapply.
    pub fn redo_label(&self) -> Option<&str> {
        self.entries.get(self.cursor + 1).map(HistoryEntry::label)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the initial entry cannot be removed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Drop `name` from every entry's mute set, so neither the visible
    /// state nor an undo can bring back a track that no longer exists.
    /// Does not move the cursor or add an entry.
    pub fn forget_track(&mut self, name: &str) {
        for entry in self.entries.iter_mut() {
            if entry.muted.contains(name) {
                Arc::make_mut(&mut entry.muted).remove(name);
            }
        }
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}
