//! Undo/redo log for prompt authoring
//!
//! Snapshots of `(prompt, creativity)` are recorded at commit points
//! (prompt field blur, quick action applied, creativity slider released),
//! not on every keystroke, so one undo step is one logical edit.
use super::data::PromptDraftSnapshot;

/// Maximum number of snapshots kept; the oldest is dropped beyond this
pub const MAX_SNAPSHOTS: usize = 100;

/// Linear snapshot history with a cursor
///
/// Invariant: `entries` is never empty and `cursor < entries.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptLog {
    entries: Vec<PromptDraftSnapshot>,
    cursor: usize,
}

impl Default for PromptLog {
    /// Seeded with an empty prompt at the default creativity
    fn default() -> Self {
        Self::new(PromptDraftSnapshot::new("", super::session::DEFAULT_CREATIVITY))
    }
}

impl PromptLog {
    /// Create a log holding a single snapshot
    pub fn new(seed: PromptDraftSnapshot) -> Self {
        Self {
            entries: vec![seed],
            cursor: 0,
        }
    }

    /// Record a new snapshot after the cursor
    ///
    /// Everything after the cursor is discarded first: a new edit branch
    /// drops the redo future.
    pub fn record(&mut self, snapshot: PromptDraftSnapshot) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);

        if self.entries.len() > MAX_SNAPSHOTS {
            let overflow = self.entries.len() - MAX_SNAPSHOTS;
            self.entries.drain(..overflow);
        }

        self.cursor = self.entries.len() - 1;
    }

    /// Step back one snapshot
    ///
    /// Returns the snapshot to adopt, or `None` at the lower bound.
    pub fn undo(&mut self) -> Option<&PromptDraftSnapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    /// Step forward one snapshot
    ///
    /// Returns the snapshot to adopt, or `None` at the upper bound.
    pub fn redo(&mut self) -> Option<&PromptDraftSnapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Snapshot under the cursor
    pub fn current(&self) -> &PromptDraftSnapshot {
        &self.entries[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PromptDraftSnapshot] {
        &self.entries
    }
}
