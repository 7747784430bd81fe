//! Saved-prompt library operations
//!
//! The library itself lives in `SessionState::saved_prompts`; these helpers
//! implement search and the import merge rule.

use std::collections::HashSet;

use super::data::SavedPrompt;

/// Case-insensitive search over name and prompt text, newest first
pub fn search<'a>(prompts: &'a [SavedPrompt], term: &str) -> Vec<&'a SavedPrompt> {
    let needle = term.to_lowercase();
    let mut hits: Vec<&SavedPrompt> = prompts
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&needle) || p.prompt.to_lowercase().contains(&needle))
        .collect();
    hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    hits
}

/// Merge imported prompts into the library
///
/// Imported entries whose id already exists are dropped; the rest are placed
/// in front of the existing entries.
pub fn merge(existing: &[SavedPrompt], imported: Vec<SavedPrompt>) -> Vec<SavedPrompt> {
    let mut ids: HashSet<String> = existing.iter().map(|p| p.id.clone()).collect();
    let mut merged: Vec<SavedPrompt> = imported
        .into_iter()
        .filter(|p| ids.insert(p.id.clone()))
        .collect();
    merged.extend_from_slice(existing);
    merged
}
