//! Quick-action suggestions
//!
//! Suggestions come from the image service; the list shown to the user only
//! grows with prompts it has not displayed yet.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A suggested prompt fragment
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuickAction {
    pub title: String,
    pub prompt: String,
}

impl QuickAction {
    pub fn new(title: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            prompt: prompt.into(),
        }
    }
}

/// Displayed suggestions, unique by prompt text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuickActionList {
    actions: Vec<QuickAction>,
}

impl QuickActionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list (initial load for a new active image)
    pub fn reset(&mut self, actions: Vec<QuickAction>) {
        self.actions.clear();
        self.extend_unique(actions);
    }

    /// Append suggestions whose prompt is not displayed yet
    ///
    /// Returns how many were added.
    pub fn extend_unique(&mut self, actions: Vec<QuickAction>) -> usize {
        let mut seen: HashSet<String> = self.actions.iter().map(|a| a.prompt.clone()).collect();
        let before = self.actions.len();
        self.actions
            .extend(actions.into_iter().filter(|a| seen.insert(a.prompt.clone())));
        self.actions.len() - before
    }

    /// Prompts already displayed (sent to the service as "seen")
    pub fn prompts(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.prompt.clone()).collect()
    }

    pub fn actions(&self) -> &[QuickAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Append a preset to the current prompt
///
/// The current prompt is trimmed and loses one trailing comma, so presets
/// chain as "a, b, c".
pub fn compose_prompt(current: &str, preset: &str) -> String {
    let trimmed = current.trim();
    let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        preset.to_string()
    } else {
        format!("{}, {}", trimmed, preset)
    }
}
