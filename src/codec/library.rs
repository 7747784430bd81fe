//! Prompt library export/import file
//!
//! The file is a JSON array of saved prompts. Import validates every entry
//! before anything is returned, so a bad file never partially merges.

use serde_json::Value;
use tracing::info;

use crate::error::{Result, SessionError};
use crate::state::data::SavedPrompt;

/// Default download name for an exported library
pub const LIBRARY_FILE_NAME: &str = "ai-image-editor-prompts.json";

const REQUIRED_FIELDS: [&str; 3] = ["id", "name", "prompt"];

/// Serialize the library as pretty-printed JSON
pub fn export_library(prompts: &[SavedPrompt]) -> Result<String> {
    Ok(serde_json::to_string_pretty(prompts)?)
}

/// Parse and validate an exported library
pub fn import_library(text: &str) -> Result<Vec<SavedPrompt>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| SessionError::InvalidLibrary(e.to_string()))?;

    let Value::Array(entries) = value else {
        return Err(SessionError::InvalidLibrary("expected a JSON array".to_string()));
    };

    let mut prompts = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let Some(object) = entry.as_object() else {
            return Err(SessionError::InvalidLibrary(format!("entry {} is not an object", index)));
        };
        if let Some(field) = REQUIRED_FIELDS
            .iter()
            .find(|field| !object.get(**field).is_some_and(Value::is_string))
        {
            return Err(SessionError::InvalidLibrary(format!(
                "entry {} is missing string field '{}'",
                index, field
            )));
        }

        let prompt: SavedPrompt = serde_json::from_value(entry)
            .map_err(|e| SessionError::InvalidLibrary(format!("entry {}: {}", index, e)))?;
        prompts.push(prompt);
    }

    info!("📚 Parsed prompt library file: {} entries", prompts.len());
    Ok(prompts)
}
