//! Shared data structures for the session state
//!
//! These structs represent the data model that flows between
//! the state machine, the codec and the persistence layer.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::locator::{Locator, LocatorRegistry};

/// MIME type assumed when the bytes don't match any known image format
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Characters of the prompt slug kept in a downloaded result's file name
pub const DOWNLOAD_SLUG_CHARS: usize = 50;

/// Current time as Unix milliseconds (the unit used by history and the library)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fresh unique id for history items and saved prompts
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Progress of the most recent generation or upscale
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// An image the user brought into the session
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    /// Raw image bytes (the source of truth)
    pub bytes: Arc<[u8]>,
    /// MIME type of `bytes` (e.g., "image/png")
    pub mime: String,
    /// Transient locator minted for `bytes`; valid for this run only
    pub locator: Locator,
    /// Display name (file name, "pasted-...", "webcam-...")
    pub name: String,
}

impl ImageHandle {
    /// Register `bytes` and build a handle that owns the new locator
    pub fn register(
        registry: &LocatorRegistry,
        bytes: impl Into<Arc<[u8]>>,
        mime: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let bytes = bytes.into();
        let mime = mime.into();
        let locator = registry.register(bytes.clone(), mime.clone());
        Self {
            bytes,
            mime,
            locator,
            name: name.into(),
        }
    }

    /// Like `register`, sniffing the MIME type from the bytes
    pub fn sniff(
        registry: &LocatorRegistry,
        bytes: impl Into<Arc<[u8]>>,
        name: impl Into<String>,
    ) -> Self {
        let bytes = bytes.into();
        let mime = sniff_mime(&bytes);
        Self::register(registry, bytes, mime, name)
    }
}

/// Guess an image MIME type from its magic bytes
pub fn sniff_mime(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME.to_string())
}

/// File extension for an image MIME type, `png` when unknown
pub fn extension_for_mime(mime: &str) -> &'static str {
    image::ImageFormat::from_mime_type(mime)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png")
}

/// One generated result, newest first in the history list
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    /// Unique id (UUID v4)
    pub id: String,
    /// Prompt that produced this result
    pub prompt: String,
    /// Locator of the active image at submit time
    #[serde(rename = "originalUrl")]
    pub original_locator: Locator,
    /// Locator of the compressed result
    #[serde(rename = "editedUrl")]
    pub edited_locator: Locator,
    /// Creation time in Unix milliseconds
    pub timestamp: i64,
}

impl HistoryItem {
    pub fn new(prompt: impl Into<String>, original_locator: Locator, edited_locator: Locator) -> Self {
        Self {
            id: new_id(),
            prompt: prompt.into(),
            original_locator,
            edited_locator,
            timestamp: now_millis(),
        }
    }

    /// File-name friendly slug of the prompt (e.g., for downloads)
    ///
    /// Runs of non-word characters collapse into '-', truncated to `max_len`.
    pub fn prompt_slug(&self, max_len: usize) -> String {
        let mut slug = String::new();
        let mut in_separator = false;
        for c in self.prompt.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                in_separator = false;
            } else if !in_separator {
                slug.push('-');
                in_separator = true;
            }
        }
        let slug: String = slug.chars().take(max_len).collect();
        if slug.is_empty() {
            "ai-edit".to_string()
        } else {
            slug
        }
    }

    /// `<prompt slug>-<timestamp>.<ext>` for the edited image stored as `mime`
    pub fn download_name(&self, mime: &str) -> String {
        format!(
            "{}-{}.{}",
            self.prompt_slug(DOWNLOAD_SLUG_CHARS),
            self.timestamp,
            extension_for_mime(mime)
        )
    }
}

/// A named prompt in the reusable library
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedPrompt {
    pub id: String,
    pub name: String,
    pub prompt: String,
    /// Creation time in Unix milliseconds
    #[serde(default)]
    pub created_at: i64,
}

impl SavedPrompt {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            prompt: prompt.into(),
            created_at: now_millis(),
        }
    }
}

/// Prompt text and creativity captured at a commit point
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptDraftSnapshot {
    pub prompt: String,
    /// 0 (faithful) to 10 (creative)
    pub creativity_level: u8,
}

impl PromptDraftSnapshot {
    pub fn new(prompt: impl Into<String>, creativity_level: u8) -> Self {
        Self {
            prompt: prompt.into(),
            creativity_level,
        }
    }
}
