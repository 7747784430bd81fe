//! Error types shared across the session engine
//!
//! Every boundary operation (archive load, library import, compression,
//! persistence writes, service calls) reports failures through `SessionError`.
//! The orchestration layer turns these into plain messages before they reach
//! the state machine.
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The archive text is not a session at all (bad JSON or wrong shape)
    #[error("Malformed session file: {0}")]
    MalformedArchive(String),

    /// The archive parsed but carries a version we cannot read
    #[error("Unsupported session version: {found} (expected {expected})")]
    UnsupportedVersion { found: String, expected: u32 },

    /// An encoded image does not carry a recognizable data URL header or payload
    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// A prompt library file failed schema validation
    #[error("Invalid prompt library file: {0}")]
    InvalidLibrary(String),

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    /// No pixel buffer could be allocated for the image
    #[error("Could not acquire a drawing surface for a {width}x{height} image")]
    Surface { width: u32, height: u32 },

    /// A transient locator was never registered or has already been released
    #[error("Unknown or released locator: {0}")]
    UnknownLocator(String),

    /// Failure reported by the external image service
    #[error("{0}")]
    Service(String),

    /// A precondition checked by the orchestration layer was not met
    #[error("{0}")]
    Validation(String),

    /// A persistence write would exceed the store's capacity
    #[error("Storage quota exceeded for key '{key}'")]
    QuotaExceeded { key: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl SessionError {
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a precondition failure raised before any work started
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a capacity failure from the durable store
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
