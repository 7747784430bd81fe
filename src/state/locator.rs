//! Locators and the transient blob registry
//!
//! A `Locator` addresses image bytes. Two kinds exist:
//! - transient locators (`blob:image-session/<uuid>`) that only resolve through
//!   the `LocatorRegistry` which minted them, and must be released once the
//!   owning handle leaves the session
//! - data URL locators (`data:<mime>;base64,...`) that carry their bytes inline
//!   and never need releasing
//!
//! The registry is the only shared mutable resource in the engine. It is a
//! cheap cloneable handle so that codec and pipeline tasks can mint locators.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::data_url;
use crate::error::{Result, SessionError};

/// Prefix of every locator minted by a registry
const TRANSIENT_PREFIX: &str = "blob:image-session/";

/// Process-local address of image bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    fn transient() -> Self {
        Self(format!("{}{}", TRANSIENT_PREFIX, Uuid::new_v4()))
    }

    /// Wrap an encoded data URL as a self-contained locator
    pub fn from_data_url(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for registry-backed locators that must be released
    pub fn is_transient(&self) -> bool {
        self.0.starts_with(TRANSIENT_PREFIX)
    }

    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Data URLs can be megabytes long; keep log lines readable
        if self.is_data_url() && self.0.len() > 48 {
            let head: String = self.0.chars().take(48).collect();
            write!(f, "{}...", head)
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Bytes plus MIME type behind a locator
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bytes: Arc<[u8]>,
    pub mime: String,
}

/// Arena of live transient blobs, keyed by locator
#[derive(Clone, Default)]
pub struct LocatorRegistry {
    blobs: Arc<Mutex<HashMap<Locator, Blob>>>,
}

impl LocatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Locator, Blob>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a fresh transient locator for `bytes`
    ///
    /// The caller owns the returned locator and must `release` it exactly once.
    pub fn register(&self, bytes: Arc<[u8]>, mime: impl Into<String>) -> Locator {
        let locator = Locator::transient();
        let blob = Blob { bytes, mime: mime.into() };
        debug!("registered {} ({} bytes, {})", locator, blob.bytes.len(), blob.mime);
        self.lock().insert(locator.clone(), blob);
        locator
    }

    /// Look up the bytes behind a locator
    ///
    /// Data URL locators are decoded in place; transient locators must still be live.
    pub fn resolve(&self, locator: &Locator) -> Result<Blob> {
        if locator.is_data_url() {
            let (mime, bytes) = data_url::decode(locator.as_str())?;
            return Ok(Blob { bytes: bytes.into(), mime });
        }

        self.lock()
            .get(locator)
            .cloned()
            .ok_or_else(|| SessionError::UnknownLocator(locator.to_string()))
    }

    /// Release a transient locator
    ///
    /// Returns `false` when the locator was not live (never registered, already
    /// released, or a data URL).
    pub fn release(&self, locator: &Locator) -> bool {
        if !locator.is_transient() {
            return false;
        }

        let removed = self.lock().remove(locator).is_some();
        if removed {
            debug!("released {}", locator);
        } else {
            warn!("⚠️  Locator released twice or never registered: {}", locator);
        }
        removed
    }

    pub fn is_live(&self, locator: &Locator) -> bool {
        self.lock().contains_key(locator)
    }

    /// Number of transient locators currently held
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

impl fmt::Debug for LocatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}
