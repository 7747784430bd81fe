//! Runtime configuration
//!
//! Defaults match the desktop editor; each field can be overridden from the
//! environment. A value that does not parse is ignored with a warning.

use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::pipeline::DEFAULT_QUALITY;

pub const DATA_DIR_ENV: &str = "IMAGE_SESSION_DATA_DIR";
pub const JPEG_QUALITY_ENV: &str = "IMAGE_SESSION_JPEG_QUALITY";
pub const STORAGE_QUOTA_ENV: &str = "IMAGE_SESSION_STORAGE_QUOTA";

/// Default durable-store capacity, same order as browser local storage
pub const DEFAULT_STORAGE_QUOTA: u64 = 5 * 1024 * 1024;

const APP_DIR: &str = "image-session";
const DATABASE_FILE: &str = "image_session.db";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where the durable store lives
    pub data_dir: PathBuf,
    /// Result compression quality, 0.0-1.0
    pub jpeg_quality: f32,
    /// Byte capacity of the durable store
    pub storage_quota_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            jpeg_quality: DEFAULT_QUALITY,
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA,
        }
    }
}

impl Config {
    /// Defaults overlaid with `IMAGE_SESSION_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|dir| !dir.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(quality) = parse_var::<f32>(&lookup, JPEG_QUALITY_ENV) {
            if quality.is_finite() {
                config.jpeg_quality = quality.clamp(0.0, 1.0);
            } else {
                warn!("⚠️  Ignoring non-finite {}", JPEG_QUALITY_ENV);
            }
        }
        if let Some(quota) = parse_var::<u64>(&lookup, STORAGE_QUOTA_ENV) {
            config.storage_quota_bytes = quota;
        }

        config
    }

    /// Path of the SQLite database backing the durable store
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("⚠️  Ignoring unparseable {}={:?}, using default", key, raw);
            None
        }
    }
}

/// Platform data directory, e.g. ~/.local/share/image-session on Linux
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
