//! Persistence binding
//!
//! Mirrors the durable slices of a session (history, prompt library) plus the
//! user settings (theme, language) into a `KeyValueStore`. Reads happen once at
//! startup and fall back to defaults; writes happen whenever a slice changes
//! and never touch in-memory state when they fail.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use super::KeyValueStore;
use crate::error::{Result, SessionError};
use crate::state::data::{HistoryItem, SavedPrompt};
use crate::state::session::SessionState;

pub const THEME_KEY: &str = "theme";
pub const LANGUAGE_KEY: &str = "language";
pub const HISTORY_KEY: &str = "edit-history";
pub const LIBRARY_KEY: &str = "prompt-library";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// UI language
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Vi => "vi",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "vi" => Ok(Locale::Vi),
            other => Err(SessionError::validation(format!("Unsupported language: {}", other))),
        }
    }
}

/// Settings that live outside the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settings {
    pub theme: Theme,
    pub locale: Locale,
}

/// Everything read back at startup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rehydrated {
    pub history: Vec<HistoryItem>,
    pub saved_prompts: Vec<SavedPrompt>,
    pub settings: Settings,
}

pub struct PersistenceBinding {
    store: Box<dyn KeyValueStore>,
    /// Last text known to be in the store, per key
    mirrored: HashMap<&'static str, String>,
}

impl PersistenceBinding {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store,
            mirrored: HashMap::new(),
        }
    }

    /// Read every bound slice, substituting defaults for missing or bad values
    pub fn rehydrate(&mut self) -> Rehydrated {
        let rehydrated = Rehydrated {
            history: self.read(HISTORY_KEY),
            saved_prompts: self.read(LIBRARY_KEY),
            settings: Settings {
                theme: self.read(THEME_KEY),
                locale: self.read(LANGUAGE_KEY),
            },
        };
        info!(
            "✅ Rehydrated {} history items, {} saved prompts ({:?}, {})",
            rehydrated.history.len(),
            rehydrated.saved_prompts.len(),
            rehydrated.settings.theme,
            rehydrated.settings.locale
        );
        rehydrated
    }

    fn read<T: DeserializeOwned + Default>(&mut self, key: &'static str) -> T {
        let text = match self.store.get(key) {
            Ok(Some(text)) => text,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!("⚠️  Error reading '{}', using default: {}", key, e);
                return T::default();
            }
        };

        match serde_json::from_str(&text) {
            Ok(value) => {
                self.mirrored.insert(key, text);
                value
            }
            Err(e) => {
                warn!("⚠️  Could not parse '{}', using default: {}", key, e);
                T::default()
            }
        }
    }

    /// Mirror the session's durable slices
    pub fn sync(&mut self, state: &SessionState) {
        self.write(HISTORY_KEY, &state.history);
        self.write(LIBRARY_KEY, &state.saved_prompts);
    }

    /// Mirror the settings
    pub fn sync_settings(&mut self, settings: &Settings) {
        self.write(THEME_KEY, &settings.theme);
        self.write(LANGUAGE_KEY, &settings.locale);
    }

    /// Serialize `value` and write it when it differs from the mirrored text
    ///
    /// Returns true when the store now holds the value.
    fn write<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> bool {
        let text = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(e) => {
                error!("❌ Could not serialize '{}': {}", key, e);
                return false;
            }
        };

        if self.mirrored.get(key) == Some(&text) {
            return true;
        }

        match self.store.set(key, &text) {
            Ok(()) => {
                debug!("persisted '{}' ({} bytes)", key, text.len());
                self.mirrored.insert(key, text);
                true
            }
            Err(e) if e.is_quota_exceeded() => {
                error!("❌ Storage is full; '{}' was not saved ({} bytes)", key, text.len());
                false
            }
            Err(e) => {
                error!("❌ Error setting '{}': {}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::locator::Locator;
    use crate::storage::SqliteStore;
    use std::sync::{Arc, Mutex};

    /// Store that counts writes and can be told to fail them
    #[derive(Clone, Default)]
    struct ProbeStore {
        values: Arc<Mutex<HashMap<String, String>>>,
        writes: Arc<Mutex<Vec<String>>>,
        full: Arc<Mutex<bool>>,
    }

    impl KeyValueStore for ProbeStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if *self.full.lock().unwrap() {
                return Err(SessionError::QuotaExceeded { key: key.to_string() });
            }
            self.writes.lock().unwrap().push(key.to_string());
            self.values.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn history_state() -> SessionState {
        let mut state = SessionState::new();
        state.history = vec![
            HistoryItem::new("b", Locator::from("blob:x"), Locator::from("data:image/jpeg;base64,AQ==")),
            HistoryItem::new("a", Locator::from("blob:x"), Locator::from("data:image/jpeg;base64,AA==")),
        ];
        state.saved_prompts = vec![SavedPrompt::new("Hat", "add a hat")];
        state
    }

    #[test]
    fn test_first_run_defaults() {
        let mut binding = PersistenceBinding::new(Box::new(SqliteStore::in_memory(1024).unwrap()));
        let rehydrated = binding.rehydrate();
        assert_eq!(rehydrated, Rehydrated::default());
        assert_eq!(rehydrated.settings.theme, Theme::Dark);
        assert_eq!(rehydrated.settings.locale, Locale::En);
    }

    #[test]
    fn test_round_trip_through_store() {
        let probe = ProbeStore::default();
        let state = history_state();

        let mut binding = PersistenceBinding::new(Box::new(probe.clone()));
        binding.sync(&state);
        binding.sync_settings(&Settings { theme: Theme::Light, locale: Locale::Vi });

        let rehydrated = PersistenceBinding::new(Box::new(probe)).rehydrate();
        assert_eq!(rehydrated.history, state.history);
        assert_eq!(rehydrated.saved_prompts, state.saved_prompts);
        assert_eq!(rehydrated.settings, Settings { theme: Theme::Light, locale: Locale::Vi });
    }

    #[test]
    fn test_values_are_json_text() {
        let probe = ProbeStore::default();
        let mut binding = PersistenceBinding::new(Box::new(probe.clone()));
        binding.sync_settings(&Settings::default());

        let values = probe.values.lock().unwrap();
        assert_eq!(values.get(THEME_KEY).map(String::as_str), Some("\"dark\""));
        assert_eq!(values.get(LANGUAGE_KEY).map(String::as_str), Some("\"en\""));
    }

    #[test]
    fn test_unchanged_slices_are_not_rewritten() {
        let probe = ProbeStore::default();
        let mut binding = PersistenceBinding::new(Box::new(probe.clone()));
        let mut state = history_state();

        binding.sync(&state);
        binding.sync(&state);
        assert_eq!(probe.writes.lock().unwrap().len(), 2);

        state.history.clear();
        binding.sync(&state);
        assert_eq!(*probe.writes.lock().unwrap(), vec![HISTORY_KEY, LIBRARY_KEY, HISTORY_KEY]);
    }

    #[test]
    fn test_corrupt_values_fall_back() {
        let probe = ProbeStore::default();
        {
            let mut values = probe.values.lock().unwrap();
            values.insert(HISTORY_KEY.to_string(), "{oops".to_string());
            values.insert(THEME_KEY.to_string(), "\"sepia\"".to_string());
            values.insert(LANGUAGE_KEY.to_string(), "\"vi\"".to_string());
        }

        let rehydrated = PersistenceBinding::new(Box::new(probe)).rehydrate();
        assert!(rehydrated.history.is_empty());
        assert_eq!(rehydrated.settings.theme, Theme::Dark);
        assert_eq!(rehydrated.settings.locale, Locale::Vi);
    }

    #[test]
    fn test_quota_failure_is_retried_on_next_change() {
        let probe = ProbeStore::default();
        let mut binding = PersistenceBinding::new(Box::new(probe.clone()));
        let state = history_state();

        *probe.full.lock().unwrap() = true;
        binding.sync(&state);
        assert!(probe.values.lock().unwrap().is_empty());
        // In-memory state is untouched by the failed write
        assert_eq!(state.history.len(), 2);

        *probe.full.lock().unwrap() = false;
        binding.sync(&state);
        assert_eq!(probe.values.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_locale_parsing() {
        assert_eq!("VI".parse::<Locale>().unwrap(), Locale::Vi);
        assert!("fr".parse::<Locale>().unwrap_err().is_validation());
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
    }
}
