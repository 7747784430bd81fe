/// Durable key-value storage
///
/// - `KeyValueStore`: the interface the persistence binding writes through
/// - `SqliteStore`: SQLite-backed implementation with a byte quota (sqlite.rs)
/// - `PersistenceBinding`: mirrors session slices into a store (binding.rs)
pub mod binding;
pub mod sqlite;

pub use binding::{Locale, PersistenceBinding, Rehydrated, Settings, Theme};
pub use sqlite::SqliteStore;

use crate::error::Result;

/// String-keyed store of JSON text values
///
/// A missing key is `Ok(None)`, never an error. Stores are shared with the
/// editor across `.await` points, hence `Sync`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace the value under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}
