/// State management module
///
/// This module owns all session data:
/// - Entity records shared by every layer (data.rs)
/// - Transient image locators and their registry (locator.rs)
/// - Prompt undo/redo log (prompt_log.rs)
/// - Events and the transition function (event.rs, session.rs)
/// - The dispatching store that enforces locator ownership (store.rs)
/// - Saved-prompt library helpers (library.rs)
/// - Quick-action suggestions (quick_action.rs)
pub mod data;
pub mod event;
pub mod library;
pub mod locator;
pub mod prompt_log;
pub mod quick_action;
pub mod session;
pub mod store;

pub use data::{HistoryItem, ImageHandle, PromptDraftSnapshot, SavedPrompt, Status};
pub use event::{SessionEvent, SessionRestore};
pub use locator::{Blob, Locator, LocatorRegistry};
pub use prompt_log::PromptLog;
pub use quick_action::{QuickAction, QuickActionList};
pub use session::{transition, SessionState};
pub use store::SessionStore;
