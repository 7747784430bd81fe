/// Session engine for an AI-assisted image editor
///
/// - `state`: entities, the transition function, the undo log and the store
/// - `codec`: data URLs, the session archive and the prompt library file
/// - `pipeline`: result compression
/// - `storage`: durable key-value store and the persistence binding
/// - `services`: interface of the external image service
/// - `app`: the `Editor` that ties everything together
pub mod app;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod state;
pub mod storage;

pub use app::{Editor, ImageFile};
pub use config::Config;
pub use error::{Result, SessionError};
