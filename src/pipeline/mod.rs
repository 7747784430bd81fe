/// Image post-processing
///
/// Results from the image service pass through here before they are
/// committed to history.
pub mod compress;

pub use compress::{compress_all, compress_bytes, compress_locator, DEFAULT_QUALITY};
