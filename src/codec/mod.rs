/// Text encodings for moving sessions in and out of the process
///
/// - data URLs for binary images (data_url.rs)
/// - the versioned session archive (archive.rs)
/// - the prompt library export file (library.rs)
pub mod archive;
pub mod data_url;
pub mod library;

pub use archive::{archive_file_name, decode_session, encode_session, SessionArchive, ARCHIVE_VERSION};
pub use library::{export_library, import_library, LIBRARY_FILE_NAME};
