//! Session archive (save to file / load from file)
//!
//! The archive is pretty-printed JSON. Images travel as data URLs, so a file
//! written by one run can be loaded by any other; transient locators are never
//! written out and are minted fresh on load.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::codec::data_url;
use crate::error::{Result, SessionError};
use crate::state::data::{HistoryItem, ImageHandle, SavedPrompt};
use crate::state::event::SessionRestore;
use crate::state::locator::LocatorRegistry;
use crate::state::session::{SessionState, DEFAULT_CREATIVITY};

/// The only archive version this build reads and writes
pub const ARCHIVE_VERSION: u32 = 1;

/// An encoded image inside the archive
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedImage {
    pub data_url: String,
    pub name: String,
}

impl ArchivedImage {
    fn from_handle(handle: &ImageHandle) -> Self {
        Self {
            data_url: data_url::encode(&handle.mime, &handle.bytes),
            name: handle.name.clone(),
        }
    }
}

/// On-disk shape of a saved session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionArchive {
    /// Checked on the raw JSON before the rest of the archive is read
    #[serde(skip_deserializing, default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_creativity")]
    pub creativity_level: u8,
    #[serde(default)]
    pub uploaded_images: Vec<ArchivedImage>,
    /// Index into `uploaded_images`; -1 means no active image
    #[serde(default = "no_active_image")]
    pub active_image_index: i64,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub reference_image: Option<ArchivedImage>,
    #[serde(default)]
    pub saved_prompts: Vec<SavedPrompt>,
}

fn current_version() -> u32 {
    ARCHIVE_VERSION
}

fn default_creativity() -> u8 {
    DEFAULT_CREATIVITY
}

fn no_active_image() -> i64 {
    -1
}

impl SessionArchive {
    /// Snapshot the persistable parts of a session
    pub fn from_state(state: &SessionState) -> Self {
        let active_image_index = state
            .active_image
            .as_ref()
            .and_then(|active| state.uploaded_images.iter().position(|img| &img.locator == active))
            .map(|index| index as i64)
            .unwrap_or(-1);

        Self {
            version: ARCHIVE_VERSION,
            prompt: state.prompt.clone(),
            creativity_level: state.creativity_level,
            uploaded_images: state.uploaded_images.iter().map(ArchivedImage::from_handle).collect(),
            active_image_index,
            history: state.history.clone(),
            reference_image: state.reference_image.as_ref().map(ArchivedImage::from_handle),
            saved_prompts: state.saved_prompts.clone(),
        }
    }
}

/// Default download name for an archive written at `millis`
pub fn archive_file_name(millis: i64) -> String {
    format!("ai-image-editor-session-{}.json", millis)
}

/// Serialize a session to archive text
pub fn encode_session(state: &SessionState) -> Result<String> {
    let archive = SessionArchive::from_state(state);
    let text = serde_json::to_string_pretty(&archive)?;
    debug!(
        "encoded session: {} images, {} history items, {} bytes",
        archive.uploaded_images.len(),
        archive.history.len(),
        text.len()
    );
    Ok(text)
}

/// Parse archive text into a restore payload
///
/// Every image is decoded before any locator is minted, so a rejected archive
/// leaves the registry exactly as it was.
pub fn decode_session(text: &str, registry: &LocatorRegistry) -> Result<SessionRestore> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| SessionError::MalformedArchive(e.to_string()))?;

    check_version(&value)?;

    let archive: SessionArchive =
        serde_json::from_value(value).map_err(|e| SessionError::MalformedArchive(e.to_string()))?;

    let uploads = archive
        .uploaded_images
        .iter()
        .map(decode_image)
        .collect::<Result<Vec<_>>>()?;
    let reference = archive.reference_image.as_ref().map(decode_image).transpose()?;

    // Nothing below can fail
    let uploaded_images: Vec<ImageHandle> = uploads
        .into_iter()
        .map(|(mime, bytes, name)| ImageHandle::register(registry, bytes, mime, name))
        .collect();
    let reference_image =
        reference.map(|(mime, bytes, name)| ImageHandle::register(registry, bytes, mime, name));

    let active_image = usize::try_from(archive.active_image_index)
        .ok()
        .and_then(|index| uploaded_images.get(index))
        .map(|img| img.locator.clone());

    info!(
        "📂 Decoded session: {} images, {} history items, {} saved prompts",
        uploaded_images.len(),
        archive.history.len(),
        archive.saved_prompts.len()
    );

    Ok(SessionRestore {
        prompt: Some(archive.prompt),
        creativity_level: Some(archive.creativity_level),
        uploaded_images,
        active_image,
        history: Some(archive.history),
        reference_image,
        saved_prompts: Some(archive.saved_prompts),
    })
}

fn check_version(value: &Value) -> Result<()> {
    let Some(object) = value.as_object() else {
        return Err(SessionError::MalformedArchive("expected a JSON object".to_string()));
    };

    // Any number equal to the version is accepted (1 and 1.0 alike)
    let version = object.get("version");
    if version.and_then(Value::as_f64) == Some(f64::from(ARCHIVE_VERSION)) {
        return Ok(());
    }

    Err(SessionError::UnsupportedVersion {
        found: version.map_or_else(|| "missing".to_string(), Value::to_string),
        expected: ARCHIVE_VERSION,
    })
}

fn decode_image(image: &ArchivedImage) -> Result<(String, Vec<u8>, String)> {
    let (mime, bytes) = data_url::decode(&image.data_url)?;
    Ok((mime, bytes, image.name.clone()))
}
