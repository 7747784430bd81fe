//! Editor orchestration
//!
//! `Editor` is the layer between user intents and the state machine. It checks
//! preconditions, talks to the image service, runs results through the
//! compression pipeline and turns every outcome into exactly one terminal
//! event. Persistence is mirrored after each dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::codec::{self, archive, library as library_file};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::pipeline::{compress_all, compress_locator};
use crate::services::{creativity_to_temperature, EditRequest, ImageDescription, ImageService, ScaleFactor};
use crate::state::data::{now_millis, sniff_mime, HistoryItem, ImageHandle, SavedPrompt};
use crate::state::event::SessionEvent;
use crate::state::library;
use crate::state::locator::{Blob, Locator, LocatorRegistry};
use crate::state::quick_action::{compose_prompt, QuickAction, QuickActionList};
use crate::state::session::SessionState;
use crate::state::store::SessionStore;
use crate::storage::{KeyValueStore, Locale, PersistenceBinding, Settings, Theme};

pub const SUBMIT_PRECONDITION_MESSAGE: &str = "Please select an image and enter a prompt.";
pub const EMPTY_UPSCALE_MESSAGE: &str = "Upscale service did not return an image.";
pub const SESSION_LOAD_MESSAGE: &str = "Failed to load session. The file may be invalid.";
pub const SESSION_SAVE_MESSAGE: &str = "Error saving session. See console for details.";
pub const HISTORY_EDIT_MESSAGE: &str = "Failed to load image for editing.";

/// Characters of the prompt kept in the name of an "edit this result" upload
const EDIT_NAME_PROMPT_CHARS: usize = 20;

/// An image file handed to the editor (upload, drop, paste)
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub bytes: Vec<u8>,
    pub name: String,
    /// Sniffed from the bytes when absent
    pub mime: Option<String>,
}

impl ImageFile {
    pub fn new(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        Self {
            bytes,
            name: name.into(),
            mime: None,
        }
    }
}

pub struct Editor {
    store: SessionStore,
    binding: PersistenceBinding,
    service: Arc<dyn ImageService>,
    quick_actions: QuickActionList,
    settings: Settings,
    reference_description: Option<ImageDescription>,
    config: Config,
}

impl Editor {
    /// Build an editor and restore the persisted slices
    pub fn new(service: Arc<dyn ImageService>, storage: Box<dyn KeyValueStore>, config: Config) -> Self {
        let mut binding = PersistenceBinding::new(storage);
        let rehydrated = binding.rehydrate();

        let mut editor = Self {
            store: SessionStore::new(LocatorRegistry::new()),
            binding,
            service,
            quick_actions: QuickActionList::new(),
            settings: rehydrated.settings,
            reference_description: None,
            config,
        };
        editor.dispatch(SessionEvent::SetHistory(rehydrated.history));
        editor.dispatch(SessionEvent::SetSavedPrompts(rehydrated.saved_prompts));
        editor
    }

    pub fn state(&self) -> &SessionState {
        self.store.state()
    }

    pub fn locators(&self) -> &LocatorRegistry {
        self.store.locators()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn quick_actions(&self) -> &[QuickAction] {
        self.quick_actions.actions()
    }

    pub fn reference_description(&self) -> Option<&ImageDescription> {
        self.reference_description.as_ref()
    }

    /// Apply an event, then mirror the durable slices when it can have changed them
    pub fn dispatch(&mut self, event: SessionEvent) {
        let durable = event.touches_durable();
        self.store.dispatch(event);
        if durable {
            self.binding.sync(self.store.state());
        }
    }

    // ========== Images ==========

    /// Add uploaded files; the first one becomes active when nothing is
    pub fn add_images(&mut self, files: Vec<ImageFile>) -> Vec<Locator> {
        let handles: Vec<ImageHandle> = files
            .into_iter()
            .map(|file| {
                let mime = file.mime.unwrap_or_else(|| sniff_mime(&file.bytes));
                ImageHandle::register(self.store.locators(), file.bytes, mime, file.name)
            })
            .collect();
        let locators: Vec<Locator> = handles.iter().map(|h| h.locator.clone()).collect();

        let first = locators.first().cloned();
        self.dispatch(SessionEvent::AddImages(handles));
        if self.state().active_image.is_none() && first.is_some() {
            self.dispatch(SessionEvent::SetActiveImage(first));
        }
        locators
    }

    /// Add an image from the clipboard
    pub fn paste_image(&mut self, bytes: Vec<u8>) -> Locator {
        let name = format!("pasted-{}", now_millis());
        let handle = ImageHandle::sniff(self.store.locators(), bytes, name);
        let locator = handle.locator.clone();

        self.dispatch(SessionEvent::AddImages(vec![handle]));
        if self.state().active_image.is_none() {
            self.dispatch(SessionEvent::SetActiveImage(Some(locator.clone())));
        }
        locator
    }

    /// Add a webcam frame, make it active and close the webcam
    pub fn capture_webcam(&mut self, bytes: Vec<u8>) -> Locator {
        let name = format!("webcam-{}", now_millis());
        let handle = ImageHandle::sniff(self.store.locators(), bytes, name);
        let locator = handle.locator.clone();

        self.dispatch(SessionEvent::AddImages(vec![handle]));
        self.dispatch(SessionEvent::SetActiveImage(Some(locator.clone())));
        if self.state().is_webcam_open {
            self.dispatch(SessionEvent::ToggleWebcam);
        }
        locator
    }

    pub fn set_reference_image(&mut self, bytes: Vec<u8>, name: impl Into<String>) -> Locator {
        let handle = ImageHandle::sniff(self.store.locators(), bytes, name);
        let locator = handle.locator.clone();
        self.reference_description = None;
        self.dispatch(SessionEvent::SetReferenceImage(Some(handle)));
        locator
    }

    pub fn clear_reference_image(&mut self) {
        self.reference_description = None;
        self.dispatch(SessionEvent::SetReferenceImage(None));
    }

    /// Ask the service to describe the reference image
    ///
    /// Failures are returned to the caller and leave the session untouched.
    pub async fn describe_reference(&mut self) -> Result<ImageDescription> {
        let Some(reference) = self.state().reference_image.as_ref().map(blob_of) else {
            return Err(SessionError::validation("No reference image to describe."));
        };

        self.reference_description = None;
        let description = self.service.describe_image(reference).await?;
        self.reference_description = Some(description.clone());
        Ok(description)
    }

    // ========== Generation ==========

    /// Edit the active image with the current prompt
    ///
    /// Results are compressed before `SubmitSuccess` is dispatched, so history
    /// never holds an uncompressed result.
    pub async fn submit(&mut self) -> Result<Vec<Locator>> {
        let request = {
            let state = self.state();
            match state.active_handle() {
                Some(active) if !state.prompt.is_empty() => Some(EditRequest {
                    prompt: state.prompt.clone(),
                    image: blob_of(active),
                    temperature: creativity_to_temperature(state.creativity_level),
                    reference: state.reference_image.as_ref().map(blob_of),
                }),
                _ => None,
            }
        };
        let Some(request) = request else {
            self.dispatch(SessionEvent::SubmitError(SUBMIT_PRECONDITION_MESSAGE.to_string()));
            return Err(SessionError::validation(SUBMIT_PRECONDITION_MESSAGE));
        };

        self.dispatch(SessionEvent::Submit);
        match self.generate(request).await {
            Ok(results) => {
                info!("✨ Generated {} results", results.len());
                self.dispatch(SessionEvent::SubmitSuccess(results.clone()));
                Ok(results)
            }
            Err(e) => {
                error!("❌ Generation failed: {}", e);
                self.dispatch(SessionEvent::SubmitError(e.to_string()));
                Err(e)
            }
        }
    }

    async fn generate(&self, request: EditRequest) -> Result<Vec<Locator>> {
        let raw = self.service.edit_image(request).await?;
        let compressed = compress_all(self.store.locators(), &raw, self.config.jpeg_quality).await;
        self.release_service_results(&raw);
        compressed
    }

    /// Upscale one result and substitute it in place
    pub async fn upscale(&mut self, locator: Locator, factor: ScaleFactor) -> Result<Locator> {
        self.dispatch(SessionEvent::UpscaleStart(locator.clone()));

        match self.upscale_result(&locator, factor).await {
            Ok(new) => {
                info!("🔍 Upscaled result x{}", factor.factor());
                self.dispatch(SessionEvent::UpscaleSuccess {
                    old: locator,
                    new: new.clone(),
                });
                Ok(new)
            }
            Err(e) => {
                error!("❌ Upscale failed: {}", e);
                self.dispatch(SessionEvent::UpscaleError(e.to_string()));
                Err(e)
            }
        }
    }

    async fn upscale_result(&self, locator: &Locator, factor: ScaleFactor) -> Result<Locator> {
        let source = self.store.locators().resolve(locator)?;
        let raw = self.service.upscale_image(source, factor).await?;

        let result = match raw.first() {
            Some(first) => compress_locator(self.store.locators(), first, self.config.jpeg_quality).await,
            None => Err(SessionError::service(EMPTY_UPSCALE_MESSAGE)),
        };
        self.release_service_results(&raw);
        result
    }

    /// Service results are consumed by compression; registry-backed ones are released
    fn release_service_results(&self, raw: &[Locator]) {
        for locator in raw.iter().filter(|l| l.is_transient()) {
            self.store.locators().release(locator);
        }
    }

    /// Start a new edit from a history result
    pub fn edit_history_item(&mut self, id: &str) -> Result<Locator> {
        let loaded = self
            .state()
            .find_history(id)
            .cloned()
            .ok_or_else(|| SessionError::validation(HISTORY_EDIT_MESSAGE))
            .and_then(|item| {
                let blob = self.store.locators().resolve(&item.edited_locator)?;
                Ok((item, blob))
            });

        let (item, blob) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("❌ Failed to load history item for editing: {}", e);
                self.dispatch(SessionEvent::SubmitError(HISTORY_EDIT_MESSAGE.to_string()));
                return Err(e);
            }
        };

        let prefix: String = item.prompt.chars().take(EDIT_NAME_PROMPT_CHARS).collect();
        let name = format!("Edit of \"{}...\"", prefix);
        let handle = ImageHandle::register(self.store.locators(), blob.bytes, blob.mime, name);
        let locator = handle.locator.clone();

        self.dispatch(SessionEvent::AddImages(vec![handle]));
        self.dispatch(SessionEvent::SetActiveImage(Some(locator.clone())));
        self.dispatch(SessionEvent::SetPrompt(String::new()));
        self.dispatch(SessionEvent::ClearOutput);
        Ok(locator)
    }

    pub fn clear_history(&mut self) {
        self.dispatch(SessionEvent::ClearHistory);
    }

    /// Download a history result into `dir`; returns the written path
    pub async fn export_history_item(&self, id: &str, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let item = self
            .state()
            .find_history(id)
            .ok_or_else(|| SessionError::validation(format!("No history item with id {}", id)))?;
        write_history_item(self.locators(), item, dir.as_ref()).await
    }

    // ========== Prompt authoring ==========

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.dispatch(SessionEvent::SetPrompt(prompt.into()));
    }

    /// Commit point: the prompt field lost focus
    pub fn commit_prompt(&mut self) {
        self.dispatch(SessionEvent::RecordPromptState);
    }

    /// Commit point: the creativity slider was released at `level`
    pub fn release_creativity_slider(&mut self, level: u8) {
        self.dispatch(SessionEvent::SetCreativityLevel(level));
        self.dispatch(SessionEvent::RecordPromptState);
    }

    /// Commit point: append a preset to the prompt
    pub fn apply_quick_action(&mut self, preset: &str) {
        let prompt = compose_prompt(&self.state().prompt, preset);
        self.dispatch(SessionEvent::SetPrompt(prompt));
        self.dispatch(SessionEvent::RecordPromptState);
    }

    pub fn undo_prompt(&mut self) {
        self.dispatch(SessionEvent::UndoPrompt);
    }

    pub fn redo_prompt(&mut self) {
        self.dispatch(SessionEvent::RedoPrompt);
    }

    // ========== Quick actions ==========

    /// Replace the suggestions with a fresh set for the active image
    pub async fn load_quick_actions(&mut self) -> Result<usize> {
        self.quick_actions.reset(Vec::new());
        let image = self.state().active_handle().map(blob_of);
        let actions = self.service.quick_actions(image, &[]).await?;
        self.quick_actions.reset(actions);
        Ok(self.quick_actions.len())
    }

    /// Ask for more suggestions; returns how many new ones were appended
    pub async fn load_more_quick_actions(&mut self) -> Result<usize> {
        let image = self.state().active_handle().map(blob_of);
        let seen = self.quick_actions.prompts();
        let actions = self.service.quick_actions(image, &seen).await?;
        let added = self.quick_actions.extend_unique(actions);
        debug!("{} new quick actions", added);
        Ok(added)
    }

    // ========== Session files ==========

    /// Encode the session; returns `(file name, archive text)`
    pub fn save_session(&mut self) -> Result<(String, String)> {
        match archive::encode_session(self.state()) {
            Ok(text) => Ok((archive::archive_file_name(now_millis()), text)),
            Err(e) => {
                error!("❌ Failed to save session: {}", e);
                self.dispatch(SessionEvent::SubmitError(SESSION_SAVE_MESSAGE.to_string()));
                Err(e)
            }
        }
    }

    /// Write the archive into `dir`; returns the written path
    pub async fn save_session_to(&mut self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let (name, text) = self.save_session()?;
        let path = dir.as_ref().join(name);

        if let Err(e) = tokio::fs::write(&path, text).await {
            error!("❌ Failed to write {}: {}", path.display(), e);
            self.dispatch(SessionEvent::SubmitError(SESSION_SAVE_MESSAGE.to_string()));
            return Err(e.into());
        }

        info!("💾 Session saved to {}", path.display());
        Ok(path)
    }

    pub async fn load_session(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => self.load_session_text(&text),
            Err(e) => {
                error!("❌ Failed to read {}: {}", path.display(), e);
                self.dispatch(SessionEvent::SubmitError(SESSION_LOAD_MESSAGE.to_string()));
                Err(e.into())
            }
        }
    }

    /// Replace the session with an archive; on failure only the error is shown
    pub fn load_session_text(&mut self, text: &str) -> Result<()> {
        match codec::decode_session(text, self.store.locators()) {
            Ok(restore) => {
                self.quick_actions.reset(Vec::new());
                self.reference_description = None;
                self.dispatch(SessionEvent::RestoreSession(restore));
                info!("📂 Session loaded");
                Ok(())
            }
            Err(e) => {
                error!("❌ Failed to load session: {}", e);
                self.dispatch(SessionEvent::SubmitError(SESSION_LOAD_MESSAGE.to_string()));
                Err(e)
            }
        }
    }

    // ========== Prompt library ==========

    /// Save the current prompt under `name` and close the save dialog
    pub fn save_prompt(&mut self, name: impl Into<String>) {
        let prompt = self.state().prompt.clone();
        self.dispatch(SessionEvent::SavePrompt {
            name: name.into(),
            prompt,
        });
        if self.state().is_save_prompt_modal_open {
            self.dispatch(SessionEvent::ToggleSavePromptModal);
        }
    }

    pub fn delete_prompt(&mut self, id: &str) {
        self.dispatch(SessionEvent::DeletePrompt(id.to_string()));
    }

    /// Load a saved prompt into the prompt field
    pub fn apply_saved_prompt(&mut self, id: &str) -> Result<()> {
        let prompt = self
            .state()
            .saved_prompts
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.prompt.clone())
            .ok_or_else(|| SessionError::validation(format!("No saved prompt with id {}", id)))?;
        self.dispatch(SessionEvent::SetPrompt(prompt));
        Ok(())
    }

    pub fn search_library(&self, term: &str) -> Vec<SavedPrompt> {
        library::search(&self.state().saved_prompts, term)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn export_library(&self) -> Result<String> {
        library_file::export_library(&self.state().saved_prompts)
    }

    /// Merge an exported library; returns how many prompts were added
    pub fn import_library(&mut self, text: &str) -> Result<usize> {
        let imported = library_file::import_library(text)?;
        let before = self.state().saved_prompts.len();
        let merged = library::merge(&self.state().saved_prompts, imported);
        let added = merged.len() - before;

        self.dispatch(SessionEvent::SetSavedPrompts(merged));
        info!("📚 Imported {} new prompts", added);
        Ok(added)
    }

    // ========== Settings ==========

    pub fn toggle_theme(&mut self) -> Theme {
        self.settings.theme = self.settings.theme.toggled();
        self.binding.sync_settings(&self.settings);
        self.settings.theme
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.settings.locale = locale;
        self.binding.sync_settings(&self.settings);
    }
}

/// Write the edited image of `item` into `dir` under its download name
pub async fn write_history_item(locators: &LocatorRegistry, item: &HistoryItem, dir: &Path) -> Result<PathBuf> {
    let blob = locators.resolve(&item.edited_locator)?;
    let path = dir.join(item.download_name(&blob.mime));
    tokio::fs::write(&path, &*blob.bytes).await?;
    info!("💾 Exported history item to {}", path.display());
    Ok(path)
}

fn blob_of(handle: &ImageHandle) -> Blob {
    Blob {
        bytes: handle.bytes.clone(),
        mime: handle.mime.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::data_url;
    use crate::pipeline::compress::tests::png_bytes;
    use crate::state::data::Status;
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockService {
        /// Number of results per edit, or the failure message
        edit_results: Option<std::result::Result<usize, String>>,
        upscale_empty: bool,
        suggestions: Vec<QuickAction>,
        requests: Mutex<Vec<EditRequest>>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    fn png_data_url(width: u32, height: u32) -> Locator {
        Locator::from_data_url(data_url::encode("image/png", &png_bytes(width, height)))
    }

    #[async_trait]
    impl ImageService for MockService {
        async fn edit_image(&self, request: EditRequest) -> Result<Vec<Locator>> {
            self.requests.lock().unwrap().push(request);
            match self.edit_results.clone().unwrap_or(Ok(1)) {
                Ok(count) => Ok((0..count).map(|i| png_data_url(4 + i as u32, 4)).collect()),
                Err(message) => Err(SessionError::service(message)),
            }
        }

        async fn upscale_image(&self, blob: Blob, factor: ScaleFactor) -> Result<Vec<Locator>> {
            if self.upscale_empty {
                return Ok(Vec::new());
            }
            let source = image::load_from_memory(&blob.bytes).map_err(|e| SessionError::ImageDecode(e.to_string()))?;
            Ok(vec![png_data_url(source.width() * factor.factor(), source.height() * factor.factor())])
        }

        async fn quick_actions(&self, _image: Option<Blob>, seen: &[String]) -> Result<Vec<QuickAction>> {
            self.seen.lock().unwrap().push(seen.to_vec());
            Ok(self.suggestions.clone())
        }

        async fn describe_image(&self, _image: Blob) -> Result<ImageDescription> {
            Ok(ImageDescription {
                english: "a red square".to_string(),
                vietnamese: "một hình vuông đỏ".to_string(),
            })
        }
    }

    fn test_config() -> Config {
        Config {
            data_dir: PathBuf::from("."),
            jpeg_quality: 0.9,
            storage_quota_bytes: 4 * 1024 * 1024,
        }
    }

    fn editor_with(service: MockService) -> (Editor, Arc<MockService>) {
        let service = Arc::new(service);
        let storage = Box::new(SqliteStore::in_memory(4 * 1024 * 1024).unwrap());
        (Editor::new(service.clone(), storage, test_config()), service)
    }

    fn is_jpeg(editor: &Editor, locator: &Locator) -> bool {
        let blob = editor.locators().resolve(locator).unwrap();
        blob.mime == "image/jpeg" && image::guess_format(&blob.bytes).ok() == Some(image::ImageFormat::Jpeg)
    }

    #[tokio::test]
    async fn test_submit_requires_prompt_and_image() {
        let (mut editor, service) = editor_with(MockService::default());

        let err = editor.submit().await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(editor.state().status, Status::Error);
        assert_eq!(editor.state().error.as_deref(), Some(SUBMIT_PRECONDITION_MESSAGE));

        editor.paste_image(png_bytes(4, 4));
        assert!(editor.submit().await.unwrap_err().is_validation());
        assert!(service.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_compresses_and_records_history() {
        let (mut editor, service) = editor_with(MockService {
            edit_results: Some(Ok(2)),
            ..MockService::default()
        });
        let source = editor.paste_image(png_bytes(8, 8));
        editor.set_prompt("make it snow");
        editor.release_creativity_slider(3);

        let results = editor.submit().await.unwrap();

        let state = editor.state();
        assert_eq!(state.status, Status::Success);
        assert_eq!(state.edited_urls, results);
        assert_eq!(state.history.len(), 2);
        for item in &state.history {
            assert_eq!(item.original_locator, source);
            assert_eq!(item.prompt, "make it snow");
            assert!(is_jpeg(&editor, &item.edited_locator));
        }

        let requests = service.requests.lock().unwrap();
        assert!((requests[0].temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(requests[0].reference, None);
    }

    #[tokio::test]
    async fn test_submit_passes_reference_image() {
        let (mut editor, service) = editor_with(MockService::default());
        editor.paste_image(png_bytes(4, 4));
        editor.set_reference_image(png_bytes(2, 2), "style.png");
        editor.set_prompt("match the style");

        editor.submit().await.unwrap();

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests[0].reference.as_ref().map(|b| b.mime.as_str()), Some("image/png"));
    }

    #[tokio::test]
    async fn test_service_failure_becomes_submit_error() {
        let (mut editor, _) = editor_with(MockService {
            edit_results: Some(Err("model overloaded".to_string())),
            ..MockService::default()
        });
        editor.paste_image(png_bytes(4, 4));
        editor.set_prompt("anything");

        assert!(editor.submit().await.is_err());
        assert_eq!(editor.state().status, Status::Error);
        assert_eq!(editor.state().error.as_deref(), Some("model overloaded"));
        assert!(editor.state().history.is_empty());
    }

    #[tokio::test]
    async fn test_upscale_substitutes_result() {
        let (mut editor, _) = editor_with(MockService::default());
        editor.paste_image(png_bytes(4, 4));
        editor.set_prompt("sharpen");
        let old = editor.submit().await.unwrap().remove(0);

        let new = editor.upscale(old.clone(), ScaleFactor::X2).await.unwrap();

        let state = editor.state();
        assert_eq!(state.edited_urls, vec![new.clone()]);
        assert_eq!(state.history[0].edited_locator, new);
        assert_eq!(state.upscaling_url, None);
        assert!(is_jpeg(&editor, &new));

        let upscaled = image::load_from_memory(&editor.locators().resolve(&new).unwrap().bytes).unwrap();
        assert_eq!((upscaled.width(), upscaled.height()), (8, 8));
    }

    #[tokio::test]
    async fn test_empty_upscale_is_an_error() {
        let (mut editor, _) = editor_with(MockService {
            upscale_empty: true,
            ..MockService::default()
        });
        editor.paste_image(png_bytes(4, 4));
        editor.set_prompt("sharpen");
        let old = editor.submit().await.unwrap().remove(0);

        assert!(editor.upscale(old.clone(), ScaleFactor::X4).await.is_err());
        assert_eq!(editor.state().error.as_deref(), Some(EMPTY_UPSCALE_MESSAGE));
        assert_eq!(editor.state().edited_urls, vec![old]);
        assert_eq!(editor.state().upscaling_url, None);
    }

    #[tokio::test]
    async fn test_edit_history_item() {
        let (mut editor, _) = editor_with(MockService::default());
        editor.paste_image(png_bytes(4, 4));
        editor.set_prompt("make it snowy outside tonight");
        editor.submit().await.unwrap();
        let id = editor.state().history[0].id.clone();

        let locator = editor.edit_history_item(&id).unwrap();

        let state = editor.state();
        assert_eq!(state.active_image, Some(locator.clone()));
        assert_eq!(state.uploaded_images.len(), 2);
        assert_eq!(state.active_handle().unwrap().name, "Edit of \"make it snowy outsid...\"");
        assert_eq!(state.active_handle().unwrap().mime, "image/jpeg");
        assert_eq!(state.prompt, "");
        assert!(state.edited_urls.is_empty());
        assert_eq!(state.status, Status::Idle);
        assert!(locator.is_transient());
    }

    #[tokio::test]
    async fn test_export_history_item() {
        let dir = TempDir::new().unwrap();
        let (mut editor, _) = editor_with(MockService::default());
        editor.paste_image(png_bytes(4, 4));
        editor.set_prompt("Make it snow!");
        editor.submit().await.unwrap();
        let item = editor.state().history[0].clone();

        let path = editor.export_history_item(&item.id, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join(format!("make-it-snow--{}.jpg", item.timestamp)));
        let written = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&written).unwrap(), image::ImageFormat::Jpeg);

        assert!(editor.export_history_item("missing", dir.path()).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_edit_unknown_history_item() {
        let (mut editor, _) = editor_with(MockService::default());
        assert!(editor.edit_history_item("missing").is_err());
        assert_eq!(editor.state().error.as_deref(), Some(HISTORY_EDIT_MESSAGE));
    }

    #[test]
    fn test_add_images_selects_first_only_when_idle() {
        let (mut editor, _) = editor_with(MockService::default());

        let first = editor.add_images(vec![
            ImageFile::new(png_bytes(2, 2), "a.png"),
            ImageFile::new(png_bytes(3, 3), "b.png"),
        ]);
        assert_eq!(editor.state().active_image, Some(first[0].clone()));
        assert_eq!(editor.state().uploaded_images[0].mime, "image/png");

        editor.add_images(vec![ImageFile::new(png_bytes(2, 2), "c.png")]);
        assert_eq!(editor.state().active_image, Some(first[0].clone()));
        assert_eq!(editor.state().uploaded_images.len(), 3);
    }

    #[test]
    fn test_webcam_capture_closes_webcam() {
        let (mut editor, _) = editor_with(MockService::default());
        editor.add_images(vec![ImageFile::new(png_bytes(2, 2), "a.png")]);
        editor.dispatch(SessionEvent::ToggleWebcam);
        assert!(editor.state().is_webcam_open);

        let captured = editor.capture_webcam(png_bytes(3, 3));

        let state = editor.state();
        assert!(!state.is_webcam_open);
        assert_eq!(state.active_image, Some(captured));
        assert!(state.active_handle().unwrap().name.starts_with("webcam-"));
    }

    #[test]
    fn test_webcam_capture_never_opens_webcam() {
        let (mut editor, _) = editor_with(MockService::default());
        assert!(!editor.state().is_webcam_open);

        let captured = editor.capture_webcam(png_bytes(3, 3));

        assert!(!editor.state().is_webcam_open);
        assert_eq!(editor.state().active_image, Some(captured));
    }

    #[test]
    fn test_removing_upload_releases_locator() {
        let (mut editor, _) = editor_with(MockService::default());
        let pasted = editor.paste_image(png_bytes(2, 2));
        assert!(editor.state().active_handle().unwrap().name.starts_with("pasted-"));

        editor.dispatch(SessionEvent::RemoveImage(pasted.clone()));

        assert!(!editor.locators().is_live(&pasted));
        assert_eq!(editor.state().active_image, None);
    }

    #[test]
    fn test_quick_action_is_a_commit_point() {
        let (mut editor, _) = editor_with(MockService::default());
        editor.set_prompt("add a cat,");
        editor.commit_prompt();
        editor.apply_quick_action("studio lighting");
        assert_eq!(editor.state().prompt, "add a cat, studio lighting");

        editor.undo_prompt();
        assert_eq!(editor.state().prompt, "add a cat,");
        editor.redo_prompt();
        assert_eq!(editor.state().prompt, "add a cat, studio lighting");
    }

    #[tokio::test]
    async fn test_quick_actions_dedup_on_load_more() {
        let (mut editor, service) = editor_with(MockService {
            suggestions: vec![
                QuickAction::new("BG", "remove background"),
                QuickAction::new("HD", "enhance to HD"),
            ],
            ..MockService::default()
        });
        editor.paste_image(png_bytes(2, 2));

        assert_eq!(editor.load_quick_actions().await.unwrap(), 2);
        assert_eq!(editor.load_more_quick_actions().await.unwrap(), 0);
        assert_eq!(editor.quick_actions().len(), 2);

        let seen = service.seen.lock().unwrap();
        assert!(seen[0].is_empty());
        assert_eq!(seen[1], vec!["remove background", "enhance to HD"]);
    }

    #[tokio::test]
    async fn test_describe_reference() {
        let (mut editor, _) = editor_with(MockService::default());
        assert!(editor.describe_reference().await.unwrap_err().is_validation());

        let reference = editor.set_reference_image(png_bytes(2, 2), "style.png");
        let description = editor.describe_reference().await.unwrap();
        assert_eq!(description.english, "a red square");
        assert!(editor.reference_description().is_some());

        editor.clear_reference_image();
        assert!(editor.reference_description().is_none());
        assert!(!editor.locators().is_live(&reference));
    }

    #[tokio::test]
    async fn test_save_and_load_session_file() {
        let dir = TempDir::new().unwrap();
        let (mut editor, _) = editor_with(MockService::default());
        editor.add_images(vec![
            ImageFile::new(png_bytes(2, 2), "a.png"),
            ImageFile::new(png_bytes(3, 3), "b.png"),
        ]);
        editor.set_prompt("make it snow");
        editor.submit().await.unwrap();
        editor.save_prompt("Snow");

        let path = editor.save_session_to(dir.path()).await.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("ai-image-editor-session-"));

        let (mut other, _) = editor_with(MockService::default());
        other.paste_image(png_bytes(5, 5));
        let stale = other.state().uploaded_images[0].locator.clone();

        other.load_session(&path).await.unwrap();

        let (a, b) = (editor.state(), other.state());
        assert_eq!(b.prompt, a.prompt);
        assert_eq!(b.history, a.history);
        assert_eq!(b.saved_prompts, a.saved_prompts);
        assert_eq!(b.uploaded_images.len(), 2);
        assert_eq!(b.active_handle().unwrap().name, "a.png");
        assert_eq!(b.active_handle().unwrap().bytes, a.active_handle().unwrap().bytes);
        assert!(!other.locators().is_live(&stale));
        assert_eq!(other.locators().live_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_session() {
        let (mut editor, _) = editor_with(MockService::default());
        let pasted = editor.paste_image(png_bytes(2, 2));
        editor.set_prompt("keep me");

        assert!(editor.load_session_text(r#"{"version": 2}"#).is_err());
        assert_eq!(editor.state().error.as_deref(), Some(SESSION_LOAD_MESSAGE));
        assert_eq!(editor.state().prompt, "keep me");
        assert_eq!(editor.state().active_image, Some(pasted));

        assert!(editor.load_session("/nonexistent/session.json").await.is_err());
        assert_eq!(editor.state().error.as_deref(), Some(SESSION_LOAD_MESSAGE));
    }

    #[test]
    fn test_import_library_merges_new_ids() {
        let (mut editor, _) = editor_with(MockService::default());
        editor.set_prompt("add a hat");
        editor.save_prompt("Hat");
        let existing_id = editor.state().saved_prompts[0].id.clone();

        let file = format!(
            r#"[{{"id": "{}", "name": "Clash", "prompt": "x"}}, {{"id": "new", "name": "Sky", "prompt": "purple sky"}}]"#,
            existing_id
        );
        assert_eq!(editor.import_library(&file).unwrap(), 1);
        assert_eq!(editor.state().saved_prompts.len(), 2);
        assert_eq!(editor.state().saved_prompts[0].name, "Sky");

        assert!(editor.import_library("{}").is_err());
        assert_eq!(editor.state().saved_prompts.len(), 2);

        let exported = editor.export_library().unwrap();
        assert_eq!(library_file::import_library(&exported).unwrap().len(), 2);
        assert_eq!(editor.search_library("SKY").len(), 1);

        editor.apply_saved_prompt("new").unwrap();
        assert_eq!(editor.state().prompt, "purple sky");
    }

    #[tokio::test]
    async fn test_persisted_slices_survive_restart() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("image_session.db");
        let service = Arc::new(MockService::default());

        {
            let storage = Box::new(SqliteStore::open(&db, 4 * 1024 * 1024).unwrap());
            let mut editor = Editor::new(service.clone(), storage, test_config());
            editor.paste_image(png_bytes(4, 4));
            editor.set_prompt("make it snow");
            editor.submit().await.unwrap();
            editor.save_prompt("Snow");
            assert_eq!(editor.toggle_theme(), Theme::Light);
            editor.set_locale(Locale::Vi);
        }

        let storage = Box::new(SqliteStore::open(&db, 4 * 1024 * 1024).unwrap());
        let editor = Editor::new(service, storage, test_config());
        assert_eq!(editor.state().history.len(), 1);
        assert_eq!(editor.state().saved_prompts[0].name, "Snow");
        assert_eq!(editor.settings(), Settings { theme: Theme::Light, locale: Locale::Vi });
        // Uploads are session-only
        assert!(editor.state().uploaded_images.is_empty());
    }

    /// Store that rejects every write and counts the attempts
    #[derive(Clone, Default)]
    struct FullStore {
        attempts: Arc<AtomicUsize>,
    }

    impl KeyValueStore for FullStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, key: &str, _value: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::QuotaExceeded { key: key.to_string() })
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_only_durable_events_are_persisted() {
        let store = FullStore::default();
        let mut editor = Editor::new(Arc::new(MockService::default()), Box::new(store.clone()), test_config());
        let after_startup = store.attempts.load(Ordering::SeqCst);

        editor.set_prompt("typing");
        editor.commit_prompt();
        editor.paste_image(png_bytes(2, 2));
        assert_eq!(store.attempts.load(Ordering::SeqCst), after_startup);

        editor.clear_history();
        assert!(store.attempts.load(Ordering::SeqCst) > after_startup);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_request_futures_are_send() {
        let (mut editor, _) = editor_with(MockService::default());
        assert_send(&editor.submit());
        assert_send(&editor.upscale(Locator::from("blob:x"), ScaleFactor::X2));
        assert_send(&editor.describe_reference());
    }

    #[tokio::test]
    async fn test_full_storage_does_not_touch_state() {
        let service = Arc::new(MockService::default());
        let storage = Box::new(SqliteStore::in_memory(64).unwrap());
        let mut editor = Editor::new(service, storage, test_config());
        editor.paste_image(png_bytes(4, 4));
        editor.set_prompt("make it snow");

        editor.submit().await.unwrap();

        assert_eq!(editor.state().status, Status::Success);
        assert_eq!(editor.state().history.len(), 1);
    }
}
