//! Session aggregate and its transition function
//!
//! `transition` is the only code that produces session data. Every event
//! yields a new `SessionState`; the previous one is left untouched.

use std::collections::HashSet;
use tracing::debug;

use super::data::{HistoryItem, ImageHandle, PromptDraftSnapshot, SavedPrompt, Status};
use super::event::{SessionEvent, SessionRestore};
use super::locator::{Locator, LocatorRegistry};
use super::prompt_log::PromptLog;

/// Creativity level of a fresh session
pub const DEFAULT_CREATIVITY: u8 = 5;

/// Highest creativity level accepted by the slider
pub const MAX_CREATIVITY: u8 = 10;

/// Everything the user can see and edit in one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub status: Status,
    pub prompt: String,
    /// 0 (faithful) to 10 (creative)
    pub creativity_level: u8,
    /// Insertion order, unique by locator
    pub uploaded_images: Vec<ImageHandle>,
    /// Locator of the active upload, if any
    pub active_image: Option<Locator>,
    /// Results of the most recent generation or upscale
    pub edited_urls: Vec<Locator>,
    pub error: Option<String>,
    /// Newest first
    pub history: Vec<HistoryItem>,
    /// Optional style guidance image
    pub reference_image: Option<ImageHandle>,
    pub prompt_log: PromptLog,
    pub saved_prompts: Vec<SavedPrompt>,

    // ========== Transient UI flags ==========
    pub modal_image: Option<Locator>,
    pub is_webcam_open: bool,
    /// Result currently being upscaled
    pub upscaling_url: Option<Locator>,
    pub is_save_prompt_modal_open: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            prompt: String::new(),
            creativity_level: DEFAULT_CREATIVITY,
            uploaded_images: Vec::new(),
            active_image: None,
            edited_urls: Vec::new(),
            error: None,
            history: Vec::new(),
            reference_image: None,
            prompt_log: PromptLog::default(),
            saved_prompts: Vec::new(),
            modal_image: None,
            is_webcam_open: false,
            upscaling_url: None,
            is_save_prompt_modal_open: false,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active upload, resolved against the upload list
    pub fn active_handle(&self) -> Option<&ImageHandle> {
        let active = self.active_image.as_ref()?;
        self.find_upload(active)
    }

    pub fn find_upload(&self, locator: &Locator) -> Option<&ImageHandle> {
        self.uploaded_images.iter().find(|img| &img.locator == locator)
    }

    pub fn find_history(&self, id: &str) -> Option<&HistoryItem> {
        self.history.iter().find(|item| item.id == id)
    }

    /// Transient locators owned by handles reachable from this state
    ///
    /// The active image is always one of the uploads, so uploads and the
    /// reference image cover every owner.
    pub fn owned_locators(&self) -> HashSet<Locator> {
        self.uploaded_images
            .iter()
            .chain(self.reference_image.iter())
            .map(|img| img.locator.clone())
            .collect()
    }

    pub fn can_undo(&self) -> bool {
        self.prompt_log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.prompt_log.can_redo()
    }

    fn adopt(&mut self, snapshot: &PromptDraftSnapshot) {
        self.prompt = snapshot.prompt.clone();
        self.creativity_level = snapshot.creativity_level;
    }
}

/// Apply one event to a state and return the next state
///
/// Never fails: precondition checks (e.g., submit without an active image)
/// belong to the caller. The one side effect is on `RestoreSession`, which
/// releases the transient locators held by `state` before the replacement
/// is adopted.
pub fn transition(state: &SessionState, event: SessionEvent, locators: &LocatorRegistry) -> SessionState {
    debug!("transition: {}", event.name());
    let mut next = state.clone();

    match event {
        SessionEvent::SetPrompt(prompt) => next.prompt = prompt,
        SessionEvent::SetCreativityLevel(level) => next.creativity_level = level.min(MAX_CREATIVITY),
        SessionEvent::RecordPromptState => {
            let snapshot = PromptDraftSnapshot::new(next.prompt.clone(), next.creativity_level);
            next.prompt_log.record(snapshot);
        }
        SessionEvent::UndoPrompt => {
            if let Some(snapshot) = next.prompt_log.undo().cloned() {
                next.adopt(&snapshot);
            }
        }
        SessionEvent::RedoPrompt => {
            if let Some(snapshot) = next.prompt_log.redo().cloned() {
                next.adopt(&snapshot);
            }
        }

        SessionEvent::AddImages(images) => {
            let mut seen: HashSet<Locator> = next
                .uploaded_images
                .iter()
                .map(|img| img.locator.clone())
                .collect();
            for image in images {
                if seen.insert(image.locator.clone()) {
                    next.uploaded_images.push(image);
                }
            }
        }
        SessionEvent::SetActiveImage(locator) => {
            // Results belong to one source image; switching invalidates them
            next.active_image = locator.filter(|l| state.find_upload(l).is_some());
            next.edited_urls.clear();
            next.status = Status::Idle;
            next.error = None;
        }
        SessionEvent::RemoveImage(locator) => {
            next.uploaded_images.retain(|img| img.locator != locator);
            if next.active_image.as_ref() == Some(&locator) {
                next.active_image = None;
            }
        }
        SessionEvent::SetImageName { locator, name } => {
            if let Some(image) = next.uploaded_images.iter_mut().find(|img| img.locator == locator) {
                image.name = name;
            }
        }
        SessionEvent::SetReferenceImage(image) => next.reference_image = image,

        SessionEvent::Submit => {
            next.status = Status::Loading;
            next.error = None;
            next.edited_urls.clear();
        }
        SessionEvent::SubmitSuccess(results) => {
            let Some(active) = state.active_handle() else {
                return next;
            };
            let mut history: Vec<HistoryItem> = results
                .iter()
                .map(|edited| HistoryItem::new(state.prompt.clone(), active.locator.clone(), edited.clone()))
                .collect();
            history.append(&mut next.history);
            next.history = history;
            next.edited_urls = results;
            next.status = Status::Success;
        }
        SessionEvent::SubmitError(message) => {
            next.status = Status::Error;
            next.error = Some(message);
        }
        SessionEvent::ClearOutput => {
            next.edited_urls.clear();
            next.status = Status::Idle;
            next.error = None;
        }

        SessionEvent::UpscaleStart(locator) => {
            next.status = Status::Loading;
            next.upscaling_url = Some(locator);
            next.error = None;
        }
        SessionEvent::UpscaleSuccess { old, new } => {
            for url in next.edited_urls.iter_mut().filter(|url| **url == old) {
                *url = new.clone();
            }
            for item in next.history.iter_mut().filter(|item| item.edited_locator == old) {
                item.edited_locator = new.clone();
            }
            next.status = Status::Success;
            next.upscaling_url = None;
        }
        SessionEvent::UpscaleError(message) => {
            next.status = Status::Error;
            next.upscaling_url = None;
            next.error = Some(message);
        }

        SessionEvent::SetHistory(history) => next.history = history,
        SessionEvent::ClearHistory => next.history.clear(),

        SessionEvent::SavePrompt { name, prompt } => {
            next.saved_prompts.insert(0, SavedPrompt::new(name, prompt));
        }
        SessionEvent::DeletePrompt(id) => next.saved_prompts.retain(|p| p.id != id),
        SessionEvent::SetSavedPrompts(prompts) => next.saved_prompts = prompts,

        SessionEvent::SetModalImage(locator) => next.modal_image = locator,
        SessionEvent::ToggleWebcam => next.is_webcam_open = !next.is_webcam_open,
        SessionEvent::ToggleSavePromptModal => {
            next.is_save_prompt_modal_open = !next.is_save_prompt_modal_open
        }

        SessionEvent::RestoreSession(restore) => return restore_session(state, restore, locators),
    }

    next
}

/// Release everything `state` owns and adopt `restore` over the defaults
///
/// The undo log restarts from the restored prompt: a restore is a hard checkpoint.
fn restore_session(state: &SessionState, restore: SessionRestore, locators: &LocatorRegistry) -> SessionState {
    let incoming: HashSet<&Locator> = restore.locators().collect();
    let mut released = 0;
    for locator in state.owned_locators() {
        if !incoming.contains(&locator) && locators.release(&locator) {
            released += 1;
        }
    }
    debug!("restore released {} locators", released);

    let prompt = restore.prompt.unwrap_or_default();
    let creativity_level = restore
        .creativity_level
        .unwrap_or(DEFAULT_CREATIVITY)
        .min(MAX_CREATIVITY);
    let active_image = restore
        .active_image
        .filter(|l| restore.uploaded_images.iter().any(|img| &img.locator == l));

    SessionState {
        prompt_log: PromptLog::new(PromptDraftSnapshot::new(prompt.clone(), creativity_level)),
        prompt,
        creativity_level,
        uploaded_images: restore.uploaded_images,
        active_image,
        history: restore.history.unwrap_or_default(),
        reference_image: restore.reference_image,
        saved_prompts: restore.saved_prompts.unwrap_or_default(),
        ..SessionState::default()
    }
}
