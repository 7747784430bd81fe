//! Events accepted by the session state machine
//!
//! One variant per transition, each carrying only what it needs.

use super::data::{HistoryItem, ImageHandle, SavedPrompt};
use super::locator::Locator;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // ========== Prompt authoring ==========
    SetPrompt(String),
    /// Clamped to 0..=10
    SetCreativityLevel(u8),
    /// Commit point: snapshot prompt + creativity into the undo log
    RecordPromptState,
    UndoPrompt,
    RedoPrompt,

    // ========== Uploaded images ==========
    /// Appends images whose locator is not already uploaded
    AddImages(Vec<ImageHandle>),
    /// Selects the source image; clears results, status and error
    SetActiveImage(Option<Locator>),
    RemoveImage(Locator),
    SetImageName { locator: Locator, name: String },
    SetReferenceImage(Option<ImageHandle>),

    // ========== Generation ==========
    Submit,
    /// Compressed result locators, in service order
    SubmitSuccess(Vec<Locator>),
    SubmitError(String),
    ClearOutput,

    // ========== Upscale ==========
    UpscaleStart(Locator),
    UpscaleSuccess { old: Locator, new: Locator },
    UpscaleError(String),

    // ========== History ==========
    SetHistory(Vec<HistoryItem>),
    ClearHistory,

    // ========== Prompt library ==========
    SavePrompt { name: String, prompt: String },
    DeletePrompt(String),
    SetSavedPrompts(Vec<SavedPrompt>),

    // ========== Transient UI flags ==========
    SetModalImage(Option<Locator>),
    ToggleWebcam,
    ToggleSavePromptModal,

    /// Replace the whole session (load from file)
    RestoreSession(SessionRestore),
}

impl SessionEvent {
    /// True for events that can change history or the prompt library
    pub fn touches_durable(&self) -> bool {
        matches!(
            self,
            Self::SubmitSuccess(_)
                | Self::UpscaleSuccess { .. }
                | Self::SetHistory(_)
                | Self::ClearHistory
                | Self::SavePrompt { .. }
                | Self::DeletePrompt(_)
                | Self::SetSavedPrompts(_)
                | Self::RestoreSession(_)
        )
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetPrompt(_) => "SetPrompt",
            Self::SetCreativityLevel(_) => "SetCreativityLevel",
            Self::RecordPromptState => "RecordPromptState",
            Self::UndoPrompt => "UndoPrompt",
            Self::RedoPrompt => "RedoPrompt",
            Self::AddImages(_) => "AddImages",
            Self::SetActiveImage(_) => "SetActiveImage",
            Self::RemoveImage(_) => "RemoveImage",
            Self::SetImageName { .. } => "SetImageName",
            Self::SetReferenceImage(_) => "SetReferenceImage",
            Self::Submit => "Submit",
            Self::SubmitSuccess(_) => "SubmitSuccess",
            Self::SubmitError(_) => "SubmitError",
            Self::ClearOutput => "ClearOutput",
            Self::UpscaleStart(_) => "UpscaleStart",
            Self::UpscaleSuccess { .. } => "UpscaleSuccess",
            Self::UpscaleError(_) => "UpscaleError",
            Self::SetHistory(_) => "SetHistory",
            Self::ClearHistory => "ClearHistory",
            Self::SavePrompt { .. } => "SavePrompt",
            Self::DeletePrompt(_) => "DeletePrompt",
            Self::SetSavedPrompts(_) => "SetSavedPrompts",
            Self::SetModalImage(_) => "SetModalImage",
            Self::ToggleWebcam => "ToggleWebcam",
            Self::ToggleSavePromptModal => "ToggleSavePromptModal",
            Self::RestoreSession(_) => "RestoreSession",
        }
    }
}

/// Partial session used by `RestoreSession`
///
/// Missing fields fall back to the session defaults. Handles must carry
/// freshly minted locators (the codec guarantees this).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionRestore {
    pub prompt: Option<String>,
    pub creativity_level: Option<u8>,
    pub uploaded_images: Vec<ImageHandle>,
    /// Must name one of `uploaded_images`, otherwise treated as none
    pub active_image: Option<Locator>,
    pub history: Option<Vec<HistoryItem>>,
    pub reference_image: Option<ImageHandle>,
    pub saved_prompts: Option<Vec<SavedPrompt>>,
}

impl SessionRestore {
    /// Every transient locator carried by this payload
    pub fn locators(&self) -> impl Iterator<Item = &Locator> {
        self.uploaded_images
            .iter()
            .chain(self.reference_image.iter())
            .map(|handle| &handle.locator)
    }
}
