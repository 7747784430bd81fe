//! External image service interface
//!
//! Generation, upscaling, description and quick-action suggestions are all
//! delegated to a remote model. The editor only depends on this trait, so a
//! real client and a test double are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::state::locator::{Blob, Locator};
use crate::state::quick_action::QuickAction;
use crate::state::session::MAX_CREATIVITY;

/// Upscale factor accepted by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleFactor {
    X2,
    X4,
}

impl ScaleFactor {
    pub fn factor(self) -> u32 {
        match self {
            ScaleFactor::X2 => 2,
            ScaleFactor::X4 => 4,
        }
    }
}

impl TryFrom<u32> for ScaleFactor {
    type Error = SessionError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            2 => Ok(ScaleFactor::X2),
            4 => Ok(ScaleFactor::X4),
            other => Err(SessionError::validation(format!("Unsupported upscale factor: {}", other))),
        }
    }
}

/// Map the 0-10 creativity slider onto a 0.0-1.0 sampling temperature
pub fn creativity_to_temperature(level: u8) -> f32 {
    f32::from(level.min(MAX_CREATIVITY)) / f32::from(MAX_CREATIVITY)
}

/// Everything a generation request carries
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub prompt: String,
    pub image: Blob,
    /// 0.0 (faithful) to 1.0 (creative)
    pub temperature: f32,
    /// Optional style guidance
    pub reference: Option<Blob>,
}

/// Bilingual description of a reference image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescription {
    pub english: String,
    pub vietnamese: String,
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Edit `request.image` according to the prompt; one or more results
    async fn edit_image(&self, request: EditRequest) -> Result<Vec<Locator>>;

    /// Upscale an image; an empty result means the service produced nothing
    async fn upscale_image(&self, image: Blob, factor: ScaleFactor) -> Result<Vec<Locator>>;

    /// Suggest prompts for an image, avoiding the ones in `seen`
    async fn quick_actions(&self, image: Option<Blob>, seen: &[String]) -> Result<Vec<QuickAction>>;

    async fn describe_image(&self, image: Blob) -> Result<ImageDescription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creativity_scaling() {
        assert_eq!(creativity_to_temperature(0), 0.0);
        assert_eq!(creativity_to_temperature(5), 0.5);
        assert_eq!(creativity_to_temperature(10), 1.0);
        assert_eq!(creativity_to_temperature(200), 1.0);
    }

    #[test]
    fn test_scale_factor() {
        assert_eq!(ScaleFactor::try_from(4).unwrap(), ScaleFactor::X4);
        assert_eq!(ScaleFactor::X2.factor(), 2);
        assert!(ScaleFactor::try_from(3).unwrap_err().is_validation());
    }
}
