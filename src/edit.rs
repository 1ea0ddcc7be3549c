//! Contracts for the external editing collaborators.
//!
//! Border-detection cropping and glare removal live outside this crate.
//! [`EditSession`](crate::session::EditSession) consumes them through these
//! traits and only cares about their outputs.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pixels::PixelBuffer;

/// Which border an automatic crop looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropStage {
    /// Outer border (first crop).
    Outer,
    /// Inner border (every later crop).
    Inner,
}

impl CropStage {
    /// Stage for a 1-based crop step number.
    #[must_use]
    pub fn from_step(step: u32) -> Self {
        if step <= 1 { Self::Outer } else { Self::Inner }
    }

    /// Lowercase name, as used in messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Outer => "outer",
            Self::Inner => "inner",
        }
    }
}

/// Four corner points of a detected or selected region, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners(pub [(f32, f32); 4]);

/// Output of a successful automatic crop.
#[derive(Debug, Clone)]
pub struct CropOutcome {
    /// Cropped image.
    pub image: PixelBuffer,
    /// Corners of the detected border.
    pub corners: Corners,
    /// Step number the cropper expects next.
    pub next_step: u32,
}

/// Border-detection cropper.
pub trait Cropper {
    /// Detect and crop the border for `stage`.
    ///
    /// `Ok(None)` means no border was found at that stage.
    fn crop_next_stage(
        &mut self,
        image: &PixelBuffer,
        stage: CropStage,
    ) -> Result<Option<CropOutcome>>;

    /// Crop from an interactive selection made outside this crate.
    fn manual_crop(&mut self, image: &PixelBuffer) -> Result<(PixelBuffer, Corners)>;
}

/// Glare-removal dialog or filter.
pub trait GlareRemover {
    /// Returns the processed image, or `None` if the user cancelled.
    fn remove_glare(&mut self, image: &PixelBuffer) -> Option<PixelBuffer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_step() {
        assert_eq!(CropStage::from_step(0), CropStage::Outer);
        assert_eq!(CropStage::from_step(1), CropStage::Outer);
        assert_eq!(CropStage::from_step(2), CropStage::Inner);
        assert_eq!(CropStage::from_step(7), CropStage::Inner);
        assert_eq!(CropStage::Inner.name(), "inner");
    }
}
