//! Document conversion collaborators
//!
//! A converter turns the imported manuscript into one HTML fragment plus the
//! images embedded in it. The fragment must keep heading levels, because the
//! markup transformer splits chapters on them. Beyond that its shape is not
//! trusted: the transformer flattens wrappers and repairs detached headings.
//!
//! - [DocxConverter] reads the Office Open XML parts in process and is the default.
//! - `PandocConverter` (feature `pandoc`) runs the `pandoc` program.

use std::path::Path;

use crate::{error::PressError, types::ExtractedImage};

mod docx;
#[cfg(feature = "pandoc")]
mod pandoc;

pub use docx::DocxConverter;
#[cfg(feature = "pandoc")]
pub use pandoc::PandocConverter;

/// Output of a conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertedDocument {
    /// One HTML fragment for the whole manuscript
    pub html: String,

    /// Embedded images, with names unique within this conversion
    pub images: Vec<ExtractedImage>,
}

impl ConvertedDocument {
    pub fn image(&self, name: &str) -> Option<&ExtractedImage> {
        self.images.iter().find(|image| image.name == name)
    }
}

/// Converts a word-processor manuscript into HTML
pub trait DocumentConverter {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// # Return
    /// - `Err(PressError::ConversionFailed)`: The collaborator failed or produced nothing usable
    /// - `Err(PressError::CollaboratorUnavailable)`: The collaborator could not be started
    fn convert(&self, manuscript: &Path) -> Result<ConvertedDocument, PressError>;
}
