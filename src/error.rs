//! Error Type Definition Module
//!
//! This module defines the errors that may be encountered while assembling
//! a work. All errors are uniformly wrapped in the `PressError` enumeration
//! so that every step of the pipeline reports to its caller the same way.
//!
//! ## Main Error Types
//!
//! - [PressError] - Enumeration of the errors raised by the pipeline
//! - [IntegrityError] - Internal consistency violations found while assembling a package
//! - [FieldError] - A single metadata field problem, aggregated by [PressError::ValidationError]

use std::fmt::Display;

use thiserror::Error;

/// Types of errors that can occur while building a work
///
/// User-fixable problems (bad metadata, bad assets, steps called out of order)
/// carry enough context to act on. Internal invariant violations are reported
/// through [PressError::PackageIntegrityError] and are never retried.
#[derive(Debug, Error)]
pub enum PressError {
    /// ZIP archive related errors
    ///
    /// Raised when reading a manuscript or packaged archive fails,
    /// or when writing the final archive fails.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Validation was requested before a package was built
    #[error("Build incomplete: the work has not been built yet, call `build` before `validate`.")]
    BuildIncomplete,

    /// An external collaborator could not be started
    ///
    /// This usually means the program is not installed or not on `PATH`.
    #[error("Collaborator unavailable: Unable to run \"{collaborator}\": {reason}")]
    CollaboratorUnavailable { collaborator: String, reason: String },

    /// The document conversion collaborator failed
    ///
    /// Either the collaborator exited with an error, or it produced no usable
    /// markup for a non-empty manuscript. `diagnostic` carries its output.
    #[error("Conversion failed: {diagnostic}")]
    ConversionFailed { diagnostic: String },

    /// Data Decoding Error - Null data
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    #[error("Image error: {source}")]
    ImageError { source: image::ImageError },

    #[error("JSON error: {source}")]
    JsonError { source: serde_json::Error },

    /// Missing required attribute error
    ///
    /// Triggered when an XML element lacks an attribute that the
    /// EPUB or OOXML format requires.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Non-canonical file structure error
    ///
    /// Raised when a required XML element or archive entry is missing.
    #[error("Non-canonical file: The \"{tag}\" elements was not found.")]
    NonCanonicalFile { tag: String },

    /// The assembled package violates an internal invariant
    ///
    /// This indicates a defect in the transformer or synthesizer, not bad input.
    #[error("Package integrity error: {source}")]
    PackageIntegrityError { source: IntegrityError },

    /// A work step was invoked out of order
    #[error("Precondition error: \"{step}\" requires {}", .missing.join(", "))]
    PreconditionError { step: String, missing: Vec<String> },

    /// A manifest id that a packaged archive does not declare
    #[error("Resource not found: Unable to find resource with id \"{id}\".")]
    ResourceIdNotExist { id: String },

    /// A file that should be in the archive is not
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Relative link leak error
    ///
    /// A relative reference escapes the package root.
    #[error("Relative link leakage: Path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// A path-like source did not resolve and did not decode as encoded data
    #[error("Source not found: \"{source_ref}\" is neither a readable file nor valid encoded data.")]
    SourceNotFound { source_ref: String },

    /// A contributor role outside the supported enumeration
    #[error("Unknown contributor role: \"{role}\" is not one of artist, editor, translator.")]
    UnknownContributorRole { role: String },

    /// The sniffed content type of an asset is not allowed for its role
    #[error("Unsupported media type: {role} expects {expected}, but \"{found}\" was detected.")]
    UnsupportedMediaType {
        role: String,
        expected: String,
        found: String,
    },

    /// Unsupported encryption method error
    ///
    /// Only IDPF font obfuscation can be undone.
    #[error("Unsupported encryption method: The \"{method}\" encryption method is not supported.")]
    UnsupportedEncryptedMethod { method: String },

    /// Unusable compression method error
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    /// UTF-8 decoding error
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// Metadata validation failed
    ///
    /// Every violated field is listed, not only the first one found.
    #[error("Metadata validation failed: {}", format_field_errors(.errors))]
    ValidationError { errors: Vec<FieldError> },

    /// WalkDir error
    ///
    /// This error occurs when using the WalkDir library to traverse the staging directory.
    #[error("WalkDir error: {source}")]
    WalkDirError { source: walkdir::Error },

    /// QuickXml error
    ///
    /// This error occurs when parsing or writing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl From<zip::result::ZipError> for PressError {
    fn from(value: zip::result::ZipError) -> Self {
        PressError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for PressError {
    fn from(value: quick_xml::Error) -> Self {
        PressError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for PressError {
    fn from(value: std::io::Error) -> Self {
        PressError::IOError { source: value }
    }
}

impl From<image::ImageError> for PressError {
    fn from(value: image::ImageError) -> Self {
        PressError::ImageError { source: value }
    }
}

impl From<serde_json::Error> for PressError {
    fn from(value: serde_json::Error) -> Self {
        PressError::JsonError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for PressError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        PressError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for PressError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        PressError::Utf16DecodeError { source: value }
    }
}

impl From<IntegrityError> for PressError {
    fn from(value: IntegrityError) -> Self {
        PressError::PackageIntegrityError { source: value }
    }
}

impl From<walkdir::Error> for PressError {
    fn from(value: walkdir::Error) -> Self {
        PressError::WalkDirError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for PressError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::MissingRequiredAttribute {
                    tag: l_tag,
                    attribute: l_attribute,
                },
                Self::MissingRequiredAttribute {
                    tag: r_tag,
                    attribute: r_attribute,
                },
            ) => l_tag == r_tag && l_attribute == r_attribute,
            (Self::NonCanonicalFile { tag: l_tag }, Self::NonCanonicalFile { tag: r_tag }) => {
                l_tag == r_tag
            }
            (
                Self::PackageIntegrityError { source: l_source },
                Self::PackageIntegrityError { source: r_source },
            ) => l_source == r_source,
            (
                Self::PreconditionError {
                    step: l_step,
                    missing: l_missing,
                },
                Self::PreconditionError {
                    step: r_step,
                    missing: r_missing,
                },
            ) => l_step == r_step && l_missing == r_missing,
            (
                Self::SourceNotFound { source_ref: l_ref },
                Self::SourceNotFound { source_ref: r_ref },
            ) => l_ref == r_ref,
            (
                Self::ResourceNotFound { resource: l_resource },
                Self::ResourceNotFound { resource: r_resource },
            ) => l_resource == r_resource,
            (
                Self::UnsupportedEncryptedMethod { method: l_method },
                Self::UnsupportedEncryptedMethod { method: r_method },
            ) => l_method == r_method,
            (
                Self::UnknownContributorRole { role: l_role },
                Self::UnknownContributorRole { role: r_role },
            ) => l_role == r_role,
            (
                Self::ValidationError { errors: l_errors },
                Self::ValidationError { errors: r_errors },
            ) => l_errors == r_errors,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

/// A single metadata field problem
///
/// `field` is the schema name of the field (never an alias), so callers can
/// map problems back to their own form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub problem: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Types of internal consistency violations found while assembling a package
///
/// These are checked on the in-memory package before anything is written.
/// Any of them means the package would be structurally broken.
#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum IntegrityError {
    /// Two manifest items share an id
    #[error("Manifest id '{id}' is used more than once.")]
    DuplicateManifestId { id: String },

    /// Two manifest items point at the same file
    #[error("Manifest path '{path}' is used more than once.")]
    DuplicateManifestPath { path: String },

    /// Navigation target missing from the manifest
    #[error("Navigation entry '{label}' points to '{target}', which is not in the manifest.")]
    DanglingNavigationTarget { label: String, target: String },

    /// Spine reference missing from the manifest
    #[error("Spine item '{idref}' does not exist in manifest.")]
    DanglingSpineReference { idref: String },

    /// A document body references a local file that is not in the manifest
    #[error("Document '{document}' references '{reference}', which is not in the manifest.")]
    UnlistedResource { document: String, reference: String },

    /// A manifest item has no file content behind it
    #[error("Manifest path '{path}' has no file content.")]
    MissingFile { path: String },

    /// A generated document is not well-formed XML
    #[error("Document '{document}' is not well-formed: {reason}")]
    MalformedDocument { document: String, reason: String },

    /// The manifest must hold exactly one navigation document
    #[error("Expected exactly one item with 'nav' property in the manifest, found {count}.")]
    NavigationDocumentCount { count: usize },

    /// There is nothing to read
    #[error("The spine is empty.")]
    EmptySpine,
}

#[cfg(test)]
mod tests {
    use crate::error::{FieldError, IntegrityError, PressError};

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = PressError::ValidationError {
            errors: vec![
                FieldError::new("title", "field is required"),
                FieldError::new("rights", "field is required"),
            ],
        };

        assert_eq!(
            err.to_string(),
            "Metadata validation failed: title: field is required; rights: field is required"
        );
    }

    #[test]
    fn test_precondition_error_display() {
        let err = PressError::PreconditionError {
            step: "build".to_string(),
            missing: vec!["document".to_string(), "cover".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "Precondition error: \"build\" requires document, cover"
        );
    }

    #[test]
    fn test_integrity_error_wrapping() {
        let err: PressError = IntegrityError::DanglingSpineReference {
            idref: "chapter-9.xhtml".to_string(),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "Package integrity error: Spine item 'chapter-9.xhtml' does not exist in manifest."
        );
    }
}
