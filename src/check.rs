//! Structural checkers
//!
//! A checker opens a packaged archive and reports whether it is a
//! structurally valid EPUB 3 publication. It never repairs anything; every
//! problem found becomes one diagnostic message.
//!
//! - [PackageInspector] re-reads the archive in process and is the default.
//! - `EpubCheck` (feature `epubcheck`) runs the `epubcheck` program.

use std::{
    collections::HashSet,
    fs,
    io::{Cursor, Read, Seek},
    path::Path,
};

use log::debug;
use zip::{CompressionMethod, ZipArchive};

use crate::{
    builder::EPUB_MIME,
    epub::EpubDoc,
    error::PressError,
    types::{EpubVersion, NCX_MIME, NavPoint, XHTML_MIME},
    utils::{
        XmlReader, compression_method_check, is_local_reference, parent_dir,
        resolve_relative_path, strip_fragment,
    },
};

#[cfg(feature = "epubcheck")]
mod epubcheck;

#[cfg(feature = "epubcheck")]
pub use epubcheck::EpubCheck;

/// Outcome of a structural check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub valid: bool,

    /// Diagnostics in the order they were found
    pub messages: Vec<String>,
}

impl CheckReport {
    /// A report that is valid exactly when there is nothing to report
    pub fn from_messages(messages: Vec<String>) -> Self {
        Self {
            valid: messages.is_empty(),
            messages,
        }
    }
}

/// Checks a packaged archive for structural validity
pub trait StructureChecker {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// # Return
    /// - `Ok(CheckReport)`: The check ran; the report says whether the package passed
    /// - `Err(PressError)`: The check itself could not run
    fn check(&self, package: &Path) -> Result<CheckReport, PressError>;
}

/// In-process structural checker
///
/// Covers the container rules (the `mimetype` entry, compression methods,
/// `container.xml`) and the consistency of the package document with the
/// files actually in the archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageInspector;

impl PackageInspector {
    pub fn new() -> Self {
        Self
    }

    fn inspect(data: &[u8]) -> Vec<String> {
        let mut messages = Vec::new();

        let mut archive = match ZipArchive::new(Cursor::new(data)) {
            Ok(archive) => archive,
            Err(err) => {
                messages.push(format!("The file is not a ZIP archive: {}", err));
                return messages;
            }
        };

        Self::check_mimetype(&mut archive, &mut messages);
        if let Err(err) = compression_method_check(&mut archive) {
            messages.push(err.to_string());
        }

        let mut doc = match EpubDoc::from_reader(Cursor::new(data)) {
            Ok(doc) => doc,
            Err(err) => {
                messages.push(format!("Unable to read the package: {}", err));
                return messages;
            }
        };

        if doc.version != EpubVersion::Version3_0 {
            messages.push("The package document does not declare version 3.0.".to_string());
        }
        Self::check_metadata(&doc, &mut messages);

        let manifest_paths = Self::check_manifest(&doc, &mut messages);
        Self::check_spine(&doc, &mut messages);
        Self::check_navigation(&doc, &manifest_paths, &mut messages);
        Self::check_documents(&mut doc, &manifest_paths, &mut messages);
        Self::check_encryption(&doc, &manifest_paths, &mut messages);

        messages
    }

    fn check_mimetype(archive: &mut ZipArchive<Cursor<&[u8]>>, messages: &mut Vec<String>) {
        let mut first = match archive.by_index(0) {
            Ok(file) => file,
            Err(err) => {
                messages.push(format!("The archive has no entries: {}", err));
                return;
            }
        };

        if first.name() != "mimetype" {
            messages.push(format!(
                "The first archive entry must be 'mimetype', found '{}'.",
                first.name()
            ));
            return;
        }
        if first.compression() != CompressionMethod::Stored {
            messages.push("The 'mimetype' entry must be stored uncompressed.".to_string());
        }

        let mut content = Vec::new();
        match first.read_to_end(&mut content) {
            Ok(_) if content == EPUB_MIME.as_bytes() => {}
            Ok(_) => messages.push(format!(
                "The 'mimetype' entry must contain exactly '{}'.",
                EPUB_MIME
            )),
            Err(err) => messages.push(format!("Unable to read the 'mimetype' entry: {}", err)),
        }
    }

    fn check_metadata<R: Read + Seek>(
        doc: &EpubDoc<R>,
        messages: &mut Vec<String>,
    ) {
        for (property, label) in [
            ("title", "dc:title"),
            ("language", "dc:language"),
            ("dcterms:modified", "dcterms:modified"),
        ] {
            let present = doc
                .get_metadata_value(property)
                .is_some_and(|values| values.iter().any(|value| !value.is_empty()));
            if !present {
                messages.push(format!("The package metadata has no '{}'.", label));
            }
        }

        if doc.unique_identifier.is_empty() {
            messages.push("The unique identifier is empty.".to_string());
        }
    }

    /// Returns the set of manifest paths
    fn check_manifest<R: Read + Seek>(
        doc: &EpubDoc<R>,
        messages: &mut Vec<String>,
    ) -> HashSet<String> {
        let mut paths = HashSet::new();
        for item in doc.manifest.values() {
            if !paths.insert(item.path.clone()) {
                messages.push(format!("Manifest path '{}' is used more than once.", item.path));
            }
            if !doc.contains_file(&item.path) {
                messages.push(format!(
                    "Manifest item '{}' points to '{}', which is not in the archive.",
                    item.id, item.path
                ));
            }
        }

        paths
    }

    fn check_spine<R: Read + Seek>(doc: &EpubDoc<R>, messages: &mut Vec<String>) {
        if doc.spine.is_empty() {
            messages.push("The spine is empty.".to_string());
        }

        for item in &doc.spine {
            if !doc.manifest.contains_key(&item.idref) {
                messages.push(format!(
                    "Spine item '{}' does not exist in manifest.",
                    item.idref
                ));
            }
        }
    }

    fn check_navigation<R: Read + Seek>(
        doc: &EpubDoc<R>,
        manifest_paths: &HashSet<String>,
        messages: &mut Vec<String>,
    ) {
        let nav_count = doc
            .manifest
            .values()
            .filter(|item| item.has_property("nav"))
            .count();
        if nav_count != 1 {
            messages.push(format!(
                "Expected exactly one item with 'nav' property in the manifest, found {}.",
                nav_count
            ));
        }

        if let Some(nav_path) = doc.nav_path() {
            if doc.catalog.is_empty() {
                messages.push("The navigation document has no toc entries.".to_string());
            }
            Self::check_nav_points(&doc.catalog, parent_dir(&nav_path), manifest_paths, messages);
        }

        if let Some(ncx) = doc.manifest.values().find(|item| item.mime == NCX_MIME) {
            Self::check_nav_points(
                &doc.ncx_catalog,
                parent_dir(&ncx.path),
                manifest_paths,
                messages,
            );
        }
    }

    fn check_nav_points(
        points: &[NavPoint],
        current_dir: &str,
        manifest_paths: &HashSet<String>,
        messages: &mut Vec<String>,
    ) {
        for point in points {
            if let Some(target) = point.target().filter(|target| !target.is_empty()) {
                let resolved = resolve_relative_path(current_dir, &target);
                if !resolved.is_some_and(|path| manifest_paths.contains(&path)) {
                    messages.push(format!(
                        "Navigation entry '{}' points to '{}', which is not in the manifest.",
                        point.label, target
                    ));
                }
            }

            Self::check_nav_points(&point.children, current_dir, manifest_paths, messages);
        }
    }

    /// Parses every XHTML document and resolves its local references
    fn check_documents<R: Read + Seek>(
        doc: &mut EpubDoc<R>,
        manifest_paths: &HashSet<String>,
        messages: &mut Vec<String>,
    ) {
        let documents = doc
            .manifest
            .values()
            .filter(|item| item.mime == XHTML_MIME && doc.contains_file(&item.path))
            .map(|item| item.path.clone())
            .collect::<Vec<_>>();

        for path in documents {
            let root = match doc
                .read_file(&path)
                .and_then(XmlReader::parse_bytes)
            {
                Ok(root) => root,
                Err(err) => {
                    messages.push(format!("Document '{}' is not well-formed: {}", path, err));
                    continue;
                }
            };

            let current_dir = parent_dir(&path);
            for element in root.descendants() {
                for attribute in ["src", "href", "xlink:href"] {
                    let Some(reference) = element.attributes.get(attribute) else {
                        continue;
                    };
                    let target = strip_fragment(reference);
                    if !is_local_reference(reference) || target.is_empty() {
                        continue;
                    }

                    let resolved = resolve_relative_path(current_dir, target);
                    if !resolved.is_some_and(|resolved| manifest_paths.contains(&resolved)) {
                        messages.push(format!(
                            "Document '{}' references '{}', which is not in the manifest.",
                            path, reference
                        ));
                    }
                }
            }
        }
    }

    fn check_encryption<R: Read + Seek>(
        doc: &EpubDoc<R>,
        manifest_paths: &HashSet<String>,
        messages: &mut Vec<String>,
    ) {
        let Some(encryption) = &doc.encryption else {
            return;
        };

        for entry in encryption {
            if !doc.contains_file(&entry.data) || !manifest_paths.contains(&entry.data) {
                messages.push(format!(
                    "Encrypted resource '{}' is not a manifest file in the archive.",
                    entry.data
                ));
            }
        }
    }
}

impl StructureChecker for PackageInspector {
    fn name(&self) -> &str {
        "inspector"
    }

    fn check(&self, package: &Path) -> Result<CheckReport, PressError> {
        debug!("Inspecting {}", package.display());
        let data = fs::read(package)?;
        Ok(CheckReport::from_messages(Self::inspect(&data)))
    }
}
