//! Package Assembler
//!
//! This module merges the transformed chapters, the generated front and back
//! matter and the static assets into one EPUB 3.0 package: the manifest, the
//! spine, the navigation documents and the package document. The package is
//! assembled in memory and checked for internal consistency before anything
//! touches the disk.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # fn main() -> Result<(), epub_press::error::PressError> {
//! # let metadata: epub_press::metadata::WorkMetadata = todo!();
//! # let chapters: Vec<epub_press::types::ChapterDocument> = todo!();
//! use std::path::Path;
//!
//! use epub_press::{builder::PackageAssembler, matter};
//!
//! let auxiliary = matter::synthesize(&metadata, &metadata.long_rights, None)?;
//! let package = PackageAssembler::new().assemble(&metadata, &chapters, &[], &auxiliary, None)?;
//! let archive = package.write(Path::new("path/to/work"), &metadata.slug())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Notes
//!
//! - Manifest and spine order depend only on the input, so assembling the same
//!   input twice yields the same package apart from `dcterms:modified`.
//! - The archive is staged next to its destination and only renamed into
//!   place once it is complete.

use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use log::{debug, warn};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{
    error::{IntegrityError, PressError},
    matter::render_chapter,
    metadata::WorkMetadata,
    types::{
        AuxiliaryDocument, AuxiliaryKind, CSS_MIME, ChapterDocument, EncryptionData,
        ExtractedImage, FONT_DIR, IMAGE_DIR, ManifestItem, MetadataItem, MetadataRefinement,
        NCX_MIME, NavPoint, PACKAGE_DIR, PackageManifest, STYLESHEET_PATH, SourceAsset, SpineItem,
        TEXT_DIR, XHTML_MIME,
    },
    utils::{
        ELEMENT_IN_DC_NAMESPACE, XmlReader, idpf_font_encryption, is_local_reference,
        modified_time, parent_dir, resolve_relative_path, strip_fragment,
    },
};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// The bundled stylesheet
pub const DEFAULT_STYLESHEET: &str = include_str!("../assets/core.css");

pub const EPUB_MIME: &str = "application/epub+zip";
pub const PACKAGE_DOCUMENT: &str = "content.opf";
pub const NAV_DOCUMENT: &str = "nav.xhtml";
pub const NCX_DOCUMENT: &str = "toc.ncx";

/// Unpacked copy of the last written package, inside the working directory
pub const PACKAGE_STAGE_DIR: &str = "package";
const STAGING_DIR: &str = "package.tmp";

pub(crate) const FONT_OBFUSCATION_ALGORITHM: &str = "http://www.idpf.org/2008/embedding";
const SE_VOCABULARY: &str = "se: https://standardebooks.org/vocab/1.0";

/// A static file placed in the package as-is, e.g. the cover or a font
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResource {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl PackageResource {
    pub fn new(name: &str, media_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            media_type: media_type.to_string(),
            data,
        }
    }

    /// Loads an imported cover, named `cover.<ext>`
    pub fn cover(asset: &SourceAsset) -> Result<Self, PressError> {
        let data = fs::read(&asset.path)?;
        Ok(Self::new(
            &format!("cover.{}", asset.extension()),
            &asset.media_type,
            data,
        ))
    }

    fn extension(&self) -> &str {
        self.name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default()
    }
}

/// Collects the font files of a directory, sorted by name
///
/// Only `.otf`, `.ttf` and `.woff` files are taken; subdirectories are not
/// searched.
pub fn load_fonts(dir: &Path) -> Result<Vec<PackageResource>, PressError> {
    let mut fonts = Vec::new();

    for entry in WalkDir::new(dir).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let extension = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let media_type = match extension.as_str() {
            "otf" => "font/otf",
            "ttf" => "font/ttf",
            "woff" => "font/woff",
            _ => {
                debug!("Skipping '{}', not a font file", name);
                continue;
            }
        };

        fonts.push(PackageResource::new(&name, media_type, fs::read(entry.path())?));
    }

    Ok(fonts)
}

/// Assembles packages from transformed and generated documents
///
/// The assembler itself only holds the static parts of a package: the
/// stylesheet and the fonts.
#[derive(Debug, Clone)]
pub struct PackageAssembler {
    stylesheet: String,
    fonts: Vec<PackageResource>,
    obfuscate_fonts: bool,

    /// Fixed `dcterms:modified` value; the current time is used when unset
    modified: Option<String>,
}

impl Default for PackageAssembler {
    fn default() -> Self {
        Self {
            stylesheet: DEFAULT_STYLESHEET.to_string(),
            fonts: vec![],
            obfuscate_fonts: false,
            modified: None,
        }
    }
}

impl PackageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stylesheet(mut self, stylesheet: &str) -> Self {
        self.stylesheet = stylesheet.to_string();
        self
    }

    pub fn with_fonts(mut self, fonts: Vec<PackageResource>) -> Self {
        self.fonts = fonts;
        self
    }

    /// Obfuscates fonts with the IDPF algorithm, keyed on the work identifier
    pub fn obfuscate_fonts(mut self, obfuscate: bool) -> Self {
        self.obfuscate_fonts = obfuscate;
        self
    }

    pub fn with_modified(mut self, modified: &str) -> Self {
        self.modified = Some(modified.to_string());
        self
    }

    /// Assembles a complete package
    ///
    /// Chapters are placed in ordinal order. Front matter precedes the
    /// chapters in the order titlepage, imprint, dedication; the colophon
    /// closes the book. Extracted images that no chapter references are left
    /// out.
    ///
    /// # Return
    /// - `Ok(AssembledPackage)`: A package whose manifest, spine and navigation agree
    /// - `Err(PressError::PackageIntegrityError)`: The inputs do not form a consistent package
    pub fn assemble(
        &self,
        metadata: &WorkMetadata,
        chapters: &[ChapterDocument],
        images: &[ExtractedImage],
        auxiliary: &[AuxiliaryDocument],
        cover: Option<&PackageResource>,
    ) -> Result<AssembledPackage, PressError> {
        let mut package = AssembledPackage::default();

        package.add_file(
            ManifestItem::new("css", STYLESHEET_PATH, CSS_MIME),
            self.stylesheet.as_bytes().to_vec(),
        )?;

        let mut fonts = self.fonts.iter().collect::<Vec<_>>();
        fonts.sort_by(|a, b| a.name.cmp(&b.name));
        for font in fonts {
            let path = format!("{}/{}", FONT_DIR, font.name);
            let data = if self.obfuscate_fonts {
                package.encryption.push(EncryptionData {
                    method: FONT_OBFUSCATION_ALGORITHM.to_string(),
                    data: container_path(&path),
                });
                idpf_font_encryption(&font.data, &metadata.identifier)
            } else {
                font.data.clone()
            };

            let id = package.unique_id(&resource_id("font", &font.name));
            package.add_file(ManifestItem::new(&id, &path, &font.media_type), data)?;
        }

        let referenced = chapters
            .iter()
            .flat_map(|chapter| chapter.images.iter().map(String::as_str))
            .collect::<BTreeSet<_>>();

        if let Some(cover) = cover {
            let path = format!("{}/{}", IMAGE_DIR, cover_name(cover.extension(), &referenced));
            package.add_file(
                ManifestItem::new("cover-image", &path, &cover.media_type)
                    .append_property("cover-image"),
                cover.data.clone(),
            )?;
        }

        let mut images = images.iter().collect::<Vec<_>>();
        images.sort_by(|a, b| a.name.cmp(&b.name));
        for image in images {
            if !referenced.contains(image.name.as_str()) {
                debug!("Leaving out image '{}', no chapter references it", image.name);
                continue;
            }

            let id = package.unique_id(&resource_id("img", &image.name));
            package.add_file(
                ManifestItem::new(
                    &id,
                    &format!("{}/{}", IMAGE_DIR, image.name),
                    &image.media_type,
                ),
                image.data.clone(),
            )?;
        }

        let mut front = auxiliary
            .iter()
            .filter(|document| document.kind != AuxiliaryKind::Colophon)
            .collect::<Vec<_>>();
        front.sort_by_key(|document| document.kind);
        let back = auxiliary
            .iter()
            .filter(|document| document.kind == AuxiliaryKind::Colophon);

        let mut chapters = chapters.iter().collect::<Vec<_>>();
        chapters.sort_by_key(|chapter| chapter.ordinal);

        let mut reading_order = Vec::new();
        for document in front {
            package.add_auxiliary(document, &mut reading_order)?;
        }
        for chapter in &chapters {
            let path = format!("{}/{}", TEXT_DIR, chapter.file_name());
            let id = format!("chapter-{}", chapter.ordinal);
            let content = render_chapter(chapter, &metadata.language)?;

            package.add_file(ManifestItem::new(&id, &path, XHTML_MIME), content.into_bytes())?;
            package.spine.push(SpineItem::new(&id));
            reading_order.push(NavPoint::new(&chapter.title, &path, reading_order.len() + 1));
            package.navigation.push(NavPoint::new(&chapter.title, &path, chapter.ordinal));
        }
        for document in back {
            package.add_auxiliary(document, &mut reading_order)?;
        }

        // a toc must list something, fall back to the whole reading order
        let toc = if package.navigation.is_empty() {
            &reading_order
        } else {
            &package.navigation
        };
        let start = chapters
            .first()
            .map(|chapter| format!("{}/{}", TEXT_DIR, chapter.file_name()));
        let nav = make_navigation_document(metadata, toc, start.as_deref())?;
        package.add_file(
            ManifestItem::new("nav", NAV_DOCUMENT, XHTML_MIME).append_property("nav"),
            nav,
        )?;

        let ncx = make_ncx(metadata, &reading_order)?;
        package.add_file(ManifestItem::new("ncx", NCX_DOCUMENT, NCX_MIME), ncx)?;

        let modified = self.modified.clone().unwrap_or_else(modified_time);
        let opf = make_opf_file(metadata, &package.manifest, &package.spine, &modified)?;
        package
            .files
            .insert(container_path(PACKAGE_DOCUMENT), opf);

        package
            .files
            .insert("META-INF/container.xml".to_string(), make_container_xml()?);
        if !package.encryption.is_empty() {
            let encryption = make_encryption_xml(&package.encryption)?;
            package
                .files
                .insert("META-INF/encryption.xml".to_string(), encryption);
        }

        package.check_integrity()?;
        Ok(package)
    }
}

/// A complete package held in memory
#[derive(Debug, Clone, Default)]
pub struct AssembledPackage {
    pub manifest: PackageManifest,
    pub spine: Vec<SpineItem>,

    /// Table of contents entries, one per chapter
    pub navigation: Vec<NavPoint>,

    pub encryption: Vec<EncryptionData>,

    /// File contents keyed by their path inside the container
    files: IndexMap<String, Vec<u8>>,
}

impl AssembledPackage {
    /// Content of a file, by its path inside the container
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(path, data)| (path.as_str(), data.as_slice()))
    }

    fn add_file(&mut self, item: ManifestItem, data: Vec<u8>) -> Result<(), IntegrityError> {
        let path = container_path(&item.path);
        self.manifest.insert(item)?;
        self.files.insert(path, data);
        Ok(())
    }

    /// `base`, or `base-N` for the first N that is not yet in the manifest
    fn unique_id(&self, base: &str) -> String {
        let mut id = base.to_string();
        let mut counter = 1;
        while self.manifest.get(&id).is_some() {
            counter += 1;
            id = format!("{}-{}", base, counter);
        }
        id
    }

    fn add_auxiliary(
        &mut self,
        document: &AuxiliaryDocument,
        reading_order: &mut Vec<NavPoint>,
    ) -> Result<(), IntegrityError> {
        let file_name = document.kind.file_name();
        let id = file_name.trim_end_matches(".xhtml");
        let path = format!("{}/{}", TEXT_DIR, file_name);

        let mut item = ManifestItem::new(id, &path, XHTML_MIME);
        if let Some(properties) = &document.properties {
            item = item.append_property(properties);
        }

        self.add_file(item, document.content.as_bytes().to_vec())?;
        self.spine.push(SpineItem::new(id));
        reading_order.push(NavPoint::new(
            document.kind.label(),
            &path,
            reading_order.len() + 1,
        ));
        Ok(())
    }

    /// Verifies the package is internally consistent
    ///
    /// Every spine entry and navigation target must be in the manifest, exactly
    /// one manifest item must carry the `nav` property, and every local `src`
    /// or `href` of every XHTML document must resolve to a manifest path.
    pub fn check_integrity(&self) -> Result<(), IntegrityError> {
        if self.spine.is_empty() {
            return Err(IntegrityError::EmptySpine);
        }

        for item in &self.spine {
            if self.manifest.get(&item.idref).is_none() {
                return Err(IntegrityError::DanglingSpineReference {
                    idref: item.idref.clone(),
                });
            }
        }

        let nav_count = self
            .manifest
            .items()
            .filter(|item| item.has_property("nav"))
            .count();
        if nav_count != 1 {
            return Err(IntegrityError::NavigationDocumentCount { count: nav_count });
        }

        for point in &self.navigation {
            let target = point.target().unwrap_or_default();
            if !self.manifest.contains_path(&target) {
                return Err(IntegrityError::DanglingNavigationTarget {
                    label: point.label.clone(),
                    target,
                });
            }
        }

        for item in self.manifest.items() {
            let Some(data) = self.files.get(&container_path(&item.path)) else {
                return Err(IntegrityError::MissingFile {
                    path: item.path.clone(),
                });
            };

            if item.mime == XHTML_MIME {
                self.check_references(&item.path, data)?;
            }
        }

        Ok(())
    }

    fn check_references(&self, document: &str, data: &[u8]) -> Result<(), IntegrityError> {
        let malformed = |reason: String| IntegrityError::MalformedDocument {
            document: document.to_string(),
            reason,
        };

        let content = String::from_utf8(data.to_vec()).map_err(|err| malformed(err.to_string()))?;
        let root = XmlReader::parse(&content).map_err(|err| malformed(err.to_string()))?;
        let current_dir = parent_dir(document);

        for element in root.descendants() {
            for attribute in ["src", "href", "xlink:href"] {
                let Some(reference) = element.attributes.get(attribute) else {
                    continue;
                };
                if !is_local_reference(reference) {
                    continue;
                }

                let target = strip_fragment(reference);
                if target.is_empty() {
                    continue;
                }

                match resolve_relative_path(current_dir, target) {
                    Some(path) if self.manifest.contains_path(&path) => {}
                    _ => {
                        return Err(IntegrityError::UnlistedResource {
                            document: document.to_string(),
                            reference: reference.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes the package into the working directory
    ///
    /// The files are first staged into `package.tmp/` and zipped into
    /// `<name>.epub.tmp`; only then does the staging directory replace
    /// `package/` and the archive get its final name. A failure leaves the
    /// previous package in place.
    ///
    /// # Return
    /// - `Ok(PathBuf)`: Path of the written `<name>.epub`
    pub fn write(&self, workdir: &Path, name: &str) -> Result<PathBuf, PressError> {
        let staging = workdir.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        fs::write(staging.join("mimetype"), EPUB_MIME)?;
        for (path, data) in &self.files {
            let target = staging.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, data)?;
        }

        let archive_path = workdir.join(format!("{}.epub", name));
        let partial_path = workdir.join(format!("{}.epub.tmp", name));
        if let Err(err) = write_archive(&staging, &partial_path) {
            if let Err(cleanup) = fs::remove_file(&partial_path) {
                warn!("Unable to remove {}: {}", partial_path.display(), cleanup);
            }
            return Err(err);
        }

        let package_dir = workdir.join(PACKAGE_STAGE_DIR);
        if package_dir.exists() {
            fs::remove_dir_all(&package_dir)?;
        }
        fs::rename(&staging, &package_dir)?;
        fs::rename(&partial_path, &archive_path)?;

        debug!("Wrote {}", archive_path.display());
        Ok(archive_path)
    }
}

/// Zips a staged package, `mimetype` first and uncompressed
fn write_archive(staging: &Path, output: &Path) -> Result<(), PressError> {
    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(EPUB_MIME.as_bytes())?;

    for entry in WalkDir::new(staging).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = path
            .strip_prefix(staging)
            .map_err(|_| PressError::RelativeLinkLeakage {
                path: path.to_string_lossy().to_string(),
            })?;
        let target_path = relative_path.to_string_lossy().replace('\\', "/");
        if target_path == "mimetype" {
            continue;
        }

        zip.start_file(target_path, deflated)?;
        zip.write_all(&fs::read(path)?)?;
    }

    zip.finish()?;
    Ok(())
}

/// Path of a package-relative file inside the container
fn container_path(path: &str) -> String {
    format!("{}/{}", PACKAGE_DIR, path)
}

/// File name of the cover, `cover.<ext>` unless a chapter image already uses it
fn cover_name(extension: &str, taken: &BTreeSet<&str>) -> String {
    let mut name = format!("cover.{}", extension);
    let mut counter = 1;
    while taken.contains(name.as_str()) {
        counter += 1;
        name = format!("cover-{}.{}", counter, extension);
    }
    name
}

/// Manifest id for a resource file, e.g. `img-image1.png`
fn resource_id(prefix: &str, name: &str) -> String {
    let name = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '-',
        })
        .collect::<String>();
    format!("{}-{}", prefix, name)
}

/// Maps every metadata field to its single location in the package document
pub fn descriptor_metadata(metadata: &WorkMetadata, modified: &str) -> Vec<MetadataItem> {
    let mut items = vec![
        MetadataItem::new("identifier", &metadata.identifier).with_id("pub-id"),
        MetadataItem::new("title", &metadata.title),
        MetadataItem::new("language", &metadata.language),
        MetadataItem::new("rights", &metadata.rights),
    ];

    for (index, creator) in metadata.creator.iter().enumerate() {
        let id = format!("author-{}", index + 1);
        items.push(
            MetadataItem::new("creator", creator)
                .with_id(&id)
                .with_refinement(
                    MetadataRefinement::new(&id, "role", "aut").with_scheme("marc:relators"),
                ),
        );
    }

    for name in &metadata.contributor {
        items.push(MetadataItem::new("contributor", name));
    }
    for (index, contributor) in metadata.contributors.iter().enumerate() {
        let id = format!("contributor-{}", index + 1);
        items.push(
            MetadataItem::new("contributor", &contributor.name)
                .with_id(&id)
                .with_refinement(
                    MetadataRefinement::new(&id, "role", contributor.role.relator_code())
                        .with_scheme("marc:relators"),
                ),
        );
    }

    items.push(MetadataItem::new(
        "date",
        &metadata.date.format("%Y-%m-%d").to_string(),
    ));

    for subject in &metadata.subject {
        items.push(MetadataItem::new("subject", subject));
    }
    if let Some(publisher) = &metadata.publisher {
        items.push(MetadataItem::new("publisher", publisher));
    }
    if let Some(description) = &metadata.description {
        items.push(MetadataItem::new("description", description));
    }
    if let Some(long_description) = &metadata.long_description {
        items.push(MetadataItem::new("se:long-description", long_description));
    }
    if !metadata.long_rights.is_empty() {
        let long_rights = metadata.long_rights.as_slice().join("\n");
        items.push(MetadataItem::new("se:long-rights", &long_rights));
    }
    if let Some(work_uri) = &metadata.work_uri {
        items.push(MetadataItem::new("se:url.work", work_uri));
    }
    if let Some(publisher_uri) = &metadata.publisher_uri {
        items.push(MetadataItem::new("se:url.publisher", publisher_uri));
    }
    if let Some(word_count) = metadata.word_count {
        items.push(MetadataItem::new("se:word-count", &word_count.to_string()));
    }

    items.push(MetadataItem::new("dcterms:modified", modified));
    items
}

/// Creates the `container.xml` file
fn make_container_xml() -> Result<Vec<u8>, PressError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let rootfile = container_path(PACKAGE_DOCUMENT);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.write_event(Event::Start(BytesStart::new("container").with_attributes(
        [
            ("version", "1.0"),
            ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
        ],
    )))?;
    writer.write_event(Event::Start(BytesStart::new("rootfiles")))?;
    writer.write_event(Event::Empty(BytesStart::new("rootfile").with_attributes([
        ("full-path", rootfile.as_str()),
        ("media-type", "application/oebps-package+xml"),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("rootfiles")))?;
    writer.write_event(Event::End(BytesEnd::new("container")))?;

    Ok(writer.into_inner().into_inner())
}

/// Creates `encryption.xml` for obfuscated fonts
fn make_encryption_xml(encryption: &[EncryptionData]) -> Result<Vec<u8>, PressError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("encryption").with_attributes([
        ("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"),
        ("xmlns:enc", "http://www.w3.org/2001/04/xmlenc#"),
    ])))?;

    for data in encryption {
        writer.write_event(Event::Start(BytesStart::new("enc:EncryptedData")))?;
        writer.write_event(Event::Empty(
            BytesStart::new("enc:EncryptionMethod")
                .with_attributes([("Algorithm", data.method.as_str())]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("enc:CipherData")))?;
        writer.write_event(Event::Empty(
            BytesStart::new("enc:CipherReference").with_attributes([("URI", data.data.as_str())]),
        ))?;
        writer.write_event(Event::End(BytesEnd::new("enc:CipherData")))?;
        writer.write_event(Event::End(BytesEnd::new("enc:EncryptedData")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("encryption")))?;

    Ok(writer.into_inner().into_inner())
}

/// Creates the navigation document
///
/// The toc lists `toc`; when `start` is given, a landmarks nav points the
/// reading system at the first chapter.
fn make_navigation_document(
    metadata: &WorkMetadata,
    toc: &[NavPoint],
    start: Option<&str>,
) -> Result<Vec<u8>, PressError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let title = "Table of Contents";

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
        ("xmlns", "http://www.w3.org/1999/xhtml"),
        ("xmlns:epub", "http://www.idpf.org/2007/ops"),
        ("xml:lang", metadata.language.as_str()),
        ("lang", metadata.language.as_str()),
    ])))?;

    // make head
    writer.write_event(Event::Start(BytesStart::new("head")))?;
    writer.write_event(Event::Start(BytesStart::new("title")))?;
    writer.write_event(Event::Text(BytesText::new(title)))?;
    writer.write_event(Event::End(BytesEnd::new("title")))?;
    writer.write_event(Event::Empty(BytesStart::new("link").with_attributes([
        ("href", STYLESHEET_PATH),
        ("rel", "stylesheet"),
        ("type", "text/css"),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    // make body
    writer.write_event(Event::Start(
        BytesStart::new("body").with_attributes([("epub:type", "frontmatter")]),
    ))?;
    writer.write_event(Event::Start(
        BytesStart::new("nav").with_attributes([("id", "toc"), ("epub:type", "toc")]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("h2")))?;
    writer.write_event(Event::Text(BytesText::new(title)))?;
    writer.write_event(Event::End(BytesEnd::new("h2")))?;

    make_nav(&mut writer, toc)?;

    writer.write_event(Event::End(BytesEnd::new("nav")))?;

    if let Some(start) = start {
        writer.write_event(Event::Start(BytesStart::new("nav").with_attributes([
            ("id", "landmarks"),
            ("epub:type", "landmarks"),
            ("hidden", "hidden"),
        ])))?;
        writer.write_event(Event::Start(BytesStart::new("h2")))?;
        writer.write_event(Event::Text(BytesText::new("Landmarks")))?;
        writer.write_event(Event::End(BytesEnd::new("h2")))?;
        writer.write_event(Event::Start(BytesStart::new("ol")))?;
        writer.write_event(Event::Start(BytesStart::new("li")))?;
        writer.write_event(Event::Start(
            BytesStart::new("a").with_attributes([("href", start), ("epub:type", "bodymatter")]),
        ))?;
        writer.write_event(Event::Text(BytesText::new(&metadata.title)))?;
        writer.write_event(Event::End(BytesEnd::new("a")))?;
        writer.write_event(Event::End(BytesEnd::new("li")))?;
        writer.write_event(Event::End(BytesEnd::new("ol")))?;
        writer.write_event(Event::End(BytesEnd::new("nav")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("html")))?;

    Ok(writer.into_inner().into_inner())
}

fn make_nav(writer: &mut XmlWriter, navigations: &[NavPoint]) -> Result<(), PressError> {
    writer.write_event(Event::Start(BytesStart::new("ol")))?;

    for nav in navigations {
        writer.write_event(Event::Start(BytesStart::new("li")))?;

        if let Some(path) = &nav.content {
            writer.write_event(Event::Start(
                BytesStart::new("a").with_attributes([("href", path.to_string_lossy())]),
            ))?;
            writer.write_event(Event::Text(BytesText::new(nav.label.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("a")))?;
        } else {
            writer.write_event(Event::Start(BytesStart::new("span")))?;
            writer.write_event(Event::Text(BytesText::new(nav.label.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("span")))?;
        }

        if !nav.children.is_empty() {
            make_nav(writer, &nav.children)?;
        }

        writer.write_event(Event::End(BytesEnd::new("li")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("ol")))?;

    Ok(())
}

/// Creates the EPUB 2 `toc.ncx`, listing the whole reading order
fn make_ncx(metadata: &WorkMetadata, reading_order: &[NavPoint]) -> Result<Vec<u8>, PressError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("ncx").with_attributes([
        ("xmlns", "http://www.daisy.org/z3986/2005/ncx/"),
        ("version", "2005-1"),
        ("xml:lang", metadata.language.as_str()),
    ])))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    for (name, content) in [
        ("dtb:uid", metadata.identifier.as_str()),
        ("dtb:depth", "1"),
        ("dtb:totalPageCount", "0"),
        ("dtb:maxPageNumber", "0"),
    ] {
        writer.write_event(Event::Empty(
            BytesStart::new("meta").with_attributes([("name", name), ("content", content)]),
        ))?;
    }
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("docTitle")))?;
    writer.write_event(Event::Start(BytesStart::new("text")))?;
    writer.write_event(Event::Text(BytesText::new(&metadata.title)))?;
    writer.write_event(Event::End(BytesEnd::new("text")))?;
    writer.write_event(Event::End(BytesEnd::new("docTitle")))?;

    writer.write_event(Event::Start(BytesStart::new("navMap")))?;
    for point in reading_order {
        let play_order = point.play_order.unwrap_or_default().to_string();
        let id = format!("navpoint-{}", play_order);
        let src = point.target().unwrap_or_default();

        writer.write_event(Event::Start(BytesStart::new("navPoint").with_attributes([
            ("id", id.as_str()),
            ("playOrder", play_order.as_str()),
        ])))?;
        writer.write_event(Event::Start(BytesStart::new("navLabel")))?;
        writer.write_event(Event::Start(BytesStart::new("text")))?;
        writer.write_event(Event::Text(BytesText::new(&point.label)))?;
        writer.write_event(Event::End(BytesEnd::new("text")))?;
        writer.write_event(Event::End(BytesEnd::new("navLabel")))?;
        writer.write_event(Event::Empty(
            BytesStart::new("content").with_attributes([("src", src.as_str())]),
        ))?;
        writer.write_event(Event::End(BytesEnd::new("navPoint")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("navMap")))?;

    writer.write_event(Event::End(BytesEnd::new("ncx")))?;

    Ok(writer.into_inner().into_inner())
}

/// Creates the package document
fn make_opf_file(
    metadata: &WorkMetadata,
    manifest: &PackageManifest,
    spine: &[SpineItem],
    modified: &str,
) -> Result<Vec<u8>, PressError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.write_event(Event::Start(BytesStart::new("package").with_attributes([
        ("xmlns", "http://www.idpf.org/2007/opf"),
        ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
        ("prefix", SE_VOCABULARY),
        ("unique-identifier", "pub-id"),
        ("version", "3.0"),
        ("xml:lang", metadata.language.as_str()),
    ])))?;

    make_opf_metadata(&mut writer, &descriptor_metadata(metadata, modified))?;
    make_opf_manifest(&mut writer, manifest)?;
    make_opf_spine(&mut writer, spine)?;

    writer.write_event(Event::End(BytesEnd::new("package")))?;

    Ok(writer.into_inner().into_inner())
}

fn make_opf_metadata(writer: &mut XmlWriter, items: &[MetadataItem]) -> Result<(), PressError> {
    writer.write_event(Event::Start(BytesStart::new("metadata")))?;

    for metadata in items {
        let is_dc = ELEMENT_IN_DC_NAMESPACE.contains(&metadata.property.as_str());
        let tag_name = if is_dc {
            format!("dc:{}", metadata.property)
        } else {
            "meta".to_string()
        };

        writer.write_event(Event::Start(
            BytesStart::new(tag_name.as_str()).with_attributes(metadata.attributes(is_dc)),
        ))?;
        writer.write_event(Event::Text(BytesText::new(metadata.value.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new(tag_name.as_str())))?;

        for refinement in &metadata.refined {
            let refines = format!("#{}", refinement.refines);
            let mut attributes = vec![
                ("refines", refines.as_str()),
                ("property", refinement.property.as_str()),
            ];
            if let Some(scheme) = &refinement.scheme {
                attributes.push(("scheme", scheme.as_str()));
            }

            writer.write_event(Event::Start(
                BytesStart::new("meta").with_attributes(attributes),
            ))?;
            writer.write_event(Event::Text(BytesText::new(refinement.value.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("meta")))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("metadata")))?;

    Ok(())
}

fn make_opf_manifest(writer: &mut XmlWriter, manifest: &PackageManifest) -> Result<(), PressError> {
    writer.write_event(Event::Start(BytesStart::new("manifest")))?;

    for item in manifest.items() {
        writer.write_event(Event::Empty(
            BytesStart::new("item").with_attributes(item.attributes()),
        ))?;
    }

    writer.write_event(Event::End(BytesEnd::new("manifest")))?;

    Ok(())
}

fn make_opf_spine(writer: &mut XmlWriter, spine: &[SpineItem]) -> Result<(), PressError> {
    writer.write_event(Event::Start(
        BytesStart::new("spine").with_attributes([("toc", "ncx")]),
    ))?;

    for item in spine {
        writer.write_event(Event::Empty(
            BytesStart::new("itemref").with_attributes(item.attributes()),
        ))?;
    }

    writer.write_event(Event::End(BytesEnd::new("spine")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, fs, io::Read};

    use serde_json::json;
    use zip::{CompressionMethod, ZipArchive};

    use crate::{
        builder::{
            AssembledPackage, PackageAssembler, PackageResource, descriptor_metadata, load_fonts,
            resource_id,
        },
        error::{IntegrityError, PressError},
        matter::synthesize,
        metadata::{Contributor, WorkMetadata, validate},
        testing::{tiny_jpeg, tiny_png},
        types::{ChapterDocument, ExtractedImage, ManifestItem, XHTML_MIME},
        utils::{XmlReader, idpf_font_encryption},
    };

    const MODIFIED: &str = "2024-01-01T00:00:00Z";

    fn metadata() -> WorkMetadata {
        validate(&json!({
            "identifier": "isbn:123",
            "title": "T",
            "language": "en",
            "rights": "All rights reserved.",
            "creator": ["A. Writer"],
            "date": "2021-07-14",
        }))
        .unwrap()
    }

    fn chapter(ordinal: usize, title: &str, images: &[&str]) -> ChapterDocument {
        let body = images
            .iter()
            .map(|name| format!(r#"<p><img alt="" src="../images/{}"/></p>"#, name))
            .collect::<String>();
        ChapterDocument {
            ordinal,
            title: title.to_string(),
            body: format!("<p>Text of {}.</p>{}", title, body),
            images: images.iter().map(|name| name.to_string()).collect::<BTreeSet<_>>(),
            word_count: 3,
        }
    }

    fn image(name: &str) -> ExtractedImage {
        ExtractedImage {
            name: name.to_string(),
            media_type: "image/png".to_string(),
            data: tiny_png(),
        }
    }

    fn assemble(chapters: &[ChapterDocument], images: &[ExtractedImage]) -> AssembledPackage {
        let metadata = metadata();
        let auxiliary = synthesize(&metadata, &metadata.long_rights, None).unwrap();
        let cover = PackageResource::new("cover.jpg", "image/jpeg", tiny_jpeg());

        PackageAssembler::new()
            .with_modified(MODIFIED)
            .assemble(&metadata, chapters, images, &auxiliary, Some(&cover))
            .unwrap()
    }

    fn text(package: &AssembledPackage, path: &str) -> String {
        String::from_utf8(package.file(path).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_manifest_and_spine_order() {
        let chapters = vec![
            chapter(1, "Chapter One", &["image2.png"]),
            chapter(2, "Chapter Two", &["image1.png"]),
        ];
        let images = vec![image("image2.png"), image("image1.png"), image("unused.png")];
        let package = assemble(&chapters, &images);

        assert_eq!(
            package.manifest.ids().collect::<Vec<_>>(),
            vec![
                "css",
                "cover-image",
                "img-image1.png",
                "img-image2.png",
                "titlepage",
                "chapter-1",
                "chapter-2",
                "colophon",
                "nav",
                "ncx"
            ]
        );
        assert_eq!(
            package
                .spine
                .iter()
                .map(|item| item.idref.as_str())
                .collect::<Vec<_>>(),
            vec!["titlepage", "chapter-1", "chapter-2", "colophon"]
        );

        let cover = package.manifest.get("cover-image").unwrap();
        assert_eq!(cover.path, "images/cover.jpg");
        assert!(cover.has_property("cover-image"));
        assert!(package.manifest.get("titlepage").unwrap().has_property("svg"));
        assert!(package.file("EPUB/images/unused.png").is_none());
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let chapters = vec![chapter(1, "One", &["a.png"]), chapter(2, "Two", &[])];
        let images = vec![image("a.png")];

        let first = assemble(&chapters, &images);
        let second = assemble(&chapters, &images);

        assert_eq!(first.manifest, second.manifest);
        assert_eq!(first.spine, second.spine);
        assert_eq!(
            first.files().collect::<Vec<_>>(),
            second.files().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_chapter_images_resolve_in_manifest() {
        let chapters = vec![chapter(1, "One", &["a.png", "b.png"]), chapter(2, "Two", &["a.png"])];
        let package = assemble(&chapters, &[image("a.png"), image("b.png")]);

        for chapter in &chapters {
            for name in &chapter.images {
                assert!(package.manifest.contains_path(&format!("images/{}", name)));
            }
        }
    }

    #[test]
    fn test_navigation_lists_chapters() {
        let chapters = vec![chapter(1, "Chapter One", &[]), chapter(2, "Chapter Two", &[])];
        let package = assemble(&chapters, &[]);

        let nav = XmlReader::parse(&text(&package, "EPUB/nav.xhtml")).unwrap();
        let toc = nav
            .find_elements_by_name("nav")
            .find(|element| element.get_attr("epub:type").as_deref() == Some("toc"))
            .unwrap();
        let entries = toc
            .find_elements_by_name("a")
            .map(|a| (a.text(), a.get_attr("href").unwrap_or_default()))
            .collect::<Vec<_>>();
        assert_eq!(
            entries,
            vec![
                ("Chapter One".to_string(), "text/chapter-1.xhtml".to_string()),
                ("Chapter Two".to_string(), "text/chapter-2.xhtml".to_string()),
            ]
        );

        let landmark = nav
            .find_elements_by_name("a")
            .find(|a| a.get_attr("epub:type").as_deref() == Some("bodymatter"))
            .unwrap();
        assert_eq!(landmark.get_attr("href").as_deref(), Some("text/chapter-1.xhtml"));
    }

    #[test]
    fn test_ncx_lists_reading_order() {
        let package = assemble(&[chapter(1, "One", &[])], &[]);
        let ncx = XmlReader::parse(&text(&package, "EPUB/toc.ncx")).unwrap();

        let points = ncx
            .find_elements_by_name("navPoint")
            .map(|point| {
                (
                    point.get_attr("playOrder").unwrap_or_default(),
                    point.text(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            points,
            vec![
                ("1".to_string(), "Title page".to_string()),
                ("2".to_string(), "One".to_string()),
                ("3".to_string(), "Colophon".to_string()),
            ]
        );
    }

    #[test]
    fn test_descriptor_places_every_field() {
        let mut metadata = validate(&json!({
            "identifier": "isbn:123",
            "title": "T",
            "language": "en",
            "rights": "All rights reserved.",
            "creator": ["A", "B"],
            "contributor": ["Helper"],
            "date": "2021-07-14",
            "subject": ["fiction", "africa"],
            "publisher": "Qwyre",
            "publisher_uri": "https://qwyre.com",
            "work_uri": "https://example.com/t",
            "description": "Short.",
            "long_description": "Long.",
            "long_rights": ["One.", "Two."],
        }))
        .unwrap();
        metadata.contributors.push(Contributor::new("artist", "Painter").unwrap());
        metadata.word_count = Some(1200);

        let items = descriptor_metadata(&metadata, MODIFIED);
        let properties = items
            .iter()
            .map(|item| (item.property.as_str(), item.value.as_str()))
            .collect::<Vec<_>>();

        assert_eq!(
            properties,
            vec![
                ("identifier", "isbn:123"),
                ("title", "T"),
                ("language", "en"),
                ("rights", "All rights reserved."),
                ("creator", "A"),
                ("creator", "B"),
                ("contributor", "Helper"),
                ("contributor", "Painter"),
                ("date", "2021-07-14"),
                ("subject", "fiction"),
                ("subject", "africa"),
                ("publisher", "Qwyre"),
                ("description", "Short."),
                ("se:long-description", "Long."),
                ("se:long-rights", "One.\nTwo."),
                ("se:url.work", "https://example.com/t"),
                ("se:url.publisher", "https://qwyre.com"),
                ("se:word-count", "1200"),
                ("dcterms:modified", MODIFIED),
            ]
        );

        let painter = &items[7];
        assert_eq!(painter.id.as_deref(), Some("contributor-1"));
        assert_eq!(painter.refined[0].value, "art");
        assert_eq!(painter.refined[0].scheme.as_deref(), Some("marc:relators"));
    }

    #[test]
    fn test_package_document() {
        let package = assemble(&[chapter(1, "One", &[])], &[]);
        let opf = XmlReader::parse(&text(&package, "EPUB/content.opf")).unwrap();

        assert_eq!(opf.get_attr("version").as_deref(), Some("3.0"));
        assert_eq!(opf.get_attr("unique-identifier").as_deref(), Some("pub-id"));
        assert_eq!(
            opf.get_attr("prefix").as_deref(),
            Some("se: https://standardebooks.org/vocab/1.0")
        );

        let identifier = opf.find_elements_by_name("identifier").next().unwrap();
        assert_eq!(identifier.get_attr("id").as_deref(), Some("pub-id"));
        assert_eq!(identifier.text(), "isbn:123");

        let refinement = opf
            .find_elements_by_name("meta")
            .find(|meta| meta.get_attr("refines").as_deref() == Some("#author-1"))
            .unwrap();
        assert_eq!(refinement.text(), "aut");

        let spine = opf.find_elements_by_name("spine").next().unwrap();
        assert_eq!(spine.get_attr("toc").as_deref(), Some("ncx"));

        let container = text(&package, "META-INF/container.xml");
        assert!(container.contains(r#"full-path="EPUB/content.opf""#));
    }

    #[test]
    fn test_unlisted_image_is_integrity_error() {
        let metadata = metadata();
        let auxiliary = synthesize(&metadata, &metadata.long_rights, None).unwrap();

        let result = PackageAssembler::new().assemble(
            &metadata,
            &[chapter(1, "One", &["missing.png"])],
            &[],
            &auxiliary,
            None,
        );

        assert_eq!(
            result.unwrap_err(),
            PressError::PackageIntegrityError {
                source: IntegrityError::UnlistedResource {
                    document: "text/chapter-1.xhtml".to_string(),
                    reference: "../images/missing.png".to_string(),
                }
            }
        );
    }

    #[test]
    fn test_duplicate_ordinal_is_integrity_error() {
        let metadata = metadata();
        let result = PackageAssembler::new().assemble(
            &metadata,
            &[chapter(1, "One", &[]), chapter(1, "Again", &[])],
            &[],
            &[],
            None,
        );

        assert_eq!(
            result.unwrap_err(),
            PressError::PackageIntegrityError {
                source: IntegrityError::DuplicateManifestId {
                    id: "chapter-1".to_string()
                }
            }
        );
    }

    #[test]
    fn test_check_integrity_counts_nav_documents() {
        let mut package = assemble(&[chapter(1, "One", &[])], &[]);
        package
            .manifest
            .insert(ManifestItem::new("nav2", "nav2.xhtml", XHTML_MIME).append_property("nav"))
            .unwrap();

        assert_eq!(
            package.check_integrity(),
            Err(IntegrityError::NavigationDocumentCount { count: 2 })
        );
    }

    #[test]
    fn test_check_integrity_dangling_spine() {
        let mut package = assemble(&[chapter(1, "One", &[])], &[]);
        package.spine.push(crate::types::SpineItem::new("chapter-9"));

        assert_eq!(
            package.check_integrity(),
            Err(IntegrityError::DanglingSpineReference {
                idref: "chapter-9".to_string()
            })
        );
    }

    #[test]
    fn test_font_obfuscation() {
        let dir = tempfile::tempdir().unwrap();
        let font_data = (0..2048u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        fs::write(dir.path().join("league.otf"), &font_data).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a font").unwrap();

        let fonts = load_fonts(dir.path()).unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].media_type, "font/otf");

        let metadata = metadata();
        let auxiliary = synthesize(&metadata, &metadata.long_rights, None).unwrap();
        let package = PackageAssembler::new()
            .with_fonts(fonts)
            .obfuscate_fonts(true)
            .assemble(&metadata, &[chapter(1, "One", &[])], &[], &auxiliary, None)
            .unwrap();

        let stored = package.file("EPUB/fonts/league.otf").unwrap();
        assert_ne!(stored, font_data.as_slice());
        assert_eq!(idpf_font_encryption(stored, "isbn:123"), font_data);

        let encryption = text(&package, "META-INF/encryption.xml");
        assert!(encryption.contains(r#"URI="EPUB/fonts/league.otf""#));
        assert!(encryption.contains(r#"Algorithm="http://www.idpf.org/2008/embedding""#));
    }

    #[test]
    fn test_write_archive() {
        let dir = tempfile::tempdir().unwrap();
        let package = assemble(&[chapter(1, "One", &[])], &[]);

        let path = package.write(dir.path(), "t").unwrap();
        assert_eq!(path, dir.path().join("t.epub"));
        assert!(!dir.path().join("t.epub.tmp").exists());
        assert!(!dir.path().join("package.tmp").exists());
        assert!(dir.path().join("package/EPUB/text/chapter-1.xhtml").is_file());

        let mut archive = ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
        {
            let mut mimetype = archive.by_index(0).unwrap();
            assert_eq!(mimetype.name(), "mimetype");
            assert_eq!(mimetype.compression(), CompressionMethod::Stored);
            let mut content = String::new();
            mimetype.read_to_string(&mut content).unwrap();
            assert_eq!(content, "application/epub+zip");
        }
        assert!(archive.by_name("EPUB/content.opf").is_ok());
        assert!(archive.by_name("META-INF/container.xml").is_ok());

        // writing again replaces the previous package
        package.write(dir.path(), "t").unwrap();
        assert!(dir.path().join("package/EPUB/nav.xhtml").is_file());
    }

    #[test]
    fn test_resource_id() {
        assert_eq!(resource_id("img", "image1.png"), "img-image1.png");
        assert_eq!(resource_id("font", "My Font.otf"), "font-My-Font.otf");
    }

    #[test]
    fn test_chapter_image_named_like_the_cover() {
        let chapters = vec![chapter(1, "One", &["cover.jpg"])];
        let package = assemble(&chapters, &[image("cover.jpg")]);

        assert_eq!(
            package.manifest.get("cover-image").unwrap().path,
            "images/cover-2.jpg"
        );
        assert_eq!(
            package.manifest.get("img-cover.jpg").unwrap().path,
            "images/cover.jpg"
        );
        assert_eq!(package.file("EPUB/images/cover-2.jpg"), Some(tiny_jpeg().as_slice()));
        assert_eq!(package.file("EPUB/images/cover.jpg"), Some(tiny_png().as_slice()));
    }

    #[test]
    fn test_image_names_with_the_same_id() {
        let chapters = vec![chapter(1, "One", &["a b.png", "a-b.png"])];
        let package = assemble(&chapters, &[image("a b.png"), image("a-b.png")]);

        assert_eq!(package.manifest.get("img-a-b.png").unwrap().path, "images/a b.png");
        assert_eq!(package.manifest.get("img-a-b.png-2").unwrap().path, "images/a-b.png");
    }
}
