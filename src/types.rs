use std::{
    collections::BTreeSet,
    fmt::Display,
    path::PathBuf,
};

use indexmap::IndexMap;

use crate::error::IntegrityError;

pub const XHTML_MIME: &str = "application/xhtml+xml";
pub const NCX_MIME: &str = "application/x-dtbncx+xml";
pub const CSS_MIME: &str = "text/css";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Directory of the package document inside the container
pub const PACKAGE_DIR: &str = "EPUB";
/// Package-relative directories
pub const TEXT_DIR: &str = "text";
pub const IMAGE_DIR: &str = "images";
pub const FONT_DIR: &str = "fonts";
pub const STYLESHEET_PATH: &str = "css/core.css";

#[derive(Debug, PartialEq, Eq)]
pub enum EpubVersion {
    Version2_0,
    Version3_0,
}

/// Represents a metadata item of the package document
///
/// Items whose property is a Dublin Core element are written as `dc:*`
/// elements, everything else is written as a `meta` element carrying the
/// property in its `property` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    /// Optional unique identifier for this metadata item
    ///
    /// Needed whenever a refinement points at this item.
    pub id: Option<String>,

    /// The metadata property name, e.g. "title" or "se:word-count"
    pub property: String,

    /// The metadata value
    pub value: String,

    /// Optional language code for this metadata item
    pub lang: Option<String>,

    /// Refinements of this metadata item
    ///
    /// Written as `meta` elements with a `refines` attribute pointing at `id`.
    pub refined: Vec<MetadataRefinement>,
}

impl MetadataItem {
    pub fn new(property: &str, value: &str) -> Self {
        Self {
            id: None,
            property: property.to_string(),
            value: value.to_string(),
            lang: None,
            refined: vec![],
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_refinement(mut self, refinement: MetadataRefinement) -> Self {
        self.refined.push(refinement);
        self
    }

    /// Attributes of the element, in writing order
    pub fn attributes(&self, is_dc: bool) -> Vec<(&str, &str)> {
        let mut attributes = Vec::new();
        if let Some(id) = &self.id {
            attributes.push(("id", id.as_str()));
        }
        if !is_dc {
            attributes.push(("property", self.property.as_str()));
        }
        if let Some(lang) = &self.lang {
            attributes.push(("xml:lang", lang.as_str()));
        }
        attributes
    }
}

/// Represents a refinement of a metadata item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRefinement {
    /// The id of the refined item, without the leading `#`
    pub refines: String,

    /// The refinement property name, e.g. "role" or "file-as"
    pub property: String,

    /// The refinement value
    pub value: String,

    /// Optional scheme identifier for this refinement, e.g. "marc:relators"
    pub scheme: Option<String>,
}

impl MetadataRefinement {
    pub fn new(refines: &str, property: &str, value: &str) -> Self {
        Self {
            refines: refines.to_string(),
            property: property.to_string(),
            value: value.to_string(),
            scheme: None,
        }
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = Some(scheme.to_string());
        self
    }
}

/// Represents a resource item declared in the package manifest
///
/// `path` is relative to the directory holding the package document and
/// always uses `/` as separator, whatever the host platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// The unique id of the item
    pub id: String,

    /// The path to the resource file
    pub path: String,

    /// The media type of the resource
    pub mime: String,

    /// Optional space-separated properties, e.g. "nav", "svg", "cover-image"
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn new(id: &str, path: &str, mime: &str) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            mime: mime.to_string(),
            properties: None,
        }
    }

    pub fn append_property(mut self, property: &str) -> Self {
        self.properties = match self.properties {
            Some(existing) if !existing.is_empty() => Some(format!("{} {}", existing, property)),
            _ => Some(property.to_string()),
        };
        self
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|properties| properties.split_whitespace().any(|p| p == property))
    }

    pub fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attributes = vec![
            ("id", self.id.as_str()),
            ("href", self.path.as_str()),
            ("media-type", self.mime.as_str()),
        ];
        if let Some(properties) = &self.properties {
            attributes.push(("properties", properties.as_str()));
        }
        attributes
    }
}

/// Represents an item in the spine, defining the reading order of the publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    /// The ID reference to a manifest item
    pub idref: String,

    /// Indicates whether this item is part of the linear reading order
    pub linear: bool,
}

impl SpineItem {
    pub fn new(idref: &str) -> Self {
        Self {
            idref: idref.to_string(),
            linear: true,
        }
    }

    pub fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attributes = vec![("idref", self.idref.as_str())];
        if !self.linear {
            attributes.push(("linear", "no"));
        }
        attributes
    }
}

/// Represents encryption information for a package resource
///
/// Mirrors one `EncryptedData` entry of `META-INF/encryption.xml`.
#[derive(Debug, Clone)]
pub struct EncryptionData {
    /// The encryption algorithm URI
    pub method: String,

    /// The path of the encrypted resource, relative to the container root
    pub data: String,
}

/// Represents a navigation point in the table of contents
///
/// Navigation points are ordered by `play_order`; two points with the same
/// play order are considered equal.
#[derive(Debug, Eq, Clone)]
pub struct NavPoint {
    /// The display label/title of this navigation point
    pub label: String,

    /// The content document path this navigation point references
    pub content: Option<PathBuf>,

    /// Child navigation points (sub-sections)
    pub children: Vec<NavPoint>,

    /// The reading order position of this navigation point
    pub play_order: Option<usize>,
}

impl NavPoint {
    pub fn new(label: &str, content: &str, play_order: usize) -> Self {
        Self {
            label: label.to_string(),
            content: Some(PathBuf::from(content)),
            children: vec![],
            play_order: Some(play_order),
        }
    }

    /// The content path with `/` separators, without any fragment
    pub fn target(&self) -> Option<String> {
        self.content.as_ref().map(|path| {
            let path = path.to_string_lossy().replace('\\', "/");
            match path.split_once('#') {
                Some((path, _)) => path.to_string(),
                None => path,
            }
        })
    }
}

impl Ord for NavPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.play_order.cmp(&other.play_order)
    }
}

impl PartialOrd for NavPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NavPoint {
    fn eq(&self, other: &Self) -> bool {
        self.play_order == other.play_order
    }
}

/// The full accounting of every file placed in the package
///
/// Items keep their insertion order, which is the order they are written
/// to the package document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    items: IndexMap<String, ManifestItem>,
}

impl PackageManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item, refusing duplicate ids and duplicate paths
    pub fn insert(&mut self, item: ManifestItem) -> Result<(), IntegrityError> {
        if self.items.contains_key(&item.id) {
            return Err(IntegrityError::DuplicateManifestId { id: item.id });
        }
        if self.get_by_path(&item.path).is_some() {
            return Err(IntegrityError::DuplicateManifestPath { path: item.path });
        }

        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.items.get(id)
    }

    pub fn get_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.items.values().find(|item| item.path == path)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.get_by_path(path).is_some()
    }

    pub fn items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The role an imported asset plays in the work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Manuscript,
    Cover,
}

impl Display for AssetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetRole::Manuscript => write!(f, "manuscript"),
            AssetRole::Cover => write!(f, "cover"),
        }
    }
}

/// Where the bytes of an imported asset came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOrigin {
    Path(PathBuf),
    Bytes,
    Encoded,
}

/// A manuscript or cover image copied into the working directory
///
/// Immutable once imported; importing the same role again replaces the
/// file at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAsset {
    pub role: AssetRole,
    pub origin: AssetOrigin,

    /// Media type detected from the content, not from a file name
    pub media_type: String,

    /// Destination inside the working directory
    pub path: PathBuf,

    pub size: usize,
}

impl SourceAsset {
    /// The file extension used for the destination file
    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
    }
}

/// An image extracted from the manuscript by the conversion collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// File name, unique within one conversion
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// One chapter of the transformed manuscript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDocument {
    /// Position in reading order, starting at 1
    pub ordinal: usize,

    pub title: String,

    /// Well-formed XHTML fragment, without the chapter title
    pub body: String,

    /// File names of images referenced by `body`
    pub images: BTreeSet<String>,

    pub word_count: usize,
}

impl ChapterDocument {
    pub fn file_name(&self) -> String {
        format!("chapter-{}.xhtml", self.ordinal)
    }
}

/// Kinds of generated front and back matter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuxiliaryKind {
    Titlepage,
    Imprint,
    Dedication,
    Colophon,
}

impl AuxiliaryKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            AuxiliaryKind::Titlepage => "titlepage.xhtml",
            AuxiliaryKind::Imprint => "imprint.xhtml",
            AuxiliaryKind::Dedication => "dedication.xhtml",
            AuxiliaryKind::Colophon => "colophon.xhtml",
        }
    }

    /// Structural semantics of the document body and section
    pub fn epub_type(&self) -> (&'static str, &'static str) {
        match self {
            AuxiliaryKind::Titlepage => ("frontmatter", "titlepage"),
            AuxiliaryKind::Imprint => ("frontmatter", "imprint"),
            AuxiliaryKind::Dedication => ("frontmatter", "dedication"),
            AuxiliaryKind::Colophon => ("backmatter", "colophon"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuxiliaryKind::Titlepage => "Title page",
            AuxiliaryKind::Imprint => "Imprint",
            AuxiliaryKind::Dedication => "Dedication",
            AuxiliaryKind::Colophon => "Colophon",
        }
    }
}

/// A generated front or back matter document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryDocument {
    pub kind: AuxiliaryKind,

    /// Complete XHTML document
    pub content: String,

    /// Manifest properties this document needs, e.g. "svg"
    pub properties: Option<String>,
}

#[cfg(test)]
mod tests {
    mod navpoint_tests {
        use std::path::PathBuf;

        use crate::types::NavPoint;

        /// Testing the equality comparison of NavPoint
        #[test]
        fn test_navpoint_partial_eq() {
            let nav1 = NavPoint::new("Chapter 1", "text/chapter-1.xhtml", 1);
            let nav2 = NavPoint::new("Chapter 1", "text/chapter-2.xhtml", 1);
            let nav3 = NavPoint::new("Chapter 2", "text/chapter-1.xhtml", 2);

            assert_eq!(nav1, nav2);
            assert_ne!(nav1, nav3);
        }

        #[test]
        fn test_navpoint_ord() {
            let nav1 = NavPoint::new("Chapter 1", "text/chapter-1.xhtml", 1);
            let nav2 = NavPoint::new("Chapter 2", "text/chapter-2.xhtml", 2);
            let nav3 = NavPoint::new("Chapter 3", "text/chapter-3.xhtml", 3);

            let mut nav_points = vec![nav2.clone(), nav3.clone(), nav1.clone()];
            nav_points.sort();
            assert_eq!(nav_points, vec![nav1, nav2, nav3]);
        }

        #[test]
        fn test_navpoint_target_strips_fragment() {
            let mut nav = NavPoint::new("Chapter 1", "text/chapter-1.xhtml#start", 1);
            assert_eq!(nav.target().as_deref(), Some("text/chapter-1.xhtml"));

            nav.content = Some(PathBuf::from("text/chapter-1.xhtml"));
            assert_eq!(nav.target().as_deref(), Some("text/chapter-1.xhtml"));

            nav.content = None;
            assert_eq!(nav.target(), None);
        }
    }

    mod manifest_tests {
        use crate::{
            error::IntegrityError,
            types::{ManifestItem, PackageManifest, XHTML_MIME},
        };

        #[test]
        fn test_manifest_rejects_duplicate_id() {
            let mut manifest = PackageManifest::new();
            manifest
                .insert(ManifestItem::new("a", "text/a.xhtml", XHTML_MIME))
                .unwrap();

            let result = manifest.insert(ManifestItem::new("a", "text/b.xhtml", XHTML_MIME));
            assert_eq!(
                result.unwrap_err(),
                IntegrityError::DuplicateManifestId { id: "a".to_string() }
            );
        }

        #[test]
        fn test_manifest_rejects_duplicate_path() {
            let mut manifest = PackageManifest::new();
            manifest
                .insert(ManifestItem::new("a", "text/a.xhtml", XHTML_MIME))
                .unwrap();

            let result = manifest.insert(ManifestItem::new("b", "text/a.xhtml", XHTML_MIME));
            assert_eq!(
                result.unwrap_err(),
                IntegrityError::DuplicateManifestPath {
                    path: "text/a.xhtml".to_string()
                }
            );
        }

        #[test]
        fn test_manifest_keeps_insertion_order() {
            let mut manifest = PackageManifest::new();
            for id in ["css", "cover", "titlepage", "chapter-1"] {
                manifest
                    .insert(ManifestItem::new(id, &format!("{}.x", id), XHTML_MIME))
                    .unwrap();
            }

            assert_eq!(
                manifest.ids().collect::<Vec<_>>(),
                vec!["css", "cover", "titlepage", "chapter-1"]
            );
        }

        #[test]
        fn test_append_property() {
            let item = ManifestItem::new("nav", "nav.xhtml", XHTML_MIME)
                .append_property("nav")
                .append_property("svg");

            assert_eq!(item.properties.as_deref(), Some("nav svg"));
            assert!(item.has_property("nav"));
            assert!(item.has_property("svg"));
            assert!(!item.has_property("cover-image"));
        }
    }
}
