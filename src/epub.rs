//! EPUB Reader
//!
//! Reads a packaged EPUB 3 archive back into memory: the container, the
//! package document, the manifest, the spine, the navigation documents and
//! the encryption declarations. The reader is strict only about what it needs
//! to locate things; judging whether the package is valid is left to
//! [crate::check].

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use indexmap::IndexMap;
use log::warn;
use zip::ZipArchive;

use crate::{
    builder::FONT_OBFUSCATION_ALGORITHM,
    error::PressError,
    types::{EncryptionData, EpubVersion, ManifestItem, MetadataItem, MetadataRefinement, NavPoint, SpineItem},
    utils::{
        DecodeBytes, NormalizeWhitespace, XmlElement, XmlReader, get_file_in_zip_archive,
        idpf_font_encryption, parent_dir, resolve_relative_path,
    },
};

const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";

/// A loaded EPUB publication
///
/// Manifest paths are resolved against the container root, so they can be
/// passed to [EpubDoc::read_file] directly.
pub struct EpubDoc<R: Read + Seek> {
    pub(crate) archive: ZipArchive<R>,

    /// Container path of the package document
    pub package_path: String,

    /// Directory holding the package document
    pub base_path: String,

    pub version: EpubVersion,

    /// The value of the identifier named by the package `unique-identifier`
    pub unique_identifier: String,

    pub metadata: Vec<MetadataItem>,

    /// Manifest items in declaration order, keyed by id
    pub manifest: IndexMap<String, ManifestItem>,

    pub spine: Vec<SpineItem>,

    /// Entries of `META-INF/encryption.xml`, when present
    pub encryption: Option<Vec<EncryptionData>>,

    /// Entries of the navigation document toc, hrefs as written
    pub catalog: Vec<NavPoint>,

    pub catalog_title: String,

    /// Entries of the NCX named by the spine `toc` attribute, when present
    pub ncx_catalog: Vec<NavPoint>,
}

impl<R: Read + Seek> EpubDoc<R> {
    /// Loads a publication from a reader
    ///
    /// # Return
    /// - `Ok(EpubDoc<R>)`: The container and package document could be read
    /// - `Err(PressError)`: A file needed to locate the content is missing or malformed
    pub fn from_reader(reader: R) -> Result<Self, PressError> {
        let mut archive = ZipArchive::new(reader)?;

        let container =
            get_file_in_zip_archive(&mut archive, "META-INF/container.xml")?.decode()?;
        let package_path = Self::parse_container(container)?;
        let base_path = parent_dir(&package_path).to_string();

        let opf_file = get_file_in_zip_archive(&mut archive, &package_path)?.decode()?;
        let package = XmlReader::parse(&opf_file)?;
        let version = Self::determine_epub_version(&package)?;

        let mut doc = Self {
            archive,
            package_path,
            base_path,
            version,
            unique_identifier: String::new(),
            metadata: vec![],
            manifest: IndexMap::new(),
            spine: vec![],
            encryption: None,
            catalog: vec![],
            catalog_title: String::new(),
            ncx_catalog: vec![],
        };

        let metadata_element = Self::required_child(&package, "metadata")?;
        let manifest_element = Self::required_child(&package, "manifest")?;
        let spine_element = Self::required_child(&package, "spine")?;

        doc.parse_metadata(metadata_element);
        doc.parse_manifest(manifest_element)?;
        doc.parse_spine(spine_element)?;
        doc.parse_encryption()?;
        if doc.version == EpubVersion::Version3_0 {
            doc.parse_catalog()?;
        }
        if let Some(toc_id) = spine_element.get_attr("toc") {
            doc.parse_ncx(&toc_id)?;
        }

        doc.unique_identifier = package
            .get_attr("unique-identifier")
            .and_then(|uid| {
                doc.metadata
                    .iter()
                    .find(|item| item.property == "identifier" && item.id.as_deref() == Some(uid.as_str()))
            })
            .map(|item| item.value.clone())
            .ok_or_else(|| PressError::NonCanonicalFile {
                tag: "dc:identifier".to_string(),
            })?;

        Ok(doc)
    }

    fn required_child<'a>(
        element: &'a XmlElement,
        name: &str,
    ) -> Result<&'a XmlElement, PressError> {
        element
            .find_children_by_name(name)
            .next()
            .ok_or_else(|| PressError::NonCanonicalFile {
                tag: name.to_string(),
            })
    }

    /// Returns the `full-path` of the first `rootfile`
    fn parse_container(data: String) -> Result<String, PressError> {
        let root = XmlReader::parse(&data)?;
        let rootfile = root
            .find_elements_by_name("rootfile")
            .next()
            .ok_or_else(|| PressError::NonCanonicalFile {
                tag: "rootfile".to_string(),
            })?;

        rootfile
            .get_attr("full-path")
            .ok_or_else(|| PressError::MissingRequiredAttribute {
                tag: "rootfile".to_string(),
                attribute: "full-path".to_string(),
            })
    }

    /// Collects Dublin Core elements and `meta` elements
    ///
    /// `meta` elements with a `refines` attribute are attached to the item
    /// they refine.
    fn parse_metadata(&mut self, metadata_element: &XmlElement) {
        let mut metadata = Vec::new();
        let mut refinements = HashMap::<String, Vec<MetadataRefinement>>::new();

        for element in metadata_element.children() {
            match element.namespace.as_deref() {
                Some(DC_NAMESPACE) => metadata.push(MetadataItem {
                    id: element.get_attr("id"),
                    property: element.name.clone(),
                    value: element.text().normalize_whitespace(),
                    lang: element.get_attr("xml:lang"),
                    refined: vec![],
                }),

                Some(OPF_NAMESPACE) if element.name == "meta" => {
                    let Some(property) = element.get_attr("property") else {
                        // EPUB 2 style name/content pairs
                        continue;
                    };
                    let value = element.text();

                    match element.get_attr("refines") {
                        Some(refines) => {
                            let id = refines.strip_prefix('#').unwrap_or(&refines).to_string();
                            let refinement = MetadataRefinement {
                                refines: id.clone(),
                                property,
                                value: value.normalize_whitespace(),
                                scheme: element.get_attr("scheme"),
                            };
                            refinements.entry(id).or_default().push(refinement);
                        }
                        // multi-paragraph values such as se:long-rights keep their lines
                        None => metadata.push(MetadataItem {
                            id: element.get_attr("id"),
                            property,
                            value: normalize_lines(&value),
                            lang: element.get_attr("xml:lang"),
                            refined: vec![],
                        }),
                    }
                }

                _ => {}
            }
        }

        for item in metadata.iter_mut() {
            if let Some(refined) = item.id.as_ref().and_then(|id| refinements.remove(id)) {
                item.refined = refined;
            }
        }

        self.metadata = metadata;
    }

    fn parse_manifest(&mut self, manifest_element: &XmlElement) -> Result<(), PressError> {
        let mut resources = IndexMap::with_capacity(manifest_element.children().count());

        for element in manifest_element.find_children_by_name("item") {
            let id = Self::required_attr(element, "id")?;
            let href = Self::required_attr(element, "href")?;
            let mime = Self::required_attr(element, "media-type")?;

            let mut item = ManifestItem::new(&id, &self.normalize_manifest_path(&href)?, &mime);
            item.properties = element.get_attr("properties");

            if resources.insert(id.clone(), item).is_some() {
                warn!("Manifest id '{}' is declared more than once", id);
            }
        }

        self.manifest = resources;
        Ok(())
    }

    fn parse_spine(&mut self, spine_element: &XmlElement) -> Result<(), PressError> {
        let mut spine = Vec::new();
        for element in spine_element.find_children_by_name("itemref") {
            let mut item = SpineItem::new(&Self::required_attr(element, "idref")?);
            item.linear = element.get_attr("linear").is_none_or(|linear| linear != "no");
            spine.push(item);
        }

        self.spine = spine;
        Ok(())
    }

    /// Parses `META-INF/encryption.xml`, if the archive has one
    fn parse_encryption(&mut self) -> Result<(), PressError> {
        if !self.has_encryption() {
            return Ok(());
        }

        let encryption_file =
            get_file_in_zip_archive(&mut self.archive, "META-INF/encryption.xml")?.decode()?;
        let root = XmlReader::parse(&encryption_file)?;

        let mut encryption_data = Vec::new();
        for data in root.find_children_by_name("EncryptedData") {
            let method = data
                .find_elements_by_name("EncryptionMethod")
                .next()
                .ok_or_else(|| PressError::NonCanonicalFile {
                    tag: "EncryptionMethod".to_string(),
                })?;
            let reference = data
                .find_elements_by_name("CipherReference")
                .next()
                .ok_or_else(|| PressError::NonCanonicalFile {
                    tag: "CipherReference".to_string(),
                })?;

            encryption_data.push(EncryptionData {
                method: Self::required_attr(method, "Algorithm")?,
                data: Self::required_attr(reference, "URI")?,
            });
        }

        if !encryption_data.is_empty() {
            self.encryption = Some(encryption_data);
        }

        Ok(())
    }

    /// Parses the toc of the navigation document
    ///
    /// A missing navigation document or toc leaves the catalog empty; the
    /// inspector reports it.
    fn parse_catalog(&mut self) -> Result<(), PressError> {
        const HEAD_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

        let Some(nav_path) = self.nav_path() else {
            return Ok(());
        };

        let nav_file = get_file_in_zip_archive(&mut self.archive, &nav_path)?.decode()?;
        let nav_element = XmlReader::parse(&nav_file)?;
        let Some(nav) = nav_element
            .find_elements_by_name("nav")
            .find(|element| element.get_attr("epub:type").as_deref() == Some("toc"))
        else {
            return Ok(());
        };

        if let Some(nav_title) = nav.find_children_by_names(&HEAD_TAGS).next() {
            self.catalog_title = nav_title.text();
        }
        if let Some(nav_list) = nav.find_children_by_name("ol").next() {
            self.catalog = Self::parse_catalog_list(nav_list)?;
        }

        Ok(())
    }

    fn parse_ncx(&mut self, toc_id: &str) -> Result<(), PressError> {
        let Some(ncx_path) = self.manifest.get(toc_id).map(|item| item.path.clone()) else {
            warn!("The spine names toc '{}', which is not in the manifest", toc_id);
            return Ok(());
        };

        let ncx_file = get_file_in_zip_archive(&mut self.archive, &ncx_path)?.decode()?;
        let ncx = XmlReader::parse(&ncx_file)?;
        if let Some(nav_map) = ncx.find_elements_by_name("navMap").next() {
            self.ncx_catalog = Self::parse_nav_points(nav_map);
        }

        Ok(())
    }

    /// Recursively parses NCX navigation points, sorted by play order
    fn parse_nav_points(parent_element: &XmlElement) -> Vec<NavPoint> {
        let mut nav_points = parent_element
            .find_children_by_name("navPoint")
            .map(|nav_point| NavPoint {
                label: nav_point
                    .find_children_by_name("navLabel")
                    .next()
                    .map(|element| element.text())
                    .unwrap_or_default(),
                content: nav_point
                    .find_children_by_name("content")
                    .next()
                    .and_then(|element| element.get_attr("src"))
                    .map(Into::into),
                play_order: nav_point
                    .get_attr("playOrder")
                    .and_then(|order| order.parse::<usize>().ok()),
                children: Self::parse_nav_points(nav_point),
            })
            .collect::<Vec<_>>();

        nav_points.sort();
        nav_points
    }

    /// Recursively parses `ol`/`li` navigation lists
    fn parse_catalog_list(element: &XmlElement) -> Result<Vec<NavPoint>, PressError> {
        let mut catalog = Vec::new();
        for item in element.children() {
            if item.name != "li" {
                return Err(PressError::NonCanonicalFile {
                    tag: "li".to_string(),
                });
            }

            let title_element = item
                .find_children_by_names(&["span", "a"])
                .next()
                .ok_or_else(|| PressError::NonCanonicalFile {
                    tag: "span/a".to_string(),
                })?;
            let children = match item.find_children_by_name("ol").next() {
                Some(list) => Self::parse_catalog_list(list)?,
                None => vec![],
            };

            catalog.push(NavPoint {
                label: title_element.text(),
                content: title_element.get_attr("href").map(Into::into),
                children,
                play_order: None,
            });
        }

        Ok(catalog)
    }

    fn determine_epub_version(opf_element: &XmlElement) -> Result<EpubVersion, PressError> {
        match opf_element.get_attr("version").as_deref() {
            Some(version) if version.starts_with("3.") => Ok(EpubVersion::Version3_0),
            Some(version) if version.starts_with("2.") => Ok(EpubVersion::Version2_0),
            _ => Err(PressError::MissingRequiredAttribute {
                tag: "package".to_string(),
                attribute: "version".to_string(),
            }),
        }
    }

    fn required_attr(element: &XmlElement, attribute: &str) -> Result<String, PressError> {
        element
            .get_attr(attribute)
            .ok_or_else(|| PressError::MissingRequiredAttribute {
                tag: element.tag_name(),
                attribute: attribute.to_string(),
            })
    }

    /// Resolves a manifest href against the package document directory
    fn normalize_manifest_path(&self, href: &str) -> Result<String, PressError> {
        let resolved = match href.strip_prefix('/') {
            Some(absolute) => resolve_relative_path("", absolute),
            None => resolve_relative_path(&self.base_path, href),
        };

        resolved.ok_or_else(|| PressError::RelativeLinkLeakage {
            path: href.to_string(),
        })
    }

    pub fn has_encryption(&self) -> bool {
        self.archive
            .file_names()
            .any(|name| name == "META-INF/encryption.xml")
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.archive.file_names().any(|name| name == path)
    }

    /// Container path of the navigation document
    pub fn nav_path(&self) -> Option<String> {
        self.manifest
            .values()
            .find(|item| item.has_property("nav"))
            .map(|item| item.path.clone())
    }

    pub fn get_metadata_value(&self, key: &str) -> Option<Vec<String>> {
        let values = self
            .metadata
            .iter()
            .filter(|item| item.property == key)
            .map(|item| item.value.clone())
            .collect::<Vec<String>>();

        (!values.is_empty()).then_some(values)
    }

    pub fn get_title(&self) -> Option<String> {
        self.get_metadata_value("title")
            .and_then(|titles| titles.into_iter().next())
    }

    /// Reads a file by its container path, undoing font obfuscation
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>, PressError> {
        let data = get_file_in_zip_archive(&mut self.archive, path)?;

        let method = self.encryption.as_ref().and_then(|encryption| {
            encryption
                .iter()
                .find(|entry| entry.data == path)
                .map(|entry| entry.method.clone())
        });

        match method.as_deref() {
            None => Ok(data),
            Some(FONT_OBFUSCATION_ALGORITHM) => {
                Ok(idpf_font_encryption(&data, &self.unique_identifier))
            }
            Some(method) => Err(PressError::UnsupportedEncryptedMethod {
                method: method.to_string(),
            }),
        }
    }

    /// Reads a manifest item, returning its content and media type
    pub fn get_manifest_item(&mut self, id: &str) -> Result<(Vec<u8>, String), PressError> {
        let (path, mime) = self
            .manifest
            .get(id)
            .map(|item| (item.path.clone(), item.mime.clone()))
            .ok_or_else(|| PressError::ResourceIdNotExist { id: id.to_string() })?;

        Ok((self.read_file(&path)?, mime))
    }
}

impl EpubDoc<BufReader<File>> {
    /// Opens a publication from a file path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, PressError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.normalize_whitespace())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
