use std::{
    cmp::min,
    collections::HashMap,
    io::{Read, Seek},
};

use chrono::{SecondsFormat, Utc};
use quick_xml::{NsReader, escape::unescape, events::Event};
use sha1::{Digest, Sha1};
use zip::{CompressionMethod, ZipArchive};

use crate::error::PressError;

pub static ELEMENT_IN_DC_NAMESPACE: std::sync::LazyLock<Vec<&str>> =
    std::sync::LazyLock::new(|| {
        vec![
            "contributor",
            "coverage",
            "creator",
            "date",
            "description",
            "format",
            "identifier",
            "language",
            "publisher",
            "relation",
            "rights",
            "source",
            "subject",
            "title",
            "type",
        ]
    });

/// Returns the current UTC time in the form required by `dcterms:modified`
pub fn modified_time() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Extracts the contents of a specified file from a ZIP archive
///
/// ## Parameters
/// - `zip_file`: A mutable reference to a ZIP archive object
/// - `file_name`: The path to the file to extract (relative to the ZIP archive root directory)
///
/// ## Return
/// - `Ok(Vec<u8>)`: The raw bytes of the file
/// - `Err(PressError)`: The file does not exist or an error occurred during the read operation
pub fn get_file_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    file_name: &str,
) -> Result<Vec<u8>, PressError> {
    let mut buffer = Vec::<u8>::new();
    let mut file = zip_file.by_name(file_name)?;
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Checks if the compression method of all entries conforms to the OCF requirements
///
/// OCF containers may only use Stored or Deflated entries.
///
/// ## Return
/// - `Ok(())`: All files use the supported compression method
/// - `Err(PressError)`: Unsupported compression method found
pub fn compression_method_check<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
) -> Result<(), PressError> {
    for index in 0..zip_archive.len() {
        let file = zip_archive.by_index(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            _ => {
                return Err(PressError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: file.compression().to_string(),
                });
            }
        };
    }

    Ok(())
}

/// Resolves a relative reference against the directory of the referencing file
///
/// Both `current_dir` and the result are relative to the same root and use `/`
/// separators. `.` segments are dropped and `..` segments climb one level.
///
/// ## Return
/// - `Some(String)`: The normalized path
/// - `None`: The reference climbs above the root
pub fn resolve_relative_path(current_dir: &str, reference: &str) -> Option<String> {
    let mut segments: Vec<&str> = current_dir
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    for segment in reference.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                // climbing above the root means the link leaks out of the container
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    Some(segments.join("/"))
}

/// Returns the directory part of a `/`-separated path
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Whether a `src` or `href` value points at a file inside the package
///
/// Absolute URLs, `mailto:`/`data:` style references and same-document
/// fragments are not local files.
pub fn is_local_reference(reference: &str) -> bool {
    if reference.is_empty() || reference.starts_with('#') {
        return false;
    }

    match reference.find(':') {
        Some(colon) => {
            // a colon after the first '/' belongs to the path, not to a scheme
            let slash = reference.find('/').unwrap_or(reference.len());
            colon > slash
        }
        None => true,
    }
}

/// Strips any fragment or query from a reference
pub fn strip_fragment(reference: &str) -> &str {
    let end = reference.find(['#', '?']).unwrap_or(reference.len());
    &reference[..end]
}

/// Encrypts the font file using the IDPF font obfuscation algorithm
///
/// The IDPF font obfuscation algorithm XORs the first 1040 bytes of the font file
/// with the SHA-1 digest of the publication's unique identifier, after all
/// whitespace has been removed from it. XOR is its own inverse, so the same
/// function deobfuscates.
///
/// ## Parameters
/// - `data`: Original font data
/// - `key`: The unique identifier of the publication
///
/// ## Notes
/// - Algorithm URI: http://www.idpf.org/2008/embedding
/// - Only processes the first 1040 bytes of the font file; the rest remains unchanged.
pub fn idpf_font_encryption(data: &[u8], key: &str) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    let key = key
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
        .collect::<String>();

    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();

    let mut obfuscated_data = data.to_vec();
    for index in 0..min(1040, data.len()) {
        obfuscated_data[index] ^= hash[index % hash.len()];
    }

    obfuscated_data
}

/// Provides functionality to decode byte data into strings
///
/// Supports UTF-8 (with or without BOM), UTF-16 BE and UTF-16 LE.
///
/// ## Notes
/// - When attempting to parse a byte stream lacking a BOM (Byte Order Mark), the parsing
///   results may be unreadable; caution should be exercised when using such streams.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, PressError>;
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, PressError> {
        if self.is_empty() || self.len() < 4 {
            return Err(PressError::EmptyDataError);
        }

        match self[0..3] {
            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, ..] => {
                String::from_utf8(self[3..].to_vec()).map_err(PressError::from)
            }

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(PressError::from)
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(PressError::from)
            }

            _ => match String::from_utf8(self.to_vec()) {
                Ok(utf8_str) => Ok(utf8_str),
                Err(_) => Ok(String::from_utf8_lossy(self).to_string()),
            },
        }
    }
}

/// Provides functionality for normalizing whitespace characters
///
/// Runs of whitespace collapse into a single space, leading and trailing
/// whitespace is removed.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// Represents an element node in an XML document
#[derive(Debug)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The namespace of the element
    pub namespace: Option<String>,

    /// The attributes of the element, values unescaped
    pub attributes: HashMap<String, String>,

    /// The text content of the element
    pub text: Option<String>,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            namespace: None,
            attributes: HashMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its child elements
    pub fn text(&self) -> String {
        let mut result = String::new();

        if let Some(text_value) = &self.text {
            result.push_str(text_value);
        }

        for child in &self.children {
            result.push_str(&child.text());
        }

        result.trim().to_string()
    }

    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Find all elements with the specified name, including this one
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        SearchElementsByNameIter::new(self, name)
    }

    /// Find all elements with the specified name among the child elements of the current element
    pub fn find_children_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Find all elements with the specified name list among the child elements of the current element
    pub fn find_children_by_names(&self, names: &[&str]) -> impl Iterator<Item = &XmlElement> {
        self.children
            .iter()
            .filter(move |child| names.contains(&child.name.as_str()))
    }

    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }

    /// Visits this element and every descendant in document order
    pub fn descendants(&self) -> impl Iterator<Item = &XmlElement> {
        let mut elements = Vec::new();
        SearchElementsByNameIter::collect_elements(self, &mut elements);
        elements.into_iter()
    }
}

struct SearchElementsByNameIter<'a> {
    elements: Vec<&'a XmlElement>,
    current_index: usize,
    target_name: String,
}

impl<'a> SearchElementsByNameIter<'a> {
    fn new(root: &'a XmlElement, name: &str) -> Self {
        let mut elements = Vec::new();
        Self::collect_elements(root, &mut elements);
        Self {
            elements,
            current_index: 0,
            target_name: name.to_string(),
        }
    }

    fn collect_elements(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        collection.push(element);
        for child in &element.children {
            Self::collect_elements(child, collection);
        }
    }
}

impl<'a> Iterator for SearchElementsByNameIter<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_index < self.elements.len() {
            let element = self.elements[self.current_index];
            self.current_index += 1;
            if element.name == self.target_name {
                return Some(element);
            }
        }
        None
    }
}

/// XML parser used to parse XML content and build an XML element tree
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML from string and builds the root element
    ///
    /// ## Parameters
    /// - `content`: The XML string to be parsed
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(PressError)`: The document is empty or not well-formed
    pub fn parse(content: &str) -> Result<XmlElement, PressError> {
        if content.trim().is_empty() {
            return Err(PressError::EmptyDataError);
        }

        let mut reader = NsReader::from_str(content);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;
        let mut namespace_map = HashMap::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let element = Self::make_element(&e, &mut namespace_map);
                    stack.push(element);
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        // an empty stack means the current element is the root element
                        if stack.is_empty() {
                            root = Some(element);
                        } else if let Some(parent) = stack.last_mut() {
                            parent.children.push(element);
                        }
                    }
                }

                Ok(Event::Empty(e)) => {
                    let element = Self::make_element(&e, &mut namespace_map);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }

                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e.as_ref()).to_string();
                        Self::append_text(element, &text);
                    }
                }

                // quick-xml reports entity and character references separately from text
                Ok(Event::GeneralRef(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let name = String::from_utf8_lossy(&e).to_string();
                        let reference = format!("&{};", name);
                        let text = unescape(&reference)
                            .map(|text| text.to_string())
                            .unwrap_or(reference);
                        Self::append_text(element, &text);
                    }
                }

                Ok(Event::CData(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e.as_ref()).to_string();
                        Self::append_text(element, &text);
                    }
                }

                Err(err) => return Err(err.into()),

                // Comment, PI, Declaration, Doctype
                _ => continue,
            }
        }

        if !stack.is_empty() {
            return Err(PressError::NonCanonicalFile {
                tag: stack
                    .last()
                    .map(|element| element.tag_name())
                    .unwrap_or_default(),
            });
        }

        if let Some(element) = root.as_mut() {
            Self::assign_namespace(element, &namespace_map);
        }

        root.ok_or(PressError::EmptyDataError)
    }

    /// Parse XML from bytes and builds the root element
    pub fn parse_bytes(bytes: Vec<u8>) -> Result<XmlElement, PressError> {
        let content = bytes.decode()?;
        Self::parse(&content)
    }

    fn make_element(
        start: &quick_xml::events::BytesStart,
        namespace_map: &mut HashMap<String, String>,
    ) -> XmlElement {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(name);

        if let Some(prefix) = start.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        for attr in start.attributes().flatten() {
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let raw_value = String::from_utf8_lossy(&attr.value).to_string();
            let attr_value = unescape(&raw_value)
                .map(|value| value.to_string())
                .unwrap_or(raw_value);

            if attr_key == "xmlns" {
                namespace_map.insert(attr_key, attr_value);
                continue;
            }
            if let Some(prefix) = attr_key.strip_prefix("xmlns:") {
                namespace_map.insert(prefix.to_string(), attr_value);
                continue;
            }

            element.attributes.insert(attr_key, attr_value);
        }

        element
    }

    fn append_text(element: &mut XmlElement, text: &str) {
        match element.text.as_mut() {
            Some(existing) => existing.push_str(text),
            None if !text.trim().is_empty() => element.text = Some(text.to_string()),
            None => {}
        }
    }

    /// Assign namespace to element recursively
    fn assign_namespace(element: &mut XmlElement, namespace_map: &HashMap<String, String>) {
        if let Some(prefix) = &element.prefix {
            if let Some(namespace) = namespace_map.get(prefix) {
                element.namespace = Some(namespace.clone());
            }
        } else if let Some(namespace) = namespace_map.get("xmlns") {
            element.namespace = Some(namespace.clone());
        }

        for child in element.children.iter_mut() {
            Self::assign_namespace(child, namespace_map);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::PressError,
        utils::{
            DecodeBytes, NormalizeWhitespace, XmlReader, idpf_font_encryption,
            is_local_reference, parent_dir, resolve_relative_path, strip_fragment,
        },
    };

    /// Test with empty data
    #[test]
    fn test_decode_empty_data() {
        let data = vec![];
        let result = data.decode();
        assert_eq!(result.unwrap_err(), PressError::EmptyDataError);
    }

    /// Testing text decoding with UTF-8 BOM
    #[test]
    fn test_decode_utf8_with_bom() {
        let data: Vec<u8> = vec![0xEF, 0xBB, 0xBF, b'H', b'e', b'l', b'l', b'o'];
        assert_eq!(data.decode().unwrap(), "Hello");
    }

    /// Testing text decoding with UTF-16 LE BOM
    #[test]
    fn test_decode_utf16_le_with_bom() {
        let data = vec![
            0xFF, 0xFE, // BOM
            b'H', 0x00, // H
            b'e', 0x00, // e
            b'l', 0x00, // l
            b'l', 0x00, // l
            b'o', 0x00, // o
        ];
        assert_eq!(data.decode().unwrap(), "Hello");
    }

    #[test]
    fn test_normalize_whitespace_trait() {
        let text = "  Hello,\tWorld!\n\nRust  ";
        assert_eq!(text.normalize_whitespace(), "Hello, World! Rust");
    }

    #[test]
    fn test_resolve_relative_path() {
        assert_eq!(
            resolve_relative_path("text", "../images/a.png").as_deref(),
            Some("images/a.png")
        );
        assert_eq!(
            resolve_relative_path("text", "./chapter-2.xhtml").as_deref(),
            Some("text/chapter-2.xhtml")
        );
        assert_eq!(
            resolve_relative_path("", "css/core.css").as_deref(),
            Some("css/core.css")
        );
        assert_eq!(resolve_relative_path("text", "../../escape.png"), None);
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("EPUB/content.opf"), "EPUB");
        assert_eq!(parent_dir("content.opf"), "");
    }

    #[test]
    fn test_is_local_reference() {
        assert!(is_local_reference("../images/a.png"));
        assert!(is_local_reference("chapter-1.xhtml#note"));
        assert!(!is_local_reference("https://example.com/a.png"));
        assert!(!is_local_reference("mailto:someone@example.com"));
        assert!(!is_local_reference("#top"));
        assert!(!is_local_reference(""));
    }

    #[test]
    fn test_strip_fragment() {
        assert_eq!(strip_fragment("a.xhtml#b"), "a.xhtml");
        assert_eq!(strip_fragment("a.xhtml?x=1"), "a.xhtml");
        assert_eq!(strip_fragment("a.xhtml"), "a.xhtml");
    }

    #[test]
    fn test_idpf_font_encryption_is_reversible() {
        let data = (0..2000).map(|i| (i % 251) as u8).collect::<Vec<u8>>();
        let key = "urn:uuid:1234 5678";

        let obfuscated = idpf_font_encryption(&data, key);
        assert_ne!(obfuscated[..1040], data[..1040]);
        assert_eq!(obfuscated[1040..], data[1040..]);

        // whitespace in the identifier does not change the key
        assert_eq!(idpf_font_encryption(&data, "urn:uuid:12345678"), obfuscated);
        assert_eq!(idpf_font_encryption(&obfuscated, key), data);
    }

    #[test]
    fn test_xml_reader_resolves_entities() {
        let root = XmlReader::parse(
            r#"<root xmlns="urn:x"><title lang="en">Tom &amp; Jerry</title><a href="a?b=1&amp;c=2"/></root>"#,
        )
        .unwrap();

        let title = root.find_elements_by_name("title").next().unwrap();
        assert_eq!(title.text(), "Tom & Jerry");
        assert_eq!(title.namespace.as_deref(), Some("urn:x"));

        let link = root.find_elements_by_name("a").next().unwrap();
        assert_eq!(link.get_attr("href").as_deref(), Some("a?b=1&c=2"));
    }

    #[test]
    fn test_xml_reader_rejects_malformed() {
        assert!(XmlReader::parse("<root><p>unclosed</root>").is_err());
        assert!(XmlReader::parse("   ").is_err());
    }
}
