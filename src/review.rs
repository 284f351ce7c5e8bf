//! Review of built archives
//!
//! [ReviewWork] opens an EPUB that was already packaged, by this library or
//! any other tool following the same layout, and reads it back: the metadata
//! of the package document, the word count of its chapters and a thumbnail of
//! its cover. It can also swap one image of the archive for another without a
//! rebuild.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # use epub_press::{error::PressError, importer::AssetSource, review::{ReviewWork, THUMBNAIL_SIZE}};
//! # fn main() -> Result<(), PressError> {
//! let review = ReviewWork::open("my-book/the-book.epub")?;
//! let metadata = review.metadata()?;
//! println!("{} has {:?} words", metadata.title, metadata.word_count);
//!
//! if let Some(thumbnail) = review.thumbnail(THUMBNAIL_SIZE)? {
//!     println!("{}x{}", thumbnail.width(), thumbnail.height());
//! }
//!
//! review.replace_image("image1.png", AssetSource::from("better.jpg"))?;
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, Cursor, Write},
    path::{Path, PathBuf},
};

use image::{DynamicImage, imageops::FilterType};
use log::{debug, warn};
use percent_encoding::percent_decode_str;
use quick_xml::{
    Reader, Writer,
    escape::unescape,
    events::{BytesStart, Event},
};
use serde_json::{Map, Value, json};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::{
    builder::EPUB_MIME,
    check::{CheckReport, PackageInspector, StructureChecker},
    epub::EpubDoc,
    error::PressError,
    importer::{AssetSource, resolve, sniff},
    metadata::{ContributorRole, WorkMetadata, validate},
    types::{MetadataItem, XHTML_MIME},
    utils::{parent_dir, resolve_relative_path, strip_fragment},
};

/// Default bounds of a cover thumbnail, width by height
pub const THUMBNAIL_SIZE: (u32, u32) = (147, 235);

/// Elements that do not break a word when they start or end
const INLINE_ELEMENTS: [&str; 12] = [
    "a", "abbr", "b", "code", "em", "i", "small", "span", "strong", "sub", "sup", "u",
];

/// A packaged work opened for review
#[derive(Debug, Clone)]
pub struct ReviewWork {
    path: PathBuf,
}

impl ReviewWork {
    /// Opens an archive for review
    ///
    /// The archive is read once to make sure it is a loadable EPUB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PressError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(PressError::SourceNotFound {
                source_ref: path.to_string_lossy().to_string(),
            });
        }

        EpubDoc::new(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document(&self) -> Result<EpubDoc<BufReader<File>>, PressError> {
        EpubDoc::new(&self.path)
    }

    /// Reads the metadata back from the package document
    ///
    /// The result goes through the same validation as metadata given to a
    /// [crate::work::Work], so an archive with incomplete metadata is an
    /// error. The word count is recounted from the chapters rather than taken
    /// from `se:word-count`.
    pub fn metadata(&self) -> Result<WorkMetadata, PressError> {
        let mut doc = self.document()?;
        let mut raw = metadata_mapping(&doc.metadata);

        if !doc.unique_identifier.is_empty() {
            raw.insert("identifier".to_string(), json!(doc.unique_identifier));
        }
        raw.insert("word_count".to_string(), json!(count_spine_words(&mut doc)?));

        validate(&Value::Object(raw))
    }

    /// Number of words in the chapters of the archive
    ///
    /// Only sections marked as chapters are counted, which leaves the title
    /// page, imprint, dedication and colophon out.
    pub fn word_count(&self) -> Result<usize, PressError> {
        count_spine_words(&mut self.document()?)
    }

    /// The cover image and its media type, when the manifest declares one
    pub fn cover_image(&self) -> Result<Option<(Vec<u8>, String)>, PressError> {
        let mut doc = self.document()?;
        let Some(id) = doc
            .manifest
            .values()
            .find(|item| item.has_property("cover-image"))
            .map(|item| item.id.clone())
        else {
            return Ok(None);
        };

        doc.get_manifest_item(&id).map(Some)
    }

    /// The cover scaled down to fit within `(width, height)`
    ///
    /// The aspect ratio is kept. A cover that already fits is returned at
    /// its own size.
    pub fn thumbnail(&self, (width, height): (u32, u32)) -> Result<Option<DynamicImage>, PressError> {
        let Some((data, _)) = self.cover_image()? else {
            return Ok(None);
        };

        let cover = image::load_from_memory(&data)?;
        if cover.width() <= width && cover.height() <= height {
            return Ok(Some(cover));
        }

        Ok(Some(cover.resize(width, height, FilterType::Lanczos3)))
    }

    /// Runs the in-process structural check on the archive
    pub fn check(&self) -> Result<CheckReport, PressError> {
        PackageInspector::new().check(&self.path)
    }

    /// Replaces one image of the archive
    ///
    /// `name` is the file name or the manifest id of the image. The new image
    /// keeps the file stem of the old one and takes the extension of its own
    /// media type. Its manifest item keeps its id and properties, so replacing
    /// the cover keeps it the cover. Every `img` and SVG `image` element
    /// pointing at the old file is updated.
    ///
    /// The archive is rewritten to `<path>.tmp` and renamed over the original.
    ///
    /// # Return
    /// - `Ok(String)`: The file name of the new image
    /// - `Err(PressError::ResourceNotFound)`: No image matches `name`
    /// - `Err(PressError::UnsupportedMediaType)`: The source is not an image
    pub fn replace_image(&self, name: &str, source: AssetSource) -> Result<String, PressError> {
        let (data, _) = resolve(source)?;
        let mime = sniff(&data)
            .filter(|mime| mime.starts_with("image/"))
            .ok_or_else(|| PressError::UnsupportedMediaType {
                role: "image".to_string(),
                expected: "an image".to_string(),
                found: sniff(&data).unwrap_or_else(|| "unknown".to_string()),
            })?;

        let mut doc = self.document()?;
        let old = doc
            .manifest
            .values()
            .find(|item| {
                item.mime.starts_with("image/") && (item.id == name || file_name(&item.path) == name)
            })
            .cloned()
            .ok_or_else(|| PressError::ResourceNotFound {
                resource: name.to_string(),
            })?;

        let directory = parent_dir(&old.path).to_string();
        let new_name = available_name(&doc, &old.path, &directory, stem(file_name(&old.path)), &mime);
        let new_path = join(&directory, &new_name);

        let package_path = doc.package_path.clone();
        let package = doc.read_file(&package_path)?;
        let mut rewritten = HashMap::new();
        rewritten.insert(
            package_path,
            rewrite_manifest_item(&package, &old.id, &new_name, &mime)?,
        );

        let documents = doc
            .manifest
            .values()
            .filter(|item| item.mime == XHTML_MIME)
            .map(|item| item.path.clone())
            .collect::<Vec<_>>();
        for path in documents {
            let content = doc.read_file(&path)?;
            if let Some(content) =
                rewrite_image_references(&content, parent_dir(&path), &old.path, &new_name)?
            {
                debug!("Updated image references in {}", path);
                rewritten.insert(path, content);
            }
        }
        drop(doc);

        let partial = self.path.with_extension("epub.tmp");
        if let Err(err) = self.rewrite_archive(&partial, &old.path, &new_path, &data, &rewritten) {
            if let Err(cleanup) = fs::remove_file(&partial) {
                warn!("Unable to remove {}: {}", partial.display(), cleanup);
            }
            return Err(err);
        }
        fs::rename(&partial, &self.path)?;

        debug!("Replaced {} with {} in {}", old.path, new_path, self.path.display());
        Ok(new_name)
    }

    /// Copies the archive to `output`, swapping the image and rewritten files
    fn rewrite_archive(
        &self,
        output: &Path,
        old_path: &str,
        new_path: &str,
        image: &[u8],
        rewritten: &HashMap<String, Vec<u8>>,
    ) -> Result<(), PressError> {
        let mut archive = ZipArchive::new(BufReader::new(File::open(&self.path)?))?;
        let mut zip = ZipWriter::new(File::create(output)?);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("mimetype", stored)?;
        zip.write_all(EPUB_MIME.as_bytes())?;

        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            let entry_name = entry.name().to_string();
            if entry_name == "mimetype" || entry_name == old_path || entry_name == new_path {
                continue;
            }

            match rewritten.get(&entry_name) {
                Some(content) => {
                    drop(entry);
                    zip.start_file(entry_name, deflated)?;
                    zip.write_all(content)?;
                }
                // copied as is, which keeps obfuscated fonts obfuscated
                None => zip.raw_copy_file(entry)?,
            }
        }

        zip.start_file(new_path, deflated)?;
        zip.write_all(image)?;
        zip.finish()?;
        Ok(())
    }
}

/// Maps package metadata onto the raw form accepted by [validate]
fn metadata_mapping(items: &[MetadataItem]) -> Map<String, Value> {
    let mut raw = Map::new();
    let mut creators = vec![];
    let mut contributors = vec![];
    let mut subjects = vec![];

    for item in items {
        let value = item.value.as_str();
        match item.property.as_str() {
            "creator" => creators.push(json!(value)),
            "subject" => subjects.push(json!(value)),
            "contributor" => {
                let role = item
                    .refined
                    .iter()
                    .find(|refinement| refinement.property == "role")
                    .and_then(|refinement| ContributorRole::from_relator_code(&refinement.value));
                contributors.push(match role {
                    Some(role) => json!({ "role": role.as_str(), "name": value }),
                    None => json!(value),
                });
            }
            "date" => {
                // dates may carry a time
                let date = value.split('T').next().unwrap_or(value);
                raw.entry("date").or_insert_with(|| json!(date));
            }
            "se:long-rights" => {
                let lines = value.lines().collect::<Vec<_>>();
                raw.entry("long_rights").or_insert_with(|| json!(lines));
            }
            property => {
                let key = match property {
                    "identifier" | "title" | "language" | "rights" | "publisher" | "description" => {
                        property
                    }
                    "se:long-description" => "long_description",
                    "se:url.work" => "work_uri",
                    "se:url.publisher" => "publisher_uri",
                    _ => continue,
                };
                raw.entry(key).or_insert_with(|| json!(value));
            }
        }
    }

    raw.insert("creator".to_string(), Value::Array(creators));
    raw.insert("contributor".to_string(), Value::Array(contributors));
    raw.insert("subject".to_string(), Value::Array(subjects));
    raw
}

fn count_spine_words<R: std::io::Read + std::io::Seek>(
    doc: &mut EpubDoc<R>,
) -> Result<usize, PressError> {
    let paths = doc
        .spine
        .iter()
        .filter_map(|itemref| doc.manifest.get(&itemref.idref))
        .filter(|item| item.mime == XHTML_MIME)
        .map(|item| item.path.clone())
        .collect::<Vec<_>>();

    let mut total = 0;
    for path in paths {
        total += count_chapter_words(&doc.read_file(&path)?)?;
    }
    Ok(total)
}

/// Counts the words inside `epub:type="chapter"` sections of one document
fn count_chapter_words(content: &[u8]) -> Result<usize, PressError> {
    let mut reader = Reader::from_reader(content);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 0usize;
    let mut chapter_depth = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,

            Event::Start(e) => {
                depth += 1;
                if chapter_depth.is_none() && is_chapter(&e) {
                    chapter_depth = Some(depth);
                } else if chapter_depth.is_some() && !is_inline(e.local_name().as_ref()) {
                    text.push(' ');
                }
            }

            Event::End(e) => {
                if chapter_depth == Some(depth) {
                    chapter_depth = None;
                    text.push(' ');
                } else if chapter_depth.is_some() && !is_inline(e.local_name().as_ref()) {
                    text.push(' ');
                }
                depth = depth.saturating_sub(1);
            }

            Event::Empty(_) if chapter_depth.is_some() => text.push(' '),

            Event::Text(e) if chapter_depth.is_some() => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }

            Event::GeneralRef(e) if chapter_depth.is_some() => {
                let reference = format!("&{};", String::from_utf8_lossy(&e));
                match unescape(&reference) {
                    Ok(resolved) => text.push_str(&resolved),
                    Err(_) => text.push_str(&reference),
                }
            }

            Event::CData(e) if chapter_depth.is_some() => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }

            _ => {}
        }
        buf.clear();
    }

    Ok(text.split_whitespace().count())
}

fn is_chapter(start: &BytesStart) -> bool {
    start.attributes().flatten().any(|attr| {
        attr.key.as_ref() == b"epub:type"
            && String::from_utf8_lossy(&attr.value)
                .split_whitespace()
                .any(|kind| kind == "chapter")
    })
}

fn is_inline(local_name: &[u8]) -> bool {
    INLINE_ELEMENTS
        .iter()
        .any(|inline| inline.as_bytes() == local_name)
}

/// Rewrites `href` and `media-type` of one manifest item
fn rewrite_manifest_item(
    package: &[u8],
    id: &str,
    new_name: &str,
    mime: &str,
) -> Result<Vec<u8>, PressError> {
    rewrite_elements(package, |start| {
        let local_name = start.local_name();
        if local_name.as_ref() != b"item" || attribute(start, "id").as_deref() != Some(id) {
            return None;
        }

        Some(replace_attributes(start, |key, value| match key {
            "href" => Some(replace_file_name(value, new_name)),
            "media-type" => Some(mime.to_string()),
            _ => None,
        }))
    })
    .map(|(content, _)| content)
}

/// Points `img` and SVG `image` elements at the new image
///
/// # Return
/// - `Ok(None)`: The document does not reference the old image
fn rewrite_image_references(
    content: &[u8],
    directory: &str,
    old_path: &str,
    new_name: &str,
) -> Result<Option<Vec<u8>>, PressError> {
    let points_at_old = |reference: &str| {
        let reference = strip_fragment(reference);
        let decoded = percent_decode_str(reference)
            .decode_utf8()
            .map(|decoded| decoded.to_string())
            .unwrap_or_else(|_| reference.to_string());
        resolve_relative_path(directory, &decoded).as_deref() == Some(old_path)
    };

    let (content, changed) = rewrite_elements(content, |start| {
        let local_name = start.local_name();
        let keys: &[&str] = match local_name.as_ref() {
            b"img" => &["src"],
            b"image" => &["href", "xlink:href"],
            _ => return None,
        };
        let matches = keys
            .iter()
            .any(|key| attribute(start, key).is_some_and(|value| points_at_old(&value)));
        if !matches {
            return None;
        }

        Some(replace_attributes(start, |key, value| {
            (keys.iter().any(|k| *k == key) && points_at_old(value))
                .then(|| replace_file_name(strip_fragment(value), new_name))
        }))
    })?;

    Ok(changed.then_some(content))
}

/// Copies an XML document event by event, replacing the start tags `rewrite` returns
fn rewrite_elements<F>(content: &[u8], mut rewrite: F) -> Result<(Vec<u8>, bool), PressError>
where
    F: FnMut(&BytesStart) -> Option<BytesStart<'static>>,
{
    let mut reader = Reader::from_reader(content);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut changed = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match rewrite(&e) {
                Some(replacement) => {
                    changed = true;
                    writer.write_event(Event::Start(replacement))?;
                }
                None => writer.write_event(Event::Start(e))?,
            },
            Event::Empty(e) => match rewrite(&e) {
                Some(replacement) => {
                    changed = true;
                    writer.write_event(Event::Empty(replacement))?;
                }
                None => writer.write_event(Event::Empty(e))?,
            },
            event => writer.write_event(event)?,
        }
        buf.clear();
    }

    Ok((writer.into_inner().into_inner(), changed))
}

/// A copy of `start` with some attribute values replaced
///
/// `replace` receives each key and unescaped value and returns the new value,
/// or `None` to keep the old one.
fn replace_attributes<F>(start: &BytesStart, replace: F) -> BytesStart<'static>
where
    F: Fn(&str, &str) -> Option<String>,
{
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let mut replacement = BytesStart::new(name);

    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw_value = String::from_utf8_lossy(&attr.value).to_string();
        let value = unescape(&raw_value)
            .map(|value| value.to_string())
            .unwrap_or(raw_value);

        let value = replace(&key, &value).unwrap_or(value);
        replacement.push_attribute((key.as_str(), value.as_str()));
    }

    replacement
}

fn attribute(start: &BytesStart, key: &str) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key.as_bytes())
        .map(|attr| {
            let raw_value = String::from_utf8_lossy(&attr.value).to_string();
            unescape(&raw_value)
                .map(|value| value.to_string())
                .unwrap_or(raw_value)
        })
}

/// Name for the replacement image: the old stem with the new extension
///
/// A counter is added when another file of the archive already has that name.
fn available_name<R: std::io::Read + std::io::Seek>(
    doc: &EpubDoc<R>,
    old_path: &str,
    directory: &str,
    stem: &str,
    mime: &str,
) -> String {
    let extension = extension_for(mime);
    let mut name = format!("{}.{}", stem, extension);
    let mut counter = 1;
    loop {
        let path = join(directory, &name);
        if path == old_path || !doc.contains_file(&path) {
            return name;
        }
        counter += 1;
        name = format!("{}-{}.{}", stem, counter, extension);
    }
}

fn extension_for(mime: &str) -> &str {
    match mime {
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        other => other.strip_prefix("image/").unwrap_or(other),
    }
}

fn replace_file_name(reference: &str, new_name: &str) -> String {
    match reference.rfind('/') {
        Some(index) => format!("{}{}", &reference[..=index], new_name),
        None => new_name.to_string(),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}

fn join(directory: &str, name: &str) -> String {
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", directory, name)
    }
}
