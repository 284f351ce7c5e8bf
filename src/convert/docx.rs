use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufReader, Cursor, Read, Seek},
    path::Path,
};

use infer::Infer;
use log::{debug, warn};
use quick_xml::{
    Reader, Writer,
    escape::unescape,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use zip::{ZipArchive, result::ZipError};

use crate::{
    convert::{ConvertedDocument, DocumentConverter},
    error::PressError,
    types::ExtractedImage,
    utils::{DecodeBytes, get_file_in_zip_archive, resolve_relative_path},
};

/// In-process converter for Office Open XML manuscripts
///
/// Reads `word/document.xml`, resolves heading levels through
/// `word/styles.xml`, and extracts pictures referenced through
/// `word/_rels/document.xml.rels`. Emits `h1`-`h6`, `p`, `strong`, `em`,
/// `br` and `img` elements; images are referenced as `media/<name>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxConverter;

impl DocumentConverter for DocxConverter {
    fn name(&self) -> &str {
        "docx"
    }

    fn convert(&self, manuscript: &Path) -> Result<ConvertedDocument, PressError> {
        debug!("Converting {} in process", manuscript.display());

        let file = File::open(manuscript)?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|err| PressError::ConversionFailed {
                diagnostic: format!("{} is not a Word document: {}", manuscript.display(), err),
            })?;

        let document = read_part(&mut archive, "word/document.xml")?.ok_or_else(|| {
            PressError::ConversionFailed {
                diagnostic: "the manuscript has no word/document.xml part".to_string(),
            }
        })?;
        let styles = match read_part(&mut archive, "word/styles.xml")? {
            Some(xml) => parse_styles(&xml)?,
            None => HashMap::new(),
        };
        let relationships = match read_part(&mut archive, "word/_rels/document.xml.rels")? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        };

        let paragraphs = parse_document(&document)?;
        let (images, image_names) = extract_images(&mut archive, &paragraphs, &relationships)?;
        let html = write_html(&paragraphs, &styles, &image_names)?;

        Ok(ConvertedDocument { html, images })
    }
}

#[derive(Debug, Default)]
struct StyleInfo {
    name: Option<String>,
    based_on: Option<String>,
    outline_level: Option<usize>,
}

#[derive(Debug, Default)]
struct Paragraph {
    style: Option<String>,
    outline_level: Option<usize>,
    inlines: Vec<Inline>,
}

impl Paragraph {
    fn has_content(&self) -> bool {
        self.inlines.iter().any(|inline| match inline {
            Inline::Text { text, .. } => !text.trim().is_empty(),
            Inline::Break => false,
            Inline::Image(_) => true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Inline {
    Text {
        text: String,
        bold: bool,
        italic: bool,
    },
    Break,

    /// Relationship id of an embedded picture
    Image(String),
}

/// Walk state for `word/document.xml`
#[derive(Debug, Default)]
struct BodyState {
    /// Open paragraphs; text boxes nest paragraphs inside paragraphs
    stack: Vec<Paragraph>,
    paragraphs: Vec<Paragraph>,
    in_paragraph_props: bool,
    in_run: bool,
    in_run_props: bool,
    in_text: bool,
    bold: bool,
    italic: bool,
}

impl BodyState {
    fn handle_start(&mut self, e: &BytesStart) {
        match e.name().as_ref() {
            b"w:p" => self.stack.push(Paragraph::default()),
            b"w:pPr" => self.in_paragraph_props = true,
            b"w:pStyle" if self.in_paragraph_props => {
                if let Some(paragraph) = self.stack.last_mut() {
                    paragraph.style = get_attr(e, b"w:val");
                }
            }
            b"w:outlineLvl" if self.in_paragraph_props => {
                if let Some(paragraph) = self.stack.last_mut() {
                    paragraph.outline_level = get_attr_usize(e, b"w:val").map(|level| level + 1);
                }
            }
            b"w:r" => {
                self.in_run = true;
                self.bold = false;
                self.italic = false;
            }
            b"w:rPr" if self.in_run => self.in_run_props = true,
            b"w:b" if self.in_run_props => self.bold = !check_val_off(e),
            b"w:i" if self.in_run_props => self.italic = !check_val_off(e),
            b"w:t" if self.in_run => self.in_text = true,
            b"w:tab" if self.in_run && !self.in_run_props => self.push_text(" "),
            b"w:br" | b"w:cr" if self.in_run => {
                if get_attr(e, b"w:type").as_deref() != Some("page") {
                    self.push(Inline::Break);
                }
            }
            b"a:blip" => {
                if let Some(rel_id) = get_attr(e, b"r:embed") {
                    self.push(Inline::Image(rel_id));
                }
            }
            b"v:imagedata" => {
                if let Some(rel_id) = get_attr(e, b"r:id") {
                    self.push(Inline::Image(rel_id));
                }
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, name: &[u8]) {
        match name {
            b"w:p" => {
                if let Some(paragraph) = self.stack.pop() {
                    self.paragraphs.push(paragraph);
                }
            }
            b"w:pPr" => self.in_paragraph_props = false,
            b"w:r" => self.in_run = false,
            b"w:rPr" => self.in_run_props = false,
            b"w:t" => self.in_text = false,
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        let (bold, italic) = (self.bold, self.italic);
        let Some(paragraph) = self.stack.last_mut() else {
            return;
        };

        if let Some(Inline::Text {
            text: existing,
            bold: b,
            italic: i,
        }) = paragraph.inlines.last_mut()
        {
            if *b == bold && *i == italic {
                existing.push_str(text);
                return;
            }
        }

        paragraph.inlines.push(Inline::Text {
            text: text.to_string(),
            bold,
            italic,
        });
    }

    fn push(&mut self, inline: Inline) {
        if let Some(paragraph) = self.stack.last_mut() {
            paragraph.inlines.push(inline);
        }
    }
}

fn parse_document(xml: &str) -> Result<Vec<Paragraph>, PressError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut state = BodyState::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.handle_start(&e),
            Ok(Event::Empty(e)) => {
                state.handle_start(&e);
                state.handle_end(e.name().as_ref());
            }
            Ok(Event::End(e)) => state.handle_end(e.name().as_ref()),
            Ok(Event::Text(e)) if state.in_text => {
                state.push_text(&String::from_utf8_lossy(&e));
            }
            Ok(Event::GeneralRef(e)) if state.in_text => {
                let reference = format!("&{};", String::from_utf8_lossy(&e));
                let text = unescape(&reference)
                    .map(|text| text.to_string())
                    .unwrap_or(reference);
                state.push_text(&text);
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(PressError::ConversionFailed {
                    diagnostic: format!("word/document.xml is not well-formed: {}", err),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(state.paragraphs)
}

fn parse_styles(xml: &str) -> Result<HashMap<String, StyleInfo>, PressError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut styles = HashMap::new();
    let mut current: Option<(String, StyleInfo)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:style" => {
                    current = get_attr(&e, b"w:styleId").map(|id| (id, StyleInfo::default()));
                }
                b"w:name" => {
                    if let Some((_, style)) = current.as_mut() {
                        style.name = get_attr(&e, b"w:val");
                    }
                }
                b"w:basedOn" => {
                    if let Some((_, style)) = current.as_mut() {
                        style.based_on = get_attr(&e, b"w:val");
                    }
                }
                b"w:outlineLvl" => {
                    if let Some((_, style)) = current.as_mut() {
                        style.outline_level = get_attr_usize(&e, b"w:val").map(|level| level + 1);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"w:style" => {
                if let Some((id, style)) = current.take() {
                    styles.insert(id, style);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(PressError::ConversionFailed {
                    diagnostic: format!("word/styles.xml is not well-formed: {}", err),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(styles)
}

/// Maps relationship ids to internal targets; external targets are skipped
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, PressError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let external = get_attr(&e, b"TargetMode").as_deref() == Some("External");
                if let (false, Some(id), Some(target)) =
                    (external, get_attr(&e, b"Id"), get_attr(&e, b"Target"))
                {
                    relationships.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(PressError::ConversionFailed {
                    diagnostic: format!("word/_rels/document.xml.rels is not well-formed: {}", err),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// Reads every referenced picture
///
/// Returns the images and the file name assigned to each relationship id.
fn extract_images<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    paragraphs: &[Paragraph],
    relationships: &HashMap<String, String>,
) -> Result<(Vec<ExtractedImage>, HashMap<String, String>), PressError> {
    let mut images = Vec::new();
    let mut names = HashMap::new();
    let mut taken = HashSet::new();

    let rel_ids = paragraphs
        .iter()
        .flat_map(|paragraph| paragraph.inlines.iter())
        .filter_map(|inline| match inline {
            Inline::Image(rel_id) => Some(rel_id.as_str()),
            _ => None,
        });

    for rel_id in rel_ids {
        if names.contains_key(rel_id) {
            continue;
        }
        let Some(target) = relationships.get(rel_id) else {
            warn!("Picture relationship '{}' is not declared, dropping it", rel_id);
            continue;
        };

        let part = match target.strip_prefix('/') {
            Some(absolute) => Some(absolute.to_string()),
            None => resolve_relative_path("word", target),
        };
        let Some(part) = part else {
            warn!("Picture target '{}' leaves the document, dropping it", target);
            continue;
        };

        let data = match get_file_in_zip_archive(archive, &part) {
            Ok(data) => data,
            Err(PressError::ArchiveError {
                source: ZipError::FileNotFound,
            }) => {
                warn!("Picture '{}' is missing from the manuscript, dropping it", part);
                continue;
            }
            Err(err) => return Err(err),
        };

        let media_type = match Infer::new().get(&data) {
            Some(kind) if kind.mime_type().starts_with("image/") => kind.mime_type().to_string(),
            _ => {
                warn!("Picture '{}' is not a recognized image, dropping it", part);
                continue;
            }
        };

        let base_name = part.rsplit('/').next().unwrap_or(part.as_str()).to_string();
        let mut name = base_name.clone();
        let mut counter = 1;
        while !taken.insert(name.clone()) {
            counter += 1;
            name = format!("{}-{}", counter, base_name);
        }

        names.insert(rel_id.to_string(), name.clone());
        images.push(ExtractedImage {
            name,
            media_type,
            data,
        });
    }

    Ok((images, names))
}

fn write_html(
    paragraphs: &[Paragraph],
    styles: &HashMap<String, StyleInfo>,
    image_names: &HashMap<String, String>,
) -> Result<String, PressError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    for paragraph in paragraphs {
        let tag = match heading_level(paragraph, styles) {
            Some(level) => format!("h{}", level),
            // an empty heading is kept, its title may follow in the next paragraph
            None if !paragraph.has_content() => continue,
            None => "p".to_string(),
        };

        writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
        for inline in &paragraph.inlines {
            match inline {
                Inline::Text { text, bold, italic } => {
                    if *bold {
                        writer.write_event(Event::Start(BytesStart::new("strong")))?;
                    }
                    if *italic {
                        writer.write_event(Event::Start(BytesStart::new("em")))?;
                    }
                    writer.write_event(Event::Text(BytesText::new(text)))?;
                    if *italic {
                        writer.write_event(Event::End(BytesEnd::new("em")))?;
                    }
                    if *bold {
                        writer.write_event(Event::End(BytesEnd::new("strong")))?;
                    }
                }
                Inline::Break => {
                    writer.write_event(Event::Empty(BytesStart::new("br")))?;
                }
                Inline::Image(rel_id) => {
                    if let Some(name) = image_names.get(rel_id) {
                        let src = format!("media/{}", name);
                        writer.write_event(Event::Empty(
                            BytesStart::new("img").with_attributes([("src", src.as_str()), ("alt", "")]),
                        ))?;
                    }
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Heading level of a paragraph, from its own outline level or its style
fn heading_level(paragraph: &Paragraph, styles: &HashMap<String, StyleInfo>) -> Option<usize> {
    let level = match paragraph.outline_level {
        Some(level) => Some(level),
        None => paragraph
            .style
            .as_deref()
            .and_then(|style_id| style_level(style_id, styles)),
    }?;

    (1..=6).contains(&level).then_some(level)
}

fn style_level(style_id: &str, styles: &HashMap<String, StyleInfo>) -> Option<usize> {
    let mut current = Some(style_id);
    // basedOn chains are short; the bound guards against cycles
    for _ in 0..10 {
        let id = current?;
        match styles.get(id) {
            Some(style) => {
                let level = style
                    .outline_level
                    .or_else(|| style.name.as_deref().and_then(level_from_name))
                    .or_else(|| level_from_name(id));
                if level.is_some() {
                    return level;
                }
                current = style.based_on.as_deref();
            }
            None => return level_from_name(id),
        }
    }
    None
}

/// Parses names such as "heading 1" or "Heading1"
fn level_from_name(name: &str) -> Option<usize> {
    let compact = name.to_ascii_lowercase().replace(' ', "");
    compact.strip_prefix("heading")?.parse().ok()
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, PressError> {
    match get_file_in_zip_archive(archive, name) {
        Ok(bytes) => Ok(Some(bytes.decode()?)),
        Err(PressError::ArchiveError {
            source: ZipError::FileNotFound,
        }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn get_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| {
            let raw = String::from_utf8_lossy(&attr.value).to_string();
            unescape(&raw).map(|value| value.to_string()).unwrap_or(raw)
        })
}

fn get_attr_usize(e: &BytesStart, key: &[u8]) -> Option<usize> {
    get_attr(e, key).and_then(|value| value.trim().parse().ok())
}

/// Whether `w:val` explicitly turns a toggle property off
fn check_val_off(e: &BytesStart) -> bool {
    matches!(get_attr(e, b"w:val").as_deref(), Some("0" | "false" | "off"))
}
