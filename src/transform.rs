//! Markup Transformer
//!
//! Restructures the converter's HTML into chapters. The fragment is parsed
//! with `scraper` into an owned tree, wrappers that hide headings are
//! flattened, and the top level is split on chapter headings. Each chapter
//! body is written back as a well-formed XHTML fragment.
//!
//! Conversion quirks handled here:
//! - A heading whose text ended up in the following paragraph gets that
//!   paragraph's text as its title.
//! - Anything before the first chapter heading is dropped.
//! - Image references are rewritten to the package image directory; images
//!   that cannot be resolved are removed.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Cursor,
};

use log::{debug, warn};
use percent_encoding::percent_decode_str;
use quick_xml::{
    Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use scraper::{ElementRef, Html, Node};

use crate::{
    convert::{ConvertedDocument, DocumentConverter},
    error::PressError,
    types::{ChapterDocument, ExtractedImage, IMAGE_DIR, SourceAsset},
    utils::{NormalizeWhitespace, is_local_reference, strip_fragment},
};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

const HEADINGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];
const WRAPPERS: [&str; 7] = ["html", "body", "main", "article", "section", "div", "header"];
const DROPPED: [&str; 8] = ["script", "style", "head", "title", "meta", "link", "noscript", "template"];
const VOID_ELEMENTS: [&str; 10] = [
    "area", "br", "col", "embed", "hr", "img", "input", "source", "track", "wbr",
];

/// The chapters of a manuscript and the images they use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformedManuscript {
    pub chapters: Vec<ChapterDocument>,

    /// Images referenced by at least one chapter, sorted by name
    pub images: Vec<ExtractedImage>,
}

impl TransformedManuscript {
    pub fn word_count(&self) -> usize {
        self.chapters.iter().map(|chapter| chapter.word_count).sum()
    }
}

/// Owned markup tree
#[derive(Debug, Clone, PartialEq, Eq)]
enum MarkupNode {
    Element {
        name: String,
        /// Sorted by name
        attributes: Vec<(String, String)>,
        children: Vec<MarkupNode>,
    },
    Text(String),
}

impl MarkupNode {
    fn name(&self) -> Option<&str> {
        match self {
            MarkupNode::Element { name, .. } => Some(name.as_str()),
            MarkupNode::Text(_) => None,
        }
    }

    fn heading_level(&self) -> Option<u8> {
        let name = self.name()?;
        HEADINGS
            .iter()
            .position(|heading| *heading == name)
            .map(|index| index as u8 + 1)
    }

    fn text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, text: &mut String) {
        match self {
            MarkupNode::Text(value) => text.push_str(value),
            MarkupNode::Element { name, children, .. } => {
                if name == "br" {
                    text.push(' ');
                }
                for child in children {
                    child.collect_text(text);
                }
            }
        }
    }

    fn contains_heading(&self) -> bool {
        match self {
            MarkupNode::Text(_) => false,
            MarkupNode::Element { children, .. } => children
                .iter()
                .any(|child| child.heading_level().is_some() || child.contains_heading()),
        }
    }

    fn contains_image(&self) -> bool {
        match self {
            MarkupNode::Text(_) => false,
            MarkupNode::Element { name, children, .. } => {
                name == "img" || children.iter().any(MarkupNode::contains_image)
            }
        }
    }
}

/// Converts the manuscript and splits it into chapters
///
/// # Parameters
/// - `manuscript`: The imported manuscript
/// - `converter`: The conversion collaborator
/// - `chapter_level`: Heading level that starts a chapter; the highest level present when `None`
///
/// # Return
/// - `Err(PressError::ConversionFailed)`: The collaborator failed, produced no markup, or
///   the markup has no chapter headings
pub fn transform(
    manuscript: &SourceAsset,
    converter: &dyn DocumentConverter,
    chapter_level: Option<u8>,
) -> Result<TransformedManuscript, PressError> {
    debug!(
        "Converting {} with the {} converter",
        manuscript.path.display(),
        converter.name()
    );
    let converted = converter.convert(&manuscript.path)?;

    if converted.html.trim().is_empty() && manuscript.size > 0 {
        return Err(PressError::ConversionFailed {
            diagnostic: format!(
                "the {} converter produced no markup for a {} byte manuscript",
                converter.name(),
                manuscript.size
            ),
        });
    }

    split_chapters(converted, chapter_level)
}

/// Splits converted markup into chapters
pub fn split_chapters(
    converted: ConvertedDocument,
    chapter_level: Option<u8>,
) -> Result<TransformedManuscript, PressError> {
    let nodes = flatten(parse_fragment(&converted.html));

    let level = match chapter_level {
        Some(level) => Some(level),
        None => nodes.iter().filter_map(MarkupNode::heading_level).min(),
    };
    let Some(level) = level.filter(|level| nodes.iter().any(|node| node.heading_level() == Some(*level)))
    else {
        return Err(PressError::ConversionFailed {
            diagnostic: "the manuscript has no chapter headings".to_string(),
        });
    };

    let mut segments: Vec<(MarkupNode, Vec<MarkupNode>)> = Vec::new();
    let mut leading = 0;
    for node in nodes {
        if node.heading_level() == Some(level) {
            segments.push((node, Vec::new()));
        } else if let Some((_, body)) = segments.last_mut() {
            body.push(node);
        } else if !node.text().trim().is_empty() || node.contains_image() {
            leading += 1;
        }
    }
    if leading > 0 {
        debug!("Discarded {} node(s) before the first chapter heading", leading);
    }

    let available = reserve_cover_names(converted.images);
    let mut used = BTreeSet::new();
    let mut chapters = Vec::with_capacity(segments.len());

    for (index, (heading, mut body)) in segments.into_iter().enumerate() {
        let ordinal = index + 1;
        let title = recover_title(&heading, &mut body, ordinal);

        let mut images = BTreeSet::new();
        body = rewrite_images(body, &available, &mut images);
        body = unwrap_local_links(body);
        used.extend(images.iter().cloned());

        let body_text = body.iter().map(MarkupNode::text).collect::<Vec<_>>().join(" ");
        let word_count = title.split_whitespace().count() + body_text.split_whitespace().count();

        chapters.push(ChapterDocument {
            ordinal,
            title,
            body: write_fragment(&body)?,
            images,
            word_count,
        });
    }

    let mut images = available
        .into_values()
        .filter(|image| used.contains(&image.name))
        .collect::<Vec<_>>();
    images.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(TransformedManuscript { chapters, images })
}

/// Extracted images keyed by the name the converter gave them
///
/// `cover.*` belongs to the cover image, a manuscript image with that name is
/// renamed to `N-cover.*`.
fn reserve_cover_names(images: Vec<ExtractedImage>) -> BTreeMap<String, ExtractedImage> {
    let mut taken = images
        .iter()
        .map(|image| image.name.clone())
        .collect::<BTreeSet<_>>();

    images
        .into_iter()
        .map(|mut image| {
            let source_name = image.name.clone();
            let stem = source_name.split('.').next().unwrap_or_default();
            if stem.eq_ignore_ascii_case("cover") {
                let mut counter = 1;
                let mut name = format!("{}-{}", counter, source_name);
                while taken.contains(&name) {
                    counter += 1;
                    name = format!("{}-{}", counter, source_name);
                }
                debug!("Renaming image '{}' to '{}'", source_name, name);
                taken.insert(name.clone());
                image.name = name;
            }
            (source_name, image)
        })
        .collect()
}

/// Parses an HTML fragment into owned nodes
fn parse_fragment(html: &str) -> Vec<MarkupNode> {
    let fragment = Html::parse_fragment(html);
    convert_children(&fragment.root_element())
}

fn convert_children(element: &ElementRef) -> Vec<MarkupNode> {
    let mut nodes = Vec::new();

    for child in element.children() {
        match child.value() {
            Node::Element(elem) => {
                if DROPPED.contains(&elem.name()) {
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };

                let mut attributes = elem
                    .attrs()
                    .filter(|(name, _)| is_xml_name(name) && !name.starts_with("xmlns"))
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect::<Vec<_>>();
                attributes.sort();

                nodes.push(MarkupNode::Element {
                    name: elem.name().to_ascii_lowercase(),
                    attributes,
                    children: convert_children(&child_ref),
                });
            }
            Node::Text(text) => nodes.push(MarkupNode::Text(text.text.to_string())),
            _ => {}
        }
    }

    nodes
}

/// Replaces wrappers that contain headings with their children
fn flatten(nodes: Vec<MarkupNode>) -> Vec<MarkupNode> {
    let mut flat = Vec::with_capacity(nodes.len());

    for node in nodes {
        let is_wrapper = node.name().is_some_and(|name| WRAPPERS.contains(&name));
        if is_wrapper && node.contains_heading() {
            if let MarkupNode::Element { children, .. } = node {
                flat.extend(flatten(children));
            }
        } else {
            flat.push(node);
        }
    }

    flat
}

/// Chapter title from the heading, repairing headings that lost their text
///
/// When the heading is empty, the first text line of the body becomes the
/// title and is removed from the body.
fn recover_title(heading: &MarkupNode, body: &mut Vec<MarkupNode>, ordinal: usize) -> String {
    let title = heading.text().normalize_whitespace();
    if !title.is_empty() {
        return title;
    }

    let detached = body.iter().position(|node| {
        !node.text().trim().is_empty() && !node.contains_image() && node.heading_level().is_none()
    });
    if let Some(position) = detached {
        let line = body.remove(position).text().normalize_whitespace();
        debug!("Re-associated detached title '{}' with chapter {}", line, ordinal);
        return line;
    }

    warn!("Chapter {} has no recoverable title", ordinal);
    format!("Chapter {}", ordinal)
}

/// Points image references at the package image directory
///
/// Remote and unresolved images are removed.
fn rewrite_images(
    nodes: Vec<MarkupNode>,
    available: &BTreeMap<String, ExtractedImage>,
    used: &mut BTreeSet<String>,
) -> Vec<MarkupNode> {
    let mut rewritten = Vec::with_capacity(nodes.len());

    for node in nodes {
        match node {
            MarkupNode::Element {
                name,
                attributes,
                children,
            } if name == "img" => {
                let src = attributes
                    .iter()
                    .find(|(key, _)| key == "src")
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default();

                if !is_local_reference(&src) {
                    warn!("Removing image '{}', it is not part of the manuscript", src);
                    continue;
                }

                let file_name = strip_fragment(&src).rsplit(['/', '\\']).next().unwrap_or_default();
                let image = available.get(file_name).or_else(|| {
                    percent_decode_str(file_name)
                        .decode_utf8()
                        .ok()
                        .and_then(|decoded| available.get(decoded.as_ref()))
                });
                let Some(image) = image else {
                    warn!("Removing image '{}', it was not extracted from the manuscript", src);
                    continue;
                };
                let file_name = image.name.clone();
                used.insert(file_name.clone());

                let mut attributes = attributes
                    .into_iter()
                    .filter(|(key, _)| !matches!(key.as_str(), "src" | "width" | "height"))
                    .collect::<Vec<_>>();
                if !attributes.iter().any(|(key, _)| key == "alt") {
                    attributes.push(("alt".to_string(), String::new()));
                }
                attributes.push(("src".to_string(), format!("../{}/{}", IMAGE_DIR, file_name)));
                attributes.sort();

                rewritten.push(MarkupNode::Element {
                    name,
                    attributes,
                    children,
                });
            }
            MarkupNode::Element {
                name,
                attributes,
                children,
            } => rewritten.push(MarkupNode::Element {
                name,
                attributes,
                children: rewrite_images(children, available, used),
            }),
            text => rewritten.push(text),
        }
    }

    rewritten
}

/// Replaces links to local files with their content
///
/// Only same-document fragments and external links survive, a chapter has
/// no other local files to point at.
fn unwrap_local_links(nodes: Vec<MarkupNode>) -> Vec<MarkupNode> {
    let mut unwrapped = Vec::with_capacity(nodes.len());

    for node in nodes {
        match node {
            MarkupNode::Element {
                name,
                attributes,
                children,
            } => {
                let local_link = name == "a"
                    && attributes
                        .iter()
                        .any(|(key, value)| key == "href" && is_local_reference(value));
                if local_link {
                    unwrapped.extend(unwrap_local_links(children));
                } else {
                    unwrapped.push(MarkupNode::Element {
                        name,
                        attributes,
                        children: unwrap_local_links(children),
                    });
                }
            }
            text => unwrapped.push(text),
        }
    }

    unwrapped
}

fn write_fragment(nodes: &[MarkupNode]) -> Result<String, PressError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_nodes(&mut writer, nodes)?;
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_nodes(writer: &mut XmlWriter, nodes: &[MarkupNode]) -> Result<(), PressError> {
    for node in nodes {
        match node {
            MarkupNode::Text(text) => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            MarkupNode::Element {
                name,
                attributes,
                children,
            } => {
                let start = BytesStart::new(name.as_str()).with_attributes(
                    attributes
                        .iter()
                        .map(|(key, value)| (key.as_str(), value.as_str())),
                );

                if VOID_ELEMENTS.contains(&name.as_str()) {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    write_nodes(writer, children)?;
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
        }
    }

    Ok(())
}

/// Whether an attribute name can be written into XHTML unchanged
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => chars
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')),
        _ => false,
    }
}
