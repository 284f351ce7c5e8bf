//! Front/Back Matter Synthesizer
//!
//! Generates the titlepage, imprint, dedication and colophon documents, and
//! wraps chapter bodies into complete documents. Every generator is a pure
//! function of its inputs; a missing optional field leaves out its region of
//! the document instead of emitting empty markup.
//!
//! All documents live in the package text directory and link the stylesheet
//! relative to it.

use std::io::Cursor;

use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use url::Url;

use crate::{
    error::{IntegrityError, PressError},
    metadata::{Contributor, Paragraphs, WorkMetadata},
    types::{AuxiliaryDocument, AuxiliaryKind, ChapterDocument, STYLESHEET_PATH},
};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
const EPUB_NAMESPACE: &str = "http://www.idpf.org/2007/ops";
const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Characters per title row on the titlepage
const TITLE_ROW_WIDTH: usize = 18;

/// A complete XHTML content document under construction
struct XhtmlDocument {
    writer: XmlWriter,
}

impl XhtmlDocument {
    /// Writes everything up to and including the opening `body` tag
    fn begin(title: &str, language: &str, body_type: &str) -> Result<Self, PressError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let stylesheet = format!("../{}", STYLESHEET_PATH);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
            ("xmlns", XHTML_NAMESPACE),
            ("xmlns:epub", EPUB_NAMESPACE),
            ("xml:lang", language),
            ("lang", language),
        ])))?;

        writer.write_event(Event::Start(BytesStart::new("head")))?;
        writer.write_event(Event::Start(BytesStart::new("title")))?;
        writer.write_event(Event::Text(BytesText::new(title)))?;
        writer.write_event(Event::End(BytesEnd::new("title")))?;
        writer.write_event(Event::Empty(BytesStart::new("link").with_attributes([
            ("href", stylesheet.as_str()),
            ("rel", "stylesheet"),
            ("type", "text/css"),
        ])))?;
        writer.write_event(Event::End(BytesEnd::new("head")))?;

        writer.write_event(Event::Start(
            BytesStart::new("body").with_attributes([("epub:type", body_type)]),
        ))?;

        Ok(Self { writer })
    }

    fn start<'a, I>(&mut self, name: &str, attributes: I) -> Result<(), PressError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.writer
            .write_event(Event::Start(BytesStart::new(name).with_attributes(attributes)))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<(), PressError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), PressError> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    fn line_break(&mut self) -> Result<(), PressError> {
        self.writer.write_event(Event::Empty(BytesStart::new("br")))?;
        Ok(())
    }

    /// An element holding only text
    fn text_element<'a, I>(&mut self, name: &str, attributes: I, text: &str) -> Result<(), PressError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.start(name, attributes)?;
        self.text(text)?;
        self.end(name)
    }

    fn paragraph(&mut self, text: &str) -> Result<(), PressError> {
        self.text_element("p", [], text)
    }

    fn link(&mut self, href: &str, text: &str) -> Result<(), PressError> {
        self.text_element("a", [("href", href)], text)
    }

    /// Copies a well-formed XHTML fragment into the document
    fn fragment(&mut self, document: &str, xhtml: &str) -> Result<(), PressError> {
        let mut reader = Reader::from_str(xhtml);

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(event) => self.writer.write_event(event)?,
                Err(err) => {
                    return Err(IntegrityError::MalformedDocument {
                        document: document.to_string(),
                        reason: err.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    fn finish(mut self) -> Result<String, PressError> {
        self.end("body")?;
        self.end("html")?;
        Ok(String::from_utf8(self.writer.into_inner().into_inner())?)
    }
}

/// Generates the titlepage
///
/// The title and creators are set in an inline SVG, so the document needs
/// the `svg` manifest property.
pub fn titlepage(metadata: &WorkMetadata) -> Result<AuxiliaryDocument, PressError> {
    let kind = AuxiliaryKind::Titlepage;
    let (body_type, section_type) = kind.epub_type();
    let creators = metadata.creators_display();
    let rows = wrap_title(&metadata.title, TITLE_ROW_WIDTH);

    let mut doc = XhtmlDocument::begin(kind.label(), &metadata.language, body_type)?;
    doc.start("section", [("id", "titlepage"), ("epub:type", section_type)])?;

    let author_y = 150 + rows.len() * 110 + 80;
    let height = if creators.is_empty() { author_y - 80 } else { author_y + 60 };
    let view_box = format!("0 0 1400 {}", height);
    doc.start(
        "svg",
        [
            ("xmlns", SVG_NAMESPACE),
            ("version", "1.1"),
            ("viewBox", view_box.as_str()),
        ],
    )?;

    let description = if creators.is_empty() {
        format!("The titlepage for {}", metadata.title)
    } else {
        format!("The titlepage for {}, by {}", metadata.title, creators)
    };
    doc.text_element("title", [], &description)?;

    for (index, row) in rows.iter().enumerate() {
        let y = (150 + index * 110).to_string();
        doc.text_element(
            "text",
            [("class", "title"), ("x", "700"), ("y", y.as_str())],
            row,
        )?;
    }
    if !creators.is_empty() {
        let y = author_y.to_string();
        doc.text_element(
            "text",
            [("class", "author"), ("x", "700"), ("y", y.as_str())],
            &creators,
        )?;
    }

    doc.end("svg")?;
    doc.end("section")?;

    Ok(AuxiliaryDocument {
        kind,
        content: doc.finish()?,
        properties: Some("svg".to_string()),
    })
}

/// Generates the colophon
///
/// Contributors are credited in the given order, each with the phrasing of
/// its role; a contribution without a year takes the year of the work.
pub fn colophon(
    metadata: &WorkMetadata,
    contributors: &[Contributor],
    rights: &str,
) -> Result<AuxiliaryDocument, PressError> {
    let kind = AuxiliaryKind::Colophon;
    let (body_type, section_type) = kind.epub_type();
    let year = metadata.year();

    let mut doc = XhtmlDocument::begin(kind.label(), &metadata.language, body_type)?;
    doc.start("section", [("id", "colophon"), ("epub:type", section_type)])?;
    doc.text_element("h2", [("epub:type", "title")], kind.label())?;

    doc.text_element("p", [("class", "work-title")], &metadata.title.to_uppercase())?;

    let creators = metadata.creators_display();
    if creators.is_empty() {
        doc.paragraph(&format!("{}.", year))?;
    } else {
        doc.paragraph(&format!("{}, {}.", creators, year))?;
    }

    if let Some(work_uri) = &metadata.work_uri {
        let host = Url::parse(work_uri)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| work_uri.clone());
        doc.start("p", [])?;
        doc.link(work_uri, &host)?;
        doc.end("p")?;
    }

    if !rights.trim().is_empty() {
        doc.paragraph(rights.trim())?;
    }

    for contributor in contributors {
        doc.paragraph(&credit_line(contributor, year))?;
    }

    if let Some(publisher) = &metadata.publisher {
        write_publisher(&mut doc, publisher, metadata.publisher_uri.as_deref())?;
    }

    doc.end("section")?;

    Ok(AuxiliaryDocument {
        kind,
        content: doc.finish()?,
        properties: None,
    })
}

/// The colophon sentence crediting one contribution
pub fn credit_line(contributor: &Contributor, work_year: i32) -> String {
    let year = contributor.year.unwrap_or(work_year);
    let mut line = format!(
        "{} is copyright © {}, {}.",
        contributor.role.credit(),
        contributor.name,
        year
    );
    if let Some(terms) = contributor.terms.as_deref().filter(|terms| !terms.is_empty()) {
        line.push(' ');
        line.push_str(terms);
    }
    line
}

/// Generates the imprint
///
/// Returns `None` when there is neither a publisher nor any rights text.
pub fn imprint(
    metadata: &WorkMetadata,
    rights: &Paragraphs,
) -> Result<Option<AuxiliaryDocument>, PressError> {
    if metadata.publisher.is_none() && rights.is_empty() {
        return Ok(None);
    }

    let kind = AuxiliaryKind::Imprint;
    let (body_type, section_type) = kind.epub_type();

    let mut doc = XhtmlDocument::begin(kind.label(), &metadata.language, body_type)?;
    doc.start("section", [("id", "imprint"), ("epub:type", section_type)])?;
    doc.text_element("h2", [("epub:type", "title")], kind.label())?;

    if let Some(publisher) = &metadata.publisher {
        write_publisher(&mut doc, publisher, metadata.publisher_uri.as_deref())?;
    }
    doc.paragraph(&format!("Identifier: {}", metadata.identifier))?;
    for paragraph in rights.iter() {
        doc.paragraph(paragraph)?;
    }

    doc.end("section")?;

    Ok(Some(AuxiliaryDocument {
        kind,
        content: doc.finish()?,
        properties: None,
    }))
}

/// Generates the dedication
///
/// No lines, or only blank ones, produce no document.
pub fn dedication(
    metadata: &WorkMetadata,
    lines: Option<&Paragraphs>,
) -> Result<Option<AuxiliaryDocument>, PressError> {
    let Some(lines) = lines.filter(|lines| !lines.is_empty()) else {
        return Ok(None);
    };

    let kind = AuxiliaryKind::Dedication;
    let (body_type, section_type) = kind.epub_type();

    let mut doc = XhtmlDocument::begin(kind.label(), &metadata.language, body_type)?;
    doc.start("section", [("id", "dedication"), ("epub:type", section_type)])?;
    for line in lines.iter() {
        doc.paragraph(line)?;
    }
    doc.end("section")?;

    Ok(Some(AuxiliaryDocument {
        kind,
        content: doc.finish()?,
        properties: None,
    }))
}

/// Generates every auxiliary document, in reading order
pub fn synthesize(
    metadata: &WorkMetadata,
    long_rights: &Paragraphs,
    dedication_lines: Option<&Paragraphs>,
) -> Result<Vec<AuxiliaryDocument>, PressError> {
    let mut documents = vec![titlepage(metadata)?];
    documents.extend(imprint(metadata, long_rights)?);
    documents.extend(dedication(metadata, dedication_lines)?);
    documents.push(colophon(metadata, &metadata.contributors, &metadata.rights)?);
    Ok(documents)
}

/// Wraps a chapter body into a complete content document
pub fn render_chapter(chapter: &ChapterDocument, language: &str) -> Result<String, PressError> {
    let id = format!("chapter-{}", chapter.ordinal);

    let mut doc = XhtmlDocument::begin(&chapter.title, language, "bodymatter")?;
    doc.start("section", [("id", id.as_str()), ("epub:type", "chapter")])?;
    doc.text_element("h1", [("epub:type", "title")], &chapter.title)?;
    doc.fragment(&chapter.file_name(), &chapter.body)?;
    doc.end("section")?;

    doc.finish()
}

fn write_publisher(
    doc: &mut XhtmlDocument,
    publisher: &str,
    publisher_uri: Option<&str>,
) -> Result<(), PressError> {
    doc.start("p", [])?;
    doc.line_break()?;
    doc.text("Published by ")?;
    match publisher_uri {
        Some(uri) => doc.link(uri, publisher)?,
        None => doc.text(publisher)?,
    }
    doc.text(".")?;
    doc.end("p")
}

/// Greedy word wrap; a word longer than `width` gets a row of its own
fn wrap_title(title: &str, width: usize) -> Vec<String> {
    let mut rows: Vec<String> = Vec::new();

    for word in title.split_whitespace() {
        match rows.last_mut() {
            Some(row) if row.chars().count() + 1 + word.chars().count() <= width => {
                row.push(' ');
                row.push_str(word);
            }
            _ => rows.push(word.to_string()),
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use crate::{
        metadata::{Contributor, Paragraphs, WorkMetadata, validate},
        matter::{colophon, credit_line, dedication, imprint, render_chapter, synthesize, titlepage, wrap_title},
        types::{AuxiliaryKind, ChapterDocument},
        utils::XmlReader,
    };

    fn metadata(extra: serde_json::Value) -> WorkMetadata {
        let mut raw = json!({
            "identifier": "isbn:123",
            "title": "Usan Abasi Lament",
            "language": "en",
            "rights": "All rights reserved.",
            "creator": ["Gavin Chait"],
            "date": "2021-07-14",
        });
        if let (Some(raw), Some(extra)) = (raw.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                raw.insert(key.clone(), value.clone());
            }
        }
        validate(&raw).unwrap()
    }

    #[test]
    fn test_wrap_title() {
        assert_eq!(wrap_title("T", 18), vec!["T"]);
        assert_eq!(
            wrap_title("The Adventures of Sherlock Holmes", 18),
            vec!["The Adventures of", "Sherlock Holmes"]
        );
        assert_eq!(
            wrap_title("Supercalifragilisticexpialidocious day", 18),
            vec!["Supercalifragilisticexpialidocious", "day"]
        );
    }

    #[test]
    fn test_titlepage() {
        let metadata = metadata(json!({ "creator": ["A", "B", "C"] }));
        let document = titlepage(&metadata).unwrap();

        assert_eq!(document.kind, AuxiliaryKind::Titlepage);
        assert_eq!(document.properties.as_deref(), Some("svg"));
        assert!(document.content.contains(r#"<body epub:type="frontmatter">"#));
        assert!(document.content.contains(r#"<section id="titlepage" epub:type="titlepage">"#));
        assert!(document.content.contains(">A, B &amp; C</text>"));
        assert!(document.content.contains(">Usan Abasi Lament</text>"));
        assert!(document.content.contains(r#"href="../css/core.css""#));

        // well-formed
        XmlReader::parse(&document.content).unwrap();
    }

    #[test]
    fn test_colophon_credits_contributors_in_order() {
        let metadata = metadata(json!({ "work_uri": "https://gavinchait.com/usan-abasi" }));
        let contributors = vec![
            Contributor::new("translator", "Tr Person").unwrap(),
            Contributor::new("artist", "Rodd Halstead")
                .unwrap()
                .with_terms("Used under licence.")
                .with_year(2006),
        ];

        let document = colophon(&metadata, &contributors, &metadata.rights).unwrap();
        let content = &document.content;

        assert!(content.contains("USAN ABASI LAMENT"));
        assert!(content.contains("<p>Gavin Chait, 2021.</p>"));
        assert!(content.contains(r#"<a href="https://gavinchait.com/usan-abasi">gavinchait.com</a>"#));
        assert!(content.contains("<p>All rights reserved.</p>"));

        let translation = content.find("Translation is copyright © Tr Person, 2021.").unwrap();
        let artwork = content
            .find("Artwork is copyright © Rodd Halstead, 2006. Used under licence.")
            .unwrap();
        assert!(translation < artwork);

        // optional regions are omitted
        assert!(!content.contains("Published by"));
        XmlReader::parse(content).unwrap();
    }

    #[test]
    fn test_colophon_publisher_link() {
        let metadata = metadata(json!({
            "publisher": "Qwyre Publishing",
            "publisher_uri": "https://qwyre.com",
        }));
        let document = colophon(&metadata, &[], &metadata.rights).unwrap();

        assert!(document.content.contains(
            r#"<p><br/>Published by <a href="https://qwyre.com">Qwyre Publishing</a>.</p>"#
        ));
    }

    #[test]
    fn test_credit_line() {
        let editor = Contributor::new("editor", "Ed Itor").unwrap();
        assert_eq!(credit_line(&editor, 2020), "Editing is copyright © Ed Itor, 2020.");
    }

    #[test]
    fn test_imprint_is_optional() {
        let bare = metadata(json!({}));
        assert!(imprint(&bare, &Paragraphs::default()).unwrap().is_none());

        let rights = Paragraphs::from("Line one.\nLine two.");
        let document = imprint(&bare, &rights).unwrap().unwrap();
        assert_eq!(document.kind, AuxiliaryKind::Imprint);
        assert!(document.content.contains("<p>Identifier: isbn:123</p>"));
        assert!(document.content.contains("<p>Line one.</p><p>Line two.</p>"));
    }

    #[test]
    fn test_long_rights_string_and_list_render_identically() {
        let bare = metadata(json!({}));
        let from_string = Paragraphs::from("You may share this work.");
        let from_list = Paragraphs::from(vec!["You may share this work."]);

        assert_eq!(
            imprint(&bare, &from_string).unwrap(),
            imprint(&bare, &from_list).unwrap()
        );
    }

    #[test]
    fn test_dedication_absent_or_empty_yields_nothing() {
        let metadata = metadata(json!({}));

        assert!(dedication(&metadata, None).unwrap().is_none());
        assert!(dedication(&metadata, Some(&Paragraphs::default())).unwrap().is_none());
        assert!(dedication(&metadata, Some(&Paragraphs::from("  "))).unwrap().is_none());

        let lines = Paragraphs::from(vec!["For those who leave.", "For those who remain."]);
        let document = dedication(&metadata, Some(&lines)).unwrap().unwrap();
        assert!(document
            .content
            .contains("<p>For those who leave.</p><p>For those who remain.</p>"));
    }

    #[test]
    fn test_synthesize_order() {
        let metadata = metadata(json!({ "publisher": "Qwyre" }));
        let lines = Paragraphs::from("For you.");

        let kinds = synthesize(&metadata, &Paragraphs::default(), Some(&lines))
            .unwrap()
            .into_iter()
            .map(|document| document.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                AuxiliaryKind::Titlepage,
                AuxiliaryKind::Imprint,
                AuxiliaryKind::Dedication,
                AuxiliaryKind::Colophon
            ]
        );

        let bare = metadata_without_publisher();
        let kinds = synthesize(&bare, &Paragraphs::default(), None)
            .unwrap()
            .into_iter()
            .map(|document| document.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![AuxiliaryKind::Titlepage, AuxiliaryKind::Colophon]);
    }

    fn metadata_without_publisher() -> WorkMetadata {
        metadata(json!({}))
    }

    #[test]
    fn test_render_chapter() {
        let chapter = ChapterDocument {
            ordinal: 2,
            title: "Chapter Two".to_string(),
            body: r#"<p>a &amp; b<br/>c</p><p><img alt="" src="../images/x.png"/></p>"#.to_string(),
            images: BTreeSet::from(["x.png".to_string()]),
            word_count: 5,
        };
        let content = render_chapter(&chapter, "en").unwrap();

        assert!(content.contains(r#"<body epub:type="bodymatter">"#));
        assert!(content.contains(r#"<section id="chapter-2" epub:type="chapter">"#));
        assert!(content.contains(r#"<h1 epub:type="title">Chapter Two</h1>"#));
        assert!(content.contains(r#"<p>a &amp; b<br/>c</p>"#));

        let root = XmlReader::parse(&content).unwrap();
        assert_eq!(root.find_elements_by_name("img").count(), 1);
    }

    #[test]
    fn test_render_chapter_rejects_malformed_body() {
        let chapter = ChapterDocument {
            ordinal: 1,
            title: "One".to_string(),
            body: "<p>unclosed</div>".to_string(),
            images: BTreeSet::new(),
            word_count: 1,
        };
        assert!(render_chapter(&chapter, "en").is_err());
    }
}
