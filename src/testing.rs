//! Fixtures shared by the unit tests
//!
//! Manuscripts are assembled in memory; `word/document.xml` is always the
//! first archive entry so that content sniffing recognizes the container.

use std::io::{Cursor, Write};

use zip::{ZipWriter, write::SimpleFileOptions};

const DOCUMENT_NAMESPACES: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#,
);

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
<w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:pPr><w:outlineLvl w:val="0"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:pPr><w:outlineLvl w:val="1"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="ChapterTitle"><w:name w:val="Chapter Title"/><w:pPr><w:outlineLvl w:val="0"/></w:pPr></w:style>
</w:styles>"#;

/// A 1x1 transparent PNG
pub fn tiny_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ]
}

/// A decodable PNG of the given size
pub fn sized_png(width: u32, height: u32) -> Vec<u8> {
    let pixels = image::RgbImage::from_pixel(width, height, image::Rgb([180, 40, 40]));
    let mut data = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut data, image::ImageFormat::Png)
        .unwrap();
    data.into_inner()
}

/// JPEG markers only; enough for content sniffing
pub fn tiny_jpeg() -> Vec<u8> {
    let mut data = vec![
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x00,
    ];
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

pub fn heading(level: u8, text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="Heading{}"/></w:pPr><w:r><w:t>{}</w:t></w:r></w:p>"#,
        level,
        escape(text)
    )
}

pub fn paragraph(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text)
    )
}

/// A paragraph holding one inline picture
pub fn picture(rel_id: &str) -> String {
    format!(
        concat!(
            r#"<w:p><w:r><w:drawing><wp:inline><wp:docPr id="1" name="Picture 1"/>"#,
            r#"<a:graphic><a:graphicData><pic:pic><pic:blipFill>"#,
            r#"<a:blip r:embed="{}"/>"#,
            r#"</pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ),
        rel_id
    )
}

/// A manuscript whose body is the given `w:body` content
pub fn docx(body: &str) -> Vec<u8> {
    docx_with_media(body, &[])
}

/// A manuscript with images stored under `word/media/`
///
/// Each image is referenced by relationship id `rIdImg<n>`, counting from 1.
pub fn docx_with_media(body: &str, media: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {}><w:body>{}</w:body></w:document>"#,
        DOCUMENT_NAMESPACES, body
    );
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(document.as_bytes()).unwrap();

    zip.start_file("word/styles.xml", options).unwrap();
    zip.write_all(STYLES.as_bytes()).unwrap();

    let relationships = media
        .iter()
        .enumerate()
        .map(|(index, (name, _))| {
            format!(
                r#"<Relationship Id="rIdImg{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{}"/>"#,
                index + 1,
                name
            )
        })
        .collect::<String>();
    let relationships = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
        relationships
    );
    zip.start_file("word/_rels/document.xml.rels", options).unwrap();
    zip.write_all(relationships.as_bytes()).unwrap();

    for (name, data) in media {
        zip.start_file(format!("word/media/{}", name), options).unwrap();
        zip.write_all(data).unwrap();
    }

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
    )
    .unwrap();

    zip.finish().unwrap().into_inner()
}

/// A manuscript with one Heading 1 section and one paragraph per title
pub fn docx_with_headings(titles: &[&str]) -> Vec<u8> {
    let body = titles
        .iter()
        .map(|title| format!("{}{}", heading(1, title), paragraph(&format!("Text of {}.", title))))
        .collect::<String>();
    docx(&body)
}

/// The metadata used by the end-to-end scenarios
pub fn scenario_metadata() -> serde_json::Value {
    serde_json::json!({
        "identifier": "isbn:123",
        "title": "T",
        "language": "en",
        "rights": "All rights reserved.",
    })
}

fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).to_string()
}
