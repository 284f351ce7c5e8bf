//! Asset Importer
//!
//! Copies or decodes the manuscript and the cover image into the working
//! directory. Inputs may be a file path, a raw byte buffer, or a text value
//! that is either a path or base64 encoded data; all of them are resolved once
//! here into bytes, sniffed, and written under a fixed file name.
//!
//! ```text
//! <workdir>/source/manuscript.docx
//! <workdir>/source/cover.jpg | cover.png
//! ```

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use infer::Infer;
use log::debug;
use zip::ZipArchive;

use crate::{
    error::PressError,
    types::{AssetOrigin, AssetRole, DOCX_MIME, SourceAsset},
};

pub const SOURCE_DIR: &str = "source";
pub const MANUSCRIPT_FILE: &str = "manuscript.docx";

/// Cover extensions, in lookup order
pub const COVER_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// An asset as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Path(PathBuf),
    Bytes(Vec<u8>),

    /// A path if one resolves, base64 data otherwise
    ///
    /// A leading `data:<mime>;base64,` prefix is accepted.
    Text(String),
}

impl From<&Path> for AssetSource {
    fn from(value: &Path) -> Self {
        AssetSource::Path(value.to_path_buf())
    }
}

impl From<PathBuf> for AssetSource {
    fn from(value: PathBuf) -> Self {
        AssetSource::Path(value)
    }
}

impl From<Vec<u8>> for AssetSource {
    fn from(value: Vec<u8>) -> Self {
        AssetSource::Bytes(value)
    }
}

impl From<&[u8]> for AssetSource {
    fn from(value: &[u8]) -> Self {
        AssetSource::Bytes(value.to_vec())
    }
}

impl From<&str> for AssetSource {
    fn from(value: &str) -> Self {
        AssetSource::Text(value.to_string())
    }
}

impl From<String> for AssetSource {
    fn from(value: String) -> Self {
        AssetSource::Text(value)
    }
}

/// Imports the manuscript into `<workdir>/source/manuscript.docx`
///
/// # Return
/// - `Err(PressError::SourceNotFound)`: The source is neither a file nor valid encoded data
/// - `Err(PressError::UnsupportedMediaType)`: The content is not a word-processor document
pub fn import_manuscript(workdir: &Path, source: AssetSource) -> Result<SourceAsset, PressError> {
    let (data, origin) = resolve(source)?;
    let media_type = sniff(&data);

    if media_type.as_deref() != Some(DOCX_MIME) {
        return Err(PressError::UnsupportedMediaType {
            role: AssetRole::Manuscript.to_string(),
            expected: "a Word document (.docx)".to_string(),
            found: media_type.unwrap_or_else(|| "unknown".to_string()),
        });
    }

    let path = source_dir(workdir)?.join(MANUSCRIPT_FILE);
    write_replacing(&path, &data)?;
    debug!("Imported manuscript ({} bytes) to {}", data.len(), path.display());

    Ok(SourceAsset {
        role: AssetRole::Manuscript,
        origin,
        media_type: DOCX_MIME.to_string(),
        path,
        size: data.len(),
    })
}

/// Imports the cover into `<workdir>/source/cover.jpg` or `cover.png`
///
/// A previously imported cover with the other extension is removed.
///
/// # Return
/// - `Err(PressError::SourceNotFound)`: The source is neither a file nor valid encoded data
/// - `Err(PressError::UnsupportedMediaType)`: The content is not a JPEG or PNG image
pub fn import_cover(workdir: &Path, source: AssetSource) -> Result<SourceAsset, PressError> {
    let (data, origin) = resolve(source)?;
    let media_type = sniff(&data);

    let extension = match media_type.as_deref() {
        Some("image/jpeg") => "jpg",
        Some("image/png") => "png",
        _ => {
            return Err(PressError::UnsupportedMediaType {
                role: AssetRole::Cover.to_string(),
                expected: "image/jpeg or image/png".to_string(),
                found: media_type.unwrap_or_else(|| "unknown".to_string()),
            });
        }
    };

    let dir = source_dir(workdir)?;
    let path = dir.join(format!("cover.{}", extension));
    write_replacing(&path, &data)?;

    for stale in COVER_EXTENSIONS.iter().filter(|ext| **ext != extension) {
        let stale = dir.join(format!("cover.{}", stale));
        if stale.is_file() {
            fs::remove_file(&stale)?;
        }
    }
    debug!("Imported cover ({} bytes) to {}", data.len(), path.display());

    Ok(SourceAsset {
        role: AssetRole::Cover,
        origin,
        media_type: media_type.unwrap_or_default(),
        path,
        size: data.len(),
    })
}

/// Writes next to `path` and renames into place
///
/// A failed write leaves an existing file intact.
fn write_replacing(path: &Path, data: &[u8]) -> Result<(), PressError> {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    let staged = PathBuf::from(staged);

    fs::write(&staged, data)?;
    fs::rename(&staged, path)?;
    Ok(())
}

/// Finds a previously imported asset of the given role
pub fn find_imported(workdir: &Path, role: AssetRole) -> Option<PathBuf> {
    let dir = workdir.join(SOURCE_DIR);
    match role {
        AssetRole::Manuscript => Some(dir.join(MANUSCRIPT_FILE)).filter(|path| path.is_file()),
        AssetRole::Cover => COVER_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("cover.{}", ext)))
            .find(|path| path.is_file()),
    }
}

/// Re-reads an imported asset from the working directory
pub fn reload(path: &Path, role: AssetRole) -> Result<SourceAsset, PressError> {
    let data = fs::read(path)?;
    Ok(SourceAsset {
        role,
        origin: AssetOrigin::Path(path.to_path_buf()),
        media_type: sniff(&data).unwrap_or_default(),
        path: path.to_path_buf(),
        size: data.len(),
    })
}

/// Detects the media type of the content
///
/// Zip containers that `infer` does not recognize as a Word document are
/// opened and checked for `word/document.xml`.
pub fn sniff(data: &[u8]) -> Option<String> {
    let kind = Infer::new().get(data)?;
    Some(refine_mime_type(kind.mime_type(), data))
}

fn refine_mime_type(infer_mime: &str, data: &[u8]) -> String {
    match infer_mime {
        "application/zip" => match ZipArchive::new(Cursor::new(data)) {
            Ok(archive) if archive.index_for_name("word/document.xml").is_some() => {
                DOCX_MIME.to_string()
            }
            _ => infer_mime.to_string(),
        },
        "image/jpg" => "image/jpeg".to_string(),
        _ => infer_mime.to_string(),
    }
}

pub(crate) fn resolve(source: AssetSource) -> Result<(Vec<u8>, AssetOrigin), PressError> {
    match source {
        AssetSource::Path(path) => {
            if !path.is_file() {
                return Err(PressError::SourceNotFound {
                    source_ref: path.to_string_lossy().to_string(),
                });
            }
            Ok((fs::read(&path)?, AssetOrigin::Path(path)))
        }

        AssetSource::Bytes(data) => Ok((data, AssetOrigin::Bytes)),

        AssetSource::Text(text) => {
            let trimmed = text.trim();
            let candidate = Path::new(trimmed);
            if !trimmed.is_empty() && candidate.is_file() {
                return Ok((fs::read(candidate)?, AssetOrigin::Path(candidate.to_path_buf())));
            }

            match decode_base64(trimmed) {
                Some(data) => Ok((data, AssetOrigin::Encoded)),
                None => Err(PressError::SourceNotFound {
                    source_ref: abbreviate(trimmed),
                }),
            }
        }
    }
}

fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let payload = match text.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,")?.1,
        None => text,
    };

    let compact = payload
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    if compact.is_empty() {
        return None;
    }

    STANDARD.decode(compact).ok().filter(|data| !data.is_empty())
}

fn source_dir(workdir: &Path) -> Result<PathBuf, PressError> {
    let dir = workdir.join(SOURCE_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn abbreviate(text: &str) -> String {
    const LIMIT: usize = 64;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use base64::{Engine, engine::general_purpose::STANDARD};

    use crate::{
        error::PressError,
        importer::{AssetSource, find_imported, import_cover, import_manuscript, sniff},
        testing::{docx_with_headings, tiny_jpeg, tiny_png},
        types::{AssetOrigin, AssetRole, DOCX_MIME},
    };

    #[test]
    fn test_import_manuscript_from_path() {
        let workdir = tempfile::tempdir().unwrap();
        let input = workdir.path().join("input.docx");
        fs::write(&input, docx_with_headings(&["Chapter One"])).unwrap();

        let asset = import_manuscript(workdir.path(), AssetSource::from(input.as_path())).unwrap();

        assert_eq!(asset.role, AssetRole::Manuscript);
        assert_eq!(asset.origin, AssetOrigin::Path(input));
        assert_eq!(asset.media_type, DOCX_MIME);
        assert_eq!(asset.path, workdir.path().join("source/manuscript.docx"));
        assert!(asset.path.is_file());
    }

    #[test]
    fn test_import_manuscript_from_encoded_text() {
        let workdir = tempfile::tempdir().unwrap();
        let encoded = STANDARD.encode(docx_with_headings(&["Chapter One"]));

        let asset = import_manuscript(workdir.path(), AssetSource::from(encoded)).unwrap();
        assert_eq!(asset.origin, AssetOrigin::Encoded);
        assert_eq!(asset.extension(), "docx");
    }

    #[test]
    fn test_import_manuscript_rejects_image() {
        let workdir = tempfile::tempdir().unwrap();

        let result = import_manuscript(workdir.path(), AssetSource::from(tiny_png()));
        match result {
            Err(PressError::UnsupportedMediaType { role, found, .. }) => {
                assert_eq!(role, "manuscript");
                assert_eq!(found, "image/png");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_import_cover_accepts_png_and_jpeg() {
        let workdir = tempfile::tempdir().unwrap();

        let png = import_cover(workdir.path(), AssetSource::from(tiny_png())).unwrap();
        assert_eq!(png.media_type, "image/png");
        assert_eq!(png.extension(), "png");
        assert_eq!(png.origin, AssetOrigin::Bytes);

        let jpeg = import_cover(workdir.path(), AssetSource::from(tiny_jpeg())).unwrap();
        assert_eq!(jpeg.media_type, "image/jpeg");
        assert_eq!(jpeg.extension(), "jpg");

        // the second import supersedes the first
        assert!(!png.path.exists());
        assert_eq!(find_imported(workdir.path(), AssetRole::Cover), Some(jpeg.path));
    }

    #[test]
    fn test_failed_cover_write_keeps_previous_cover() {
        let workdir = tempfile::tempdir().unwrap();
        let png = import_cover(workdir.path(), AssetSource::from(tiny_png())).unwrap();

        // a directory in the way of the staged file makes the write fail
        fs::create_dir(workdir.path().join("source/cover.jpg.tmp")).unwrap();
        assert!(import_cover(workdir.path(), AssetSource::from(tiny_jpeg())).is_err());

        assert_eq!(fs::read(&png.path).unwrap(), tiny_png());
        assert_eq!(find_imported(workdir.path(), AssetRole::Cover), Some(png.path));
    }

    #[test]
    fn test_import_cover_from_data_uri() {
        let workdir = tempfile::tempdir().unwrap();
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(tiny_png()));

        let asset = import_cover(workdir.path(), AssetSource::from(uri.as_str())).unwrap();
        assert_eq!(asset.size, tiny_png().len());
        assert_eq!(fs::read(asset.path).unwrap(), tiny_png());
    }

    #[test]
    fn test_import_cover_rejects_document() {
        let workdir = tempfile::tempdir().unwrap();

        let result = import_cover(
            workdir.path(),
            AssetSource::from(docx_with_headings(&["Chapter One"])),
        );
        assert!(matches!(result, Err(PressError::UnsupportedMediaType { .. })));
    }

    #[test]
    fn test_unresolvable_sources() {
        let workdir = tempfile::tempdir().unwrap();

        let missing = workdir.path().join("missing.png");
        let result = import_cover(workdir.path(), AssetSource::from(missing.clone()));
        assert_eq!(
            result.unwrap_err(),
            PressError::SourceNotFound {
                source_ref: missing.to_string_lossy().to_string()
            }
        );

        let result = import_cover(workdir.path(), AssetSource::from("not/a/file.png"));
        assert_eq!(
            result.unwrap_err(),
            PressError::SourceNotFound {
                source_ref: "not/a/file.png".to_string()
            }
        );
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(&tiny_png()).as_deref(), Some("image/png"));
        assert_eq!(
            sniff(&docx_with_headings(&["A"])).as_deref(),
            Some(DOCX_MIME)
        );
        assert_eq!(sniff(b"plain text"), None);
    }
}
