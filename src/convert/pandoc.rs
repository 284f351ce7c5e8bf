use std::{
    collections::HashSet,
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Command,
};

use infer::Infer;
use log::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    convert::{ConvertedDocument, DocumentConverter},
    error::PressError,
    types::ExtractedImage,
};

/// Converter backed by the `pandoc` program
///
/// Runs `pandoc <manuscript> -f docx -t html5 --extract-media <dir>` and
/// collects the extracted media. Pandoc references images by their extracted
/// path; the transformer matches them by file name.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pandoc"),
        }
    }
}

impl PandocConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific pandoc executable instead of the one on `PATH`
    pub fn with_program<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    fn collect_media(media_dir: &Path) -> Result<Vec<ExtractedImage>, PressError> {
        let mut images = Vec::new();
        let mut taken = HashSet::new();

        if !media_dir.exists() {
            return Ok(images);
        }

        for entry in WalkDir::new(media_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let data = fs::read(entry.path())?;
            let Some(kind) = Infer::new().get(&data).filter(|kind| kind.mime_type().starts_with("image/"))
            else {
                warn!("Skipping extracted file '{}', not an image", entry.path().display());
                continue;
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if !taken.insert(name.clone()) {
                warn!("Skipping extracted image '{}', the name is already used", name);
                continue;
            }

            images.push(ExtractedImage {
                name,
                media_type: kind.mime_type().to_string(),
                data,
            });
        }

        Ok(images)
    }
}

impl DocumentConverter for PandocConverter {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn convert(&self, manuscript: &Path) -> Result<ConvertedDocument, PressError> {
        let media_dir = env::temp_dir().join(format!("epub-press-media-{}", Uuid::new_v4()));
        debug!(
            "Running {} on {}",
            self.program.display(),
            manuscript.display()
        );

        let output = Command::new(&self.program)
            .arg(manuscript)
            .args(["-f", "docx", "-t", "html5", "--extract-media"])
            .arg(&media_dir)
            .output()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    PressError::CollaboratorUnavailable {
                        collaborator: self.program.to_string_lossy().to_string(),
                        reason: err.to_string(),
                    }
                }
                _ => PressError::IOError { source: err },
            })?;

        let result = if output.status.success() {
            let html = String::from_utf8(output.stdout)?;
            Self::collect_media(&media_dir).map(|images| ConvertedDocument { html, images })
        } else {
            Err(PressError::ConversionFailed {
                diagnostic: format!(
                    "pandoc exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        };

        if media_dir.exists() {
            if let Err(err) = fs::remove_dir_all(&media_dir) {
                warn!("Unable to remove {}: {}", media_dir.display(), err);
            }
        }

        result
    }
}
