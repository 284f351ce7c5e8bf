//! Build options
//!
//! [WorkOptions] holds everything about a build that is not the work itself:
//! styling, fonts, chapter detection and where state goes. Options can be set
//! in code or loaded from a JSON file.
//!
//! ```json
//! {
//!     "stylesheet": "style/book.css",
//!     "fonts_dir": "fonts",
//!     "obfuscate_fonts": true,
//!     "chapter_level": 1
//! }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    builder::{PackageAssembler, load_fonts},
    error::{FieldError, PressError},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkOptions {
    /// Replaces the bundled stylesheet
    pub stylesheet: Option<PathBuf>,

    /// Directory whose `.otf`, `.ttf` and `.woff` files are packaged
    pub fonts_dir: Option<PathBuf>,

    pub obfuscate_fonts: bool,

    /// Heading level that starts a chapter; the highest level present when unset
    pub chapter_level: Option<u8>,

    /// Whether metadata and dedication are saved to `work.json`
    pub persist_state: bool,

    /// File stem of the archive; the title slug when unset
    pub package_name: Option<String>,
}

impl Default for WorkOptions {
    fn default() -> Self {
        Self {
            stylesheet: None,
            fonts_dir: None,
            obfuscate_fonts: false,
            chapter_level: None,
            persist_state: true,
            package_name: None,
        }
    }
}

impl WorkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from a JSON file; absent keys keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, PressError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn stylesheet<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.stylesheet = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn fonts_dir<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.fonts_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn obfuscate_fonts(&mut self, obfuscate: bool) -> &mut Self {
        self.obfuscate_fonts = obfuscate;
        self
    }

    pub fn chapter_level(&mut self, level: u8) -> &mut Self {
        self.chapter_level = Some(level);
        self
    }

    pub fn persist_state(&mut self, persist: bool) -> &mut Self {
        self.persist_state = persist;
        self
    }

    pub fn package_name(&mut self, name: &str) -> &mut Self {
        self.package_name = Some(name.to_string());
        self
    }

    /// The configured package name, refused when it is not a plain file stem
    ///
    /// # Return
    /// - `Err(PressError::ValidationError)`: The name is empty, `.`/`..`, or contains a path separator
    pub fn checked_package_name(&self) -> Result<Option<&str>, PressError> {
        let Some(name) = self.package_name.as_deref() else {
            return Ok(None);
        };

        if name.trim().is_empty()
            || matches!(name, "." | "..")
            || name.contains(['/', '\\', '\0'])
        {
            return Err(PressError::ValidationError {
                errors: vec![FieldError::new(
                    "package_name",
                    "must be a file name without path separators",
                )],
            });
        }

        Ok(Some(name))
    }

    /// Creates a package assembler carrying the configured stylesheet and fonts
    ///
    /// Relative paths are resolved against `base`.
    pub fn assembler(&self, base: &Path) -> Result<PackageAssembler, PressError> {
        let mut assembler = PackageAssembler::new().obfuscate_fonts(self.obfuscate_fonts);

        if let Some(stylesheet) = &self.stylesheet {
            let content = fs::read_to_string(base.join(stylesheet))?;
            assembler = assembler.with_stylesheet(&content);
        }
        if let Some(fonts_dir) = &self.fonts_dir {
            assembler = assembler.with_fonts(load_fonts(&base.join(fonts_dir))?);
        }

        Ok(assembler)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{config::WorkOptions, error::PressError};

    #[test]
    fn test_defaults() {
        let options = WorkOptions::default();
        assert!(options.persist_state);
        assert!(!options.obfuscate_fonts);
        assert_eq!(options.chapter_level, None);
        assert_eq!(options.package_name, None);
    }

    #[test]
    fn test_from_json_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, r#"{"chapter_level": 2, "package_name": "book"}"#).unwrap();

        let options = WorkOptions::from_json_file(&path).unwrap();
        assert_eq!(options.chapter_level, Some(2));
        assert_eq!(options.package_name.as_deref(), Some("book"));
        assert!(options.persist_state);
    }

    #[test]
    fn test_chained_setters() {
        let mut options = WorkOptions::new();
        options.chapter_level(1).persist_state(false).package_name("book");

        assert_eq!(options.chapter_level, Some(1));
        assert!(!options.persist_state);
        assert_eq!(options.package_name.as_deref(), Some("book"));
    }

    #[test]
    fn test_assembler_reads_stylesheet_and_fonts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("book.css"), "p{}").unwrap();
        fs::create_dir(dir.path().join("fonts")).unwrap();
        fs::write(dir.path().join("fonts/serif.otf"), [0u8; 16]).unwrap();

        let mut options = WorkOptions::new();
        options.stylesheet("book.css").fonts_dir("fonts");

        assert!(options.assembler(dir.path()).is_ok());
    }

    #[test]
    fn test_package_name_must_be_a_file_stem() {
        let mut options = WorkOptions::new();
        assert_eq!(options.checked_package_name().unwrap(), None);

        options.package_name("my book");
        assert_eq!(options.checked_package_name().unwrap(), Some("my book"));

        for name in ["../escape", "a/b", "a\\b", "..", ""] {
            options.package_name(name);
            assert!(matches!(
                options.checked_package_name(),
                Err(PressError::ValidationError { .. })
            ));
        }
    }

    #[test]
    fn test_assembler_missing_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = WorkOptions::new();
        options.stylesheet("missing.css");

        assert!(options.assembler(dir.path()).is_err());
    }
}
