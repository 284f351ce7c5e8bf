use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Command,
};

use log::debug;

use crate::{
    check::{CheckReport, StructureChecker},
    error::PressError,
};

/// Checker backed by the `epubcheck` program
///
/// Runs `epubcheck <package> -q`. The exit status decides validity; lines
/// mentioning `ERROR` or `FATAL` become the diagnostics.
#[derive(Debug, Clone)]
pub struct EpubCheck {
    program: PathBuf,
}

impl Default for EpubCheck {
    fn default() -> Self {
        Self {
            program: PathBuf::from("epubcheck"),
        }
    }
}

impl EpubCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific epubcheck executable instead of the one on `PATH`
    pub fn with_program<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    fn parse_messages(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| line.contains("ERROR") || line.contains("FATAL"))
            .map(str::to_string)
            .collect()
    }
}

impl StructureChecker for EpubCheck {
    fn name(&self) -> &str {
        "epubcheck"
    }

    fn check(&self, package: &Path) -> Result<CheckReport, PressError> {
        debug!("Running {} on {}", self.program.display(), package.display());

        let output = Command::new(&self.program)
            .arg(package)
            .arg("-q")
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

        let mut messages = Self::parse_messages(&String::from_utf8_lossy(&output.stdout));
        messages.extend(Self::parse_messages(&String::from_utf8_lossy(&output.stderr)));

        let valid = output.status.success();
        if !valid && messages.is_empty() {
            messages.push(format!("epubcheck exited with {}", output.status));
        }

        Ok(CheckReport { valid, messages })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        check::{StructureChecker, epubcheck::EpubCheck},
        error::PressError,
    };

    #[test]
    fn test_missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let checker = EpubCheck::with_program(dir.path().join("no-such-epubcheck"));

        let result = checker.check(&dir.path().join("book.epub"));
        assert!(matches!(
            result,
            Err(PressError::CollaboratorUnavailable { .. })
        ));
    }

    #[test]
    fn test_parse_messages() {
        let output = "Validating using EPUB version 3.3 rules.\n\
            ERROR(RSC-005): book.epub/EPUB/nav.xhtml(12,4): Error while parsing file\n\
            WARNING(ACC-009): book.epub: something minor\n\
            FATAL(PKG-008): Unable to read file\n";

        assert_eq!(
            EpubCheck::parse_messages(output),
            vec![
                "ERROR(RSC-005): book.epub/EPUB/nav.xhtml(12,4): Error while parsing file".to_string(),
                "FATAL(PKG-008): Unable to read file".to_string(),
            ]
        );
    }
}
