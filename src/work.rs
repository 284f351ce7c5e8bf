//! Work Orchestrator
//!
//! [Work] is the stateful entry point of the pipeline. It owns one working
//! directory and records which steps have completed in a [BuildState]:
//!
//! ```text
//! opened -> metadata -> document, cover (any order) -> [rights] -> [dedication] -> built -> validated
//! ```
//!
//! Every step after the metadata requires the metadata. Setters may be called
//! again at any time and replace what the previous call set; a setter called
//! after a build invalidates it. Metadata, rights, contributors and dedication
//! are saved to `work.json`, and imported sources live under `source/`, so a
//! work reopened on the same directory continues where it stopped.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # use epub_press::{error::PressError, importer::AssetSource, work::Work};
//! # fn main() -> Result<(), PressError> {
//! let mut work = Work::open("my-book")?;
//! work.set_metadata(&serde_json::json!({
//!     "title": "My Book",
//!     "language": "en",
//!     "rights": "All rights reserved.",
//! }))?;
//! work.set_document(AssetSource::from("manuscript.docx"))?;
//! work.set_cover(AssetSource::from("cover.jpg"), None)?;
//!
//! let archive = work.build()?;
//! if !work.validate()? {
//!     for message in work.diagnostics() {
//!         eprintln!("{}", message);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    collections::BTreeSet,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    builder::{AssembledPackage, PackageResource},
    check::{PackageInspector, StructureChecker},
    config::WorkOptions,
    convert::{DocumentConverter, DocxConverter},
    error::PressError,
    importer::{AssetSource, find_imported, import_cover, import_manuscript, reload},
    matter::synthesize,
    metadata::{Contributor, Paragraphs, WorkMetadata, validate},
    rights::{RightsTemplate, rights_statement},
    transform::transform,
    types::{AssetRole, PackageManifest, SourceAsset},
};

/// File holding the persisted state of a work
pub const STATE_FILE: &str = "work.json";

/// Archive stem used when the title has no usable characters
const FALLBACK_NAME: &str = "work";

/// A step of the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildStep {
    MetadataSet,
    DocumentSet,
    CoverSet,
    RightsSet,
    DedicationSet,
    Built,
    Validated,
}

impl BuildStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStep::MetadataSet => "metadata",
            BuildStep::DocumentSet => "document",
            BuildStep::CoverSet => "cover",
            BuildStep::RightsSet => "rights",
            BuildStep::DedicationSet => "dedication",
            BuildStep::Built => "built",
            BuildStep::Validated => "validated",
        }
    }
}

impl Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The completed steps of one work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildState {
    steps: BTreeSet<BuildStep>,
}

impl BuildState {
    /// Steps that must be completed before a build
    pub const REQUIRED_FOR_BUILD: [BuildStep; 3] = [
        BuildStep::MetadataSet,
        BuildStep::DocumentSet,
        BuildStep::CoverSet,
    ];

    pub fn is_set(&self, step: BuildStep) -> bool {
        self.steps.contains(&step)
    }

    pub fn steps(&self) -> impl Iterator<Item = BuildStep> + '_ {
        self.steps.iter().copied()
    }

    /// Required steps that have not been completed yet
    pub fn missing_for_build(&self) -> Vec<BuildStep> {
        Self::REQUIRED_FOR_BUILD
            .into_iter()
            .filter(|step| !self.is_set(*step))
            .collect()
    }

    fn mark(&mut self, step: BuildStep) {
        self.steps.insert(step);
    }

    fn clear(&mut self, step: BuildStep) {
        self.steps.remove(&step);
    }
}

/// Contents of `work.json`
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedWork {
    #[serde(default)]
    metadata: Option<WorkMetadata>,
    #[serde(default)]
    long_rights: Option<Paragraphs>,
    #[serde(default)]
    dedication: Option<Paragraphs>,
    #[serde(default)]
    cover_artist: Option<Contributor>,
    #[serde(default)]
    contributors: Vec<Contributor>,
}

/// One work under construction
pub struct Work {
    workdir: PathBuf,
    options: WorkOptions,
    state: BuildState,

    metadata: Option<WorkMetadata>,

    /// Replaces the long rights of the metadata when set
    long_rights: Option<Paragraphs>,
    dedication: Option<Paragraphs>,
    cover_artist: Option<Contributor>,

    /// Contributors added after the metadata, in the order they were added
    contributors: Vec<Contributor>,

    manuscript: Option<SourceAsset>,
    cover: Option<SourceAsset>,

    converter: Box<dyn DocumentConverter>,
    checker: Box<dyn StructureChecker>,

    package: Option<AssembledPackage>,
    output: Option<PathBuf>,
    diagnostics: Vec<String>,
}

impl Work {
    /// Opens a work on a working directory with the default options
    ///
    /// The directory is created when missing. State persisted by an earlier
    /// work on the same directory is restored.
    pub fn open<P: AsRef<Path>>(workdir: P) -> Result<Self, PressError> {
        Self::with_options(workdir, WorkOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(
        workdir: P,
        options: WorkOptions,
    ) -> Result<Self, PressError> {
        let workdir = workdir.as_ref().to_path_buf();
        fs::create_dir_all(&workdir)?;

        let mut work = Self {
            workdir,
            options,
            state: BuildState::default(),
            metadata: None,
            long_rights: None,
            dedication: None,
            cover_artist: None,
            contributors: vec![],
            manuscript: None,
            cover: None,
            converter: Box::new(DocxConverter),
            checker: Box::new(PackageInspector::new()),
            package: None,
            output: None,
            diagnostics: vec![],
        };

        work.resume()?;
        Ok(work)
    }

    /// Restores persisted state and previously imported sources
    fn resume(&mut self) -> Result<(), PressError> {
        let state_file = self.workdir.join(STATE_FILE);
        if self.options.persist_state && state_file.is_file() {
            let persisted: PersistedWork = serde_json::from_str(&fs::read_to_string(&state_file)?)?;

            if persisted.metadata.is_some() {
                self.state.mark(BuildStep::MetadataSet);
            }
            if persisted.long_rights.is_some() {
                self.state.mark(BuildStep::RightsSet);
            }
            if persisted.dedication.is_some() {
                self.state.mark(BuildStep::DedicationSet);
            }

            self.metadata = persisted.metadata;
            self.long_rights = persisted.long_rights;
            self.dedication = persisted.dedication;
            self.cover_artist = persisted.cover_artist;
            self.contributors = persisted.contributors;
            debug!("Restored work state from {}", state_file.display());
        }

        if let Some(path) = find_imported(&self.workdir, AssetRole::Manuscript) {
            self.manuscript = Some(reload(&path, AssetRole::Manuscript)?);
            self.state.mark(BuildStep::DocumentSet);
        }
        if let Some(path) = find_imported(&self.workdir, AssetRole::Cover) {
            self.cover = Some(reload(&path, AssetRole::Cover)?);
            self.state.mark(BuildStep::CoverSet);
        }

        Ok(())
    }

    fn persist(&self) -> Result<(), PressError> {
        if !self.options.persist_state {
            return Ok(());
        }

        let persisted = PersistedWork {
            metadata: self.metadata.clone(),
            long_rights: self.long_rights.clone(),
            dedication: self.dedication.clone(),
            cover_artist: self.cover_artist.clone(),
            contributors: self.contributors.clone(),
        };
        fs::write(
            self.workdir.join(STATE_FILE),
            serde_json::to_string_pretty(&persisted)?,
        )?;
        Ok(())
    }

    fn require_metadata(&self, step: &str) -> Result<(), PressError> {
        if self.state.is_set(BuildStep::MetadataSet) {
            Ok(())
        } else {
            Err(PressError::PreconditionError {
                step: step.to_string(),
                missing: vec![BuildStep::MetadataSet.to_string()],
            })
        }
    }

    /// Marks a step complete and drops any earlier build
    fn complete(&mut self, step: BuildStep) {
        self.state.mark(step);
        if self.state.is_set(BuildStep::Built) {
            debug!("'{}' changed, the previous build is outdated", step);
        }
        self.state.clear(BuildStep::Built);
        self.state.clear(BuildStep::Validated);
        self.package = None;
        self.output = None;
        self.diagnostics.clear();
    }

    /// Validates a raw metadata mapping and makes it the work's metadata
    ///
    /// # Return
    /// - `Err(PressError::ValidationError)`: Lists every violated field; the previous metadata is kept
    pub fn set_metadata(&mut self, raw: &Value) -> Result<(), PressError> {
        let metadata = validate(raw)?;
        self.set_work_metadata(metadata)
    }

    /// Uses an already validated metadata record
    pub fn set_work_metadata(&mut self, metadata: WorkMetadata) -> Result<(), PressError> {
        debug!("Metadata set for '{}'", metadata.identifier);
        self.metadata = Some(metadata);
        self.complete(BuildStep::MetadataSet);
        self.persist()
    }

    /// Imports the manuscript, replacing any earlier one
    pub fn set_document(&mut self, source: AssetSource) -> Result<(), PressError> {
        self.require_metadata("set_document")?;
        self.manuscript = Some(import_manuscript(&self.workdir, source)?);
        self.complete(BuildStep::DocumentSet);
        Ok(())
    }

    /// Imports the cover, replacing any earlier one
    ///
    /// `artist` is credited in the colophon; it replaces the artist given
    /// with an earlier cover.
    pub fn set_cover(
        &mut self,
        source: AssetSource,
        artist: Option<Contributor>,
    ) -> Result<(), PressError> {
        self.require_metadata("set_cover")?;
        self.cover = Some(import_cover(&self.workdir, source)?);
        self.cover_artist = artist;
        self.complete(BuildStep::CoverSet);
        self.persist()
    }

    /// Credits a contributor in the colophon and the package metadata
    pub fn add_contributor(&mut self, contributor: Contributor) -> Result<(), PressError> {
        self.require_metadata("add_contributor")?;
        self.contributors.push(contributor);
        self.complete(BuildStep::MetadataSet);
        self.persist()
    }

    /// Sets the long rights statement shown in the imprint
    ///
    /// Accepts a string or a sequence of strings; both are stored the same
    /// way. Empty rights remove the statement.
    pub fn set_rights<T: Into<Paragraphs>>(&mut self, rights: T) -> Result<(), PressError> {
        self.require_metadata("set_rights")?;

        let rights = rights.into();
        if rights.is_empty() {
            self.long_rights = None;
            self.state.clear(BuildStep::RightsSet);
            self.complete(BuildStep::MetadataSet);
        } else {
            self.long_rights = Some(rights);
            self.complete(BuildStep::RightsSet);
        }

        self.persist()
    }

    /// Fills the long rights from a template
    ///
    /// The creators and year come from the metadata; the terms of the cover
    /// artist, when given, become the cover credit.
    pub fn set_rights_template(&mut self, template: RightsTemplate) -> Result<(), PressError> {
        self.require_metadata("set_rights_template")?;

        let cover_rights = self
            .cover_artist
            .as_ref()
            .and_then(|artist| artist.terms.as_deref());
        let rights = self
            .metadata()
            .map(|metadata| rights_statement(template, &metadata, cover_rights))
            .unwrap_or_default();

        self.set_rights(rights)
    }

    /// Sets the dedication lines
    ///
    /// No lines remove the dedication; the package then has no dedication page.
    pub fn set_dedication<T: Into<Paragraphs>>(&mut self, lines: T) -> Result<(), PressError> {
        self.require_metadata("set_dedication")?;

        let lines = lines.into();
        if lines.is_empty() {
            self.dedication = None;
            self.state.clear(BuildStep::DedicationSet);
            self.complete(BuildStep::MetadataSet);
        } else {
            self.dedication = Some(lines);
            self.complete(BuildStep::DedicationSet);
        }

        self.persist()
    }

    pub fn set_converter(&mut self, converter: Box<dyn DocumentConverter>) {
        self.converter = converter;
    }

    pub fn set_checker(&mut self, checker: Box<dyn StructureChecker>) {
        self.checker = checker;
    }

    /// The metadata as it will be packaged
    ///
    /// The rights, cover artist and added contributors are merged in. The
    /// word count is only known after a build.
    pub fn metadata(&self) -> Option<WorkMetadata> {
        let mut metadata = self.metadata.clone()?;
        if let Some(long_rights) = &self.long_rights {
            metadata.long_rights = long_rights.clone();
        }
        metadata.contributors.extend(self.cover_artist.iter().cloned());
        metadata.contributors.extend(self.contributors.iter().cloned());
        Some(metadata)
    }

    /// Builds the archive
    ///
    /// The manuscript is transformed, the front and back matter generated and
    /// everything assembled and written as `<name>.epub` in the working
    /// directory. The name is the configured package name, or the title slug.
    ///
    /// # Return
    /// - `Ok(PathBuf)`: Path of the written archive
    /// - `Err(PressError::PreconditionError)`: Metadata, document or cover is missing
    pub fn build(&mut self) -> Result<PathBuf, PressError> {
        let missing = self.state.missing_for_build();
        let (Some(mut metadata), Some(manuscript), Some(cover), true) = (
            self.metadata(),
            self.manuscript.as_ref(),
            self.cover.as_ref(),
            missing.is_empty(),
        ) else {
            return Err(PressError::PreconditionError {
                step: "build".to_string(),
                missing: missing.iter().map(BuildStep::to_string).collect(),
            });
        };

        let package_name = self.options.checked_package_name()?.map(str::to_string);

        debug!("Building '{}'", metadata.identifier);
        let transformed = transform(manuscript, self.converter.as_ref(), self.options.chapter_level)?;
        metadata.word_count = Some(transformed.word_count() as u64);

        let auxiliary = synthesize(&metadata, &metadata.long_rights, self.dedication.as_ref())?;
        let cover = PackageResource::cover(cover)?;
        let package = self.options.assembler(&self.workdir)?.assemble(
            &metadata,
            &transformed.chapters,
            &transformed.images,
            &auxiliary,
            Some(&cover),
        )?;

        let name = match package_name {
            Some(name) => name,
            None => Some(metadata.slug())
                .filter(|slug| !slug.is_empty())
                .unwrap_or_else(|| FALLBACK_NAME.to_string()),
        };
        let path = package.write(&self.workdir, &name)?;

        self.state.mark(BuildStep::Built);
        self.state.clear(BuildStep::Validated);
        self.package = Some(package);
        self.output = Some(path.clone());
        self.diagnostics.clear();

        info!(
            "Built {} ({} chapters)",
            path.display(),
            transformed.chapters.len()
        );
        Ok(path)
    }

    /// Checks the built archive
    ///
    /// Diagnostics of the check are available from [Work::diagnostics].
    ///
    /// # Return
    /// - `Ok(bool)`: Whether the archive passed
    /// - `Err(PressError::BuildIncomplete)`: Nothing has been built since the last change
    pub fn validate(&mut self) -> Result<bool, PressError> {
        let Some(path) = self.output.clone().filter(|_| self.state.is_set(BuildStep::Built)) else {
            return Err(PressError::BuildIncomplete);
        };

        debug!("Checking {} with {}", path.display(), self.checker.name());
        let report = self.checker.check(&path)?;
        self.diagnostics = report.messages;

        if report.valid {
            self.state.mark(BuildStep::Validated);
            info!("{} is valid", path.display());
        } else {
            warn!(
                "{} failed the {} check with {} messages",
                path.display(),
                self.checker.name(),
                self.diagnostics.len()
            );
        }

        Ok(report.valid)
    }

    /// Messages of the last validation
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Manifest of the current build
    pub fn manifest(&self) -> Option<&PackageManifest> {
        self.package.as_ref().map(|package| &package.manifest)
    }

    pub fn package(&self) -> Option<&AssembledPackage> {
        self.package.as_ref()
    }

    /// Path of the current build's archive
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::{
        check::{CheckReport, StructureChecker},
        config::WorkOptions,
        epub::EpubDoc,
        error::PressError,
        importer::AssetSource,
        metadata::Contributor,
        rights::RightsTemplate,
        testing::{docx_with_headings, scenario_metadata, tiny_jpeg, tiny_png},
        work::{BuildStep, STATE_FILE, Work},
    };

    fn ready_work(dir: &Path) -> Work {
        let mut work = Work::open(dir).unwrap();
        work.set_metadata(&scenario_metadata()).unwrap();
        work.set_document(AssetSource::Bytes(docx_with_headings(&[
            "Chapter One",
            "Chapter Two",
        ])))
        .unwrap();
        work.set_cover(AssetSource::Bytes(tiny_png()), None).unwrap();
        work
    }

    struct RejectingChecker;

    impl StructureChecker for RejectingChecker {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn check(&self, _package: &Path) -> Result<CheckReport, PressError> {
            Ok(CheckReport::from_messages(vec!["rejected".to_string()]))
        }
    }

    /// Two Heading 1 sections build into a valid two-entry toc
    #[test]
    fn test_scenario_build_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());

        let path = work.build().unwrap();
        assert_eq!(path, dir.path().join("t.epub"));
        assert!(path.is_file());
        assert_eq!(work.output_path(), Some(path.as_path()));

        let doc = EpubDoc::new(&path).unwrap();
        let labels = doc
            .catalog
            .iter()
            .map(|point| point.label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["Chapter One", "Chapter Two"]);

        assert!(work.validate().unwrap(), "{:?}", work.diagnostics());
        assert!(work.diagnostics().is_empty());
        assert!(work.state().is_set(BuildStep::Validated));
    }

    #[test]
    fn test_build_before_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = Work::open(dir.path()).unwrap();
        work.set_metadata(&scenario_metadata()).unwrap();
        work.set_cover(AssetSource::Bytes(tiny_png()), None).unwrap();

        assert_eq!(
            work.build().err(),
            Some(PressError::PreconditionError {
                step: "build".to_string(),
                missing: vec!["document".to_string()],
            })
        );
    }

    #[test]
    fn test_build_lists_every_missing_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = Work::open(dir.path()).unwrap();

        assert_eq!(
            work.state().missing_for_build(),
            vec![
                BuildStep::MetadataSet,
                BuildStep::DocumentSet,
                BuildStep::CoverSet
            ]
        );
        assert_eq!(
            work.build().err(),
            Some(PressError::PreconditionError {
                step: "build".to_string(),
                missing: vec![
                    "metadata".to_string(),
                    "document".to_string(),
                    "cover".to_string()
                ],
            })
        );
    }

    #[test]
    fn test_steps_require_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = Work::open(dir.path()).unwrap();

        let result = work.set_document(AssetSource::Bytes(docx_with_headings(&["One"])));
        assert_eq!(
            result.err(),
            Some(PressError::PreconditionError {
                step: "set_document".to_string(),
                missing: vec!["metadata".to_string()],
            })
        );
        assert!(work.set_dedication(vec!["For you"]).is_err());
    }

    #[test]
    fn test_invalid_metadata_lists_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = Work::open(dir.path()).unwrap();

        let result = work.set_metadata(&serde_json::json!({ "identifier": "x" }));
        let Err(PressError::ValidationError { errors }) = result else {
            panic!("expected a validation error");
        };
        let fields = errors.iter().map(|error| error.field.as_str()).collect::<Vec<_>>();
        assert!(fields.contains(&"title"));
        assert!(fields.contains(&"language"));
        assert!(fields.contains(&"rights"));
        assert!(!work.state().is_set(BuildStep::MetadataSet));
    }

    #[test]
    fn test_validate_before_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());

        assert_eq!(work.validate().err(), Some(PressError::BuildIncomplete));
    }

    #[test]
    fn test_setter_after_build_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());
        work.build().unwrap();
        assert!(work.validate().unwrap());

        work.set_rights("Some rights reserved.").unwrap();
        assert!(!work.state().is_set(BuildStep::Built));
        assert!(!work.state().is_set(BuildStep::Validated));
        assert!(work.manifest().is_none());
        assert_eq!(work.validate().err(), Some(PressError::BuildIncomplete));

        // a validated work can be rebuilt
        work.build().unwrap();
        assert!(work.validate().unwrap());
        assert!(work.manifest().unwrap().get("imprint").is_some());
    }

    #[test]
    fn test_second_cover_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());
        work.set_cover(AssetSource::Bytes(tiny_jpeg()), None).unwrap();
        work.build().unwrap();

        let manifest = work.manifest().unwrap();
        assert_eq!(manifest.get("cover-image").unwrap().path, "images/cover.jpg");
        assert!(!dir.path().join("source/cover.png").exists());
    }

    #[test]
    fn test_skipped_dedication() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());
        work.build().unwrap();

        let package = work.package().unwrap();
        assert!(package.manifest.get("dedication").is_none());
        assert!(package.spine.iter().all(|item| item.idref != "dedication"));
    }

    #[test]
    fn test_dedication_and_contributors() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());
        work.set_dedication(vec!["For my mother,", "who read to me."])
            .unwrap();
        work.set_cover(
            AssetSource::Bytes(tiny_png()),
            Some(Contributor::new("artist", "Jane Doe").unwrap().with_year(2006)),
        )
        .unwrap();
        work.add_contributor(Contributor::new("editor", "Sam Roe").unwrap())
            .unwrap();
        work.build().unwrap();

        let package = work.package().unwrap();
        let spine = package
            .spine
            .iter()
            .map(|item| item.idref.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            spine,
            vec!["titlepage", "dedication", "chapter-1", "chapter-2", "colophon"]
        );

        let colophon =
            String::from_utf8(package.file("EPUB/text/colophon.xhtml").unwrap().to_vec()).unwrap();
        let artwork = colophon.find("Artwork is copyright © Jane Doe, 2006.").unwrap();
        let editing = colophon.find("Editing is copyright © Sam Roe").unwrap();
        assert!(artwork < editing);
    }

    #[test]
    fn test_rights_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());
        work.set_cover(
            AssetSource::Bytes(tiny_png()),
            Some(
                Contributor::new("artist", "Jane Doe")
                    .unwrap()
                    .with_terms("Cover art by Jane Doe."),
            ),
        )
        .unwrap();
        work.set_rights_template(RightsTemplate::CcByNcSa).unwrap();
        assert!(work.state().is_set(BuildStep::RightsSet));

        let rights = work.metadata().unwrap().long_rights;
        assert!(rights.as_slice()[1].starts_with("Copyright the Author, "));
        assert_eq!(rights.as_slice()[2], "Cover art by Jane Doe.");

        work.build().unwrap();
        let imprint = String::from_utf8(
            work.package()
                .unwrap()
                .file("EPUB/text/imprint.xhtml")
                .unwrap()
                .to_vec(),
        )
        .unwrap();
        assert!(imprint.contains("Cover art by Jane Doe."));
        assert!(imprint.contains("(CC BY-NC-SA 4.0)"));
    }

    #[test]
    fn test_word_count_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());
        let path = work.build().unwrap();

        let doc = EpubDoc::new(&path).unwrap();
        let count = doc.get_metadata_value("se:word-count").unwrap();
        // two words of title and four of text per chapter
        assert_eq!(count, vec!["12".to_string()]);
    }

    #[test]
    fn test_reopen_resumes_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut work = ready_work(dir.path());
            work.set_dedication("For you").unwrap();
        }
        assert!(dir.path().join(STATE_FILE).is_file());

        let mut work = Work::open(dir.path()).unwrap();
        for step in [
            BuildStep::MetadataSet,
            BuildStep::DocumentSet,
            BuildStep::CoverSet,
            BuildStep::DedicationSet,
        ] {
            assert!(work.state().is_set(step), "{} not restored", step);
        }
        assert!(!work.state().is_set(BuildStep::Built));

        work.build().unwrap();
        assert!(work.manifest().unwrap().get("dedication").is_some());
    }

    #[test]
    fn test_without_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = WorkOptions::new();
        options.persist_state(false).package_name("book");

        let mut work = Work::with_options(dir.path(), options).unwrap();
        work.set_metadata(&scenario_metadata()).unwrap();
        work.set_document(AssetSource::Bytes(docx_with_headings(&["One"])))
            .unwrap();
        work.set_cover(AssetSource::Bytes(tiny_png()), None).unwrap();

        assert_eq!(work.build().unwrap(), dir.path().join("book.epub"));
        assert!(!dir.path().join(STATE_FILE).exists());
    }

    #[test]
    fn test_package_name_cannot_leave_workdir() {
        let root = tempfile::tempdir().unwrap();
        let workdir = root.path().join("work");
        let mut options = WorkOptions::new();
        options.package_name("../escape");

        let mut work = Work::with_options(&workdir, options).unwrap();
        work.set_metadata(&scenario_metadata()).unwrap();
        work.set_document(AssetSource::Bytes(docx_with_headings(&["One"])))
            .unwrap();
        work.set_cover(AssetSource::Bytes(tiny_png()), None).unwrap();

        assert!(matches!(work.build(), Err(PressError::ValidationError { .. })));
        assert!(!root.path().join("escape.epub").exists());
        assert!(!work.state().is_set(BuildStep::Built));
    }

    #[test]
    fn test_failed_check_keeps_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let mut work = ready_work(dir.path());
        work.set_checker(Box::new(RejectingChecker));
        work.build().unwrap();

        assert!(!work.validate().unwrap());
        assert_eq!(work.diagnostics(), ["rejected".to_string()]);
        assert!(!work.state().is_set(BuildStep::Validated));
    }
}
