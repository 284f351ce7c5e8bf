//! epub-press
//!
//! A Rust library that turns a Word manuscript into an EPUB 3 ebook.
//!
//! The library takes validated bibliographic metadata, a `.docx` manuscript,
//! a cover image and optional rights and dedication text, and produces one
//! packaged archive whose manifest, spine and navigation agree with each
//! other. The archive is then checked for structural validity.
//!
//! ## Features
//!
//! - Declarative metadata validation that reports every invalid field at once.
//! - Assets given as file paths, raw bytes or base64 text.
//! - Chapters split on headings, with images relocated into the package.
//! - Generated titlepage, imprint, dedication and colophon.
//! - Incremental builds that survive a restart of the process.
//! - Copyright and Creative Commons rights templates.
//! - Review of built archives: metadata readback, cover thumbnails and image replacement.
//!
//! ## Quick Start
//!
//! ```rust, no_run
//! # use epub_press::{error::PressError, importer::AssetSource, metadata::Contributor, work::Work};
//! # fn main() -> Result<(), PressError> {
//! let mut work = Work::open("path/to/workdir")?;
//!
//! work.set_metadata(&serde_json::json!({
//!     "identifier": "isbn:9780000000000",
//!     "title": "The Book",
//!     "language": "en",
//!     "rights": "All rights reserved.",
//!     "creator": "A. Writer",
//! }))?;
//! work.set_document(AssetSource::from("manuscript.docx"))?;
//! work.set_cover(
//!     AssetSource::from("cover.jpg"),
//!     Some(Contributor::new("artist", "B. Painter")?),
//! )?;
//! work.set_dedication(vec!["For C."])?;
//!
//! let archive = work.build()?;
//! println!("Wrote {}", archive.display());
//! println!("Valid: {}", work.validate()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! Both collaborators that run external programs are behind feature flags.
//! The in-process defaults need neither.
//!
//! - `pandoc`: Enable `convert::PandocConverter`, which converts manuscripts with `pandoc`.
//! - `epubcheck`: Enable `check::EpubCheck`, which validates archives with `epubcheck`.

pub(crate) mod utils;

pub mod builder;
pub mod check;
pub mod config;
pub mod convert;
pub mod epub;
pub mod error;
pub mod importer;
pub mod matter;
pub mod metadata;
pub mod review;
pub mod rights;
pub mod transform;
pub mod types;
pub mod work;

#[cfg(test)]
mod testing;

pub use utils::DecodeBytes;
pub use work::{BuildState, BuildStep, Work};
