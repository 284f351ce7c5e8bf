//! Metadata Model
//!
//! Typed, validated bibliographic and rights information for one work.
//!
//! Raw metadata arrives as a JSON-like mapping. It is checked once against the
//! declarative [SCHEMA]; the result is either a fully populated [WorkMetadata]
//! or a [PressError::ValidationError] listing every problem found.
//!
//! ## Usage
//!
//! ```rust
//! # fn main() -> Result<(), epub_press::error::PressError> {
//! use epub_press::metadata;
//! use serde_json::json;
//!
//! let metadata = metadata::validate(&json!({
//!     "title": "Usan Abasi's Lament",
//!     "language": "en",
//!     "rights": "All rights reserved.",
//!     "creator": ["Gavin Chait"],
//!     "long-rights": "This work may not be reproduced.",
//! }))?;
//!
//! assert!(metadata.identifier.starts_with("urn:uuid:"));
//! assert_eq!(metadata.slug(), "usan-abasis-lament");
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::{Datelike, Local, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::error::{FieldError, PressError};

/// Value shape expected by a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single non-empty string
    Text,
    /// Exactly two ASCII letters
    LanguageCode,
    /// An absolute http(s) URL
    Uri,
    /// An ISO calendar date, `YYYY-MM-DD`
    Date,
    /// A string or a sequence of strings, kept as a list
    TextList,
    /// A string or a sequence of strings, kept as a list without duplicates
    TagSet,
    /// A string or a sequence of strings, normalized into paragraphs
    Paragraphs,
    /// A sequence of names or contributor records
    Contributors,
    /// A non-negative integer
    Count,
}

/// How a field is filled when it is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRule {
    /// Left empty
    Absent,
    /// A random `urn:uuid:` identifier
    GeneratedUuid,
    /// The local date at validation time
    Today,
}

/// One entry of the metadata schema
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,

    /// Alternative keys accepted in the raw mapping
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub required: bool,
    pub default: DefaultRule,
}

const fn field(
    name: &'static str,
    aliases: &'static [&'static str],
    kind: FieldKind,
    required: bool,
    default: DefaultRule,
) -> FieldSpec {
    FieldSpec {
        name,
        aliases,
        kind,
        required,
        default,
    }
}

/// The declarative metadata schema
pub static SCHEMA: &[FieldSpec] = &[
    field("identifier", &[], FieldKind::Text, false, DefaultRule::GeneratedUuid),
    field("title", &[], FieldKind::Text, true, DefaultRule::Absent),
    field("language", &[], FieldKind::LanguageCode, true, DefaultRule::Absent),
    field("rights", &[], FieldKind::Text, true, DefaultRule::Absent),
    field("creator", &[], FieldKind::TextList, false, DefaultRule::Absent),
    field("contributor", &[], FieldKind::Contributors, false, DefaultRule::Absent),
    field("date", &["isodate"], FieldKind::Date, false, DefaultRule::Today),
    field("subject", &[], FieldKind::TagSet, false, DefaultRule::Absent),
    field("publisher", &[], FieldKind::Text, false, DefaultRule::Absent),
    field("publisher_uri", &["publisher-uri"], FieldKind::Uri, false, DefaultRule::Absent),
    field("work_uri", &["work-uri"], FieldKind::Uri, false, DefaultRule::Absent),
    field("description", &[], FieldKind::Text, false, DefaultRule::Absent),
    field("long_description", &["long-description"], FieldKind::Text, false, DefaultRule::Absent),
    field("long_rights", &["long-rights"], FieldKind::Paragraphs, false, DefaultRule::Absent),
    field("word_count", &["word-count"], FieldKind::Count, false, DefaultRule::Absent),
];

/// Returns the schema used by [validate]
pub fn schema() -> &'static [FieldSpec] {
    SCHEMA
}

/// Contributor roles understood by the colophon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributorRole {
    Artist,
    Editor,
    Translator,
}

impl ContributorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributorRole::Artist => "artist",
            ContributorRole::Editor => "editor",
            ContributorRole::Translator => "translator",
        }
    }

    /// MARC relator code used in the package document
    pub fn relator_code(&self) -> &'static str {
        match self {
            ContributorRole::Artist => "art",
            ContributorRole::Editor => "edt",
            ContributorRole::Translator => "trl",
        }
    }

    /// Inverse of [ContributorRole::relator_code]
    pub fn from_relator_code(code: &str) -> Option<Self> {
        match code.trim() {
            "art" => Some(ContributorRole::Artist),
            "edt" => Some(ContributorRole::Editor),
            "trl" => Some(ContributorRole::Translator),
            _ => None,
        }
    }

    /// The noun describing this kind of contribution in the colophon
    pub fn credit(&self) -> &'static str {
        match self {
            ContributorRole::Artist => "Artwork",
            ContributorRole::Editor => "Editing",
            ContributorRole::Translator => "Translation",
        }
    }
}

impl FromStr for ContributorRole {
    type Err = PressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "artist" => Ok(ContributorRole::Artist),
            "editor" => Ok(ContributorRole::Editor),
            "translator" => Ok(ContributorRole::Translator),
            _ => Err(PressError::UnknownContributorRole {
                role: s.to_string(),
            }),
        }
    }
}

impl Display for ContributorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A credited contribution to the work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub role: ContributorRole,
    pub name: String,

    /// Free-text rights statement for the contribution
    #[serde(default)]
    pub terms: Option<String>,

    /// Defaults to the year of the work when absent
    #[serde(default)]
    pub year: Option<i32>,
}

impl Contributor {
    /// Create a contributor from a raw role name
    ///
    /// # Return
    /// - `Err(PressError::UnknownContributorRole)`: The role is not artist, editor or translator
    pub fn new(role: &str, name: &str) -> Result<Self, PressError> {
        Ok(Self {
            role: role.parse()?,
            name: name.trim().to_string(),
            terms: None,
            year: None,
        })
    }

    pub fn with_terms(mut self, terms: &str) -> Self {
        let terms = terms.trim();
        self.terms = (!terms.is_empty()).then(|| terms.to_string());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Build a contributor from a raw record
    ///
    /// Problems are reported against `field`, e.g. `contributor[0].role`.
    pub fn from_value(value: &Value, field: &str) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let Some(record) = value.as_object() else {
            return Err(vec![FieldError::new(field, "expected a name or a contributor record")]);
        };

        let role = match record.get("role").and_then(Value::as_str) {
            Some(role) => match role.parse::<ContributorRole>() {
                Ok(role) => Some(role),
                Err(err) => {
                    errors.push(FieldError::new(format!("{}.role", field), err.to_string()));
                    None
                }
            },
            None => {
                errors.push(FieldError::new(format!("{}.role", field), "field is required"));
                None
            }
        };

        let name = match record.get("name").and_then(Value::as_str).map(str::trim) {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => {
                errors.push(FieldError::new(format!("{}.name", field), "field is required"));
                None
            }
        };

        let terms = match record.get("terms") {
            None | Some(Value::Null) => None,
            Some(Value::String(terms)) => Some(terms.trim().to_string()).filter(|t| !t.is_empty()),
            Some(_) => {
                errors.push(FieldError::new(format!("{}.terms", field), "expected a string"));
                None
            }
        };

        let year = match record.get("year") {
            None | Some(Value::Null) => None,
            Some(Value::Number(year)) => year.as_i64().and_then(|year| i32::try_from(year).ok()),
            Some(Value::String(year)) => year.trim().parse::<i32>().ok(),
            Some(_) => None,
        };
        if year.is_none() && record.get("year").is_some_and(|year| !year.is_null()) {
            errors.push(FieldError::new(format!("{}.year", field), "expected a year"));
        }

        match (role, name) {
            (Some(role), Some(name)) if errors.is_empty() => Ok(Contributor {
                role,
                name,
                terms,
                year,
            }),
            _ => Err(errors),
        }
    }
}

/// An ordered block of text paragraphs
///
/// Built from either a single string or a sequence of strings. Input is split
/// on line breaks, each line is trimmed and empty lines are dropped, so a
/// string and a one-element sequence holding the same text are identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TextInput", into = "Vec<String>")]
pub struct Paragraphs(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum TextInput {
    One(String),
    Many(Vec<String>),
}

impl From<TextInput> for Paragraphs {
    fn from(value: TextInput) -> Self {
        match value {
            TextInput::One(text) => Paragraphs::from(text.as_str()),
            TextInput::Many(lines) => Paragraphs::from(lines),
        }
    }
}

impl From<Paragraphs> for Vec<String> {
    fn from(value: Paragraphs) -> Self {
        value.0
    }
}

impl Paragraphs {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = lines
            .into_iter()
            .map(|line| line.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        Self(
            joined
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for Paragraphs {
    fn from(value: &str) -> Self {
        Paragraphs::new([value])
    }
}

impl From<String> for Paragraphs {
    fn from(value: String) -> Self {
        Paragraphs::new([value])
    }
}

impl From<Vec<String>> for Paragraphs {
    fn from(value: Vec<String>) -> Self {
        Paragraphs::new(value)
    }
}

impl From<Vec<&str>> for Paragraphs {
    fn from(value: Vec<&str>) -> Self {
        Paragraphs::new(value)
    }
}

impl From<&[&str]> for Paragraphs {
    fn from(value: &[&str]) -> Self {
        Paragraphs::new(value)
    }
}

/// Validated bibliographic and rights information for one work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub identifier: String,
    pub title: String,
    pub language: String,
    pub rights: String,
    #[serde(default)]
    pub creator: Vec<String>,

    /// Contributors credited by name only
    #[serde(default)]
    pub contributor: Vec<String>,

    /// Contributors with a role, in the order they were added
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    pub date: NaiveDate,
    #[serde(default)]
    pub subject: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub publisher_uri: Option<String>,
    #[serde(default)]
    pub work_uri: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub long_rights: Paragraphs,
    #[serde(default)]
    pub word_count: Option<u64>,
}

impl WorkMetadata {
    /// Deterministic, file-system friendly name of the work
    ///
    /// The title is lower-cased, every word keeps only its alphanumeric
    /// characters, and the words are joined with `-`.
    pub fn slug(&self) -> String {
        self.title
            .split_whitespace()
            .map(|word| {
                word.chars()
                    .filter(|c| c.is_alphanumeric())
                    .flat_map(char::to_lowercase)
                    .collect::<String>()
            })
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Creators joined for display, e.g. "A, B & C"
    pub fn creators_display(&self) -> String {
        match self.creator.as_slice() {
            [] => String::new(),
            [single] => single.clone(),
            [init @ .., last] => format!("{} & {}", init.join(", "), last),
        }
    }
}

enum FieldValue {
    Text(String),
    List(Vec<String>),
    Paragraphs(Paragraphs),
    Date(NaiveDate),
    Count(u64),
    Contributors(Vec<String>, Vec<Contributor>),
}

/// Validates a raw metadata mapping against [SCHEMA]
///
/// # Parameters
/// - `raw`: A JSON object; hyphenated keys and `isodate` are accepted as aliases
///
/// # Return
/// - `Ok(WorkMetadata)`: Every field is valid; missing optional fields get their defaults
/// - `Err(PressError::ValidationError)`: Lists every violated field
pub fn validate(raw: &Value) -> Result<WorkMetadata, PressError> {
    let Some(mapping) = raw.as_object() else {
        return Err(PressError::ValidationError {
            errors: vec![FieldError::new("metadata", "expected a mapping of fields")],
        });
    };

    for key in mapping.keys() {
        let known = SCHEMA
            .iter()
            .any(|spec| spec.name == key || spec.aliases.contains(&key.as_str()));
        if !known {
            debug!("Ignoring unknown metadata field '{}'", key);
        }
    }

    let mut errors = Vec::new();
    let mut values = HashMap::new();

    for spec in SCHEMA {
        match lookup(mapping, spec) {
            Some(value) => match evaluate(spec, value) {
                Ok(Some(value)) => {
                    values.insert(spec.name, value);
                }
                Ok(None) if spec.required => {
                    errors.push(FieldError::new(spec.name, "field must not be empty"))
                }
                Ok(None) => {}
                Err(mut field_errors) => errors.append(&mut field_errors),
            },
            None if spec.required => errors.push(FieldError::new(spec.name, "field is required")),
            None => {}
        }

        if !values.contains_key(spec.name) {
            match spec.default {
                DefaultRule::GeneratedUuid => {
                    values.insert(
                        spec.name,
                        FieldValue::Text(format!("urn:uuid:{}", Uuid::new_v4())),
                    );
                }
                DefaultRule::Today => {
                    values.insert(spec.name, FieldValue::Date(Local::now().date_naive()));
                }
                DefaultRule::Absent => {}
            }
        }
    }

    if !errors.is_empty() {
        return Err(PressError::ValidationError { errors });
    }

    let (contributor, contributors) = match values.remove("contributor") {
        Some(FieldValue::Contributors(names, records)) => (names, records),
        _ => (vec![], vec![]),
    };

    Ok(WorkMetadata {
        identifier: take_text(&mut values, "identifier").unwrap_or_default(),
        title: take_text(&mut values, "title").unwrap_or_default(),
        language: take_text(&mut values, "language").unwrap_or_default(),
        rights: take_text(&mut values, "rights").unwrap_or_default(),
        creator: take_list(&mut values, "creator"),
        contributor,
        contributors,
        date: match values.remove("date") {
            Some(FieldValue::Date(date)) => date,
            _ => Local::now().date_naive(),
        },
        subject: take_list(&mut values, "subject"),
        publisher: take_text(&mut values, "publisher"),
        publisher_uri: take_text(&mut values, "publisher_uri"),
        work_uri: take_text(&mut values, "work_uri"),
        description: take_text(&mut values, "description"),
        long_description: take_text(&mut values, "long_description"),
        long_rights: match values.remove("long_rights") {
            Some(FieldValue::Paragraphs(paragraphs)) => paragraphs,
            _ => Paragraphs::default(),
        },
        word_count: match values.remove("word_count") {
            Some(FieldValue::Count(count)) => Some(count),
            _ => None,
        },
    })
}

/// Finds the value of a field under its name or one of its aliases
///
/// `null` counts as absent.
fn lookup<'a>(mapping: &'a Map<String, Value>, spec: &FieldSpec) -> Option<&'a Value> {
    std::iter::once(spec.name)
        .chain(spec.aliases.iter().copied())
        .filter_map(|key| mapping.get(key))
        .find(|value| !value.is_null())
}

/// Evaluates one present value
///
/// `Ok(None)` means the value is present but empty.
fn evaluate(spec: &FieldSpec, value: &Value) -> Result<Option<FieldValue>, Vec<FieldError>> {
    let name = spec.name;
    let invalid = |problem: &str| vec![FieldError::new(name, problem)];

    match spec.kind {
        FieldKind::Text => match value {
            Value::String(text) => Ok(non_empty(text).map(FieldValue::Text)),
            _ => Err(invalid("expected a string")),
        },

        FieldKind::LanguageCode => match value {
            Value::String(code) => {
                let code = code.trim();
                if code.is_empty() {
                    Ok(None)
                } else if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
                    Ok(Some(FieldValue::Text(code.to_ascii_lowercase())))
                } else {
                    Err(invalid("expected a two-letter language code"))
                }
            }
            _ => Err(invalid("expected a two-letter language code")),
        },

        FieldKind::Uri => match value {
            Value::String(uri) => match non_empty(uri) {
                None => Ok(None),
                Some(uri) => match Url::parse(&uri) {
                    Ok(url) if matches!(url.scheme(), "http" | "https") => {
                        Ok(Some(FieldValue::Text(uri)))
                    }
                    _ => Err(invalid("expected an absolute http(s) URL")),
                },
            },
            _ => Err(invalid("expected an absolute http(s) URL")),
        },

        FieldKind::Date => match value {
            Value::String(date) => {
                let date = date.trim();
                if date.is_empty() {
                    return Ok(None);
                }
                // full timestamps are accepted, only the calendar date is kept
                let calendar = date.get(..10).unwrap_or(date);
                NaiveDate::parse_from_str(calendar, "%Y-%m-%d")
                    .map(|date| Some(FieldValue::Date(date)))
                    .map_err(|_| invalid("expected an ISO date (YYYY-MM-DD)"))
            }
            _ => Err(invalid("expected an ISO date (YYYY-MM-DD)")),
        },

        FieldKind::TextList | FieldKind::TagSet => {
            let mut items = string_list(value).ok_or_else(|| invalid("expected a string or a list of strings"))?;
            if spec.kind == FieldKind::TagSet {
                let mut seen = Vec::<String>::new();
                items.retain(|item| {
                    if seen.contains(item) {
                        false
                    } else {
                        seen.push(item.clone());
                        true
                    }
                });
            }
            Ok((!items.is_empty()).then_some(FieldValue::List(items)))
        }

        FieldKind::Paragraphs => match value {
            Value::String(text) => Ok(Some(FieldValue::Paragraphs(Paragraphs::from(text.as_str())))),
            Value::Array(_) => {
                let lines = string_list(value).ok_or_else(|| invalid("expected a string or a list of strings"))?;
                Ok(Some(FieldValue::Paragraphs(Paragraphs::new(lines))))
            }
            _ => Err(invalid("expected a string or a list of strings")),
        },

        FieldKind::Contributors => {
            let entries = match value {
                Value::Array(entries) => entries.as_slice(),
                Value::String(_) | Value::Object(_) => std::slice::from_ref(value),
                _ => return Err(invalid("expected a list of names or contributor records")),
            };

            let mut names = Vec::new();
            let mut records = Vec::new();
            let mut errors = Vec::new();
            for (index, entry) in entries.iter().enumerate() {
                let field = format!("{}[{}]", name, index);
                match entry {
                    Value::String(text) => {
                        if let Some(text) = non_empty(text) {
                            names.push(text);
                        }
                    }
                    _ => match Contributor::from_value(entry, &field) {
                        Ok(contributor) => records.push(contributor),
                        Err(mut entry_errors) => errors.append(&mut entry_errors),
                    },
                }
            }

            if !errors.is_empty() {
                return Err(errors);
            }
            Ok(Some(FieldValue::Contributors(names, records)))
        }

        FieldKind::Count => value
            .as_u64()
            .map(|count| Some(FieldValue::Count(count)))
            .ok_or_else(|| invalid("expected a non-negative integer")),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(text) => Some(non_empty(text).into_iter().collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(non_empty))
            .collect::<Option<Vec<_>>>()
            .map(|items| items.into_iter().flatten().collect()),
        _ => None,
    }
}

fn take_text(values: &mut HashMap<&'static str, FieldValue>, name: &str) -> Option<String> {
    match values.remove(name) {
        Some(FieldValue::Text(text)) => Some(text),
        _ => None,
    }
}

fn take_list(values: &mut HashMap<&'static str, FieldValue>, name: &str) -> Vec<String> {
    match values.remove(name) {
        Some(FieldValue::List(items)) => items,
        _ => vec![],
    }
}
