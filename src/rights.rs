//! Rights statements
//!
//! Boilerplate for the long rights shown on the imprint. A template is filled
//! from the metadata of the work: the creators, the publication year and,
//! when given, a credit for the cover.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{FieldError, PressError},
    metadata::{Paragraphs, WorkMetadata},
};

/// Available rights templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RightsTemplate {
    /// All rights reserved
    Copyright,

    /// Attribution-NonCommercial-ShareAlike 4.0 International
    CcByNcSa,
}

impl RightsTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            RightsTemplate::Copyright => "copyright",
            RightsTemplate::CcByNcSa => "cc-by-nc-sa",
        }
    }

    /// One-line `dc:rights` value matching the template
    pub fn summary(&self) -> &'static str {
        match self {
            RightsTemplate::Copyright => "All rights reserved.",
            RightsTemplate::CcByNcSa => {
                "Attribution-NonCommercial-ShareAlike 4.0 International (CC BY-NC-SA 4.0)"
            }
        }
    }
}

impl FromStr for RightsTemplate {
    type Err = PressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "copyright" => Ok(RightsTemplate::Copyright),
            "cc-by-nc-sa" | "commons" => Ok(RightsTemplate::CcByNcSa),
            _ => Err(PressError::ValidationError {
                errors: vec![FieldError::new(
                    "long_rights",
                    format!("unknown rights template \"{}\"", s),
                )],
            }),
        }
    }
}

impl Display for RightsTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fills a rights template for a work
///
/// `cover_rights` is a credit or licence line for the cover artwork and is
/// placed after the copyright line.
pub fn rights_statement(
    template: RightsTemplate,
    metadata: &WorkMetadata,
    cover_rights: Option<&str>,
) -> Paragraphs {
    let year = metadata.year();
    let plural = metadata.creator.len() > 1;
    let holders = match metadata.creators_display() {
        names if names.is_empty() => "the Author".to_string(),
        names => names,
    };
    let (author, these, support) = if plural {
        ("Authors", "These authors", "support")
    } else {
        ("Author", "This author", "supports")
    };

    let mut lines = vec![format!("First published in {}.", year)];

    match template {
        RightsTemplate::Copyright => {
            lines.push(format!("Copyright {}, {}.", holders, year));
            lines.extend(cover_rights.map(str::to_string));
            lines.push(format!(
                "The right of {holders} to be identified as the {author} of the Work has been \
                 asserted by them in accordance with the Copyright, Designs and Patents Act 1988. \
                 {these} {support} copyright. Copyright gives creators space to explore and \
                 provides for their long-term ability to sustain themselves from their work. \
                 Thank you for buying this work and for complying with copyright laws by not \
                 reproducing, scanning, or distributing any part of it without permission. Your \
                 support will contribute to future works by {these_lower}.",
                these_lower = these.to_lowercase(),
            ));
        }
        RightsTemplate::CcByNcSa => {
            lines.push(format!(
                "Copyright {}, {}. Licenced under {}.",
                holders,
                year,
                template.summary()
            ));
            lines.extend(cover_rights.map(str::to_string));
            lines.push(format!(
                "You are free to copy and redistribute the Work in any medium or format, and \
                 remix, transform, and build upon the Work. The {author} cannot revoke these \
                 freedoms as long as you follow the license terms."
            ));
            lines.push(format!(
                "In return: You may not use the material for commercial purposes. You must give \
                 appropriate credit, provide a link to this license, and indicate if changes were \
                 made. You may do so in any reasonable manner, but not in any way that suggests \
                 the {author} endorses you or your use. If you remix, transform, or build upon \
                 the material, you must distribute your contributions under the same license as \
                 the original. You may not apply legal terms or technological measures that \
                 legally restrict others from doing anything the license permits."
            ));
        }
    }

    lines.push(
        "This is a work of fiction and, except in the case of historical fact, any resemblance \
         to actual persons, living or dead, is purely coincidental."
            .to_string(),
    );
    lines.push(
        "Every effort has been made to obtain the necessary permissions with reference to \
         copyright material, both illustrative and quoted. We apologise for any omissions in \
         this respect and will be pleased to make appropriate acknowledgements in any future \
         edition."
            .to_string(),
    );

    Paragraphs::new(lines)
}
