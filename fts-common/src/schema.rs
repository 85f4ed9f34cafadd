//! Historical vocabulary of the response files
//!
//! The study app renamed columns and value spellings several times. Every
//! alias is listed once here, in a table built on first use and checked
//! against the closed `Question`/`Version` vocabulary.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::model::{Question, Version};
use crate::{Error, Result};

/// Canonical column of the long schema, or a wide rating column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Pid,
    SecondaryId,
    FaceId,
    Version,
    Question,
    Response,
    Timestamp,
    ReactionTime,
    /// Legacy wide layout: one column per question, the cell holds the response
    Wide(QuestionAlias),
}

/// A question spelling, with the side hint carried by `_left/_right/_full` suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuestionAlias {
    pub question: Question,
    pub side: Option<Version>,
}

/// Result of resolving a raw version cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionAlias {
    Condition(Version),
    /// Post-study survey row, not a trial
    Survey,
}

/// Placeholder participant ids written by older app builds
const PLACEHOLDERS: &[&str] = &["", "unknown", "unknown_pid", "nan", "none", "null"];

/// Canonical long-format header, in persisted order
pub const LONG_HEADER: [&str; 6] = ["pid", "face_id", "version", "question", "response", "timestamp"];

const COLUMN_ALIASES: &[(&str, Column)] = &[
    ("pid", Column::Pid),
    ("participant_id", Column::Pid),
    ("participantid", Column::Pid),
    ("prolific_pid", Column::SecondaryId),
    ("prolific_id", Column::SecondaryId),
    ("face_id", Column::FaceId),
    ("image_id", Column::FaceId),
    ("facenumber", Column::FaceId),
    ("face_number", Column::FaceId),
    ("faceid", Column::FaceId),
    ("face", Column::FaceId),
    ("version", Column::Version),
    ("faceversion", Column::Version),
    ("face_version", Column::Version),
    ("face_view", Column::Version),
    ("question", Column::Question),
    ("question_type", Column::Question),
    ("response", Column::Response),
    ("timestamp", Column::Timestamp),
    ("reaction_time", Column::ReactionTime),
    ("reaction_time_ms", Column::ReactionTime),
    ("rt", Column::ReactionTime),
];

const VERSION_ALIASES: &[(&str, VersionAlias)] = &[
    ("left", VersionAlias::Condition(Version::Left)),
    ("left_half", VersionAlias::Condition(Version::Left)),
    ("right", VersionAlias::Condition(Version::Right)),
    ("right_half", VersionAlias::Condition(Version::Right)),
    ("both", VersionAlias::Condition(Version::Both)),
    ("full", VersionAlias::Condition(Version::Both)),
    ("full_face", VersionAlias::Condition(Version::Both)),
    ("half", VersionAlias::Condition(Version::Both)),
    ("toggle", VersionAlias::Condition(Version::Both)),
    ("survey", VersionAlias::Survey),
];

const fn q(question: Question, side: Option<Version>) -> QuestionAlias {
    QuestionAlias { question, side }
}

const QUESTION_ALIASES: &[(&str, QuestionAlias)] = &[
    ("trust", q(Question::TrustRating, None)),
    ("trust_rating", q(Question::TrustRating, None)),
    ("trust_left", q(Question::TrustRating, Some(Version::Left))),
    ("trust_right", q(Question::TrustRating, Some(Version::Right))),
    ("trust_full", q(Question::TrustRating, Some(Version::Both))),
    ("emotion", q(Question::EmotionRating, None)),
    ("emotion_rating", q(Question::EmotionRating, None)),
    ("emotion_left", q(Question::EmotionRating, Some(Version::Left))),
    ("emotion_right", q(Question::EmotionRating, Some(Version::Right))),
    ("emotion_full", q(Question::EmotionRating, Some(Version::Both))),
    ("masc", q(Question::MascChoice, None)),
    ("masc_choice", q(Question::MascChoice, None)),
    ("masculinity_choice", q(Question::MascChoice, None)),
    ("fem", q(Question::FemChoice, None)),
    ("fem_choice", q(Question::FemChoice, None)),
    ("femininity_choice", q(Question::FemChoice, None)),
    ("masculinity", q(Question::MasculinityFull, None)),
    ("masculinity_rating", q(Question::MasculinityFull, None)),
    ("masculinity_full", q(Question::MasculinityFull, None)),
    ("femininity", q(Question::FemininityFull, None)),
    ("femininity_rating", q(Question::FemininityFull, None)),
    ("femininity_full", q(Question::FemininityFull, None)),
];

static FACE_SPELLING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:face\s*id\s*\(\s*(\d+)\s*\)|face\s*\(\s*(\d+)\s*\)|face[\s_-]*(\d+)|(\d+))$",
    )
    .unwrap_or_else(|e| panic!("face id pattern: {}", e))
});

static DIGIT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").unwrap_or_else(|e| panic!("digit pattern: {}", e)));

/// Process-wide alias table
pub static ALIASES: Lazy<AliasTable> = Lazy::new(AliasTable::builtin);

/// Lookup maps keyed by normalized spelling
#[derive(Debug)]
pub struct AliasTable {
    columns: HashMap<&'static str, Column>,
    versions: HashMap<&'static str, VersionAlias>,
    questions: HashMap<&'static str, QuestionAlias>,
}

impl AliasTable {
    /// Build the table from the built-in alias lists
    pub fn builtin() -> Self {
        let table = Self {
            columns: COLUMN_ALIASES.iter().copied().collect(),
            versions: VERSION_ALIASES.iter().copied().collect(),
            questions: QUESTION_ALIASES.iter().copied().collect(),
        };
        debug_assert!(table.validate().is_ok(), "alias table: {:?}", table.validate());
        table
    }

    /// Check the table against the closed vocabulary.
    ///
    /// Every canonical spelling must resolve to itself and no spelling may be
    /// both a long-format column and a wide question column.
    pub fn validate(&self) -> Result<()> {
        for question in Question::ALL {
            match self.questions.get(question.as_str()) {
                Some(alias) if alias.question == question && alias.side.is_none() => {}
                other => {
                    return Err(Error::Config(format!(
                        "question '{}' resolves to {:?}",
                        question, other
                    )))
                }
            }
        }

        for version in Version::ALL {
            if self.versions.get(version.as_str()) != Some(&VersionAlias::Condition(version)) {
                return Err(Error::Config(format!(
                    "version '{}' does not resolve to itself",
                    version
                )));
            }
        }

        let canonical = [
            Column::Pid,
            Column::FaceId,
            Column::Version,
            Column::Question,
            Column::Response,
            Column::Timestamp,
        ];
        for (name, column) in LONG_HEADER.iter().zip(canonical) {
            if self.columns.get(name) != Some(&column) {
                return Err(Error::Config(format!("column '{}' is not canonical", name)));
            }
        }

        if let Some(clash) = self.columns.keys().find(|k| self.questions.contains_key(*k)) {
            return Err(Error::Config(format!(
                "'{}' is both a column and a question alias",
                clash
            )));
        }

        Ok(())
    }

    pub fn column(&self, header: &str) -> Option<Column> {
        let key = normalize_key(header);
        self.columns
            .get(key.as_str())
            .copied()
            .or_else(|| self.questions.get(key.as_str()).copied().map(Column::Wide))
    }

    pub fn question(&self, raw: &str) -> Option<QuestionAlias> {
        self.questions.get(normalize_key(raw).as_str()).copied()
    }

    pub fn version(&self, raw: &str) -> Option<VersionAlias> {
        self.versions.get(normalize_key(raw).as_str()).copied()
    }
}

/// Lowercase, trim, strip a UTF-8 BOM and fold whitespace/hyphen runs to `_`
pub fn normalize_key(raw: &str) -> String {
    let raw = raw.trim_start_matches('\u{feff}').trim().to_lowercase();
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_whitespace() || c == '-' {
            pending_sep = true;
        } else {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        }
    }
    out
}

/// Canonical column for a CSV header
pub fn canonical_column(header: &str) -> Option<Column> {
    ALIASES.column(header)
}

pub fn resolve_question(raw: &str) -> Option<QuestionAlias> {
    ALIASES.question(raw)
}

pub fn resolve_version(raw: &str) -> Option<VersionAlias> {
    ALIASES.version(raw)
}

/// Normalize a face identifier spelling to `face_N`.
///
/// Values without any digit are returned trimmed; empty input stays empty.
pub fn normalize_face_id(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let digits = FACE_SPELLING
        .captures(raw)
        .and_then(|caps| caps.iter().skip(1).flatten().next())
        .or_else(|| DIGIT_RUN.find(raw))
        .map(|m| m.as_str());

    match digits {
        Some(d) => {
            let stripped = d.trim_start_matches('0');
            format!("face_{}", if stripped.is_empty() { "0" } else { stripped })
        }
        None => raw.to_string(),
    }
}

/// Whether a participant id cell holds no real identity
pub fn is_placeholder(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
}
