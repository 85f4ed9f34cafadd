//! Canonical long-format response model
//!
//! One `ResponseRecord` is one atomic answer: a participant's response to one
//! question about one face shown in one presentation condition.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Presentation condition of a face stimulus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    /// Left half of the face only
    Left,
    /// Right half of the face only
    Right,
    /// Full face
    Both,
}

impl Version {
    /// All conditions in reporting order
    pub const ALL: [Version; 3] = [Version::Left, Version::Right, Version::Both];

    /// Canonical spelling used in the persisted CSV schema
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Left => "left",
            Version::Right => "right",
            Version::Both => "both",
        }
    }

    /// Half-face conditions (left or right)
    pub fn is_half(&self) -> bool {
        matches!(self, Version::Left | Version::Right)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed question vocabulary of the 10-question design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Question {
    TrustRating,
    EmotionRating,
    MascChoice,
    FemChoice,
    MasculinityFull,
    FemininityFull,
}

impl Question {
    pub const ALL: [Question; 6] = [
        Question::TrustRating,
        Question::EmotionRating,
        Question::MascChoice,
        Question::FemChoice,
        Question::MasculinityFull,
        Question::FemininityFull,
    ];

    /// Questions answered on a numeric rating scale
    pub const NUMERIC: [Question; 4] = [
        Question::TrustRating,
        Question::EmotionRating,
        Question::MasculinityFull,
        Question::FemininityFull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Question::TrustRating => "trust_rating",
            Question::EmotionRating => "emotion_rating",
            Question::MascChoice => "masc_choice",
            Question::FemChoice => "fem_choice",
            Question::MasculinityFull => "masculinity_full",
            Question::FemininityFull => "femininity_full",
        }
    }

    /// Rating questions carry a numeric response; choice questions a side
    pub fn is_numeric(&self) -> bool {
        !self.is_choice()
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, Question::MascChoice | Question::FemChoice)
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a side-choice question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Left,
    Right,
    Neither,
}

impl Choice {
    /// Case-insensitive parse of a raw choice response
    pub fn parse(raw: &str) -> Option<Choice> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Choice::Left),
            "right" => Some(Choice::Right),
            "neither" => Some(Choice::Neither),
            _ => None,
        }
    }
}

/// Which response files a dashboard view considers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViewMode {
    /// Non-test files only
    #[default]
    Production,
    /// Test files only
    Test,
    /// Every file
    All,
}

impl ViewMode {
    pub const ALL: [ViewMode; 3] = [ViewMode::Production, ViewMode::Test, ViewMode::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Production => "PRODUCTION",
            ViewMode::Test => "TEST",
            ViewMode::All => "ALL",
        }
    }

    /// Lenient parse for form input: unknown values select `Production`
    pub fn parse_or_default(raw: &str) -> ViewMode {
        raw.parse().unwrap_or_default()
    }

    /// Whether a file with the given test flag is visible in this mode
    pub fn admits(&self, is_test: bool) -> bool {
        match self {
            ViewMode::Production => !is_test,
            ViewMode::Test => is_test,
            ViewMode::All => true,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRODUCTION" => Ok(ViewMode::Production),
            "TEST" => Ok(ViewMode::Test),
            "ALL" => Ok(ViewMode::All),
            other => Err(Error::InvalidInput(format!("unknown view mode: {}", other))),
        }
    }
}

/// One row of the canonical long table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Stable per-session participant identifier, never empty
    pub participant_id: String,
    /// Canonical `face_N`, empty when the source row had no face identifier
    pub face_id: String,
    pub version: Version,
    pub question: Question,
    /// Trimmed raw response
    pub response: String,
    /// Numeric response for rating questions; `None` for choices and invalid ratings
    pub value: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
    /// Timestamp exactly as stored, written back verbatim on export
    pub timestamp_raw: String,
    /// External platform identity (e.g. Prolific PID)
    pub secondary_id: Option<String>,
    pub reaction_time_ms: Option<f64>,
    pub source_file: String,
    pub source_modified: Option<DateTime<Utc>>,
}

impl ResponseRecord {
    /// Side choice for choice questions
    pub fn choice(&self) -> Option<Choice> {
        if self.question.is_choice() {
            Choice::parse(&self.response)
        } else {
            None
        }
    }

    /// De-duplication key: at most one record per key survives standardization
    pub fn key(&self) -> (&str, &str, Version, Question) {
        (&self.participant_id, &self.face_id, self.version, self.question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Version::Both).unwrap(), "\"both\"");
        assert_eq!(Version::Left.to_string(), "left");
        assert!(Version::Right.is_half());
        assert!(!Version::Both.is_half());
    }

    #[test]
    fn test_question_vocabulary() {
        assert_eq!(
            serde_json::to_string(&Question::MasculinityFull).unwrap(),
            "\"masculinity_full\""
        );
        let numeric: Vec<_> = Question::ALL.iter().filter(|q| q.is_numeric()).collect();
        assert_eq!(numeric.len(), Question::NUMERIC.len());
        assert!(Question::FemChoice.is_choice());
    }

    #[test]
    fn test_choice_parse() {
        assert_eq!(Choice::parse(" Left "), Some(Choice::Left));
        assert_eq!(Choice::parse("NEITHER"), Some(Choice::Neither));
        assert_eq!(Choice::parse("both"), None);
    }

    #[test]
    fn test_view_mode_parse() {
        assert_eq!("test".parse::<ViewMode>().unwrap(), ViewMode::Test);
        assert_eq!(" All ".parse::<ViewMode>().unwrap(), ViewMode::All);
        assert!("staging".parse::<ViewMode>().is_err());
        assert_eq!(ViewMode::parse_or_default("staging"), ViewMode::Production);
        assert_eq!(ViewMode::default(), ViewMode::Production);
    }

    #[test]
    fn test_view_mode_admits() {
        assert!(ViewMode::Production.admits(false));
        assert!(!ViewMode::Production.admits(true));
        assert!(ViewMode::Test.admits(true));
        assert!(!ViewMode::Test.admits(false));
        assert!(ViewMode::All.admits(true) && ViewMode::All.admits(false));
    }

    #[test]
    fn test_view_mode_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ViewMode::Test).unwrap(), "\"TEST\"");
    }
}
