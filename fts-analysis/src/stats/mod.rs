//! Statistics over the included rows
//!
//! Every analysis returns a serializable result carrying an `error` field
//! instead of failing, so a sparse dataset still renders.

pub mod anova;
pub mod choice;
pub mod descriptive;
pub mod paired;
pub mod reliability;
pub mod summaries;

use chrono::{DateTime, Utc};
use fts_common::config::AnalysisConfig;
use fts_common::{Question, ResponseRecord, Version};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::exclusion::{complete_participants_only, AnnotatedTable};
use anova::RepeatedMeasuresAnova;
use choice::ChoicePreference;
use descriptive::DescriptiveStats;
use paired::PairedComparison;
use reliability::{IntraclassCorrelation, SplitHalfReliability};
use summaries::{BoxplotData, Histogram, ImageReport, ParticipantSummary};

/// Minimum participants for the trust paired test and the ANOVA
pub const MIN_N_TRUST: usize = 2;
/// Emotion ratings are sparser; the paired test needs one more participant
pub const MIN_N_EMOTION: usize = 3;

/// Sort key ordering `face_2` before `face_10`
pub fn face_order(face_id: &str) -> (usize, String, String) {
    let digits: String = face_id
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let digits = digits.trim_start_matches('0').to_string();
    (digits.len(), digits, face_id.to_string())
}

/// Sorted distinct participant ids
pub fn unique_participants(records: &[&ResponseRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.participant_id.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Everything the dashboard shows, in one serializable value
#[derive(Debug, Clone, Serialize)]
pub struct StatisticalReport {
    pub generated_at: DateTime<Utc>,
    pub included_participants: Vec<String>,
    pub included_rows: usize,
    pub descriptives: BTreeMap<Question, BTreeMap<Version, DescriptiveStats>>,
    pub paired_trust: PairedComparison,
    pub paired_emotion: PairedComparison,
    pub anova_trust: RepeatedMeasuresAnova,
    pub anova_emotion: RepeatedMeasuresAnova,
    pub choice_preference: ChoicePreference,
    pub split_half: SplitHalfReliability,
    pub icc: IntraclassCorrelation,
    pub images: ImageReport,
    pub participants: Vec<ParticipantSummary>,
    pub histograms: Vec<Histogram>,
    pub boxplots: Vec<BoxplotData>,
}

pub struct StatisticsEngine {
    split_half_seed: u64,
}

impl StatisticsEngine {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            split_half_seed: config.split_half_seed,
        }
    }

    fn included<'a>(&self, table: &'a AnnotatedTable) -> Vec<&'a ResponseRecord> {
        table.included().collect()
    }

    pub fn descriptives(
        &self,
        table: &AnnotatedTable,
    ) -> BTreeMap<Question, BTreeMap<Version, DescriptiveStats>> {
        descriptive::by_condition(&self.included(table))
    }

    pub fn paired(&self, table: &AnnotatedTable, question: Question) -> PairedComparison {
        let min_n = if question == Question::EmotionRating {
            MIN_N_EMOTION
        } else {
            MIN_N_TRUST
        };
        paired::half_vs_full(&self.included(table), question, min_n)
    }

    pub fn anova(&self, table: &AnnotatedTable, question: Question) -> RepeatedMeasuresAnova {
        anova::repeated_measures(&self.included(table), question, MIN_N_TRUST)
    }

    pub fn choice_preference(&self, table: &AnnotatedTable) -> ChoicePreference {
        choice::preference(&self.included(table))
    }

    pub fn split_half(&self, table: &AnnotatedTable) -> SplitHalfReliability {
        reliability::split_half(&self.included(table), self.split_half_seed)
    }

    pub fn icc(&self, table: &AnnotatedTable) -> IntraclassCorrelation {
        reliability::icc(&self.included(table))
    }

    /// Per-face trust summary; all rows are used when nobody is included
    pub fn images(&self, table: &AnnotatedTable) -> ImageReport {
        let included = self.included(table);
        if included.is_empty() && !table.records.is_empty() {
            warn!("No participant passed the exclusion rules; image summary uses all rows");
            let all: Vec<&ResponseRecord> = table.records.iter().map(|r| &r.record).collect();
            return ImageReport {
                unfiltered_fallback: true,
                images: summaries::image_summaries(&all),
            };
        }
        ImageReport {
            unfiltered_fallback: false,
            images: summaries::image_summaries(&included),
        }
    }

    pub fn participants(&self, table: &AnnotatedTable) -> Vec<ParticipantSummary> {
        summaries::participant_summaries(&complete_participants_only(table))
    }

    pub fn histograms(&self, table: &AnnotatedTable) -> Vec<Histogram> {
        let included = self.included(table);
        [Question::TrustRating, Question::EmotionRating]
            .iter()
            .map(|q| summaries::histogram(&included, *q))
            .collect()
    }

    pub fn boxplots(&self, table: &AnnotatedTable) -> Vec<BoxplotData> {
        let included = self.included(table);
        [Question::TrustRating, Question::EmotionRating]
            .iter()
            .map(|q| summaries::boxplot(&included, *q))
            .collect()
    }

    pub fn report(&self, table: &AnnotatedTable) -> StatisticalReport {
        let included = self.included(table);
        let report = StatisticalReport {
            generated_at: fts_common::time::now(),
            included_participants: unique_participants(&included),
            included_rows: included.len(),
            descriptives: self.descriptives(table),
            paired_trust: self.paired(table, Question::TrustRating),
            paired_emotion: self.paired(table, Question::EmotionRating),
            anova_trust: self.anova(table, Question::TrustRating),
            anova_emotion: self.anova(table, Question::EmotionRating),
            choice_preference: self.choice_preference(table),
            split_half: self.split_half(table),
            icc: self.icc(table),
            images: self.images(table),
            participants: self.participants(table),
            histograms: self.histograms(table),
            boxplots: self.boxplots(table),
        };
        info!(
            "Statistics computed over {} rows from {} participants",
            report.included_rows,
            report.included_participants.len()
        );
        report
    }
}
