//! Per-image and per-participant summaries, histograms and box-plot data

use fts_common::{Question, ResponseRecord, Version};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::descriptive::{mean, population_std_dev, std_dev, values_for};
use super::face_order;
use crate::exclusion::is_complete_participant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummary {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub count: usize,
}

impl ConditionSummary {
    fn from_values(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: std_dev(values),
            count: values.len(),
        }
    }
}

/// Trust ratings of one face
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSummary {
    pub face_id: String,
    pub conditions: BTreeMap<Version, ConditionSummary>,
    pub half_face_avg: Option<f64>,
    /// Full-face mean, else the mean over all conditions
    pub mean_trust: Option<f64>,
    /// Sample SD of full-face ratings, else population SD over all conditions
    pub std_trust: Option<f64>,
    pub full_minus_half_diff: Option<f64>,
    pub rating_count: usize,
    pub unique_participants: usize,
}

impl ImageSummary {
    pub fn full_mean(&self) -> Option<f64> {
        self.conditions.get(&Version::Both).and_then(|c| c.mean)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    /// No participant passed the exclusion rules, so all rows were used
    pub unfiltered_fallback: bool,
    pub images: Vec<ImageSummary>,
}

impl ImageReport {
    pub fn get(&self, face_id: &str) -> Option<&ImageSummary> {
        self.images.iter().find(|i| i.face_id == face_id)
    }
}

pub fn image_summaries(records: &[&ResponseRecord]) -> Vec<ImageSummary> {
    let mut by_face: BTreeMap<&str, Vec<&ResponseRecord>> = BTreeMap::new();
    for r in records {
        if r.question == Question::TrustRating && !r.face_id.is_empty() {
            by_face.entry(r.face_id.as_str()).or_default().push(*r);
        }
    }

    let mut images: Vec<ImageSummary> = by_face
        .into_iter()
        .map(|(face_id, rows)| {
            let conditions: BTreeMap<Version, ConditionSummary> = Version::ALL
                .iter()
                .map(|v| {
                    (*v, ConditionSummary::from_values(&values_for(&rows, Question::TrustRating, *v)))
                })
                .collect();

            let half_means: Vec<f64> = [Version::Left, Version::Right]
                .iter()
                .filter_map(|v| conditions[v].mean)
                .collect();
            let half_face_avg = mean(&half_means);

            let all: Vec<f64> = rows.iter().filter_map(|r| r.value).collect();
            let full: Vec<f64> = values_for(&rows, Question::TrustRating, Version::Both);
            let (mean_trust, std_trust) = if full.is_empty() {
                (mean(&all), population_std_dev(&all))
            } else {
                (mean(&full), std_dev(&full))
            };
            let full_mean = mean(&full);

            ImageSummary {
                face_id: face_id.to_string(),
                half_face_avg,
                mean_trust,
                std_trust,
                full_minus_half_diff: full_mean.zip(half_face_avg).map(|(f, h)| f - h),
                rating_count: all.len(),
                unique_participants: rows
                    .iter()
                    .map(|r| r.participant_id.as_str())
                    .collect::<BTreeSet<_>>()
                    .len(),
                conditions,
            }
        })
        .collect();

    images.sort_by(|a, b| face_order(&a.face_id).cmp(&face_order(&b.face_id)));
    images
}

/// Trust summary of one complete participant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantSummary {
    pub participant_id: String,
    pub trust_count: usize,
    pub trust_mean: Option<f64>,
    pub trust_std: Option<f64>,
    pub versions: Vec<Version>,
    pub faces_seen: usize,
    pub total_responses: usize,
}

/// Participants with at least one complete face
pub fn participant_summaries(records: &[&ResponseRecord]) -> Vec<ParticipantSummary> {
    let mut by_participant: BTreeMap<&str, Vec<&ResponseRecord>> = BTreeMap::new();
    for r in records {
        by_participant.entry(r.participant_id.as_str()).or_default().push(*r);
    }

    by_participant
        .into_iter()
        .filter(|(_, rows)| is_complete_participant(rows))
        .map(|(pid, rows)| {
            let trust: Vec<f64> = rows
                .iter()
                .filter(|r| r.question == Question::TrustRating)
                .filter_map(|r| r.value)
                .collect();
            ParticipantSummary {
                participant_id: pid.to_string(),
                trust_count: trust.len(),
                trust_mean: mean(&trust),
                trust_std: std_dev(&trust),
                versions: rows
                    .iter()
                    .map(|r| r.version)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
                faces_seen: rows
                    .iter()
                    .filter(|r| !r.face_id.is_empty())
                    .map(|r| r.face_id.as_str())
                    .collect::<BTreeSet<_>>()
                    .len(),
                total_responses: rows.len(),
            }
        })
        .collect()
}

/// Widest contiguous label range; wider data is labelled by observed points only
pub const MAX_HISTOGRAM_SPAN: i64 = 100;

/// Rating counts per integer scale point and condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub question: Question,
    pub labels: Vec<i64>,
    pub counts: BTreeMap<Version, Vec<usize>>,
}

pub fn histogram(records: &[&ResponseRecord], question: Question) -> Histogram {
    let rounded: Vec<(Version, i64)> = records
        .iter()
        .filter(|r| r.question == question)
        .filter_map(|r| {
            r.value
                .filter(|v| v.is_finite())
                .map(|v| (r.version, v.round() as i64))
        })
        .collect();

    let observed: BTreeSet<i64> = rounded.iter().map(|(_, v)| *v).collect();
    let labels: Vec<i64> = match (observed.first(), observed.last()) {
        (Some(&lo), Some(&hi))
            if i128::from(hi) - i128::from(lo) <= i128::from(MAX_HISTOGRAM_SPAN) =>
        {
            (lo..=hi).collect()
        }
        _ => observed.into_iter().collect(),
    };

    let position: BTreeMap<i64, usize> = labels.iter().enumerate().map(|(i, l)| (*l, i)).collect();
    let mut counts: BTreeMap<Version, Vec<usize>> = Version::ALL
        .iter()
        .map(|v| (*v, vec![0; labels.len()]))
        .collect();
    for (version, value) in &rounded {
        if let (Some(row), Some(i)) = (counts.get_mut(version), position.get(value)) {
            row[*i] += 1;
        }
    }

    Histogram {
        question,
        labels,
        counts,
    }
}

/// Raw values per condition for box plots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxplotData {
    pub question: Question,
    pub values: BTreeMap<Version, Vec<f64>>,
}

pub fn boxplot(records: &[&ResponseRecord], question: Question) -> BoxplotData {
    BoxplotData {
        question,
        values: Version::ALL
            .iter()
            .map(|v| (*v, values_for(records, question, *v)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::tests::rating;

    #[test]
    fn test_image_summary() {
        let data = vec![
            rating("1", "face_2", Version::Left, Question::TrustRating, 2.0),
            rating("1", "face_2", Version::Right, Question::TrustRating, 4.0),
            rating("1", "face_2", Version::Both, Question::TrustRating, 6.0),
            rating("2", "face_2", Version::Both, Question::TrustRating, 4.0),
            rating("2", "face_2", Version::Both, Question::EmotionRating, 1.0),
            rating("2", "face_10", Version::Left, Question::TrustRating, 3.0),
        ];
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let images = image_summaries(&refs);

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].face_id, "face_2");
        assert_eq!(images[1].face_id, "face_10");

        let face = &images[0];
        assert_eq!(face.conditions[&Version::Both].count, 2);
        assert_eq!(face.full_mean(), Some(5.0));
        assert_eq!(face.half_face_avg, Some(3.0));
        assert_eq!(face.full_minus_half_diff, Some(2.0));
        assert_eq!(face.mean_trust, Some(5.0));
        assert_eq!(face.rating_count, 4);
        assert_eq!(face.unique_participants, 2);

        // No full-face ratings: overall mean
        let face = &images[1];
        assert_eq!(face.mean_trust, Some(3.0));
        assert!(face.full_minus_half_diff.is_none());
        assert_eq!(face.conditions[&Version::Both].count, 0);
    }

    #[test]
    fn test_image_std_without_full_face_is_population() {
        let data = vec![
            rating("1", "face_4", Version::Left, Question::TrustRating, 2.0),
            rating("2", "face_4", Version::Right, Question::TrustRating, 4.0),
            rating("1", "face_5", Version::Both, Question::TrustRating, 2.0),
            rating("2", "face_5", Version::Both, Question::TrustRating, 4.0),
        ];
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let images = image_summaries(&refs);

        assert_eq!(images[0].mean_trust, Some(3.0));
        assert_eq!(images[0].std_trust, Some(1.0));
        assert!((images[1].std_trust.unwrap() - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_participant_summaries_only_complete() {
        let mut data = Vec::new();
        for i in 0..10 {
            let version = if i < 4 { Version::Left } else { Version::Both };
            data.push(rating("1", "face_1", version, Question::TrustRating, (i % 7) as f64 + 1.0));
        }
        data.push(rating("2", "face_1", Version::Both, Question::TrustRating, 4.0));
        let refs: Vec<&ResponseRecord> = data.iter().collect();

        let summaries = participant_summaries(&refs);
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.participant_id, "1");
        assert_eq!(s.trust_count, 10);
        assert_eq!(s.versions, vec![Version::Left, Version::Both]);
        assert_eq!(s.faces_seen, 1);
    }

    #[test]
    fn test_histogram_labels_and_counts() {
        let data = vec![
            rating("1", "face_1", Version::Left, Question::TrustRating, 2.0),
            rating("1", "face_1", Version::Both, Question::TrustRating, 5.0),
            rating("2", "face_1", Version::Both, Question::TrustRating, 5.0),
            rating("2", "face_1", Version::Right, Question::EmotionRating, 9.0),
        ];
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let hist = histogram(&refs, Question::TrustRating);

        assert_eq!(hist.labels, vec![2, 3, 4, 5]);
        assert_eq!(hist.counts[&Version::Both], vec![0, 0, 0, 2]);
        assert_eq!(hist.counts[&Version::Left], vec![1, 0, 0, 0]);
        assert_eq!(hist.counts[&Version::Right], vec![0, 0, 0, 0]);

        let empty = histogram(&[], Question::EmotionRating);
        assert!(empty.labels.is_empty());
    }

    #[test]
    fn test_histogram_out_of_scale_value() {
        let data = vec![
            rating("1", "face_1", Version::Both, Question::TrustRating, 2.0),
            rating("1", "face_2", Version::Both, Question::TrustRating, 5.0),
            rating("2", "face_2", Version::Left, Question::TrustRating, 1e300),
            rating("3", "face_2", Version::Right, Question::TrustRating, 1e9),
        ];
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let hist = histogram(&refs, Question::TrustRating);

        assert_eq!(hist.labels, vec![2, 5, 1_000_000_000, i64::MAX]);
        assert_eq!(hist.counts[&Version::Both], vec![1, 1, 0, 0]);
        assert_eq!(hist.counts[&Version::Left], vec![0, 0, 0, 1]);
        assert_eq!(hist.counts[&Version::Right], vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_boxplot_values() {
        let data = vec![
            rating("1", "face_1", Version::Both, Question::EmotionRating, 3.0),
            rating("2", "face_1", Version::Both, Question::EmotionRating, 6.0),
        ];
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let plot = boxplot(&refs, Question::EmotionRating);
        assert_eq!(plot.values[&Version::Both], vec![3.0, 6.0]);
        assert!(plot.values[&Version::Left].is_empty());
    }
}
