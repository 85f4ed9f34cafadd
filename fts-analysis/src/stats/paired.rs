//! Paired half-face vs full-face comparison

use fts_common::{Question, ResponseRecord, Version};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeMap;

use super::descriptive::{mean, std_dev};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedComparison {
    pub question: Question,
    pub n: usize,
    pub included_participants: Vec<String>,
    /// Paired t statistic
    pub statistic: Option<f64>,
    pub pvalue: Option<f64>,
    pub df: Option<f64>,
    pub half_face_mean: Option<f64>,
    pub full_face_mean: Option<f64>,
    /// Mean of (half - full)
    pub difference: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub effect_size: Option<f64>,
    pub error: Option<String>,
}

impl PairedComparison {
    fn empty(question: Question) -> Self {
        Self {
            question,
            n: 0,
            included_participants: Vec::new(),
            statistic: None,
            pvalue: None,
            df: None,
            half_face_mean: None,
            full_face_mean: None,
            difference: None,
            ci_lower: None,
            ci_upper: None,
            effect_size: None,
            error: None,
        }
    }
}

/// Per participant: (mean of left and right means, full-face mean)
fn participant_pairs(records: &[&ResponseRecord], question: Question) -> BTreeMap<String, (f64, f64)> {
    let mut cells: BTreeMap<&str, BTreeMap<Version, Vec<f64>>> = BTreeMap::new();
    for r in records.iter().filter(|r| r.question == question) {
        if let Some(value) = r.value {
            cells
                .entry(r.participant_id.as_str())
                .or_default()
                .entry(r.version)
                .or_default()
                .push(value);
        }
    }

    cells
        .into_iter()
        .filter_map(|(pid, by_version)| {
            let left = mean(by_version.get(&Version::Left)?)?;
            let right = mean(by_version.get(&Version::Right)?)?;
            let full = mean(by_version.get(&Version::Both)?)?;
            Some((pid.to_string(), ((left + right) / 2.0, full)))
        })
        .collect()
}

/// Paired t-test of half-face against full-face ratings
pub fn half_vs_full(records: &[&ResponseRecord], question: Question, min_n: usize) -> PairedComparison {
    let pairs = participant_pairs(records, question);
    let mut result = PairedComparison::empty(question);

    let halves: Vec<f64> = pairs.values().map(|(h, _)| *h).collect();
    let fulls: Vec<f64> = pairs.values().map(|(_, f)| *f).collect();
    let diffs: Vec<f64> = pairs.values().map(|(h, f)| h - f).collect();

    result.n = pairs.len();
    result.included_participants = pairs.into_keys().collect();
    result.half_face_mean = mean(&halves);
    result.full_face_mean = mean(&fulls);
    result.difference = mean(&diffs);

    let n = diffs.len();
    if n < min_n.max(2) {
        result.error = Some(format!(
            "Insufficient data: {} participants with left, right and full ratings (need {})",
            n,
            min_n.max(2)
        ));
        return result;
    }

    let (Some(mean_diff), Some(sd)) = (mean(&diffs), std_dev(&diffs)) else {
        result.error = Some("No differences to test".to_string());
        return result;
    };

    result.effect_size = Some(if sd > 0.0 { mean_diff / sd } else { 0.0 });

    if sd == 0.0 {
        result.error = Some("Zero variance in paired differences".to_string());
        return result;
    }

    let df = (n - 1) as f64;
    let se = sd / (n as f64).sqrt();
    let t = mean_diff / se;

    let dist = match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => dist,
        Err(e) => {
            result.error = Some(format!("t distribution: {}", e));
            return result;
        }
    };
    let critical = dist.inverse_cdf(0.975);

    result.statistic = Some(t);
    result.df = Some(df);
    result.pvalue = Some(2.0 * (1.0 - dist.cdf(t.abs())));
    result.ci_lower = Some(mean_diff - critical * se);
    result.ci_upper = Some(mean_diff + critical * se);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::tests::rating;

    fn participant(pid: &str, left: f64, right: f64, full: f64) -> Vec<ResponseRecord> {
        vec![
            rating(pid, "face_1", Version::Left, Question::TrustRating, left),
            rating(pid, "face_1", Version::Right, Question::TrustRating, right),
            rating(pid, "face_1", Version::Both, Question::TrustRating, full),
        ]
    }

    #[test]
    fn test_empty_input_reports_error() {
        let result = half_vs_full(&[], Question::TrustRating, 2);
        assert_eq!(result.n, 0);
        assert!(result.error.is_some());
        assert!(result.statistic.is_none());
    }

    #[test]
    fn test_single_participant_reports_error() {
        let data = participant("1", 3.0, 5.0, 6.0);
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let result = half_vs_full(&refs, Question::TrustRating, 2);
        assert_eq!(result.n, 1);
        assert!(result.error.is_some());
        assert_eq!(result.half_face_mean, Some(4.0));
        assert_eq!(result.full_face_mean, Some(6.0));
    }

    #[test]
    fn test_participant_without_both_halves_is_skipped() {
        let mut data = participant("1", 3.0, 5.0, 6.0);
        data.push(rating("2", "face_1", Version::Left, Question::TrustRating, 3.0));
        data.push(rating("2", "face_1", Version::Both, Question::TrustRating, 3.0));
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let result = half_vs_full(&refs, Question::TrustRating, 2);
        assert_eq!(result.included_participants, vec!["1".to_string()]);
    }

    #[test]
    fn test_paired_t() {
        let mut data = Vec::new();
        // half - full differences: -1, -2, -3
        data.extend(participant("1", 4.0, 4.0, 5.0));
        data.extend(participant("2", 3.0, 5.0, 6.0));
        data.extend(participant("3", 2.0, 4.0, 6.0));
        let refs: Vec<&ResponseRecord> = data.iter().collect();

        let result = half_vs_full(&refs, Question::TrustRating, 2);
        assert!(result.error.is_none());
        assert_eq!(result.n, 3);
        assert_eq!(result.df, Some(2.0));
        assert_eq!(result.difference, Some(-2.0));
        // mean -2, sd 1, se 1/sqrt(3)
        let t = result.statistic.unwrap();
        assert!((t - (-2.0 * 3f64.sqrt())).abs() < 1e-9);
        assert!((result.effect_size.unwrap() + 2.0).abs() < 1e-9);
        let p = result.pvalue.unwrap();
        assert!(p > 0.05 && p < 0.2, "p = {p}");
        assert!(result.ci_lower.unwrap() < -2.0 && result.ci_upper.unwrap() > -2.0);
    }

    #[test]
    fn test_zero_variance_keeps_means() {
        let mut data = Vec::new();
        data.extend(participant("1", 4.0, 4.0, 5.0));
        data.extend(participant("2", 2.0, 2.0, 3.0));
        let refs: Vec<&ResponseRecord> = data.iter().collect();

        let result = half_vs_full(&refs, Question::TrustRating, 2);
        assert!(result.error.is_some());
        assert_eq!(result.difference, Some(-1.0));
        assert_eq!(result.half_face_mean, Some(3.0));
        assert_eq!(result.effect_size, Some(0.0));
        assert!(result.pvalue.is_none());
    }

    #[test]
    fn test_emotion_needs_three() {
        let mut data = Vec::new();
        for (pid, l, r, f) in [("1", 1.0, 2.0, 4.0), ("2", 2.0, 2.0, 3.0)] {
            for (version, value) in [(Version::Left, l), (Version::Right, r), (Version::Both, f)] {
                data.push(rating(pid, "face_1", version, Question::EmotionRating, value));
            }
        }
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let result = half_vs_full(&refs, Question::EmotionRating, 3);
        assert!(result.error.is_some());
        assert_eq!(result.n, 2);
    }
}
