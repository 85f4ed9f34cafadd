//! Descriptive statistics per presentation condition

use fts_common::{Question, ResponseRecord, Version};
use serde::Serialize;
use std::collections::BTreeMap;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (ddof 1); 0 for a single value
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Population standard deviation (ddof 0)
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / values.len() as f64).sqrt())
}

/// Quantile of already sorted values with linear interpolation between ranks
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile(&sorted, 0.5)
}

/// Summary of one condition; every field but `n` is `None` when empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub n: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q25: Option<f64>,
    pub q75: Option<f64>,
}

impl DescriptiveStats {
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            n: sorted.len(),
            mean: mean(&sorted),
            std: std_dev(&sorted),
            median: quantile(&sorted, 0.5),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            q25: quantile(&sorted, 0.25),
            q75: quantile(&sorted, 0.75),
        }
    }
}

/// Numeric values of `question` in `version`
pub fn values_for(records: &[&ResponseRecord], question: Question, version: Version) -> Vec<f64> {
    records
        .iter()
        .filter(|r| r.question == question && r.version == version)
        .filter_map(|r| r.value)
        .collect()
}

/// Stats per numeric question with data, for each of the three conditions
pub fn by_condition(
    records: &[&ResponseRecord],
) -> BTreeMap<Question, BTreeMap<Version, DescriptiveStats>> {
    let mut out = BTreeMap::new();
    for question in Question::NUMERIC {
        let has_data = records
            .iter()
            .any(|r| r.question == question && r.value.is_some());
        if !has_data {
            continue;
        }

        let per_version = Version::ALL
            .iter()
            .map(|v| (*v, DescriptiveStats::from_values(&values_for(records, question, *v))))
            .collect();
        out.insert(question, per_version);
    }
    out
}
