//! One-way repeated-measures ANOVA over the three presentation conditions

use fts_common::{Question, ResponseRecord, Version};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use std::collections::BTreeMap;

use super::descriptive::{mean, std_dev};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatedMeasuresAnova {
    pub question: Question,
    pub n: usize,
    pub included_participants: Vec<String>,
    #[serde(rename = "F")]
    pub f_statistic: Option<f64>,
    pub pvalue: Option<f64>,
    pub partial_eta_squared: Option<f64>,
    pub df_num: usize,
    pub df_den: usize,
    pub ss_conditions: Option<f64>,
    pub ss_subjects: Option<f64>,
    pub ss_error: Option<f64>,
    pub condition_means: BTreeMap<Version, f64>,
    pub condition_stds: BTreeMap<Version, f64>,
    pub error: Option<String>,
}

/// Rows: participants with all three conditions; columns in `Version::ALL` order
fn subject_matrix(records: &[&ResponseRecord], question: Question) -> BTreeMap<String, [f64; 3]> {
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
            let mut row = [0.0; 3];
            for (slot, version) in row.iter_mut().zip(Version::ALL) {
                *slot = mean(by_version.get(&version)?)?;
            }
            Some((pid.to_string(), row))
        })
        .collect()
}

pub fn repeated_measures(
    records: &[&ResponseRecord],
    question: Question,
    min_n: usize,
) -> RepeatedMeasuresAnova {
    let matrix = subject_matrix(records, question);
    let n = matrix.len();
    let k = Version::ALL.len();

    let mut result = RepeatedMeasuresAnova {
        question,
        n,
        included_participants: matrix.keys().cloned().collect(),
        f_statistic: None,
        pvalue: None,
        partial_eta_squared: None,
        df_num: k - 1,
        df_den: (k - 1) * n.saturating_sub(1),
        ss_conditions: None,
        ss_subjects: None,
        ss_error: None,
        condition_means: BTreeMap::new(),
        condition_stds: BTreeMap::new(),
        error: None,
    };

    for (column, version) in Version::ALL.iter().enumerate() {
        let values: Vec<f64> = matrix.values().map(|row| row[column]).collect();
        if let (Some(m), Some(sd)) = (mean(&values), std_dev(&values)) {
            result.condition_means.insert(*version, m);
            result.condition_stds.insert(*version, sd);
        }
    }

    if n < min_n.max(2) {
        result.error = Some(format!(
            "Insufficient data: {} participants with all three conditions (need {})",
            n,
            min_n.max(2)
        ));
        return result;
    }

    let all: Vec<f64> = matrix.values().flat_map(|row| row.iter().copied()).collect();
    let grand = all.iter().sum::<f64>() / all.len() as f64;

    let ss_total: f64 = all.iter().map(|x| (x - grand).powi(2)).sum();
    let ss_conditions: f64 = result
        .condition_means
        .values()
        .map(|m| n as f64 * (m - grand).powi(2))
        .sum();
    let ss_subjects: f64 = matrix
        .values()
        .map(|row| {
            let subject_mean = row.iter().sum::<f64>() / k as f64;
            k as f64 * (subject_mean - grand).powi(2)
        })
        .sum();
    let ss_error = ss_total - ss_conditions - ss_subjects;

    result.ss_conditions = Some(ss_conditions);
    result.ss_subjects = Some(ss_subjects);
    result.ss_error = Some(ss_error);

    if ss_error <= 1e-12 {
        result.error = Some("Insufficient variance".to_string());
        return result;
    }

    let ms_conditions = ss_conditions / result.df_num as f64;
    let ms_error = ss_error / result.df_den as f64;
    let f = ms_conditions / ms_error;

    result.f_statistic = Some(f);
    result.partial_eta_squared = Some(ss_conditions / (ss_conditions + ss_error));

    match FisherSnedecor::new(result.df_num as f64, result.df_den as f64) {
        Ok(dist) => result.pvalue = Some(1.0 - dist.cdf(f)),
        Err(e) => result.error = Some(format!("F distribution: {}", e)),
    }
    result
}
