//! Split-half reliability and intraclass correlation of full-face trust

use fts_common::{Question, ResponseRecord, Version};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::descriptive::mean;
use super::face_order;

/// Participants needed for a split-half correlation
pub const MIN_SPLIT_HALF_PARTICIPANTS: usize = 2;

/// participant -> face -> mean full-face trust
type Pivot<'a> = BTreeMap<&'a str, BTreeMap<&'a str, f64>>;

fn full_face_trust<'a>(records: &[&'a ResponseRecord]) -> Pivot<'a> {
    let mut cells: BTreeMap<&str, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();
    for r in records {
        if r.question != Question::TrustRating || r.version != Version::Both || r.face_id.is_empty() {
            continue;
        }
        if let Some(value) = r.value {
            cells
                .entry(r.participant_id.as_str())
                .or_default()
                .entry(r.face_id.as_str())
                .or_default()
                .push(value);
        }
    }

    cells
        .into_iter()
        .map(|(pid, faces)| {
            let means = faces
                .into_iter()
                .filter_map(|(face, values)| mean(&values).map(|m| (face, m)))
                .collect();
            (pid, means)
        })
        .collect()
}

/// Faces a participant must have rated to enter the split: half of all
/// faces rounded down, and at least one
fn min_faces_rated(total_faces: usize) -> usize {
    (total_faces / 2).max(1)
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitHalfReliability {
    pub n_participants: usize,
    pub n_faces: usize,
    pub seed: u64,
    pub correlation: Option<f64>,
    pub spearman_brown: Option<f64>,
    pub included_participants: Vec<String>,
    pub error: Option<String>,
}

/// Correlation of per-participant means over two random halves of the faces
pub fn split_half(records: &[&ResponseRecord], seed: u64) -> SplitHalfReliability {
    let pivot = full_face_trust(records);
    let mut result = SplitHalfReliability {
        n_participants: 0,
        n_faces: 0,
        seed,
        correlation: None,
        spearman_brown: None,
        included_participants: Vec::new(),
        error: None,
    };

    let all_faces: BTreeSet<&str> = pivot.values().flat_map(|f| f.keys().copied()).collect();
    let needed = min_faces_rated(all_faces.len());
    let pivot: Pivot<'_> = pivot
        .into_iter()
        .filter(|(_, faces)| faces.len() >= needed)
        .collect();

    let mut faces: Vec<&str> = pivot
        .values()
        .flat_map(|f| f.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    faces.sort_by(|a, b| face_order(a).cmp(&face_order(b)));

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    faces.shuffle(&mut rng);

    result.n_faces = faces.len();
    if faces.len() < 2 {
        result.error = Some(format!("Need at least 2 faces, found {}", faces.len()));
        return result;
    }

    let (first, second) = faces.split_at(faces.len() / 2);
    let half_mean = |ratings: &BTreeMap<&str, f64>, half: &[&str]| -> Option<f64> {
        let values: Vec<f64> = half.iter().filter_map(|f| ratings.get(f).copied()).collect();
        mean(&values)
    };

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (pid, ratings) in &pivot {
        if let (Some(x), Some(y)) = (half_mean(ratings, first), half_mean(ratings, second)) {
            xs.push(x);
            ys.push(y);
            result.included_participants.push(pid.to_string());
        }
    }
    result.n_participants = xs.len();

    if xs.len() < MIN_SPLIT_HALF_PARTICIPANTS {
        result.error = Some(format!(
            "Need at least {} participants rating both halves, found {}",
            MIN_SPLIT_HALF_PARTICIPANTS,
            xs.len()
        ));
        return result;
    }

    let Some(r) = pearson(&xs, &ys) else {
        result.error = Some("No variance in half means".to_string());
        return result;
    };

    result.correlation = Some(r);
    result.spearman_brown = if r >= 1.0 {
        Some(1.0)
    } else if r <= -1.0 {
        None
    } else {
        Some(2.0 * r / (1.0 + r))
    };
    result
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntraclassCorrelation {
    pub icc: Option<f64>,
    pub n_raters: usize,
    pub n_stimuli: usize,
    pub mean_ratings_per_stimulus: f64,
    pub ms_between_stimuli: Option<f64>,
    pub ms_between_raters: Option<f64>,
    pub ms_error: Option<f64>,
    pub included_participants: Vec<String>,
    pub error: Option<String>,
}

/// ICC over the stimulus x rater matrix of full-face trust.
///
/// Computed on the complete block: stimuli rated by at least two raters,
/// then raters who rated all of those stimuli.
pub fn icc(records: &[&ResponseRecord]) -> IntraclassCorrelation {
    let pivot = full_face_trust(records);

    let mut raters_per_face: BTreeMap<&str, usize> = BTreeMap::new();
    for faces in pivot.values() {
        for face in faces.keys() {
            *raters_per_face.entry(*face).or_default() += 1;
        }
    }

    let mut result = IntraclassCorrelation {
        icc: None,
        n_raters: pivot.len(),
        n_stimuli: raters_per_face.len(),
        mean_ratings_per_stimulus: if raters_per_face.is_empty() {
            0.0
        } else {
            raters_per_face.values().sum::<usize>() as f64 / raters_per_face.len() as f64
        },
        ms_between_stimuli: None,
        ms_between_raters: None,
        ms_error: None,
        included_participants: Vec::new(),
        error: None,
    };

    let shared: Vec<&str> = raters_per_face
        .iter()
        .filter(|(_, n)| **n >= 2)
        .map(|(face, _)| *face)
        .collect();

    if result.n_raters < 2 || result.n_stimuli < 2 || shared.len() < 2 {
        result.error = Some(format!(
            "Need at least 2 raters and 2 stimuli rated by 2 or more raters \
             ({} raters, {} stimuli, {} shared)",
            result.n_raters,
            result.n_stimuli,
            shared.len()
        ));
        return result;
    }

    // stimulus x rater, complete rows only
    let raters: Vec<(&str, Vec<f64>)> = pivot
        .iter()
        .filter_map(|(pid, faces)| {
            let row: Option<Vec<f64>> = shared.iter().map(|f| faces.get(f).copied()).collect();
            row.map(|r| (*pid, r))
        })
        .collect();

    let k = raters.len();
    let n = shared.len();
    if k < 2 {
        result.error = Some(format!(
            "Only {} rater(s) rated every shared stimulus",
            k
        ));
        return result;
    }
    result.included_participants = raters.iter().map(|(pid, _)| pid.to_string()).collect();

    let grand = raters.iter().flat_map(|(_, r)| r.iter()).sum::<f64>() / (n * k) as f64;
    let stimulus_means: Vec<f64> = (0..n)
        .map(|i| raters.iter().map(|(_, r)| r[i]).sum::<f64>() / k as f64)
        .collect();
    let rater_means: Vec<f64> = raters
        .iter()
        .map(|(_, r)| r.iter().sum::<f64>() / n as f64)
        .collect();

    let ss_total: f64 = raters
        .iter()
        .flat_map(|(_, r)| r.iter())
        .map(|x| (x - grand).powi(2))
        .sum();
    let ss_stimuli: f64 = stimulus_means.iter().map(|m| k as f64 * (m - grand).powi(2)).sum();
    let ss_raters: f64 = rater_means.iter().map(|m| n as f64 * (m - grand).powi(2)).sum();
    let ss_error = (ss_total - ss_stimuli - ss_raters).max(0.0);

    let ms_b = ss_stimuli / (n - 1) as f64;
    let ms_r = ss_raters / (k - 1) as f64;
    let ms_e = ss_error / ((n - 1) * (k - 1)) as f64;

    result.ms_between_stimuli = Some(ms_b);
    result.ms_between_raters = Some(ms_r);
    result.ms_error = Some(ms_e);

    let denominator = ms_b + (k - 1) as f64 * ms_e;
    if denominator <= 0.0 {
        result.error = Some("No variance between stimuli".to_string());
        return result;
    }
    result.icc = Some((ms_b - ms_e) / denominator);
    result
}
