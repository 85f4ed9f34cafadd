//! Side preference in the masculinity/femininity choice questions

use fts_common::{Choice, Question, ResponseRecord, Version};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::unique_participants;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceCounts {
    /// `None` for the pooled result
    pub question: Option<Question>,
    pub left: usize,
    pub right: usize,
    pub neither: usize,
    pub total: usize,
    pub left_proportion: Option<f64>,
    pub right_proportion: Option<f64>,
    pub neither_proportion: Option<f64>,
    /// Goodness of fit of left vs right against 50/50
    pub chi_square: Option<f64>,
    pub pvalue: Option<f64>,
    pub error: Option<String>,
}

impl ChoiceCounts {
    fn from_choices(question: Option<Question>, choices: &[Choice]) -> Self {
        let count = |c: Choice| choices.iter().filter(|x| **x == c).count();
        let (left, right, neither) = (count(Choice::Left), count(Choice::Right), count(Choice::Neither));
        let total = choices.len();
        let proportion = |n: usize| (total > 0).then(|| n as f64 / total as f64);

        let mut result = Self {
            question,
            left,
            right,
            neither,
            total,
            left_proportion: proportion(left),
            right_proportion: proportion(right),
            neither_proportion: proportion(neither),
            chi_square: None,
            pvalue: None,
            error: None,
        };

        let sided = left + right;
        if sided == 0 {
            result.error = Some("No left or right choices".to_string());
            return result;
        }

        let expected = sided as f64 / 2.0;
        let chi = [left, right]
            .iter()
            .map(|observed| (*observed as f64 - expected).powi(2) / expected)
            .sum::<f64>();
        result.chi_square = Some(chi);

        match ChiSquared::new(1.0) {
            Ok(dist) => result.pvalue = Some(1.0 - dist.cdf(chi)),
            Err(e) => result.error = Some(format!("chi-square distribution: {}", e)),
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoicePreference {
    pub masc_choice: ChoiceCounts,
    pub fem_choice: ChoiceCounts,
    pub pooled: ChoiceCounts,
    pub included_participants: Vec<String>,
}

/// Full-face choice rows only
pub fn preference(records: &[&ResponseRecord]) -> ChoicePreference {
    let rows: Vec<&ResponseRecord> = records
        .iter()
        .copied()
        .filter(|r| r.question.is_choice() && r.version == Version::Both)
        .collect();

    let choices_for = |question: Option<Question>| -> Vec<Choice> {
        rows.iter()
            .filter(|r| question.map_or(true, |q| r.question == q))
            .filter_map(|r| r.choice())
            .collect()
    };

    ChoicePreference {
        masc_choice: ChoiceCounts::from_choices(
            Some(Question::MascChoice),
            &choices_for(Some(Question::MascChoice)),
        ),
        fem_choice: ChoiceCounts::from_choices(
            Some(Question::FemChoice),
            &choices_for(Some(Question::FemChoice)),
        ),
        pooled: ChoiceCounts::from_choices(None, &choices_for(None)),
        included_participants: unique_participants(&rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::tests::choice;

    #[test]
    fn test_counts_and_proportions() {
        let data = vec![
            choice("1", "face_1", Version::Both, Question::MascChoice, "left"),
            choice("1", "face_2", Version::Both, Question::MascChoice, "Left"),
            choice("2", "face_1", Version::Both, Question::MascChoice, "right"),
            choice("2", "face_2", Version::Both, Question::MascChoice, "neither"),
            choice("2", "face_2", Version::Left, Question::MascChoice, "left"),
            choice("3", "face_1", Version::Both, Question::FemChoice, "right"),
        ];
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let result = preference(&refs);

        let masc = &result.masc_choice;
        assert_eq!((masc.left, masc.right, masc.neither, masc.total), (2, 1, 1, 4));
        assert_eq!(masc.left_proportion, Some(0.5));
        // (2 - 1.5)^2 / 1.5 twice
        assert!((masc.chi_square.unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert!(masc.pvalue.unwrap() > 0.5);

        assert_eq!(result.pooled.total, 5);
        assert_eq!(result.pooled.right, 2);
        assert_eq!(result.included_participants.len(), 3);
    }

    #[test]
    fn test_strong_preference_is_significant() {
        let data: Vec<ResponseRecord> = (0..40)
            .map(|i| {
                let side = if i < 35 { "left" } else { "right" };
                choice(&i.to_string(), "face_1", Version::Both, Question::FemChoice, side)
            })
            .collect();
        let refs: Vec<&ResponseRecord> = data.iter().collect();
        let result = preference(&refs);
        assert!(result.fem_choice.pvalue.unwrap() < 0.001);
    }

    #[test]
    fn test_no_choices_reports_error() {
        let result = preference(&[]);
        assert!(result.masc_choice.error.is_some());
        assert_eq!(result.pooled.total, 0);
        assert!(result.pooled.left_proportion.is_none());
    }
}
