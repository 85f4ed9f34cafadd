//! Inclusion/exclusion rules
//!
//! Session-level rules decide whether a participant's data is usable at all;
//! trial-level rules flag single responses with implausible reaction times.
//! Rows with no flag set are `include_in_primary`.

use fts_common::config::AnalysisConfig;
use fts_common::{ResponseRecord, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use crate::loader::FileMetadata;
use crate::standardize::StandardTable;
use crate::stats::descriptive::{median, quantile};

/// Rows per face in the canonical design (2 left + 2 right + 6 both)
pub const ROWS_PER_COMPLETE_FACE: usize = 10;

/// Session-level rule evaluated on all rows of one participant
pub trait SessionCheck: Send + Sync {
    /// Whether the participant fails the check
    fn flags(&self, participant_id: &str, rows: &[&ResponseRecord]) -> bool;
}

/// Attention-check items are not part of the current question set
#[derive(Debug, Default)]
pub struct AttentionCheck;

impl SessionCheck for AttentionCheck {
    fn flags(&self, _participant_id: &str, _rows: &[&ResponseRecord]) -> bool {
        false
    }
}

/// Device metadata is not collected by the study app
#[derive(Debug, Default)]
pub struct DeviceCheck;

impl SessionCheck for DeviceCheck {
    fn flags(&self, _participant_id: &str, _rows: &[&ResponseRecord]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionFlags {
    pub duplicate_session: bool,
    pub low_completion: bool,
    pub failed_attention: bool,
    pub device_violation: bool,
    pub fast_rt: bool,
    pub slow_rt: bool,
}

impl ExclusionFlags {
    pub fn any(&self) -> bool {
        self.duplicate_session
            || self.low_completion
            || self.failed_attention
            || self.device_violation
            || self.fast_rt
            || self.slow_rt
    }
}

/// Standardized record plus its exclusion decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRecord {
    #[serde(flatten)]
    pub record: ResponseRecord,
    #[serde(flatten)]
    pub flags: ExclusionFlags,
    pub include_in_primary: bool,
}

/// Per-participant session-level detail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantExclusion {
    pub participant_id: String,
    pub rows: usize,
    /// Rows surviving the duplicate-session rule
    pub retained_rows: usize,
    pub expected_trials: f64,
    pub completion_rate: f64,
    pub real_participant: bool,
    pub from_test_file: bool,
    pub threshold: f64,
    pub excluded: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExclusionSummary {
    pub total_raw_rows: usize,
    pub total_cleaned_rows: usize,
    pub excluded_rows: usize,
    pub total_participants: usize,
    pub included_participants: usize,
    pub excluded_participants: usize,
    /// Participants per session-level reason
    pub session_level: BTreeMap<String, usize>,
    /// Rows per trial-level reason
    pub trial_level: BTreeMap<String, usize>,
    pub reaction_times_available: bool,
    pub participants: Vec<ParticipantExclusion>,
}

/// Output of the exclusion engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedTable {
    pub records: Vec<AnnotatedRecord>,
    pub summary: ExclusionSummary,
}

impl AnnotatedTable {
    /// Records for the primary analysis
    pub fn included(&self) -> impl Iterator<Item = &ResponseRecord> + '_ {
        self.records
            .iter()
            .filter(|r| r.include_in_primary)
            .map(|r| &r.record)
    }

    pub fn included_participants(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .included()
            .map(|r| r.participant_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }
}

/// Whether `actual / expected` reaches `threshold`
pub fn passes_completion(actual: usize, expected: f64, threshold: f64) -> bool {
    if expected <= 0.0 {
        return true;
    }
    actual as f64 / expected >= threshold
}

/// A participant is complete when some face has a full set of rows
pub fn is_complete_participant(rows: &[&ResponseRecord]) -> bool {
    let mut per_face: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        if !row.face_id.is_empty() {
            *per_face.entry(row.face_id.as_str()).or_default() += 1;
        }
    }
    per_face.values().any(|n| *n >= ROWS_PER_COMPLETE_FACE)
}

/// Included rows of participants who are complete
pub fn complete_participants_only(table: &AnnotatedTable) -> Vec<&ResponseRecord> {
    let mut by_participant: BTreeMap<&str, Vec<&ResponseRecord>> = BTreeMap::new();
    for record in table.included() {
        by_participant
            .entry(record.participant_id.as_str())
            .or_default()
            .push(record);
    }

    by_participant
        .into_values()
        .filter(|rows| is_complete_participant(rows))
        .flatten()
        .collect()
}

pub struct ExclusionEngine {
    expected_faces: usize,
    assumed_rows_per_face: usize,
    flat_expected_rows: usize,
    production_threshold: f64,
    test_threshold: f64,
    real_participant: Regex,
    fast_rt_ms: f64,
    slow_rt_quantile: f64,
    attention: Box<dyn SessionCheck>,
    device: Box<dyn SessionCheck>,
}

impl ExclusionEngine {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            expected_faces: config.expected_total_faces,
            assumed_rows_per_face: config.assumed_rows_per_face,
            flat_expected_rows: config.flat_expected_rows,
            production_threshold: config.production_completion_threshold,
            test_threshold: config.test_completion_threshold,
            real_participant: config.real_participant_regex()?,
            fast_rt_ms: config.fast_rt_ms,
            slow_rt_quantile: config.slow_rt_quantile,
            attention: Box::new(AttentionCheck),
            device: Box::new(DeviceCheck),
        })
    }

    pub fn with_attention_check(mut self, check: Box<dyn SessionCheck>) -> Self {
        self.attention = check;
        self
    }

    pub fn with_device_check(mut self, check: Box<dyn SessionCheck>) -> Self {
        self.device = check;
        self
    }

    pub fn is_real_participant(&self, participant_id: &str) -> bool {
        self.real_participant.is_match(participant_id)
    }

    /// Expected row count for one participant's retained rows
    pub fn expected_trials(&self, rows: &[&ResponseRecord]) -> f64 {
        if self.expected_faces == 0 {
            return self.flat_expected_rows as f64;
        }

        let mut per_face: HashMap<&str, usize> = HashMap::new();
        for row in rows {
            if !row.face_id.is_empty() {
                *per_face.entry(row.face_id.as_str()).or_default() += 1;
            }
        }

        if per_face.is_empty() {
            return (self.expected_faces * self.assumed_rows_per_face) as f64;
        }

        let counts: Vec<f64> = per_face.values().map(|n| *n as f64).collect();
        let rows_per_face = median(&counts).unwrap_or(self.assumed_rows_per_face as f64);
        self.expected_faces as f64 * rows_per_face
    }

    /// Annotate every record; `files` are the loaded file descriptions
    pub fn apply(&self, table: &StandardTable, files: &[FileMetadata]) -> AnnotatedTable {
        let test_sources: HashSet<&str> = files
            .iter()
            .filter(|f| f.is_test)
            .map(|f| f.file_name.as_str())
            .collect();

        let mut flags = vec![ExclusionFlags::default(); table.len()];

        let mut by_participant: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (index, record) in table.records.iter().enumerate() {
            by_participant
                .entry(record.participant_id.as_str())
                .or_default()
                .push(index);
        }

        let mut participants = Vec::new();
        for (pid, indices) in &by_participant {
            let detail = self.session_rules(pid, indices, table, &test_sources, &mut flags);
            participants.push(detail);
        }

        // Selected files whose participant has no rows at all
        for file in files {
            let pid = file.participant_id.as_str();
            if !by_participant.contains_key(pid)
                && !participants.iter().any(|p: &ParticipantExclusion| p.participant_id == pid)
            {
                participants.push(ParticipantExclusion {
                    participant_id: pid.to_string(),
                    rows: 0,
                    retained_rows: 0,
                    expected_trials: 0.0,
                    completion_rate: 0.0,
                    real_participant: self.is_real_participant(pid),
                    from_test_file: file.is_test,
                    threshold: self.threshold_for(file.is_test),
                    excluded: true,
                    reasons: vec!["no_data".to_string()],
                });
            }
        }

        let reaction_times_available = table
            .records
            .iter()
            .any(|r| r.reaction_time_ms.is_some());
        if reaction_times_available {
            for indices in by_participant.values() {
                self.trial_rules(indices, table, &mut flags);
            }
        }

        let records: Vec<AnnotatedRecord> = table
            .records
            .iter()
            .zip(flags)
            .map(|(record, flags)| AnnotatedRecord {
                record: record.clone(),
                include_in_primary: !flags.any(),
                flags,
            })
            .collect();

        let summary = summarize(&records, participants, reaction_times_available);
        info!(
            "Exclusions: {}/{} participants included, {}/{} rows kept",
            summary.included_participants,
            summary.total_participants,
            summary.total_cleaned_rows,
            summary.total_raw_rows
        );

        AnnotatedTable { records, summary }
    }

    fn threshold_for(&self, from_test_file: bool) -> f64 {
        if from_test_file {
            self.test_threshold
        } else {
            self.production_threshold
        }
    }

    fn session_rules(
        &self,
        pid: &str,
        indices: &[usize],
        table: &StandardTable,
        test_sources: &HashSet<&str>,
        flags: &mut [ExclusionFlags],
    ) -> ParticipantExclusion {
        let mut reasons = Vec::new();

        // One secondary identity per participant: the most frequent wins
        let mut identities: BTreeMap<&str, usize> = BTreeMap::new();
        for &i in indices {
            if let Some(secondary) = table.records[i].secondary_id.as_deref() {
                *identities.entry(secondary).or_default() += 1;
            }
        }
        if identities.len() > 1 {
            // BTreeMap order makes the first maximum the smallest id
            let keep = identities
                .iter()
                .fold(None, |best: Option<(&str, usize)>, (id, n)| match best {
                    Some((_, m)) if m >= *n => best,
                    _ => Some((*id, *n)),
                })
                .map(|(id, _)| id);
            for &i in indices {
                let secondary = table.records[i].secondary_id.as_deref();
                if secondary.is_some() && secondary != keep {
                    flags[i].duplicate_session = true;
                }
            }
            reasons.push("duplicate_session".to_string());
        }

        let retained: Vec<&ResponseRecord> = indices
            .iter()
            .filter(|i| !flags[**i].duplicate_session)
            .map(|i| &table.records[*i])
            .collect();

        let from_test_file = indices
            .iter()
            .any(|i| test_sources.contains(table.records[*i].source_file.as_str()));
        let threshold = self.threshold_for(from_test_file);
        let real_participant = self.is_real_participant(pid);
        let expected_trials = self.expected_trials(&retained);

        let completion_rate = if real_participant || expected_trials <= 0.0 {
            1.0
        } else {
            retained.len() as f64 / expected_trials
        };

        let low_completion = !real_participant
            && (retained.is_empty() || !passes_completion(retained.len(), expected_trials, threshold));
        let failed_attention = self.attention.flags(pid, &retained);
        let device_violation = self.device.flags(pid, &retained);

        if low_completion {
            reasons.push("low_completion".to_string());
        }
        if failed_attention {
            reasons.push("failed_attention".to_string());
        }
        if device_violation {
            reasons.push("device_violation".to_string());
        }

        for &i in indices {
            flags[i].low_completion = low_completion;
            flags[i].failed_attention = failed_attention;
            flags[i].device_violation = device_violation;
        }

        let excluded = low_completion || failed_attention || device_violation;
        debug!(
            "{}: {} rows, expected {:.1}, completion {:.2} (threshold {}){}",
            pid,
            retained.len(),
            expected_trials,
            completion_rate,
            threshold,
            if excluded { ", excluded" } else { "" }
        );

        ParticipantExclusion {
            participant_id: pid.to_string(),
            rows: indices.len(),
            retained_rows: retained.len(),
            expected_trials,
            completion_rate,
            real_participant,
            from_test_file,
            threshold,
            excluded,
            reasons,
        }
    }

    fn trial_rules(&self, indices: &[usize], table: &StandardTable, flags: &mut [ExclusionFlags]) {
        let mut times: Vec<f64> = indices
            .iter()
            .filter_map(|i| table.records[*i].reaction_time_ms)
            .collect();
        if times.is_empty() {
            return;
        }
        times.sort_by(f64::total_cmp);
        let slow_cutoff = quantile(&times, self.slow_rt_quantile);

        for &i in indices {
            if let Some(rt) = table.records[i].reaction_time_ms {
                flags[i].fast_rt = rt < self.fast_rt_ms;
                flags[i].slow_rt = slow_cutoff.map(|cut| rt > cut).unwrap_or(false);
            }
        }
    }
}

fn summarize(
    records: &[AnnotatedRecord],
    participants: Vec<ParticipantExclusion>,
    reaction_times_available: bool,
) -> ExclusionSummary {
    let mut session_level: BTreeMap<String, usize> = BTreeMap::new();
    for participant in &participants {
        for reason in &participant.reasons {
            *session_level.entry(reason.clone()).or_default() += 1;
        }
    }

    let mut trial_level: BTreeMap<String, usize> = BTreeMap::new();
    if reaction_times_available {
        trial_level.insert(
            "fast_rt".to_string(),
            records.iter().filter(|r| r.flags.fast_rt).count(),
        );
        trial_level.insert(
            "slow_rt".to_string(),
            records.iter().filter(|r| r.flags.slow_rt).count(),
        );
    }

    let cleaned = records.iter().filter(|r| r.include_in_primary).count();
    let included_participants: HashSet<&str> = records
        .iter()
        .filter(|r| r.include_in_primary)
        .map(|r| r.record.participant_id.as_str())
        .collect();

    ExclusionSummary {
        total_raw_rows: records.len(),
        total_cleaned_rows: cleaned,
        excluded_rows: records.len() - cleaned,
        total_participants: participants.len(),
        included_participants: included_participants.len(),
        excluded_participants: participants.len() - included_participants.len(),
        session_level,
        trial_level,
        reaction_times_available,
        participants,
    }
}
