//! Raw rows to the canonical long table
//!
//! Resolves column and value aliases, melts legacy wide rows, coerces rating
//! responses and keeps one record per (participant, face, version, question).
//! Running it on its own output (via `StandardTable::to_raw_table`) is a no-op.

use chrono::{DateTime, Utc};
use fts_common::schema::{self, Column, QuestionAlias, VersionAlias};
use fts_common::time::parse_timestamp;
use fts_common::{Question, ResponseRecord, Version};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::loader::{RawRow, RawTable};

/// Canonical long table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardTable {
    pub records: Vec<ResponseRecord>,
}

impl StandardTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn participants(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.participant_id.as_str()).collect()
    }

    /// Project the table back onto canonical raw columns
    pub fn to_raw_table(&self) -> RawTable {
        let rows = self
            .records
            .iter()
            .map(|r| {
                let mut fields = vec![
                    (Column::Pid, r.participant_id.clone()),
                    (Column::FaceId, r.face_id.clone()),
                    (Column::Version, r.version.as_str().to_string()),
                    (Column::Question, r.question.as_str().to_string()),
                    (Column::Response, r.response.clone()),
                    (Column::Timestamp, r.timestamp_raw.clone()),
                ];
                if let Some(secondary) = &r.secondary_id {
                    fields.push((Column::SecondaryId, secondary.clone()));
                }
                if let Some(rt) = r.reaction_time_ms {
                    fields.push((Column::ReactionTime, rt.to_string()));
                }
                RawRow {
                    source_file: r.source_file.clone(),
                    source_modified: r.source_modified,
                    participant_hint: r.participant_id.clone(),
                    fields,
                }
            })
            .collect();
        RawTable { rows }
    }
}

/// Row counts per standardization outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StandardizeReport {
    pub input_rows: usize,
    /// Long rows produced from wide rating columns
    pub melted_rows: usize,
    pub survey_rows: usize,
    pub unknown_version: usize,
    pub unknown_question: usize,
    pub empty_response: usize,
    /// Rating responses that are not finite numbers (kept with no value)
    pub invalid_numeric: usize,
    pub duplicates_removed: usize,
    pub output_rows: usize,
}

/// Fields shared by every long row produced from one raw row
struct RowContext<'a> {
    row: &'a RawRow,
    participant_id: String,
    face_id: String,
    timestamp_raw: String,
    secondary_id: Option<String>,
    reaction_time_ms: Option<f64>,
}

impl RowContext<'_> {
    fn record(
        &self,
        version: Version,
        question: Question,
        response: &str,
        report: &mut StandardizeReport,
    ) -> ResponseRecord {
        let value = if question.is_numeric() {
            let parsed = response.parse::<f64>().ok().filter(|v| v.is_finite());
            if parsed.is_none() {
                report.invalid_numeric += 1;
            }
            parsed
        } else {
            None
        };

        ResponseRecord {
            participant_id: self.participant_id.clone(),
            face_id: self.face_id.clone(),
            version,
            question,
            response: response.to_string(),
            value,
            timestamp: parse_timestamp(&self.timestamp_raw),
            timestamp_raw: self.timestamp_raw.clone(),
            secondary_id: self.secondary_id.clone(),
            reaction_time_ms: self.reaction_time_ms,
            source_file: self.row.source_file.clone(),
            source_modified: self.row.source_modified,
        }
    }
}

/// Standardize a raw table into the canonical long table
pub fn standardize(raw: &RawTable) -> (StandardTable, StandardizeReport) {
    let mut report = StandardizeReport {
        input_rows: raw.len(),
        ..Default::default()
    };

    let mut records = Vec::with_capacity(raw.len());
    for row in &raw.rows {
        standardize_row(row, &mut records, &mut report);
    }

    let records = dedupe(records, &mut report);
    report.output_rows = records.len();

    if report.unknown_version + report.unknown_question > 0 {
        warn!(
            "Dropped {} rows with unknown version and {} with unknown question",
            report.unknown_version, report.unknown_question
        );
    }
    info!(
        "Standardized {} raw rows into {} records ({} duplicates removed)",
        report.input_rows, report.output_rows, report.duplicates_removed
    );

    (StandardTable { records }, report)
}

fn standardize_row(row: &RawRow, out: &mut Vec<ResponseRecord>, report: &mut StandardizeReport) {
    let row_version = match row.get(Column::Version) {
        None => None,
        Some(raw) => match schema::resolve_version(raw) {
            Some(VersionAlias::Condition(v)) => Some(v),
            Some(VersionAlias::Survey) => {
                report.survey_rows += 1;
                return;
            }
            None => {
                debug!("{}: unknown version '{}'", row.source_file, raw);
                report.unknown_version += 1;
                return;
            }
        },
    };

    let participant_id = row
        .get(Column::Pid)
        .filter(|pid| !schema::is_placeholder(pid))
        .unwrap_or(row.participant_hint.as_str())
        .to_string();

    let ctx = RowContext {
        row,
        participant_id,
        face_id: schema::normalize_face_id(row.get(Column::FaceId).unwrap_or("")),
        timestamp_raw: row.get(Column::Timestamp).unwrap_or("").to_string(),
        secondary_id: row.get(Column::SecondaryId).map(str::to_string),
        reaction_time_ms: row
            .get(Column::ReactionTime)
            .and_then(|rt| rt.parse::<f64>().ok())
            .filter(|rt| rt.is_finite()),
    };

    if let Some(raw_question) = row.get(Column::Question) {
        let Some(QuestionAlias { question, side }) = schema::resolve_question(raw_question) else {
            debug!("{}: unknown question '{}'", row.source_file, raw_question);
            report.unknown_question += 1;
            return;
        };
        let Some(response) = row.get(Column::Response) else {
            report.empty_response += 1;
            return;
        };
        let version = row_version.or(side).unwrap_or(Version::Both);
        out.push(ctx.record(version, question, response, report));
        return;
    }

    let mut melted = 0;
    for (alias, response) in row.wide_cells() {
        let version = alias.side.or(row_version).unwrap_or(Version::Both);
        out.push(ctx.record(version, alias.question, response, report));
        melted += 1;
    }

    if melted == 0 {
        report.unknown_question += 1;
    }
    report.melted_rows += melted;
}

/// Last write wins per key, by source modification time then row order.
/// Survivors keep their original relative order.
fn dedupe(records: Vec<ResponseRecord>, report: &mut StandardizeReport) -> Vec<ResponseRecord> {
    let mut winners: HashMap<(&str, &str, Version, Question), (Option<DateTime<Utc>>, usize)> =
        HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let rank = (record.source_modified, index);
        winners
            .entry(record.key())
            .and_modify(|best| {
                if rank > *best {
                    *best = rank;
                }
            })
            .or_insert(rank);
    }

    let keep: Vec<bool> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            winners
                .get(&record.key())
                .map(|(_, winner)| *winner == index)
                .unwrap_or(false)
        })
        .collect();

    report.duplicates_removed = keep.iter().filter(|k| !**k).count();

    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, keep)| keep.then_some(record))
        .collect()
}
