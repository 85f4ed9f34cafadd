//! CSV and JSON exports
//!
//! The long CSV layout is consumed by SPSS/R scripts; its header and column
//! order never change.

use fts_common::schema::LONG_HEADER;
use fts_common::{ResponseRecord, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::exclusion::{AnnotatedRecord, ExclusionSummary};
use crate::loader::DataSummary;
use crate::session::Analysis;
use crate::standardize::StandardizeReport;
use crate::stats::StatisticalReport;

const FLAG_COLUMNS: [&str; 8] = [
    "source_file",
    "duplicate_session",
    "low_completion",
    "failed_attention",
    "device_violation",
    "fast_rt",
    "slow_rt",
    "include_in_primary",
];

fn long_fields(r: &ResponseRecord) -> [&str; 6] {
    [
        r.participant_id.as_str(),
        r.face_id.as_str(),
        r.version.as_str(),
        r.question.as_str(),
        r.response.as_str(),
        r.timestamp_raw.as_str(),
    ]
}

/// Canonical long CSV: `pid,face_id,version,question,response,timestamp`
pub fn write_long_csv<'a, W: Write>(
    writer: W,
    records: impl IntoIterator<Item = &'a ResponseRecord>,
) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(LONG_HEADER)?;

    let mut rows = 0;
    for record in records {
        csv.write_record(long_fields(record))?;
        rows += 1;
    }
    csv.flush()?;
    Ok(rows)
}

/// Long CSV plus source file and exclusion flags
pub fn write_cleaned_csv<'a, W: Write>(
    writer: W,
    records: impl IntoIterator<Item = &'a AnnotatedRecord>,
) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(LONG_HEADER.iter().chain(FLAG_COLUMNS.iter()))?;

    let flag = |b: bool| if b { "true" } else { "false" };
    let mut rows = 0;
    for annotated in records {
        let r = &annotated.record;
        let f = &annotated.flags;
        let tail = [
            r.source_file.as_str(),
            flag(f.duplicate_session),
            flag(f.low_completion),
            flag(f.failed_attention),
            flag(f.device_violation),
            flag(f.fast_rt),
            flag(f.slow_rt),
            flag(annotated.include_in_primary),
        ];
        csv.write_record(long_fields(r).iter().chain(tail.iter()))?;
        rows += 1;
    }
    csv.flush()?;
    Ok(rows)
}

/// Everything written by `report --out`
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub data_summary: &'a DataSummary,
    pub standardize: &'a StandardizeReport,
    pub exclusions: &'a ExclusionSummary,
    pub statistics: &'a StatisticalReport,
}

impl<'a> JsonReport<'a> {
    pub fn from_analysis(analysis: &'a Analysis) -> Self {
        Self {
            data_summary: &analysis.summary,
            standardize: &analysis.standardize,
            exclusions: &analysis.table.summary,
            statistics: &analysis.report,
        }
    }
}

pub fn write_json_report<W: Write>(writer: W, report: &JsonReport<'_>) -> Result<()> {
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

pub fn export_long(path: &Path, analysis: &Analysis) -> Result<usize> {
    let file = BufWriter::new(File::create(path)?);
    let rows = write_long_csv(file, analysis.table.records.iter().map(|a| &a.record))?;
    info!("Wrote {} rows to {}", rows, path.display());
    Ok(rows)
}

pub fn export_cleaned(path: &Path, analysis: &Analysis) -> Result<usize> {
    let file = BufWriter::new(File::create(path)?);
    let rows = write_cleaned_csv(file, &analysis.table.records)?;
    info!("Wrote {} annotated rows to {}", rows, path.display());
    Ok(rows)
}

pub fn export_report(path: &Path, analysis: &Analysis) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write_json_report(&mut file, &JsonReport::from_analysis(analysis))?;
    file.flush()?;
    info!("Wrote report to {}", path.display());
    Ok(())
}
