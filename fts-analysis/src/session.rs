//! Per-user dashboard context
//!
//! A `DashboardSession` holds the view mode and the analysis computed for
//! it. Each user or request gets its own session; nothing is process-wide.

use fts_common::config::AnalysisConfig;
use fts_common::{Error, Question, Result, ViewMode};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::exclusion::{complete_participants_only, AnnotatedTable, ExclusionEngine};
use crate::loader::{DataSummary, DataViewPolicy, FileMetadata, ResponseLoader};
use crate::standardize::{standardize, StandardTable, StandardizeReport};
use crate::stats::descriptive::{mean, std_dev};
use crate::stats::{unique_participants, StatisticalReport, StatisticsEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataAvailability {
    /// Rows are visible in the current mode
    Loaded,
    /// Files exist but none are visible in the current mode
    Empty,
    /// The data directory is missing or holds no CSV files
    NoData,
}

/// One complete pipeline run
#[derive(Debug, Clone)]
pub struct Analysis {
    pub availability: DataAvailability,
    pub summary: DataSummary,
    pub policy: DataViewPolicy,
    /// Files whose rows were analyzed
    pub files: Vec<FileMetadata>,
    pub standardize: StandardizeReport,
    pub table: AnnotatedTable,
    pub report: StatisticalReport,
}

/// Dashboard header counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub mode: ViewMode,
    pub availability: DataAvailability,
    pub total_participants: usize,
    pub included_participants: usize,
    pub complete_participants: usize,
    pub total_responses: usize,
    pub average_trust: Option<f64>,
    pub trust_std: Option<f64>,
    pub raw_rows: usize,
    pub cleaned_rows: usize,
    pub excluded_rows: usize,
    /// Mean file progress of the analyzed files, in [0, 1]
    pub completion_rate: f64,
    pub policy: DataViewPolicy,
}

/// Load, standardize, exclude and analyze `data_dir` in `mode`.
///
/// A missing or CSV-free directory is not an error: it yields an empty
/// analysis marked `NoData`.
pub fn run_pipeline(config: &AnalysisConfig, data_dir: &Path, mode: ViewMode) -> Result<Analysis> {
    let exclusion = ExclusionEngine::new(config)?;
    let statistics = StatisticsEngine::new(config);

    let loaded = match ResponseLoader::new(data_dir, config.expected_total_faces).load(mode) {
        Ok(loaded) => loaded,
        Err(Error::NoData(dir)) => {
            warn!("No response data in {}", dir.display());
            let table = AnnotatedTable::default();
            let report = statistics.report(&table);
            return Ok(Analysis {
                availability: DataAvailability::NoData,
                summary: DataSummary::empty(mode),
                policy: DataViewPolicy {
                    mode,
                    fallback_promoted: false,
                    promoted_files: Vec::new(),
                },
                files: Vec::new(),
                standardize: StandardizeReport::default(),
                table,
                report,
            });
        }
        Err(e) => return Err(e),
    };

    let (standard, standardize_report): (StandardTable, StandardizeReport) = standardize(&loaded.raw);
    let table = exclusion.apply(&standard, &loaded.selected);
    let report = statistics.report(&table);

    let availability = if loaded.raw.is_empty() {
        DataAvailability::Empty
    } else {
        DataAvailability::Loaded
    };

    Ok(Analysis {
        availability,
        summary: loaded.summary,
        policy: loaded.policy,
        files: loaded.selected,
        standardize: standardize_report,
        table,
        report,
    })
}

pub struct DashboardSession {
    config: AnalysisConfig,
    data_dir: PathBuf,
    mode: ViewMode,
    cache: Option<Analysis>,
}

impl DashboardSession {
    pub fn new(config: AnalysisConfig, data_dir: impl Into<PathBuf>, mode: ViewMode) -> Self {
        Self {
            config,
            data_dir: data_dir.into(),
            mode,
            cache: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Switch view mode; a different mode drops the cached analysis
    pub fn set_mode(&mut self, mode: ViewMode) {
        if mode != self.mode {
            info!("View mode {} -> {}", self.mode, mode);
            self.mode = mode;
            self.cache = None;
        }
    }

    /// Drop the cached analysis so the next call rereads the directory
    pub fn refresh(&mut self) {
        self.cache = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Cached analysis for the current mode, computed on first use
    pub fn analysis(&mut self) -> Result<&Analysis> {
        if self.cache.is_none() {
            let analysis = run_pipeline(&self.config, &self.data_dir, self.mode)?;
            self.cache = Some(analysis);
        }
        self.cache
            .as_ref()
            .ok_or_else(|| Error::Internal("analysis cache empty after load".to_string()))
    }

    pub fn overview(&mut self) -> Result<Overview> {
        let mode = self.mode;
        let analysis = self.analysis()?;
        let summary = &analysis.table.summary;

        let included: Vec<_> = analysis.table.included().collect();
        let trust: Vec<f64> = included
            .iter()
            .filter(|r| r.question == Question::TrustRating)
            .filter_map(|r| r.value)
            .collect();

        let progress: Vec<f64> = analysis
            .files
            .iter()
            .map(|f| f.progress_percent / 100.0)
            .collect();

        Ok(Overview {
            mode,
            availability: analysis.availability,
            total_participants: summary.total_participants,
            included_participants: summary.included_participants,
            complete_participants: unique_participants(&complete_participants_only(&analysis.table))
                .len(),
            total_responses: analysis.table.records.len(),
            average_trust: mean(&trust),
            trust_std: std_dev(&trust),
            raw_rows: summary.total_raw_rows,
            cleaned_rows: summary.total_cleaned_rows,
            excluded_rows: summary.excluded_rows,
            completion_rate: mean(&progress).unwrap_or(0.0),
            policy: analysis.policy.clone(),
        })
    }
}
