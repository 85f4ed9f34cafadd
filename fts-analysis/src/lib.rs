//! fts-analysis library - facial trust study analysis pipeline
//!
//! Loads participant response CSVs, standardizes them to the canonical long
//! schema, applies exclusion rules and computes the study statistics.
//! `DashboardSession` is the entry point for a single user or request.

pub mod exclusion;
pub mod export;
pub mod loader;
pub mod session;
pub mod standardize;
pub mod stats;

pub use exclusion::{AnnotatedTable, ExclusionEngine, ExclusionSummary};
pub use fts_common::ViewMode;
pub use loader::{DataSummary, DataViewPolicy, ResponseLoader};
pub use session::{run_pipeline, Analysis, DashboardSession, DataAvailability, Overview};
pub use standardize::{standardize, StandardTable, StandardizeReport};
pub use stats::{StatisticalReport, StatisticsEngine};
