//! fts-analysis - command-line front end of the facial trust study pipeline
//!
//! Every subcommand runs one `DashboardSession` over the response directory
//! and prints JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fts_common::config::{resolve_data_dir, AnalysisConfig};
use fts_common::schema::ALIASES;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::filter::Directive;

use fts_analysis::export;
use fts_analysis::loader::DataSummary;
use fts_analysis::session::Overview;
use fts_analysis::standardize::StandardizeReport;
use fts_analysis::{DashboardSession, ViewMode};

#[derive(Parser)]
#[command(name = "fts-analysis", version, about = "Facial trust study analysis")]
struct Cli {
    /// Directory holding participant response CSVs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Which files to analyze: production, test or all
    #[arg(long, global = true, default_value = "production")]
    mode: ViewMode,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dashboard counters and load summary
    Summary,
    /// Exclusion counts per rule and participant
    Exclusions,
    /// Full statistical report
    Stats,
    /// Per-face trust summaries
    Images,
    /// Summaries of complete participants
    Participants,
    /// Write the canonical long CSV
    ExportLong {
        #[arg(long)]
        out: PathBuf,
    },
    /// Write the long CSV with exclusion flags
    ExportCleaned {
        #[arg(long)]
        out: PathBuf,
    },
    /// Write the JSON report
    Report {
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    overview: Overview,
    data: &'a DataSummary,
    standardize: &'a StandardizeReport,
}

#[derive(Serialize)]
struct WriteOutput<'a> {
    path: &'a Path,
    rows: Option<usize>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn init_tracing(log_level: &str) {
    let default: Directive = log_level
        .parse()
        .unwrap_or_else(|_| tracing::Level::INFO.into());

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(default))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AnalysisConfig::load_resolved(cli.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.log_level);

    info!(
        "Starting FTS Analysis (fts-analysis) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    ALIASES.validate().context("Alias table is inconsistent")?;

    let data_dir = resolve_data_dir(cli.data_dir.as_deref(), &config);
    info!("Data directory: {} (mode {})", data_dir.display(), cli.mode);

    let mut session = DashboardSession::new(config, data_dir, cli.mode);

    match cli.command {
        Command::Summary => {
            let overview = session.overview()?;
            let analysis = session.analysis()?;
            print_json(&SummaryOutput {
                overview,
                data: &analysis.summary,
                standardize: &analysis.standardize,
            })?;
        }
        Command::Exclusions => {
            print_json(&session.analysis()?.table.summary)?;
        }
        Command::Stats => {
            print_json(&session.analysis()?.report)?;
        }
        Command::Images => {
            print_json(&session.analysis()?.report.images)?;
        }
        Command::Participants => {
            print_json(&session.analysis()?.report.participants)?;
        }
        Command::ExportLong { out } => {
            let rows = export::export_long(&out, session.analysis()?)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            print_json(&WriteOutput {
                path: &out,
                rows: Some(rows),
            })?;
        }
        Command::ExportCleaned { out } => {
            let rows = export::export_cleaned(&out, session.analysis()?)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            print_json(&WriteOutput {
                path: &out,
                rows: Some(rows),
            })?;
        }
        Command::Report { out } => {
            export::export_report(&out, session.analysis()?)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            print_json(&WriteOutput {
                path: &out,
                rows: None,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fts-analysis",
            "export-long",
            "--out",
            "long.csv",
            "--mode",
            "test",
            "--data-dir",
            "/tmp/responses",
        ])
        .unwrap();
        assert_eq!(cli.mode, ViewMode::Test);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/responses")));
        assert!(matches!(cli.command, Command::ExportLong { .. }));
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["fts-analysis", "--mode", "staging", "summary"]).is_err());
    }
}
