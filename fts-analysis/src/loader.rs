//! Response directory loader
//!
//! Scans one directory of participant CSV files, resolves who each file
//! belongs to, classifies test files and picks the file that represents each
//! participant. The rows of the picked files form the raw table handed to
//! the standardizer.

use chrono::{DateTime, NaiveDateTime, Utc};
use fts_common::schema::{self, Column};
use fts_common::time::{parse_timestamp, system_time_to_utc};
use fts_common::{Error, Result, ViewMode};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Filename fragments marking test sessions (matched case-insensitively)
const TEST_MARKERS: &[&str] = &["_test", "-test", " test"];
const TEST_KEYWORDS: &[&str] = &["prolific_test", "testparticipant", "test_stat", "testdata"];

/// One CSV row with its cells mapped onto canonical columns
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub source_file: String,
    pub source_modified: Option<DateTime<Utc>>,
    /// Participant id resolved for the whole file
    pub participant_hint: String,
    /// Recognized cells in header order; unrecognized headers are dropped
    pub fields: Vec<(Column, String)>,
}

impl RawRow {
    /// First non-empty value for `column` in header order
    pub fn get(&self, column: Column) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(c, _)| *c == column)
            .map(|(_, v)| v.trim())
            .find(|v| !v.is_empty())
    }

    /// Non-empty wide rating cells
    pub fn wide_cells(&self) -> impl Iterator<Item = (schema::QuestionAlias, &str)> + '_ {
        self.fields.iter().filter_map(|(c, v)| match c {
            Column::Wide(alias) if !v.trim().is_empty() => Some((*alias, v.trim())),
            _ => None,
        })
    }
}

/// Concatenated rows of every selected file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-file facts gathered while loading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub participant_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
    pub is_test: bool,
    pub complete: bool,
    pub completed_faces: usize,
    pub total_faces: usize,
    pub progress_percent: f64,
    pub row_count: usize,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
}

/// File that could not be read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
}

/// How the view mode was applied to the selected files
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataViewPolicy {
    pub mode: ViewMode,
    /// PRODUCTION had no real files, so test files are shown instead
    pub fallback_promoted: bool,
    pub promoted_files: Vec<String>,
}

/// Load counters for the dashboard header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub mode: ViewMode,
    pub total_rows: usize,
    /// Participants whose selected file is not a test file
    pub real_participants: usize,
    /// Distinct participants visible in the current mode
    pub visible_participants: usize,
    /// Selected test files, one per test participant
    pub test_files: usize,
    pub real_files: Vec<String>,
    pub test_files_list: Vec<String>,
    pub fallback_promoted: bool,
    pub skipped_files: Vec<SkippedFile>,
}

impl DataSummary {
    pub fn empty(mode: ViewMode) -> Self {
        Self {
            mode,
            total_rows: 0,
            real_participants: 0,
            visible_participants: 0,
            test_files: 0,
            real_files: Vec::new(),
            test_files_list: Vec::new(),
            fallback_promoted: false,
            skipped_files: Vec::new(),
        }
    }
}

/// Result of one directory load
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub raw: RawTable,
    /// Every readable file
    pub files: Vec<FileMetadata>,
    /// Files whose rows are in `raw`
    pub selected: Vec<FileMetadata>,
    pub policy: DataViewPolicy,
    pub summary: DataSummary,
}

impl LoadedDataset {
    /// Whether rows from `source_file` come from a test-flagged file
    pub fn is_test_source(&self, source_file: &str) -> bool {
        self.files
            .iter()
            .any(|f| f.file_name == source_file && f.is_test)
    }
}

/// Whether a file name marks a test session
pub fn is_test_file(file_name: &str) -> bool {
    let lowered = file_name.to_lowercase();
    lowered.starts_with("test")
        || TEST_MARKERS.iter().any(|m| lowered.contains(m))
        || TEST_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Participant token derived from a file name: first `_` segment of the stem
pub fn participant_from_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    match stem.split('_').next() {
        Some(segment) if !segment.trim().is_empty() => segment.trim().to_string(),
        _ => stem,
    }
}

/// One parsed file before selection
struct ParsedFile {
    meta: FileMetadata,
    rows: Vec<RawRow>,
}

/// Loader for one response directory
pub struct ResponseLoader {
    data_dir: PathBuf,
    expected_total_faces: usize,
}

impl ResponseLoader {
    pub fn new(data_dir: impl Into<PathBuf>, expected_total_faces: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            expected_total_faces,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `*.csv` files directly inside the data directory, sorted by name
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.data_dir.is_dir() {
            return Err(Error::NoData(self.data_dir.clone()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.data_dir).min_depth(1).max_depth(1) {
            match entry {
                Ok(entry) => {
                    let is_csv = entry
                        .path()
                        .extension()
                        .map(|e| e.eq_ignore_ascii_case("csv"))
                        .unwrap_or(false);
                    if entry.file_type().is_file() && is_csv {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => warn!("Error accessing entry in {}: {}", self.data_dir.display(), e),
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(Error::NoData(self.data_dir.clone()));
        }
        Ok(files)
    }

    /// Load every file, select one file per participant and apply `mode`
    pub fn load(&self, mode: ViewMode) -> Result<LoadedDataset> {
        let paths = self.discover()?;
        info!("Found {} CSV files in {}", paths.len(), self.data_dir.display());

        let mut parsed = Vec::new();
        let mut skipped = Vec::new();
        for path in &paths {
            match self.read_file(path) {
                Ok(file) => parsed.push(file),
                Err(e) => {
                    let file_name = file_name_of(path);
                    warn!("Skipping {}: {}", file_name, e);
                    skipped.push(SkippedFile {
                        file_name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let chosen = select_per_participant(&parsed);
        let (visible, policy) = apply_mode(&parsed, &chosen, mode);

        let mut raw = RawTable::default();
        let mut selected = Vec::new();
        for index in &visible {
            let file = &parsed[*index];
            raw.rows.extend(file.rows.iter().cloned());
            selected.push(file.meta.clone());
        }

        let representatives: Vec<&FileMetadata> =
            chosen.iter().map(|i| &parsed[*i].meta).collect();
        let summary = summarize(mode, &representatives, &selected, &raw, &policy, skipped);
        let files: Vec<FileMetadata> = parsed.into_iter().map(|p| p.meta).collect();

        info!(
            "Loaded {} rows from {} of {} files (mode {})",
            raw.len(),
            selected.len(),
            files.len(),
            mode
        );

        Ok(LoadedDataset {
            raw,
            files,
            selected,
            policy,
            summary,
        })
    }

    fn read_file(&self, path: &Path) -> Result<ParsedFile> {
        let file_name = file_name_of(path);
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(system_time_to_utc);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let columns: Vec<Option<Column>> = reader
            .headers()?
            .iter()
            .map(schema::canonical_column)
            .collect();

        let mut cells = Vec::new();
        for record in reader.records() {
            let record = record?;
            let fields: Vec<(Column, String)> = columns
                .iter()
                .zip(record.iter())
                .filter_map(|(column, value)| column.map(|c| (c, value.to_string())))
                .collect();
            cells.push(fields);
        }

        let participant_id = resolve_participant(&cells, &file_name);
        let is_test = is_test_file(&file_name);

        let faces: HashSet<String> = cells
            .iter()
            .filter_map(|fields| first_value(fields, Column::FaceId))
            .map(schema::normalize_face_id)
            .filter(|f| !f.is_empty())
            .collect();

        let timestamps: Vec<NaiveDateTime> = cells
            .iter()
            .filter_map(|fields| first_value(fields, Column::Timestamp))
            .filter_map(parse_timestamp)
            .collect();

        let total = self.expected_total_faces;
        let completed = faces.len();
        let progress_percent = if total == 0 {
            0.0
        } else {
            completed.min(total) as f64 / total as f64 * 100.0
        };

        debug!(
            "{}: participant {} ({} rows, {}/{} faces{})",
            file_name,
            participant_id,
            cells.len(),
            completed,
            total,
            if is_test { ", test" } else { "" }
        );

        let meta = FileMetadata {
            participant_id: participant_id.clone(),
            file_name: file_name.clone(),
            path: path.to_path_buf(),
            modified,
            is_test,
            complete: total > 0 && completed >= total,
            completed_faces: completed,
            total_faces: total,
            progress_percent,
            row_count: cells.len(),
            first_timestamp: timestamps.iter().min().copied(),
            last_timestamp: timestamps.iter().max().copied(),
        };

        let rows = cells
            .into_iter()
            .map(|fields| RawRow {
                source_file: file_name.clone(),
                source_modified: modified,
                participant_hint: participant_id.clone(),
                fields,
            })
            .collect();

        Ok(ParsedFile { meta, rows })
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn first_value(fields: &[(Column, String)], column: Column) -> Option<&str> {
    fields
        .iter()
        .filter(|(c, _)| *c == column)
        .map(|(_, v)| v.trim())
        .find(|v| !v.is_empty())
}

/// Explicit id column, then secondary identity, then the file name
fn resolve_participant(cells: &[Vec<(Column, String)>], file_name: &str) -> String {
    for column in [Column::Pid, Column::SecondaryId] {
        let found = cells
            .iter()
            .flat_map(|fields| fields.iter())
            .filter(|(c, _)| *c == column)
            .map(|(_, v)| v.trim())
            .find(|v| !schema::is_placeholder(v));
        if let Some(id) = found {
            return id.to_string();
        }
    }
    participant_from_file_name(file_name)
}

/// Index of the representative file per participant: the latest complete
/// file when there is one, otherwise the latest file.
fn select_per_participant(parsed: &[ParsedFile]) -> Vec<usize> {
    let mut latest: BTreeMap<&str, usize> = BTreeMap::new();
    let mut latest_complete: BTreeMap<&str, usize> = BTreeMap::new();

    let newer = |a: &ParsedFile, b: &ParsedFile| {
        (a.meta.modified, &a.meta.file_name) > (b.meta.modified, &b.meta.file_name)
    };

    for (index, file) in parsed.iter().enumerate() {
        let pid = file.meta.participant_id.as_str();
        let slot = latest.entry(pid).or_insert(index);
        if newer(file, &parsed[*slot]) {
            *slot = index;
        }
        if file.meta.complete {
            let slot = latest_complete.entry(pid).or_insert(index);
            if newer(file, &parsed[*slot]) {
                *slot = index;
            }
        }
    }

    let mut chosen: Vec<usize> = latest
        .iter()
        .map(|(pid, index)| latest_complete.get(pid).copied().unwrap_or(*index))
        .collect();
    chosen.sort_unstable();
    chosen
}

fn apply_mode(
    parsed: &[ParsedFile],
    chosen: &[usize],
    mode: ViewMode,
) -> (Vec<usize>, DataViewPolicy) {
    let visible: Vec<usize> = chosen
        .iter()
        .copied()
        .filter(|i| mode.admits(parsed[*i].meta.is_test))
        .collect();

    let mut policy = DataViewPolicy {
        mode,
        fallback_promoted: false,
        promoted_files: Vec::new(),
    };

    if mode == ViewMode::Production && visible.is_empty() {
        let promoted: Vec<usize> = chosen
            .iter()
            .copied()
            .filter(|i| parsed[*i].meta.is_test)
            .collect();
        if !promoted.is_empty() {
            policy.fallback_promoted = true;
            policy.promoted_files = promoted
                .iter()
                .map(|i| parsed[*i].meta.file_name.clone())
                .collect();
            warn!(
                "No production files found; showing {} test files instead",
                promoted.len()
            );
            return (promoted, policy);
        }
    }

    (visible, policy)
}

/// `representatives` holds one file per participant; superseded files are
/// not counted
fn summarize(
    mode: ViewMode,
    representatives: &[&FileMetadata],
    selected: &[FileMetadata],
    raw: &RawTable,
    policy: &DataViewPolicy,
    skipped_files: Vec<SkippedFile>,
) -> DataSummary {
    let real_files: Vec<String> = representatives
        .iter()
        .filter(|f| !f.is_test)
        .map(|f| f.file_name.clone())
        .collect();
    let test_files_list: Vec<String> = representatives
        .iter()
        .filter(|f| f.is_test)
        .map(|f| f.file_name.clone())
        .collect();
    let visible_participants = selected
        .iter()
        .map(|f| f.participant_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    DataSummary {
        mode,
        total_rows: raw.len(),
        real_participants: representatives
            .iter()
            .filter(|f| !f.is_test)
            .map(|f| f.participant_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
        visible_participants,
        test_files: test_files_list.len(),
        real_files,
        test_files_list,
        fallback_promoted: policy.fallback_promoted,
        skipped_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const HEADER: &str = "pid,face_id,version,question,response,timestamp\n";

    fn write(dir: &Path, name: &str, body: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    fn faces(pid: &str, count: usize) -> String {
        let mut body = HEADER.to_string();
        for n in 1..=count {
            body.push_str(&format!(
                "{pid},Face ({n}),both,trust_rating,4,2024-01-01T12:00:0{}\n",
                n % 10
            ));
        }
        body
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file("TEST_007_20240101_120000.csv"));
        assert!(is_test_file("p12_test.csv"));
        assert!(is_test_file("run-test-3.csv"));
        assert!(is_test_file("my test run.csv"));
        assert!(is_test_file("Prolific_Test_abc.csv"));
        assert!(is_test_file("export_testdata.csv"));
        assert!(!is_test_file("12345_20240101.csv"));
        assert!(!is_test_file("contest.csv"));
    }

    #[test]
    fn test_participant_from_file_name() {
        assert_eq!(participant_from_file_name("abc123_20240101.csv"), "abc123");
        assert_eq!(participant_from_file_name("plain.csv"), "plain");
        assert_eq!(participant_from_file_name("_odd.csv"), "_odd");
    }

    #[test]
    fn test_missing_directory_is_no_data() {
        let temp = TempDir::new().unwrap();
        let loader = ResponseLoader::new(temp.path().join("absent"), 35);
        assert!(matches!(loader.load(ViewMode::All), Err(Error::NoData(_))));
    }

    #[test]
    fn test_directory_without_csv_is_no_data() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes.txt"), "hello").unwrap();
        let loader = ResponseLoader::new(temp.path(), 35);
        assert!(matches!(loader.load(ViewMode::All), Err(Error::NoData(_))));
    }

    #[test]
    fn test_participant_resolution_order() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "fromfile_1.csv",
            "pid,prolific_pid,face_id,version,question,response\n\
             unknown,PROL1,1,both,trust,3\n",
            10,
        );
        write(
            temp.path(),
            "filename_2.csv",
            "pid,face_id,version,question,response\nnan,1,both,trust,3\n",
            10,
        );
        write(
            temp.path(),
            "whatever.CSV",
            "participant_id,face_id,version,question,response\n,1,both,trust,3\n777,2,both,trust,3\n",
            10,
        );

        let data = ResponseLoader::new(temp.path(), 35).load(ViewMode::All).unwrap();
        let pids: Vec<&str> = data.files.iter().map(|f| f.participant_id.as_str()).collect();
        assert_eq!(pids, vec!["filename", "PROL1", "777"]);
        assert!(data.raw.rows.iter().all(|r| !r.participant_hint.is_empty()));
    }

    #[test]
    fn test_metadata_progress() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "p1_a.csv", &faces("p1", 7), 10);

        let data = ResponseLoader::new(temp.path(), 35).load(ViewMode::All).unwrap();
        let meta = &data.files[0];
        assert_eq!(meta.completed_faces, 7);
        assert_eq!(meta.row_count, 7);
        assert!(!meta.complete);
        assert!((meta.progress_percent - 20.0).abs() < 1e-9);
        assert!(meta.first_timestamp.unwrap() <= meta.last_timestamp.unwrap());
    }

    #[test]
    fn test_selection_prefers_latest_complete_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "p1_old.csv", &faces("p1", 3), 300);
        write(temp.path(), "p1_full.csv", &faces("p1", 3), 200);
        write(temp.path(), "p1_new.csv", &faces("p1", 2), 100);

        let data = ResponseLoader::new(temp.path(), 3).load(ViewMode::All).unwrap();
        assert_eq!(data.selected.len(), 1);
        assert_eq!(data.selected[0].file_name, "p1_full.csv");
        assert!(data.raw.rows.iter().all(|r| r.source_file == "p1_full.csv"));
    }

    #[test]
    fn test_selection_falls_back_to_latest_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "p1_old.csv", &faces("p1", 1), 300);
        write(temp.path(), "p1_new.csv", &faces("p1", 2), 100);

        let data = ResponseLoader::new(temp.path(), 35).load(ViewMode::All).unwrap();
        assert_eq!(data.selected.len(), 1);
        assert_eq!(data.selected[0].file_name, "p1_new.csv");
        assert_eq!(data.raw.len(), 2);
    }

    #[test]
    fn test_mode_filtering() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "101_a.csv", &faces("101", 2), 10);
        write(temp.path(), "test_b.csv", &faces("T1", 2), 10);

        let loader = ResponseLoader::new(temp.path(), 35);

        let production = loader.load(ViewMode::Production).unwrap();
        assert_eq!(production.selected.len(), 1);
        assert!(!production.selected[0].is_test);
        assert!(!production.policy.fallback_promoted);

        let test = loader.load(ViewMode::Test).unwrap();
        assert_eq!(test.selected.len(), 1);
        assert!(test.selected[0].is_test);

        let all = loader.load(ViewMode::All).unwrap();
        assert_eq!(all.selected.len(), 2);
        assert_eq!(all.summary.real_participants, 1);
        assert_eq!(all.summary.test_files, 1);
        assert_eq!(all.summary.visible_participants, 2);
    }

    #[test]
    fn test_superseded_files_are_not_counted() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "101_a.csv", &faces("101", 1), 300);
        write(temp.path(), "101_b.csv", &faces("101", 2), 200);
        write(temp.path(), "101_c.csv", &faces("101", 3), 100);
        write(temp.path(), "test_x.csv", &faces("T1", 1), 200);
        write(temp.path(), "test_y.csv", &faces("T1", 2), 100);

        let data = ResponseLoader::new(temp.path(), 35)
            .load(ViewMode::Production)
            .unwrap();
        assert_eq!(data.files.len(), 5);
        assert_eq!(data.summary.real_participants, 1);
        assert_eq!(data.summary.visible_participants, 1);
        assert_eq!(data.summary.test_files, 1);
        assert_eq!(data.summary.real_files, vec!["101_c.csv".to_string()]);
        assert_eq!(data.summary.test_files_list, vec!["test_y.csv".to_string()]);
    }

    #[test]
    fn test_production_promotes_test_files_when_alone() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "test_b.csv", &faces("T1", 2), 10);

        let data = ResponseLoader::new(temp.path(), 35)
            .load(ViewMode::Production)
            .unwrap();
        assert!(data.policy.fallback_promoted);
        assert_eq!(data.policy.promoted_files, vec!["test_b.csv".to_string()]);
        assert!(data.summary.fallback_promoted);
        assert_eq!(data.raw.len(), 2);
    }

    #[test]
    fn test_test_mode_without_test_files_is_empty_not_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "101_a.csv", &faces("101", 2), 10);

        let data = ResponseLoader::new(temp.path(), 35).load(ViewMode::Test).unwrap();
        assert!(data.raw.is_empty());
        assert!(data.selected.is_empty());
        assert_eq!(data.summary.real_participants, 1);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "101_a.csv", &faces("101", 2), 10);
        fs::write(temp.path().join("broken.csv"), [0xff, 0xfe, b',', 0xff, b'\n', 0xfd]).unwrap();

        let data = ResponseLoader::new(temp.path(), 35).load(ViewMode::All).unwrap();
        assert_eq!(data.files.len(), 1);
        assert_eq!(data.summary.skipped_files.len(), 1);
        assert_eq!(data.summary.skipped_files[0].file_name, "broken.csv");
    }

    #[test]
    fn test_header_aliases_and_first_non_empty_wins() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "p9_x.csv",
            "\u{feff}Participant ID,pid,Face Number,comments\n,p9,Face ID (4),hi\n",
            10,
        );

        let data = ResponseLoader::new(temp.path(), 35).load(ViewMode::All).unwrap();
        let row = &data.raw.rows[0];
        assert_eq!(row.get(Column::Pid), Some("p9"));
        assert_eq!(row.get(Column::FaceId), Some("Face ID (4)"));
        assert_eq!(row.fields.len(), 3);
    }
}
