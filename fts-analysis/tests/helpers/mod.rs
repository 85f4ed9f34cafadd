//! Test Helper Utilities
//!
//! Scratch response directories for the pipeline tests

use std::fs;
use std::path::Path;

pub const LONG_HEADER: &str = "pid,face_id,version,question,response,timestamp";

/// One canonical long row: pid, face, version, question, response
pub type Row<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);

/// Write a long-format CSV with a fixed timestamp on every row
pub fn write_long_csv(dir: &Path, file_name: &str, rows: &[Row<'_>]) {
    let mut body = format!("{}\n", LONG_HEADER);
    for (pid, face, version, question, response) in rows {
        body.push_str(&format!(
            "{},{},{},{},{},2024-01-01T12:00:00\n",
            pid, face, version, question, response
        ));
    }
    fs::write(dir.join(file_name), body).unwrap();
}

/// The ten answers of one face: 2 left, 2 right, 6 full-face
pub fn complete_face<'a>(pid: &'a str, face: &'a str, trust_full: &'a str) -> Vec<Row<'a>> {
    vec![
        (pid, face, "left", "trust_rating", "3"),
        (pid, face, "left", "emotion_rating", "4"),
        (pid, face, "right", "trust_rating", "4"),
        (pid, face, "right", "emotion_rating", "3"),
        (pid, face, "both", "trust_rating", trust_full),
        (pid, face, "both", "emotion_rating", "4"),
        (pid, face, "both", "masc_choice", "left"),
        (pid, face, "both", "fem_choice", "right"),
        (pid, face, "both", "masculinity_full", "5"),
        (pid, face, "both", "femininity_full", "3"),
    ]
}
