//! Persistence layer for the harness's input and output files.
//!
//! Inputs: seed queries (one per line), the gold set and the corpus (JSON
//! Lines), and saved ranked lists (JSON). Outputs: the gold set, ranked lists
//! and evaluation reports in CSV or JSON.

use crate::document::{Corpus, CorpusEntry, RankedList};
use crate::error::{EvalError, Result};
use crate::eval::{EvalReport, MetricRow};
use crate::gold::{GoldRecord, check_unique_queries};
use crate::retrieval::parse_search_body;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Label of the aggregate row in CSV reports.
pub const MEAN_ROW_LABEL: &str = "MEAN";

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// One row per query plus a mean row.
    Csv,
    /// The full report, including skipped queries.
    Json,
}

impl ReportFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => ReportFormat::Csv,
            _ => ReportFormat::Json, // Default to JSON
        }
    }
}

fn require_input(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(EvalError::Configuration(format!(
            "{} not found at '{}'",
            what,
            path.display()
        )))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| EvalError::io(path, e))
}

/// Load seed queries, one per non-blank line.
pub fn load_seed_queries(path: &Path) -> Result<Vec<String>> {
    require_input(path, "Seed query file")?;
    Ok(read_lines(path)?
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// Load the gold set from JSON Lines.
pub fn load_gold(path: &Path) -> Result<Vec<GoldRecord>> {
    require_input(path, "Gold set")?;

    let mut records = Vec::new();
    for (number, line) in read_lines(path)?.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: GoldRecord = serde_json::from_str(line).map_err(|e| {
            EvalError::Serialization(format!("{}:{}: {}", path.display(), number + 1, e))
        })?;
        records.push(record);
    }

    check_unique_queries(&records)?;
    Ok(records)
}

/// Write the gold set as JSON Lines, replacing any previous file.
pub fn save_gold(records: &[GoldRecord], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n").map_err(|e| EvalError::io(path, e))?;
    }
    writer.flush().map_err(|e| EvalError::io(path, e))
}

/// Corpus files under `path`: the file itself, or every `.jsonl`/`.json`
/// file below a directory in sorted order.
fn corpus_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("jsonl" | "json")))
        .collect();
    files.sort();
    files
}

/// Load the corpus lookup table. Malformed lines are skipped with a warning.
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    require_input(path, "Corpus")?;

    let mut corpus = Corpus::new();
    for file in corpus_files(path) {
        debug!(file = %file.display(), "loading corpus file");
        for (number, line) in read_lines(&file)?.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CorpusEntry>(line) {
                Ok(entry) => corpus.add_entry(entry),
                Err(e) => warn!("Skipping {}:{}: {}", file.display(), number + 1, e),
            }
        }
    }

    if corpus.is_empty() {
        return Err(EvalError::Configuration(format!(
            "Corpus at '{}' has no sections",
            path.display()
        )));
    }
    Ok(corpus)
}

/// Load a ranked list saved by this tool or captured from a search endpoint.
pub fn load_ranked_list(path: &Path) -> Result<RankedList> {
    require_input(path, "Ranked list")?;
    let body = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

    if let Ok(list) = serde_json::from_str::<RankedList>(&body) {
        return Ok(list);
    }

    let value: serde_json::Value = serde_json::from_str(&body)?;
    let query = value.get("query").and_then(|q| q.as_str()).unwrap_or_default();
    parse_search_body(query, &body)
}

/// Save a ranked list as pretty JSON.
pub fn save_ranked_list(list: &RankedList, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let data = serde_json::to_string_pretty(list)?;
    fs::write(path, data).map_err(|e| EvalError::io(path, e))
}

/// Save a report in the format implied by the extension.
pub fn save_report<T: MetricRow + Serialize>(report: &EvalReport<T>, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    match ReportFormat::from_path(path) {
        ReportFormat::Json => {
            let data = serde_json::to_string_pretty(report)?;
            fs::write(path, data).map_err(|e| EvalError::io(path, e))
        }
        ReportFormat::Csv => save_report_csv(report, path),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn save_report_csv<T: MetricRow>(report: &EvalReport<T>, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    let csv_err = |e: csv::Error| EvalError::Serialization(format!("{}: {}", path.display(), e));

    let mut header = vec!["query".to_string()];
    header.extend(T::metric_names().iter().map(|s| s.to_string()));
    header.extend(T::text_names().iter().map(|s| s.to_string()));
    writer.write_record(&header).map_err(csv_err)?;

    for record in &report.records {
        let mut row = vec![record.query().to_string()];
        row.extend(record.metric_values().into_iter().map(format_value));
        row.extend(record.text_values());
        writer.write_record(&row).map_err(csv_err)?;
    }

    let mut mean_row = vec![MEAN_ROW_LABEL.to_string()];
    mean_row.extend(report.mean_row().into_iter().map(format_value));
    mean_row.extend(T::text_names().iter().map(|_| String::new()));
    writer.write_record(&mean_row).map_err(csv_err)?;

    writer.flush().map_err(|e| EvalError::io(path, e))
}
