//! Multiplexed log storage.
//!
//! Every output line from every process lands in a single `LogStore`, a
//! fixed-capacity ring ordered by arrival. Each record is scanned once at
//! append time: the styled runs, the escape-stripped text used by search and
//! any file references found in the visible text are cached on the record.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use strip_ansi_escapes::strip;

use crate::ansi::{scan_line, strip_escapes, StyledRun};

/// Global record cap shared by all processes.
pub const MAX_RECORDS: usize = 10_000;

/// A single line of output, immutable once appended.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub process_name: String,
    pub raw_text: String,
    pub is_error: bool,
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    runs: Vec<StyledRun>,
    file_refs: Vec<FileReference>,
    folded: String,
}

impl LogRecord {
    fn new(process_name: &str, raw_text: &str, is_error: bool, sequence: u64) -> Self {
        let runs = scan_line(raw_text);
        let file_refs = extract_file_references(&runs);
        let folded = strip_escapes(raw_text).to_lowercase();
        Self {
            process_name: process_name.to_string(),
            raw_text: raw_text.to_string(),
            is_error,
            sequence,
            timestamp: Local::now(),
            runs,
            file_refs,
            folded,
        }
    }

    pub fn runs(&self) -> &[StyledRun] {
        &self.runs
    }

    pub fn file_refs(&self) -> &[FileReference] {
        &self.file_refs
    }

    /// Case-insensitive substring test against the visible text.
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        self.folded.contains(needle)
    }
}

#[derive(Debug, Clone)]
pub struct LogStore {
    capacity: usize,
    records: VecDeque<LogRecord>,
    next_sequence: u64,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(MAX_RECORDS)
    }
}

impl LogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::with_capacity(capacity.min(1024)),
            next_sequence: 0,
        }
    }

    /// Appends a record, evicting the oldest one when the store is full.
    pub fn append(&mut self, process_name: &str, text: &str, is_error: bool) -> &LogRecord {
        let record = LogRecord::new(process_name, text, is_error, self.next_sequence);
        self.next_sequence += 1;
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        &self.records[self.records.len() - 1]
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.next_sequence = 0;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    /// The most recently appended record.
    pub fn last(&self) -> Option<&LogRecord> {
        self.records.back()
    }

    /// Escape-free text of one process's records, one line each.
    pub fn export(&self, process_name: &str) -> String {
        self.records
            .iter()
            .filter(|record| record.process_name == process_name)
            .map(|record| sanitize_text(&record.raw_text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Removes terminal control sequences for plain-text output.
pub fn sanitize_text(text: &str) -> String {
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Byte range of a reference inside one styled run's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpanRef {
    pub run: usize,
    pub start: usize,
    pub end: usize,
}

/// A `path[:line[:col]]` token found in output text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReference {
    pub path: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub span: SpanRef,
}

impl FileReference {
    /// Joins a relative path onto `base`; absolute paths are returned as-is.
    pub fn resolve(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        if let Some(rest) = self.path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        base.join(path)
    }

    /// `path:line:col` as printed in the source output.
    pub fn location(&self) -> String {
        match (self.line, self.column) {
            (Some(line), Some(col)) => format!("{}:{}:{}", self.path, line, col),
            (Some(line), None) => format!("{}:{}", self.path, line),
            _ => self.path.clone(),
        }
    }
}

static FILE_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"((?:~/|\.{1,2}/|/)?(?:[\w.\-]+/)*[\w.\-]*\w\.[A-Za-z][\w]*)(?::(\d+)(?::(\d+))?)?",
    )
    .expect("file reference regex is valid")
});

/// Finds file references in each run's text independently.
///
/// Matches directly preceded by `:` or `/` are tails of URLs and skipped.
pub fn extract_file_references(runs: &[StyledRun]) -> Vec<FileReference> {
    let mut refs = Vec::new();
    for (run_idx, run) in runs.iter().enumerate() {
        for caps in FILE_REF_PATTERN.captures_iter(&run.text) {
            let (Some(full), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let preceded_by = run.text[..full.start()].chars().next_back();
            if matches!(preceded_by, Some(':') | Some('/')) {
                continue;
            }
            refs.push(FileReference {
                path: path.as_str().to_string(),
                line: caps.get(2).and_then(|m| m.as_str().parse().ok()),
                column: caps.get(3).and_then(|m| m.as_str().parse().ok()),
                span: SpanRef {
                    run: run_idx,
                    start: full.start(),
                    end: full.end(),
                },
            });
        }
    }
    refs
}
