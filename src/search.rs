//! Filtering and contextual search over the log store.
//!
//! The visible subsequence is the store filtered by the active tab and the
//! hidden-process set. With a query active, only matching records and the
//! `CONTEXT_RADIUS` records around each match are shown; non-adjacent groups
//! are separated by a gap marker.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::output::{LogRecord, LogStore};

/// Records shown on each side of a match.
pub const CONTEXT_RADIUS: usize = 2;

/// Which slice of the multiplexed log is being looked at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "name")]
pub enum TabFilter {
    #[default]
    All,
    Process(String),
}

impl TabFilter {
    pub fn is_all(&self) -> bool {
        matches!(self, TabFilter::All)
    }

    pub fn process_name(&self) -> Option<&str> {
        match self {
            TabFilter::All => None,
            TabFilter::Process(name) => Some(name),
        }
    }
}

impl fmt::Display for TabFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabFilter::All => f.write_str("all"),
            TabFilter::Process(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub tab: TabFilter,
    pub hidden: HashSet<String>,
}

impl Filter {
    /// Whether a record belongs to the visible subsequence.
    pub fn admits(&self, record: &LogRecord) -> bool {
        if self.hidden.contains(&record.process_name) {
            return false;
        }
        match &self.tab {
            TabFilter::All => true,
            TabFilter::Process(name) => record.process_name == *name,
        }
    }

    /// Hides a visible process or shows a hidden one. Returns the new hidden state.
    pub fn toggle_visibility(&mut self, name: &str) -> bool {
        if self.hidden.remove(name) {
            false
        } else {
            self.hidden.insert(name.to_string());
            true
        }
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.contains(name)
    }
}

/// The active query. Empty means no search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    query: String,
    needle: String,
}

impl SearchState {
    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.needle = query.to_lowercase();
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.needle.clear();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_active(&self) -> bool {
        !self.needle.is_empty()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        self.is_active() && record.matches(&self.needle)
    }
}

/// One row of the search result.
#[derive(Debug, Clone, Copy)]
pub enum DisplayEntry<'a> {
    Record { record: &'a LogRecord, is_match: bool },
    Gap,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult<'a> {
    pub entries: Vec<DisplayEntry<'a>>,
    /// Set when a query is active and nothing matched.
    pub no_matches: bool,
    /// Size of the visible subsequence before the query was applied.
    pub visible: usize,
}

/// Records that pass the tab and visibility filter, in store order.
pub fn filtered<'a>(store: &'a LogStore, filter: &Filter) -> Vec<&'a LogRecord> {
    store.iter().filter(|record| filter.admits(record)).collect()
}

/// Positions within `records` that match the query.
pub fn match_indices(records: &[&LogRecord], search: &SearchState) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| search.matches(record))
        .map(|(idx, _)| idx)
        .collect()
}

/// Merges `[m - radius, m + radius]` windows around each match into inclusive
/// ranges clamped to `len`. Overlapping or touching windows coalesce.
pub fn context_windows(matches: &[usize], len: usize, radius: usize) -> Vec<(usize, usize)> {
    let mut windows: Vec<(usize, usize)> = Vec::new();
    if len == 0 {
        return windows;
    }
    for &idx in matches {
        let start = idx.saturating_sub(radius);
        let end = (idx + radius).min(len - 1);
        match windows.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => windows.push((start, end)),
        }
    }
    windows
}

pub fn search<'a>(store: &'a LogStore, filter: &Filter, state: &SearchState) -> SearchResult<'a> {
    let records = filtered(store, filter);
    let visible = records.len();

    if !state.is_active() {
        let entries = records
            .into_iter()
            .map(|record| DisplayEntry::Record {
                record,
                is_match: false,
            })
            .collect();
        return SearchResult {
            entries,
            no_matches: false,
            visible,
        };
    }

    let matches = match_indices(&records, state);
    if matches.is_empty() {
        return SearchResult {
            entries: Vec::new(),
            no_matches: true,
            visible,
        };
    }

    let mut entries = Vec::new();
    for (window_idx, (start, end)) in context_windows(&matches, visible, CONTEXT_RADIUS)
        .into_iter()
        .enumerate()
    {
        if window_idx > 0 {
            entries.push(DisplayEntry::Gap);
        }
        for record in &records[start..=end] {
            entries.push(DisplayEntry::Record {
                record,
                is_match: state.matches(record),
            });
        }
    }
    SearchResult {
        entries,
        no_matches: false,
        visible,
    }
}

/// Number of visible records matching the query; zero when no query is active.
pub fn match_count(store: &LogStore, filter: &Filter, state: &SearchState) -> usize {
    if !state.is_active() {
        return 0;
    }
    store
        .iter()
        .filter(|record| filter.admits(record) && state.matches(record))
        .count()
}
