//! Projection of engine state into a render model.
//!
//! `project` is a pure function of the registry, the store, the filter and the
//! search state. Front ends either walk the model directly (the console does)
//! or serialize it to JSON.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::ansi::StyledRun;
use crate::output::{FileReference, LogRecord, LogStore};
use crate::registry::ProcessRegistry;
use crate::search::{self, DisplayEntry, Filter, SearchState, TabFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectOptions {
    /// Attach extracted file references to each line.
    pub linkify: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderLine {
    pub sequence: u64,
    pub process_name: String,
    pub color_index: usize,
    pub show_prefix: bool,
    pub is_error: bool,
    pub is_match: bool,
    pub timestamp: DateTime<Local>,
    pub runs: Vec<StyledRun>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_refs: Vec<FileReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RenderItem {
    Line(RenderLine),
    Gap,
}

/// Why the item list is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Placeholder {
    NoProcfile,
    EmptyBuffer,
    NothingVisible,
    NoMatches,
}

impl Placeholder {
    pub fn message(self) -> &'static str {
        match self {
            Placeholder::NoProcfile => "No Procfile loaded. Use `load <path>` to open one.",
            Placeholder::EmptyBuffer => "No output to display.",
            Placeholder::NothingVisible => "No output for the current tab.",
            Placeholder::NoMatches => "No matching lines.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderModel {
    pub tab: TabFilter,
    pub items: Vec<RenderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Placeholder>,
    /// Present only while a query is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
    pub running: usize,
    pub total: usize,
}

impl RenderModel {
    pub fn lines(&self) -> impl Iterator<Item = &RenderLine> {
        self.items.iter().filter_map(|item| match item {
            RenderItem::Line(line) => Some(line),
            RenderItem::Gap => None,
        })
    }

    /// File references in display order, as addressed by `open <n>`.
    pub fn file_refs(&self) -> impl Iterator<Item = (&RenderLine, &FileReference)> {
        self.lines()
            .flat_map(|line| line.file_refs.iter().map(move |r| (line, r)))
    }
}

/// Builds the render line for a single record.
pub fn render_line(
    registry: &ProcessRegistry,
    record: &LogRecord,
    show_prefix: bool,
    is_match: bool,
    options: ProjectOptions,
) -> RenderLine {
    RenderLine {
        sequence: record.sequence,
        process_name: record.process_name.clone(),
        color_index: registry
            .get(&record.process_name)
            .map(|entity| entity.color_index)
            .unwrap_or_default(),
        show_prefix,
        is_error: record.is_error,
        is_match,
        timestamp: record.timestamp,
        runs: record.runs().to_vec(),
        file_refs: if options.linkify {
            record.file_refs().to_vec()
        } else {
            Vec::new()
        },
    }
}

pub fn project(
    registry: &ProcessRegistry,
    store: &LogStore,
    filter: &Filter,
    state: &SearchState,
    options: ProjectOptions,
) -> RenderModel {
    let result = search::search(store, filter, state);
    let show_prefix = filter.tab.is_all();

    let mut match_count = 0;
    let items: Vec<RenderItem> = result
        .entries
        .iter()
        .map(|entry| match entry {
            DisplayEntry::Gap => RenderItem::Gap,
            DisplayEntry::Record { record, is_match } => {
                if *is_match {
                    match_count += 1;
                }
                RenderItem::Line(render_line(registry, record, show_prefix, *is_match, options))
            }
        })
        .collect();

    let placeholder = if !items.is_empty() {
        None
    } else if registry.is_empty() && store.is_empty() {
        Some(Placeholder::NoProcfile)
    } else if store.is_empty() {
        Some(Placeholder::EmptyBuffer)
    } else if result.no_matches && result.visible > 0 {
        Some(Placeholder::NoMatches)
    } else {
        Some(Placeholder::NothingVisible)
    };

    RenderModel {
        tab: filter.tab.clone(),
        items,
        placeholder,
        match_count: state.is_active().then_some(match_count),
        running: registry.running_count(),
        total: registry.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ProcessDecl, ProcessStatus};

    fn fixture() -> (ProcessRegistry, LogStore) {
        let mut registry = ProcessRegistry::new();
        registry
            .load(&[ProcessDecl::new("web", false), ProcessDecl::new("worker", false)])
            .unwrap();
        registry
            .apply_status("web", ProcessStatus::Running, None)
            .unwrap();
        let mut store = LogStore::new(100);
        store.append("web", "\u{1b}[32mlistening\u{1b}[0m on :3000", false);
        store.append("worker", "loaded jobs/email.rb:12", false);
        store.append("worker", "boom", true);
        (registry, store)
    }

    #[test]
    fn projection_is_deterministic() {
        let (registry, store) = fixture();
        let mut state = SearchState::default();
        state.set_query("o");
        let options = ProjectOptions { linkify: true };
        let first = project(&registry, &store, &Filter::default(), &state, options);
        let second = project(&registry, &store, &Filter::default(), &state, options);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn lines_carry_prefix_and_colors_on_all_tab() {
        let (registry, store) = fixture();
        let model = project(
            &registry,
            &store,
            &Filter::default(),
            &SearchState::default(),
            ProjectOptions::default(),
        );
        let lines: Vec<_> = model.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.show_prefix));
        assert_eq!(lines[1].color_index, 1);
        assert!(lines[2].is_error);
        assert!(lines[1].file_refs.is_empty());
        assert_eq!(model.match_count, None);
        assert_eq!((model.running, model.total), (1, 2));
        assert_eq!(model.placeholder, None);
    }

    #[test]
    fn process_tab_hides_prefix() {
        let (registry, store) = fixture();
        let filter = Filter {
            tab: TabFilter::Process("worker".into()),
            ..Filter::default()
        };
        let model = project(
            &registry,
            &store,
            &filter,
            &SearchState::default(),
            ProjectOptions::default(),
        );
        assert_eq!(model.lines().count(), 2);
        assert!(model.lines().all(|line| !line.show_prefix));
    }

    #[test]
    fn linkify_attaches_file_references() {
        let (registry, store) = fixture();
        let model = project(
            &registry,
            &store,
            &Filter::default(),
            &SearchState::default(),
            ProjectOptions { linkify: true },
        );
        let refs: Vec<_> = model.file_refs().map(|(_, r)| r.location()).collect();
        assert_eq!(refs, vec!["jobs/email.rb:12"]);
    }

    #[test]
    fn match_counter_only_with_query() {
        let (registry, store) = fixture();
        let mut state = SearchState::default();
        state.set_query("BOOM");
        let model = project(
            &registry,
            &store,
            &Filter::default(),
            &state,
            ProjectOptions::default(),
        );
        assert_eq!(model.match_count, Some(1));
        let matched: Vec<_> = model.lines().filter(|l| l.is_match).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].sequence, 2);
    }

    #[test]
    fn placeholders_explain_empty_lists() {
        let empty = ProcessRegistry::new();
        let store = LogStore::new(10);
        let state = SearchState::default();
        let options = ProjectOptions::default();
        let model = project(&empty, &store, &Filter::default(), &state, options);
        assert_eq!(model.placeholder, Some(Placeholder::NoProcfile));

        let (registry, mut store) = fixture();
        let mut cleared = LogStore::new(10);
        let model = project(&registry, &cleared, &Filter::default(), &state, options);
        assert_eq!(model.placeholder, Some(Placeholder::EmptyBuffer));

        cleared.append("web", "x", false);
        let mut filter = Filter::default();
        filter.toggle_visibility("web");
        let model = project(&registry, &cleared, &filter, &state, options);
        assert_eq!(model.placeholder, Some(Placeholder::NothingVisible));
        let mut searching = SearchState::default();
        searching.set_query("x");
        let model = project(&registry, &cleared, &filter, &searching, options);
        assert_eq!(model.placeholder, Some(Placeholder::NothingVisible));

        store.append("web", "more", false);
        let mut state = SearchState::default();
        state.set_query("nothing like this");
        let model = project(&registry, &store, &Filter::default(), &state, options);
        assert_eq!(model.placeholder, Some(Placeholder::NoMatches));
        assert_eq!(model.match_count, Some(0));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let (registry, store) = fixture();
        let model = project(
            &registry,
            &store,
            &Filter::default(),
            &SearchState::default(),
            ProjectOptions::default(),
        );
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["items"][0]["type"], "line");
        assert_eq!(json["items"][0]["processName"], "web");
        assert_eq!(json["items"][0]["runs"][0]["color"], "green");
        assert!(json.get("matchCount").is_none());
    }
}
