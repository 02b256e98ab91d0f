//! Console rendering of log lines and views.
//!
//! Lines are rebuilt from their styled runs, so what the console prints is
//! exactly what the render model describes.

use std::fmt::Write as _;

use chrono::{DateTime, Local};

use crate::ansi::{unescape_html, StyledRun};
use crate::registry::{ProcessRegistry, PALETTE, PALETTE_SIZE};
use crate::view::{RenderItem, RenderLine, RenderModel};

const RESET: &str = "\u{1b}[0m";
pub const GAP_MARKER: &str = "  ···";

#[derive(Debug, Clone, Copy)]
pub struct Printer {
    pub timestamps: bool,
    pub color: bool,
}

impl Printer {
    pub fn new(timestamps: bool, color: bool) -> Self {
        Self { timestamps, color }
    }

    pub fn format_line(&self, line: &RenderLine, marker: Option<char>) -> String {
        let mut out = String::new();
        if let Some(marker) = marker {
            out.push(marker);
            out.push(' ');
        }
        if self.timestamps {
            out.push_str(&format_timestamp(&line.timestamp));
            out.push(' ');
        }
        if line.show_prefix {
            out.push_str(&self.prefix(&line.process_name, line.color_index));
        }
        out.push_str(&self.runs(&line.runs));
        out
    }

    /// Prints the whole model: gap markers between groups, `>` before matches.
    pub fn format_model(&self, model: &RenderModel) -> Vec<String> {
        if let Some(placeholder) = model.placeholder {
            return vec![placeholder.message().to_string()];
        }
        let searching = model.match_count.is_some();
        let mut lines: Vec<String> = model
            .items
            .iter()
            .map(|item| match item {
                RenderItem::Gap => GAP_MARKER.to_string(),
                RenderItem::Line(line) => {
                    let marker = searching.then_some(if line.is_match { '>' } else { ' ' });
                    self.format_line(line, marker)
                }
            })
            .collect();
        if let Some(count) = model.match_count {
            lines.push(format!("{} matches", count));
        }
        lines
    }

    pub fn format_status(&self, registry: &ProcessRegistry) -> Vec<String> {
        registry
            .iter()
            .map(|entity| {
                let mut line = format!(
                    "{}{}",
                    self.prefix(&entity.name, entity.color_index),
                    entity.status
                );
                if let Some(code) = entity.last_exit_code {
                    let _ = write!(line, " (last exit {})", code);
                }
                line
            })
            .collect()
    }

    fn prefix(&self, name: &str, color_index: usize) -> String {
        if !self.color {
            return format!("[{}] ", name);
        }
        let (r, g, b) = PALETTE[color_index % PALETTE_SIZE];
        format!("\u{1b}[38;2;{};{};{}m[{}]{} ", r, g, b, name, RESET)
    }

    fn runs(&self, runs: &[StyledRun]) -> String {
        let mut out = String::new();
        for run in runs {
            let text = unescape_html(&run.text);
            if !self.color || run.is_plain() {
                out.push_str(&text);
                continue;
            }
            let params: Vec<String> = run.sgr_params().iter().map(u8::to_string).collect();
            let _ = write!(out, "\u{1b}[{}m{}{}", params.join(";"), text, RESET);
        }
        out
    }
}

fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::LogStore;
    use crate::registry::ProcessDecl;
    use crate::search::{Filter, SearchState};
    use crate::view::{project, ProjectOptions};

    fn model(query: &str) -> RenderModel {
        let mut registry = ProcessRegistry::new();
        registry
            .load(&[ProcessDecl::new("web", false), ProcessDecl::new("db", false)])
            .unwrap();
        let mut store = LogStore::new(100);
        store.append("web", "\u{1b}[31mfail\u{1b}[0m <init>", true);
        for i in 0..6 {
            store.append("db", &format!("row {}", i), false);
        }
        store.append("web", "fail again", false);
        let mut search = SearchState::default();
        search.set_query(query);
        project(
            &registry,
            &store,
            &Filter::default(),
            &search,
            ProjectOptions::default(),
        )
    }

    #[test]
    fn plain_output_unescapes_text() {
        let printer = Printer::new(false, false);
        let lines = printer.format_model(&model(""));
        assert_eq!(lines[0], "[web] fail <init>");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn colored_output_reapplies_styles() {
        let printer = Printer::new(false, true);
        let lines = printer.format_model(&model(""));
        assert_eq!(
            lines[0],
            "\u{1b}[38;2;239;68;68m[web]\u{1b}[0m \u{1b}[31mfail\u{1b}[0m <init>"
        );
    }

    #[test]
    fn search_view_marks_matches_and_gaps() {
        let printer = Printer::new(false, false);
        let lines = printer.format_model(&model("fail"));
        assert_eq!(
            lines,
            vec![
                "> [web] fail <init>",
                "  [db] row 0",
                "  [db] row 1",
                GAP_MARKER,
                "  [db] row 4",
                "  [db] row 5",
                "> [web] fail again",
                "2 matches",
            ]
        );
    }

    #[test]
    fn placeholder_is_printed_alone() {
        let printer = Printer::new(true, false);
        let lines = printer.format_model(&model("nothing"));
        assert_eq!(lines, vec!["No matching lines."]);
    }

    #[test]
    fn status_lists_processes() {
        let mut registry = ProcessRegistry::new();
        registry.load(&[ProcessDecl::new("web", false)]).unwrap();
        let lines = Printer::new(false, false).format_status(&registry);
        assert_eq!(lines, vec!["[web] stopped"]);
    }
}
