//! Application state and event handlers.
//!
//! `App` owns the engine state (registry, log store, filter and search) and is
//! only mutated from the main loop. Supervisor events arrive through the
//! `on_*` handlers; console commands use the setters.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::error::{Error, Result};
use crate::events::{ProcessOutput, ProcessStatusChange, ProcfileLoaded};
use crate::output::{LogRecord, LogStore};
use crate::registry::{ProcessRegistry, ProcessStatus};
use crate::search::{self, Filter, SearchState, TabFilter};
use crate::view::{self, ProjectOptions, RenderLine, RenderModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusMessage {
    text: String,
    level: StatusLevel,
}

/// The main application state container.
#[derive(Debug)]
pub struct App {
    pub registry: ProcessRegistry,
    pub store: LogStore,
    pub filter: Filter,
    pub search: SearchState,
    /// Attach file references to rendered lines.
    pub linkify: bool,
    pub should_quit: bool,
    procfile: Option<PathBuf>,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(linkify: bool) -> Self {
        Self::with_store(LogStore::default(), linkify)
    }

    pub fn with_store(store: LogStore, linkify: bool) -> Self {
        Self {
            registry: ProcessRegistry::new(),
            store,
            filter: Filter::default(),
            search: SearchState::default(),
            linkify,
            should_quit: false,
            procfile: None,
            status_message: None,
        }
    }

    pub fn procfile(&self) -> Option<&Path> {
        self.procfile.as_deref()
    }

    /// Replaces the process list in one step: registry, buffer, tab, hidden
    /// set and query. A rejected list changes nothing.
    pub fn on_procfile_loaded(&mut self, loaded: ProcfileLoaded) -> Result<()> {
        if let Err(err) = self.registry.load(&loaded.processes) {
            self.report_failure(&err);
            return Err(err);
        }
        self.store.clear();
        self.filter = Filter::default();
        self.search.clear();
        self.procfile = Some(PathBuf::from(&loaded.path));

        let mut message = format!("Loaded {} processes from Procfile", self.registry.len());
        if loaded.env_loaded {
            message.push_str(&format!(" ({} env vars from .env)", loaded.env_count));
        }
        tracing::info!(path = %loaded.path, processes = self.registry.len(), "procfile applied");
        self.set_status_message(message);
        Ok(())
    }

    /// Appends a line of output. Lines from processes outside the registry are
    /// dropped.
    pub fn on_process_output(&mut self, output: ProcessOutput) -> Option<&LogRecord> {
        if !self.registry.contains(&output.name) {
            tracing::debug!(process = %output.name, "dropping output from unknown process");
            return None;
        }
        Some(
            self.store
                .append(&output.name, &output.line, output.is_stderr),
        )
    }

    /// Applies a status change, returning the diagnostic record when the
    /// process crashed.
    pub fn on_process_status(&mut self, change: ProcessStatusChange) -> Option<&LogRecord> {
        match self
            .registry
            .apply_status(&change.name, change.status, change.exit_code)
        {
            Ok(Some(diagnostic)) => Some(self.store.append(&change.name, &diagnostic, true)),
            Ok(None) => None,
            Err(err) if err.is_stale_event() => {
                tracing::debug!("ignoring status event: {err}");
                None
            }
            Err(err) => {
                self.report_failure(&err);
                None
            }
        }
    }

    pub fn is_disabled(&self, name: &str) -> Result<bool> {
        self.registry
            .get(name)
            .map(|entity| entity.status == ProcessStatus::Disabled)
            .ok_or_else(|| Error::unknown_process(name))
    }

    pub fn enable(&mut self, name: &str) -> Result<bool> {
        let changed = self.registry.enable(name)?;
        if changed {
            self.set_status_message(format!("Enabled {}", name));
        }
        Ok(changed)
    }

    pub fn set_tab(&mut self, tab: TabFilter) -> Result<()> {
        if let TabFilter::Process(name) = &tab {
            if !self.registry.contains(name) {
                return Err(Error::unknown_process(name.as_str()));
            }
        }
        self.filter.tab = tab;
        Ok(())
    }

    /// Hides (`hidden = true`) or shows a process on the all tab.
    pub fn set_hidden(&mut self, name: &str, hidden: bool) -> Result<()> {
        if !self.registry.contains(name) {
            return Err(Error::unknown_process(name));
        }
        if self.filter.is_hidden(name) != hidden {
            self.filter.toggle_visibility(name);
        }
        Ok(())
    }

    pub fn set_query(&mut self, query: &str) {
        if query.trim().is_empty() {
            self.search.clear();
        } else {
            self.search.set_query(query);
        }
    }

    /// Whether a freshly appended record shows up under the current filter
    /// and query.
    pub fn is_live_visible(&self, record: &LogRecord) -> bool {
        self.filter.admits(record) && (!self.search.is_active() || self.search.matches(record))
    }

    pub fn render(&self) -> RenderModel {
        view::project(
            &self.registry,
            &self.store,
            &self.filter,
            &self.search,
            self.project_options(),
        )
    }

    /// Render line for a single record under the current tab and query.
    pub fn render_record(&self, record: &LogRecord) -> RenderLine {
        view::render_line(
            &self.registry,
            record,
            self.filter.tab.is_all(),
            self.search.matches(record),
            self.project_options(),
        )
    }

    fn project_options(&self) -> ProjectOptions {
        ProjectOptions {
            linkify: self.linkify,
        }
    }

    pub fn match_count(&self) -> usize {
        search::match_count(&self.store, &self.filter, &self.search)
    }

    pub fn clear_output(&mut self) {
        self.store.clear();
        self.set_status_message("Output cleared");
    }

    /// Writes the escape-free log of the current process tab into `dir`.
    pub fn save_log(&mut self, dir: &Path) -> anyhow::Result<PathBuf> {
        let Some(name) = self.filter.tab.process_name().map(str::to_string) else {
            bail!("switch to a process tab to save its log");
        };
        let content = self.store.export(&name);
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("procrack_{}_{}.txt", sanitize_name(&name), timestamp));
        fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
        self.set_status_message(format!("Log saved to {}", path.display()));
        Ok(path)
    }

    pub fn status_line(&self) -> String {
        let mut line = format!(
            "{}/{} running | tab: {} | lines: {}/{}",
            self.registry.running_count(),
            self.registry.len(),
            self.filter.tab,
            self.store.len(),
            self.store.capacity()
        );
        if !self.filter.hidden.is_empty() {
            let mut hidden: Vec<_> = self.filter.hidden.iter().map(String::as_str).collect();
            hidden.sort_unstable();
            line.push_str(&format!(" | hidden: {}", hidden.join(",")));
        }
        if self.search.is_active() {
            line.push_str(&format!(
                " | search: {:?} ({} matches)",
                self.search.query(),
                self.match_count()
            ));
        }
        line
    }

    /// Turns a failure into error status text.
    pub fn report_failure(&mut self, err: &Error) {
        tracing::warn!("{err}");
        self.set_status_message_with_level(err.to_string(), StatusLevel::Error);
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Info);
    }

    fn set_status_message_with_level(&mut self, message: impl Into<String>, level: StatusLevel) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            level,
        });
    }

    /// Returns and clears the pending status message.
    pub fn take_status(&mut self) -> Option<(String, StatusLevel)> {
        self.status_message
            .take()
            .map(|message| (message.text, message.level))
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
