//! Process identity and lifecycle tracking.
//!
//! The registry holds one `ProcessEntity` per Procfile entry. It is replaced
//! wholesale on every load and only ever mutated through status events and
//! `enable`. Per entity: `stopped <-> running`, `disabled -> stopped`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Display colors assigned to processes by load order.
pub const PALETTE: [(u8, u8, u8); 10] = [
    (0xef, 0x44, 0x44), // red
    (0xf9, 0x73, 0x16), // orange
    (0xea, 0xb3, 0x08), // yellow
    (0x22, 0xc5, 0x5e), // green
    (0x14, 0xb8, 0xa6), // teal
    (0x3b, 0x82, 0xf6), // blue
    (0x63, 0x66, 0xf1), // indigo
    (0xa8, 0x55, 0xf7), // purple
    (0xec, 0x48, 0x99), // pink
    (0x06, 0xb6, 0xd4), // cyan
];

pub const PALETTE_SIZE: usize = PALETTE.len();

/// Lifecycle status of a process as seen by the log engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Stopped,
    Running,
    Disabled,
}

impl ProcessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Running => "running",
            ProcessStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "stopped" => Ok(ProcessStatus::Stopped),
            "running" => Ok(ProcessStatus::Running),
            "disabled" => Ok(ProcessStatus::Disabled),
            _ => Err(format!("invalid process status: {}", value)),
        }
    }
}

/// One entry of a process list handed to `load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDecl {
    pub name: String,
    pub disabled: bool,
}

impl ProcessDecl {
    pub fn new(name: impl Into<String>, disabled: bool) -> Self {
        Self {
            name: name.into(),
            disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEntity {
    pub name: String,
    pub status: ProcessStatus,
    pub color_index: usize,
    /// Exit code recorded by the last `running -> stopped` transition.
    pub last_exit_code: Option<i32>,
}

impl ProcessEntity {
    pub fn is_running(&self) -> bool {
        self.status == ProcessStatus::Running
    }
}

/// Owns every `ProcessEntity` of the currently loaded Procfile.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    entities: Vec<ProcessEntity>,
    index: HashMap<String, usize>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every entity with the given list, in order.
    ///
    /// The list is validated before anything is touched, so a rejected load
    /// leaves the previous registry intact.
    pub fn load(&mut self, processes: &[ProcessDecl]) -> Result<()> {
        if processes.is_empty() {
            return Err(Error::invalid_load("no processes defined"));
        }
        let mut seen = HashSet::new();
        for decl in processes {
            if decl.name.trim().is_empty() {
                return Err(Error::invalid_load("process name is empty"));
            }
            if !seen.insert(decl.name.as_str()) {
                return Err(Error::invalid_load(format!(
                    "duplicate process name: {}",
                    decl.name
                )));
            }
        }

        self.entities = processes
            .iter()
            .enumerate()
            .map(|(idx, decl)| ProcessEntity {
                name: decl.name.clone(),
                status: if decl.disabled {
                    ProcessStatus::Disabled
                } else {
                    ProcessStatus::Stopped
                },
                color_index: idx % PALETTE_SIZE,
                last_exit_code: None,
            })
            .collect();
        self.index = self
            .entities
            .iter()
            .enumerate()
            .map(|(idx, entity)| (entity.name.clone(), idx))
            .collect();
        Ok(())
    }

    /// Applies a status event.
    ///
    /// Returns the diagnostic line to append to the log when a running process
    /// stopped with a nonzero exit code.
    pub fn apply_status(
        &mut self,
        name: &str,
        status: ProcessStatus,
        exit_code: Option<i32>,
    ) -> Result<Option<String>> {
        let entity = self.get_mut(name)?;
        let previous = entity.status;
        if previous == status {
            return Ok(None);
        }
        match (previous, status) {
            (ProcessStatus::Running, ProcessStatus::Stopped) => {
                entity.status = status;
                entity.last_exit_code = exit_code;
                Ok(exit_code
                    .filter(|code| *code != 0)
                    .map(|code| format!("Process exited with code {}", code)))
            }
            (ProcessStatus::Stopped, ProcessStatus::Running) => {
                entity.status = status;
                Ok(None)
            }
            (from, to) => {
                tracing::warn!(process = name, %from, %to, "ignoring illegal status transition");
                Ok(None)
            }
        }
    }

    /// Moves a disabled process to `stopped`. Returns whether anything changed.
    pub fn enable(&mut self, name: &str) -> Result<bool> {
        let entity = self.get_mut(name)?;
        if entity.status != ProcessStatus::Disabled {
            return Ok(false);
        }
        entity.status = ProcessStatus::Stopped;
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<&ProcessEntity> {
        self.index.get(name).map(|idx| &self.entities[*idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_running()).count()
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut ProcessEntity> {
        match self.index.get(name) {
            Some(idx) => Ok(&mut self.entities[*idx]),
            None => Err(Error::unknown_process(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decls(names: &[(&str, bool)]) -> Vec<ProcessDecl> {
        names
            .iter()
            .map(|(name, disabled)| ProcessDecl::new(*name, *disabled))
            .collect()
    }

    fn loaded() -> ProcessRegistry {
        let mut registry = ProcessRegistry::new();
        registry
            .load(&decls(&[("web", false), ("worker", false), ("docs", true)]))
            .unwrap();
        registry
    }

    #[test]
    fn load_assigns_order_colors_and_initial_status() {
        let registry = loaded();
        let names: Vec<_> = registry.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["web", "worker", "docs"]);
        assert_eq!(registry.get("worker").unwrap().color_index, 1);
        assert_eq!(registry.get("web").unwrap().status, ProcessStatus::Stopped);
        assert_eq!(registry.get("docs").unwrap().status, ProcessStatus::Disabled);
    }

    #[test]
    fn color_index_wraps_around_palette() {
        let names: Vec<String> = (0..12).map(|i| format!("p{}", i)).collect();
        let list: Vec<ProcessDecl> = names.iter().map(|n| ProcessDecl::new(n, false)).collect();
        let mut registry = ProcessRegistry::new();
        registry.load(&list).unwrap();
        assert_eq!(registry.get("p10").unwrap().color_index, 0);
        assert_eq!(registry.get("p11").unwrap().color_index, 1);
    }

    #[test]
    fn rejected_load_keeps_previous_state() {
        let mut registry = loaded();
        let err = registry.load(&[]).unwrap_err();
        assert!(matches!(err, Error::InvalidLoad { .. }));
        let err = registry
            .load(&decls(&[("a", false), ("a", true)]))
            .unwrap_err();
        assert_eq!(err, Error::invalid_load("duplicate process name: a"));
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("web"));
    }

    #[test]
    fn crash_produces_diagnostic() {
        let mut registry = loaded();
        registry
            .apply_status("web", ProcessStatus::Running, None)
            .unwrap();
        let diagnostic = registry
            .apply_status("web", ProcessStatus::Stopped, Some(2))
            .unwrap();
        assert_eq!(diagnostic.as_deref(), Some("Process exited with code 2"));
        assert_eq!(registry.get("web").unwrap().last_exit_code, Some(2));
    }

    #[test]
    fn clean_or_manual_stop_has_no_diagnostic() {
        let mut registry = loaded();
        registry.apply_status("web", ProcessStatus::Running, None).unwrap();
        assert_eq!(
            registry.apply_status("web", ProcessStatus::Stopped, Some(0)).unwrap(),
            None
        );
        registry.apply_status("web", ProcessStatus::Running, None).unwrap();
        assert_eq!(
            registry.apply_status("web", ProcessStatus::Stopped, None).unwrap(),
            None
        );
        assert_eq!(registry.get("web").unwrap().last_exit_code, None);
    }

    #[test]
    fn stopped_to_stopped_does_not_record_exit_code() {
        let mut registry = loaded();
        let diagnostic = registry
            .apply_status("web", ProcessStatus::Stopped, Some(1))
            .unwrap();
        assert_eq!(diagnostic, None);
        assert_eq!(registry.get("web").unwrap().last_exit_code, None);
    }

    #[test]
    fn disabled_process_cannot_start() {
        let mut registry = loaded();
        registry
            .apply_status("docs", ProcessStatus::Running, None)
            .unwrap();
        assert_eq!(registry.get("docs").unwrap().status, ProcessStatus::Disabled);
    }

    #[test]
    fn unknown_name_is_reported_without_mutation() {
        let mut registry = loaded();
        let err = registry
            .apply_status("ghost", ProcessStatus::Running, None)
            .unwrap_err();
        assert!(err.is_stale_event());
        assert!(!registry.contains("ghost"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn enable_moves_disabled_to_stopped_once() {
        let mut registry = loaded();
        assert!(registry.enable("docs").unwrap());
        assert_eq!(registry.get("docs").unwrap().status, ProcessStatus::Stopped);
        assert!(!registry.enable("docs").unwrap());
        assert!(!registry.enable("web").unwrap());
        assert!(matches!(
            registry.enable("ghost"),
            Err(Error::UnknownProcess { .. })
        ));
    }

    #[test]
    fn running_count_tracks_status() {
        let mut registry = loaded();
        registry.apply_status("web", ProcessStatus::Running, None).unwrap();
        registry.apply_status("worker", ProcessStatus::Running, None).unwrap();
        assert_eq!(registry.running_count(), 2);
    }

    #[test]
    fn status_parses_wire_names() {
        assert_eq!("running".parse::<ProcessStatus>(), Ok(ProcessStatus::Running));
        assert_eq!("Stopped".parse::<ProcessStatus>(), Ok(ProcessStatus::Stopped));
        assert!("paused".parse::<ProcessStatus>().is_err());
    }
}
