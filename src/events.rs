//! Event definitions for the main loop.
//!
//! Every state change reaches the app as an `Event` drained by a single
//! consumer, so records are appended in arrival order. The payload structs
//! keep the wire names (`process-output`, `process-status`, `procfile-loaded`)
//! so other front ends can consume them as JSON.

use serde::{Deserialize, Serialize};

use crate::registry::{ProcessDecl, ProcessStatus};

/// A line captured from a child's stdout or stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub name: String,
    pub line: String,
    pub is_stderr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatusChange {
    pub name: String,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcfileLoaded {
    pub path: String,
    pub processes: Vec<ProcessDecl>,
    pub env_loaded: bool,
    pub env_count: usize,
}

#[derive(Debug, Clone)]
pub enum Event {
    ProcessOutput(ProcessOutput),
    ProcessStatus(ProcessStatusChange),
    ProcfileLoaded(ProcfileLoaded),
    /// The restart delay after a crash elapsed. `generation` must still match
    /// the supervisor's counter for the restart to go ahead.
    AutoRestart { name: String, generation: u64 },
    /// One line typed on the console.
    Input(String),
    /// Interrupt or end of input.
    Shutdown,
}

impl Event {
    pub fn output(name: impl Into<String>, line: impl Into<String>, is_stderr: bool) -> Self {
        Event::ProcessOutput(ProcessOutput {
            name: name.into(),
            line: line.into(),
            is_stderr,
        })
    }

    pub fn status(name: impl Into<String>, status: ProcessStatus, exit_code: Option<i32>) -> Self {
        Event::ProcessStatus(ProcessStatusChange {
            name: name.into(),
            status,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_payload_uses_wire_names() {
        let raw = r#"{"name":"web","status":"stopped","exit_code":null}"#;
        let change: ProcessStatusChange = serde_json::from_str(raw).unwrap();
        assert_eq!(change.status, ProcessStatus::Stopped);
        assert_eq!(change.exit_code, None);
    }

    #[test]
    fn procfile_loaded_serializes_snake_case() {
        let loaded = ProcfileLoaded {
            path: "/srv/Procfile".into(),
            processes: vec![ProcessDecl::new("web", false)],
            env_loaded: true,
            env_count: 2,
        };
        let json = serde_json::to_value(&loaded).unwrap();
        assert_eq!(json["env_count"], 2);
        assert_eq!(json["processes"][0]["name"], "web");
        assert_eq!(json["processes"][0]["disabled"], false);
    }

    #[test]
    fn output_payload_round_trips() {
        let raw = r#"{"name":"api","line":"\u001b[31mboom","is_stderr":true}"#;
        let output: ProcessOutput = serde_json::from_str(raw).unwrap();
        assert!(output.is_stderr);
        assert_eq!(output.line, "\u{1b}[31mboom");
    }
}
