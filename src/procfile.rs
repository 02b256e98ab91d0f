//! Procfile and `.env` parsing.
//!
//! A Procfile is a list of `name: command` lines. Commented entries of the same
//! shape (`# name: command`) declare disabled processes, which can be
//! re-enabled by uncommenting them in place.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::registry::ProcessDecl;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub name: String,
    pub command: String,
    pub disabled: bool,
}

impl ProcessDefinition {
    pub fn decl(&self) -> ProcessDecl {
        ProcessDecl::new(self.name.clone(), self.disabled)
    }
}

/// Parses Procfile content into definitions.
///
/// Active entries come first in file order, followed by commented entries
/// whose name is not already taken. Each name appears at most once.
pub fn parse_procfile(content: &str) -> Vec<ProcessDefinition> {
    let mut definitions = Vec::new();
    let mut seen = HashSet::new();

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, command)) = split_entry(line) {
            if seen.insert(name.to_string()) {
                definitions.push(ProcessDefinition {
                    name: name.to_string(),
                    command: command.to_string(),
                    disabled: false,
                });
            } else {
                tracing::warn!(process = name, "duplicate Procfile entry ignored");
            }
        }
    }

    for line in content.lines().map(str::trim) {
        let Some(body) = line.strip_prefix('#') else {
            continue;
        };
        if let Some((name, command)) = split_entry(body.trim()) {
            if seen.insert(name.to_string()) {
                definitions.push(ProcessDefinition {
                    name: name.to_string(),
                    command: command.to_string(),
                    disabled: true,
                });
            }
        }
    }

    definitions
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let (name, command) = line.split_once(':')?;
    let (name, command) = (name.trim(), command.trim());
    if name.is_empty() || command.is_empty() {
        return None;
    }
    Some((name, command))
}

pub fn read_procfile(path: &Path) -> Result<Vec<ProcessDefinition>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read Procfile {}", path.display()))?;
    Ok(parse_procfile(&raw))
}

/// Uncomments the first disabled entry for `name`, keeping its indentation.
pub fn enable_in_procfile(content: &str, name: &str) -> Result<String> {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    let mut found = false;

    for line in lines.iter_mut() {
        let trimmed = line.trim_start();
        let Some(body) = trimmed.strip_prefix('#') else {
            continue;
        };
        let matches_name = split_entry(body.trim()).is_some_and(|(entry, _)| entry == name);
        if matches_name {
            let indent = &line[..line.len() - trimmed.len()];
            *line = format!("{}{}", indent, body.trim_start());
            found = true;
            break;
        }
    }

    if !found {
        bail!("process {} not found as disabled", name);
    }
    Ok(lines.join("\n"))
}

/// Rewrites the Procfile at `path` with `name` enabled.
pub fn enable_in_file(path: &Path, name: &str) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read Procfile {}", path.display()))?;
    let updated = enable_in_procfile(&raw, name)?;
    fs::write(path, updated)
        .with_context(|| format!("failed to write Procfile {}", path.display()))?;
    Ok(())
}

/// Parses `KEY=VALUE` lines. Blank keys are ignored; later keys win.
pub fn parse_env(content: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        env.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    env
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// The `.env` file next to a Procfile, if there is one.
pub fn find_env_file(procfile: &Path) -> Option<PathBuf> {
    let dir = procfile.parent().unwrap_or_else(|| Path::new("."));
    let candidate = dir.join(".env");
    candidate.is_file().then_some(candidate)
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read env file {}", path.display()))?;
    Ok(parse_env(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_active_entries() {
        let content = "# Test Procfile\nalpha: echo A\nbeta: echo B\ngamma: echo C\n";
        let defs = parse_procfile(content);
        let pairs: Vec<_> = defs
            .iter()
            .map(|d| (d.name.as_str(), d.command.as_str(), d.disabled))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("alpha", "echo A", false),
                ("beta", "echo B", false),
                ("gamma", "echo C", false),
            ]
        );
    }

    #[test]
    fn skips_blank_lines_and_plain_comments() {
        let content = "\n# This is a comment\nweb: echo web\n\n# Another comment\nworker: echo worker\n\n";
        assert_eq!(parse_procfile(content).len(), 2);
    }

    #[test]
    fn command_keeps_later_colons() {
        let defs = parse_procfile("web: python -m http.server --bind 0.0.0.0:8000");
        assert_eq!(defs[0].command, "python -m http.server --bind 0.0.0.0:8000");
    }

    #[test]
    fn commented_entries_become_disabled() {
        let content = "web: npm start\n# docs: mkdocs serve\n#web: old command\n# docs: duplicate\n";
        let defs = parse_procfile(content);
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[1].name, "docs");
        assert_eq!(defs[1].command, "mkdocs serve");
        assert!(defs[1].disabled);
        assert!(!defs[0].disabled);
        assert_eq!(defs[0].command, "npm start");
    }

    #[test]
    fn duplicate_active_names_keep_first() {
        let defs = parse_procfile("web: one\nweb: two\n");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].command, "one");
    }

    #[test]
    fn enable_uncomments_and_keeps_indent() {
        let content = "web: npm start\n  # docs: mkdocs serve\n";
        let updated = enable_in_procfile(content, "docs").unwrap();
        assert_eq!(updated, "web: npm start\n  docs: mkdocs serve\n");
        let defs = parse_procfile(&updated);
        assert!(defs.iter().all(|d| !d.disabled));
    }

    #[test]
    fn enable_fails_for_missing_entry() {
        let err = enable_in_procfile("web: npm start\n", "docs").unwrap_err();
        assert!(err.to_string().contains("docs"));
    }

    #[test]
    fn enable_in_file_rewrites_procfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Procfile");
        fs::write(&path, "web: a\n#worker: b\n").unwrap();
        enable_in_file(&path, "worker").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "web: a\nworker: b\n");
    }

    #[test]
    fn parses_env_with_quotes() {
        let env = parse_env(
            "# comment\nPORT=3000\nNAME=\"my app\"\nTOKEN='abc=def'\n=skipped\nBROKEN\nEMPTY=\n",
        );
        assert_eq!(env.get("PORT").map(String::as_str), Some("3000"));
        assert_eq!(env.get("NAME").map(String::as_str), Some("my app"));
        assert_eq!(env.get("TOKEN").map(String::as_str), Some("abc=def"));
        assert_eq!(env.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(env.len(), 4);
    }

    #[test]
    fn finds_env_next_to_procfile() {
        let dir = tempfile::tempdir().unwrap();
        let procfile = dir.path().join("Procfile");
        fs::write(&procfile, "web: a\n").unwrap();
        assert_eq!(find_env_file(&procfile), None);
        fs::write(dir.path().join(".env"), "A=1\n").unwrap();
        assert_eq!(find_env_file(&procfile), Some(dir.path().join(".env")));
        let env = read_env_file(&dir.path().join(".env")).unwrap();
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
    }
}
