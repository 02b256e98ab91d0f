//! Persistent user configuration.
//!
//! Settings live in `settings.toml` as a flat string table and the recent
//! project list in `recent_projects.json`, both under `<config_dir>/procrack`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const MAX_RECENT_PROJECTS: usize = 10;

/// Setting holding the editor command used by `open`. Setting it enables
/// file reference extraction in the view.
pub const TEXT_EDITOR_KEY: &str = "textEditor";

const SETTINGS_FILE: &str = "settings.toml";
const RECENT_FILE: &str = "recent_projects.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Stores `value`; an empty value removes the key.
    pub fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value.to_string());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn text_editor(&self) -> Option<&str> {
        self.get(TEXT_EDITOR_KEY).filter(|value| !value.trim().is_empty())
    }
}

/// Reads and writes the files under one configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir().context("could not determine config directory")?;
        Ok(Self::new(base.join("procrack")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_settings(&self) -> Result<Settings> {
        let path = self.dir.join(SETTINGS_FILE);
        let Some(raw) = read_optional(&path)? else {
            return Ok(Settings::default());
        };
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn save_setting(&self, key: &str, value: &str) -> Result<Settings> {
        let mut settings = self.load_settings().unwrap_or_else(|err| {
            tracing::warn!("discarding unreadable settings: {err:#}");
            Settings::default()
        });
        settings.set(key, value);
        let raw = toml::to_string(&settings).context("failed to serialize settings")?;
        self.write(SETTINGS_FILE, &raw)?;
        Ok(settings)
    }

    /// Most recent first. A corrupt file reads as an empty list.
    pub fn recent_projects(&self) -> Result<Vec<String>> {
        let path = self.dir.join(RECENT_FILE);
        let Some(raw) = read_optional(&path)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(projects) => Ok(projects),
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring corrupt recent projects: {err}");
                Ok(Vec::new())
            }
        }
    }

    /// Moves `project` to the front of the list, dropping duplicates and
    /// anything past the cap.
    pub fn add_recent_project(&self, project: &str) -> Result<Vec<String>> {
        let mut projects: Vec<String> = self
            .recent_projects()?
            .into_iter()
            .filter(|existing| existing != project)
            .collect();
        projects.insert(0, project.to_string());
        projects.truncate(MAX_RECENT_PROJECTS);
        let raw = serde_json::to_string_pretty(&projects)
            .context("failed to serialize recent projects")?;
        self.write(RECENT_FILE, &raw)?;
        Ok(projects)
    }

    fn write(&self, file: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(file);
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_read_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("procrack"));
        assert_eq!(store.load_settings().unwrap(), Settings::default());
        assert!(store.recent_projects().unwrap().is_empty());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        store.save_setting(TEXT_EDITOR_KEY, "code").unwrap();
        store.save_setting("theme", "dark").unwrap();
        let settings = store.load_settings().unwrap();
        assert_eq!(settings.text_editor(), Some("code"));
        assert_eq!(settings.get("theme"), Some("dark"));

        let raw = fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap();
        assert!(raw.contains("textEditor = \"code\""));
    }

    #[test]
    fn empty_value_removes_setting() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        store.save_setting(TEXT_EDITOR_KEY, "subl").unwrap();
        let settings = store.save_setting(TEXT_EDITOR_KEY, "").unwrap();
        assert_eq!(settings.text_editor(), None);
    }

    #[test]
    fn recent_projects_are_most_recent_first_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        store.add_recent_project("/test/project1/Procfile").unwrap();
        store.add_recent_project("/test/project2/Procfile").unwrap();
        store.add_recent_project("/test/project3/Procfile").unwrap();
        let projects = store.add_recent_project("/test/project1/Procfile").unwrap();
        assert_eq!(
            projects,
            vec![
                "/test/project1/Procfile",
                "/test/project3/Procfile",
                "/test/project2/Procfile",
            ]
        );
        assert_eq!(store.recent_projects().unwrap(), projects);
    }

    #[test]
    fn recent_projects_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        for i in 0..15 {
            store.add_recent_project(&format!("/p{}/Procfile", i)).unwrap();
        }
        let projects = store.recent_projects().unwrap();
        assert_eq!(projects.len(), MAX_RECENT_PROJECTS);
        assert_eq!(projects[0], "/p14/Procfile");
    }

    #[test]
    fn corrupt_recent_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RECENT_FILE), "{not json").unwrap();
        let store = ConfigStore::new(dir.path());
        assert!(store.recent_projects().unwrap().is_empty());
    }
}
