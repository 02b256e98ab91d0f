//! Process execution and supervision.
//!
//! `ProcessManager` spawns Procfile commands through `sh -c`, forwards their
//! output line by line and reports lifecycle changes as events. It owns no
//! log state; everything it learns goes through the event channel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::events::{Event, ProcfileLoaded};
use crate::procfile::{self, ProcessDefinition};
use crate::registry::ProcessStatus;

pub const AUTO_RESTART_DELAY: Duration = Duration::from_secs(2);
pub const AUTO_RESTART_MESSAGE: &str = "Auto-restarting process...";
const STOP_GRACE: Duration = Duration::from_millis(100);
const REAP_TIMEOUT: Duration = Duration::from_millis(500);

/// Manages the lifecycle and I/O of child processes.
pub struct ProcessManager {
    event_tx: mpsc::UnboundedSender<Event>,
    procfile: Option<PathBuf>,
    definitions: Vec<ProcessDefinition>,
    env: HashMap<String, String>,
    running: HashMap<String, Child>,
    // Bumped on every start or stop so stale restart timers are ignored.
    generations: HashMap<String, u64>,
    auto_restart: bool,
    restart_delay: Duration,
}

impl ProcessManager {
    pub fn new(event_tx: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            event_tx,
            procfile: None,
            definitions: Vec::new(),
            env: HashMap::new(),
            running: HashMap::new(),
            generations: HashMap::new(),
            auto_restart: true,
            restart_delay: AUTO_RESTART_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn procfile(&self) -> Option<&Path> {
        self.procfile.as_deref()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains_key(name)
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    /// Reads a Procfile and its `.env`, then announces the new process list.
    ///
    /// Processes whose name survives keep running and are re-announced as
    /// running after the load; the rest are stopped first.
    pub async fn load_procfile(&mut self, path: &Path) -> Result<ProcfileLoaded> {
        let path = std::path::absolute(path)
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        let definitions = procfile::read_procfile(&path)?;
        if definitions.is_empty() {
            bail!("no processes defined in {}", path.display());
        }
        let env = match procfile::find_env_file(&path) {
            Some(env_path) => procfile::read_env_file(&env_path).unwrap_or_else(|err| {
                tracing::warn!("ignoring unreadable env file: {err:#}");
                HashMap::new()
            }),
            None => HashMap::new(),
        };

        let removed: Vec<String> = self
            .running
            .keys()
            .filter(|name| {
                !definitions
                    .iter()
                    .any(|def| def.name == **name && !def.disabled)
            })
            .cloned()
            .collect();
        for name in removed {
            self.stop_process(&name).await?;
        }

        self.procfile = Some(path.clone());
        self.definitions = definitions;
        self.env = env;

        let loaded = ProcfileLoaded {
            path: path.display().to_string(),
            processes: self.definitions.iter().map(ProcessDefinition::decl).collect(),
            env_loaded: !self.env.is_empty(),
            env_count: self.env.len(),
        };
        tracing::info!(
            path = %loaded.path,
            processes = loaded.processes.len(),
            env = loaded.env_count,
            "procfile loaded"
        );
        self.send(Event::ProcfileLoaded(loaded.clone()));
        for def in &self.definitions {
            if self.running.contains_key(&def.name) {
                self.send(Event::status(&def.name, ProcessStatus::Running, None));
            }
        }
        Ok(loaded)
    }

    /// Raw text of the loaded Procfile.
    pub fn procfile_content(&self) -> Result<String> {
        let Some(path) = self.procfile.as_deref() else {
            bail!("no Procfile loaded");
        };
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read Procfile {}", path.display()))
    }

    /// Replaces the Procfile content and reloads it. Content without any
    /// process is rejected before the file is touched.
    pub async fn save_procfile_content(&mut self, content: &str) -> Result<ProcfileLoaded> {
        let Some(path) = self.procfile.clone() else {
            bail!("no Procfile loaded");
        };
        if procfile::parse_procfile(content).is_empty() {
            bail!("no processes defined in new Procfile content");
        }
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write Procfile {}", path.display()))?;
        tracing::info!(path = %path.display(), "procfile saved");
        self.load_procfile(&path).await
    }

    pub async fn start_process(&mut self, name: &str) -> Result<()> {
        let def = self.definition(name)?.clone();
        if def.disabled {
            bail!("process {} is disabled", name);
        }
        if self.running.contains_key(name) {
            return Ok(());
        }
        self.bump_generation(name);

        let mut command = Command::new("sh");
        command.arg("-c").arg(&def.command);
        if let Some(dir) = self.procfile.as_deref().and_then(Path::parent) {
            command.current_dir(dir);
        }
        command
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", name))?;
        tracing::info!(process = name, pid = ?child.id(), "process started");
        self.send(Event::status(name, ProcessStatus::Running, None));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_stream(name.to_string(), false, stdout, self.event_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_stream(name.to_string(), true, stderr, self.event_tx.clone()));
        }
        self.running.insert(name.to_string(), child);
        Ok(())
    }

    /// Terminates the process group: SIGTERM, a short grace period, SIGKILL.
    /// A manual stop reports no exit code.
    pub async fn stop_process(&mut self, name: &str) -> Result<()> {
        self.bump_generation(name);
        let Some(mut child) = self.running.remove(name) else {
            return Ok(());
        };
        if let Some(pid) = child.id() {
            send_group_signal(pid, Signal::Term);
            tokio::time::sleep(STOP_GRACE).await;
            send_group_signal(pid, Signal::Kill);
        }
        let _ = child.start_kill();
        if let Err(err) = wait_for_exit(&mut child, REAP_TIMEOUT).await {
            tracing::warn!(process = name, "failed to reap process: {err:#}");
        }
        tracing::info!(process = name, "process stopped");
        self.send(Event::status(name, ProcessStatus::Stopped, None));
        Ok(())
    }

    pub async fn restart_process(&mut self, name: &str) -> Result<()> {
        self.definition(name)?;
        self.stop_process(name).await?;
        self.start_process(name).await
    }

    /// Starts every enabled process that is not already running.
    pub async fn start_all(&mut self) -> Result<()> {
        let names: Vec<String> = self
            .definitions
            .iter()
            .filter(|def| !def.disabled)
            .map(|def| def.name.clone())
            .collect();
        for name in names {
            self.start_process(&name).await?;
        }
        Ok(())
    }

    pub async fn stop_all(&mut self) -> Result<()> {
        let names: Vec<String> = self.running.keys().cloned().collect();
        for name in names {
            self.stop_process(&name).await?;
        }
        Ok(())
    }

    /// Uncomments the process in the Procfile and marks it enabled.
    pub async fn enable_process(&mut self, name: &str) -> Result<()> {
        let Some(path) = self.procfile.clone() else {
            bail!("no Procfile loaded");
        };
        if !self.definition(name)?.disabled {
            return Ok(());
        }
        procfile::enable_in_file(&path, name)?;
        // Only this entry changes; other edits on disk wait for the next load.
        let command = procfile::read_procfile(&path)?
            .into_iter()
            .find(|def| def.name == name && !def.disabled)
            .map(|def| def.command);
        if let Some(def) = self.definitions.iter_mut().find(|def| def.name == name) {
            def.disabled = false;
            if let Some(command) = command {
                def.command = command;
            }
        }
        tracing::info!(process = name, "process enabled");
        Ok(())
    }

    pub async fn set_auto_restart(&mut self, enabled: bool) -> Result<()> {
        self.auto_restart = enabled;
        Ok(())
    }

    /// Handles an elapsed restart timer.
    pub async fn on_auto_restart(&mut self, name: &str, generation: u64) -> Result<()> {
        if !self.auto_restart || self.generation(name) != generation || self.is_running(name) {
            tracing::debug!(process = name, "skipping stale auto-restart");
            return Ok(());
        }
        if self.definition(name).map(|def| def.disabled).unwrap_or(true) {
            return Ok(());
        }
        self.send(Event::output(name, AUTO_RESTART_MESSAGE, false));
        self.start_process(name).await
    }

    /// Reaps children that exited on their own and schedules crash restarts.
    pub async fn poll_exits(&mut self) {
        let mut exited = Vec::new();
        for (name, child) in self.running.iter_mut() {
            match child.try_wait() {
                Ok(Some(status)) => exited.push((name.clone(), exit_code(status))),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(process = %name, "failed to poll process: {err}");
                    exited.push((name.clone(), None));
                }
            }
        }

        for (name, code) in exited {
            self.running.remove(&name);
            tracing::info!(process = %name, ?code, "process exited");
            self.send(Event::status(&name, ProcessStatus::Stopped, code));
            if self.auto_restart && code.is_some_and(|code| code != 0) {
                let generation = self.bump_generation(&name);
                let tx = self.event_tx.clone();
                let delay = self.restart_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Event::AutoRestart { name, generation });
                });
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Err(err) = self.stop_all().await {
            tracing::warn!("shutdown failed: {err:#}");
        }
    }

    fn definition(&self, name: &str) -> Result<&ProcessDefinition> {
        self.definitions
            .iter()
            .find(|def| def.name == name)
            .with_context(|| format!("unknown process: {}", name))
    }

    fn generation(&self, name: &str) -> u64 {
        self.generations.get(name).copied().unwrap_or_default()
    }

    fn bump_generation(&mut self, name: &str) -> u64 {
        let generation = self.generations.entry(name.to_string()).or_default();
        *generation += 1;
        *generation
    }

    fn send(&self, event: Event) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("event channel closed");
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn send_group_signal(pid: u32, signal: Signal) {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let pid = pid as i32;
    unsafe {
        let _ = libc::kill(-pid, sig);
    }
}

#[cfg(not(unix))]
fn send_group_signal(_pid: u32, _signal: Signal) {}

/// Exit code, or `128 + signal` for a child killed by a signal.
fn exit_code(status: ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|sig| 128 + sig))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

async fn wait_for_exit(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(status)),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Ok(None),
    }
}

async fn read_stream<R>(name: String, is_stderr: bool, reader: R, tx: mpsc::UnboundedSender<Event>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    buf.pop();
                    if buf.ends_with(b"\r") {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Event::output(&name, line, is_stderr)).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(process = %name, "output stream failed: {err}");
                break;
            }
        }
    }
}
