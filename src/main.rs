//! procrack: a Procfile runner with a searchable, multiplexed log console.
//!
//! The binary wires the pieces together: a `ProcessManager` that supervises
//! child processes, an `App` that owns the log engine, and a line-oriented
//! console on stdin. Every input funnels through a single event channel and
//! is handled on the main loop.

mod ansi;
mod app;
mod config;
mod console;
mod editor;
mod error;
mod events;
mod logging;
mod output;
mod printer;
mod procfile;
mod registry;
mod runner;
mod search;
mod view;

use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::Parser;
use tokio::sync::mpsc;

use crate::app::{App, StatusLevel};
use crate::config::{ConfigStore, Settings, TEXT_EDITOR_KEY};
use crate::console::Command;
use crate::error::Error;
use crate::events::Event;
use crate::printer::Printer;
use crate::runner::ProcessManager;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "procrack",
    version,
    about = "Procfile runner with a searchable log console",
    styles = help_styles()
)]
struct Cli {
    /// Procfile to load on startup.
    procfile: Option<PathBuf>,
    /// Load the Procfile without starting its processes.
    #[arg(long)]
    no_start: bool,
    /// Do not restart processes that exit with a non-zero code.
    #[arg(long)]
    no_auto_restart: bool,
    /// Prepend a timestamp to each printed line.
    #[arg(long)]
    timestamps: bool,
    /// Directory holding settings.toml and recent_projects.json.
    #[arg(long)]
    config_dir: Option<PathBuf>,
    /// Print output without colors.
    #[arg(long)]
    no_color: bool,
}

/// State the command handlers share besides `App` and the manager.
struct Session {
    config: ConfigStore,
    settings: Settings,
    printer: Printer,
    auto_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = logging::init() {
        eprintln!("warning: file logging disabled: {err:#}");
    }

    let config = match &cli.config_dir {
        Some(dir) => ConfigStore::new(dir),
        None => ConfigStore::default_location()?,
    };
    let settings = config.load_settings().unwrap_or_else(|err| {
        eprintln!("warning: using default settings: {err:#}");
        Settings::default()
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut manager = ProcessManager::new(event_tx.clone());
    manager.set_auto_restart(!cli.no_auto_restart).await?;

    let mut app = App::new(settings.text_editor().is_some());
    let mut session = Session {
        config,
        settings,
        printer: Printer::new(cli.timestamps, !cli.no_color && std::io::stdout().is_terminal()),
        auto_start: !cli.no_start,
    };

    spawn_stdin_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());

    match &cli.procfile {
        Some(path) => {
            if let Err(err) = load_project(path, &mut manager, &session).await {
                report(&mut app, err);
            }
        }
        None => println!("{}", view::Placeholder::NoProcfile.message()),
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                handle_event(event, &mut app, &mut manager, &mut session).await;
            }
            _ = ticker.tick() => manager.poll_exits().await,
        }
        flush_status(&mut app);
        if app.should_quit {
            break;
        }
    }

    manager.shutdown().await;
    tracing::info!("procrack stopped");
    Ok(())
}

async fn handle_event(
    event: Event,
    app: &mut App,
    manager: &mut ProcessManager,
    session: &mut Session,
) {
    match event {
        Event::ProcessOutput(output) => {
            if app.on_process_output(output).is_some() {
                print_latest(app, &session.printer);
            }
        }
        Event::ProcessStatus(change) => {
            if app.on_process_status(change).is_some() {
                print_latest(app, &session.printer);
            }
        }
        Event::ProcfileLoaded(loaded) => {
            let _ = app.on_procfile_loaded(loaded);
        }
        Event::AutoRestart { name, generation } => {
            if let Err(err) = manager.on_auto_restart(&name, generation).await {
                report(app, err);
            }
        }
        Event::Input(line) => match console::parse(&line) {
            Ok(Some(command)) => {
                if let Err(err) = handle_command(command, app, manager, session).await {
                    report(app, err);
                }
            }
            Ok(None) => {}
            Err(err) => report(app, err),
        },
        Event::Shutdown => app.should_quit = true,
    }
}

async fn handle_command(
    command: Command,
    app: &mut App,
    manager: &mut ProcessManager,
    session: &mut Session,
) -> Result<()> {
    match command {
        Command::Load(path) => {
            let path = resolve_load_target(&path, &session.config)?;
            load_project(&path, manager, session).await?;
        }
        Command::Recent => {
            let recent = session.config.recent_projects()?;
            if recent.is_empty() {
                println!("No recent projects.");
            }
            for (idx, project) in recent.iter().enumerate() {
                println!("{:>2}. {}", idx + 1, project);
            }
        }
        Command::Start(name) => manager.start_process(&name).await?,
        Command::Stop(name) => manager.stop_process(&name).await?,
        Command::Restart(name) => manager.restart_process(&name).await?,
        Command::Enable(name) => {
            if !app.is_disabled(&name)? {
                app.set_status_message(format!("{} is already enabled", name));
                return Ok(());
            }
            manager.enable_process(&name).await?;
            app.enable(&name)?;
        }
        Command::StartAll => manager.start_all().await?,
        Command::StopAll => manager.stop_all().await?,
        Command::AutoRestart(enabled) => {
            manager.set_auto_restart(enabled).await?;
            app.set_status_message(format!(
                "Auto-restart {}",
                if enabled { "enabled" } else { "disabled" }
            ));
        }
        Command::Tab(tab) => {
            app.set_tab(tab)?;
            print_view(app, &session.printer);
        }
        Command::Hide(name) => app.set_hidden(&name, true)?,
        Command::Show(name) => app.set_hidden(&name, false)?,
        Command::Search(query) => {
            app.set_query(&query);
            print_view(app, &session.printer);
        }
        Command::View => print_view(app, &session.printer),
        Command::Procfile => print!("{}", manager.procfile_content()?),
        Command::Edit => {
            let Some(editor) = session.settings.text_editor().map(str::to_string) else {
                bail!("set {} to edit the Procfile", TEXT_EDITOR_KEY);
            };
            let content = manager.procfile_content()?;
            let edited = editor::edit_text(&editor, "Procfile", &content).await?;
            if edited == content {
                app.set_status_message("Procfile unchanged");
                return Ok(());
            }
            manager.save_procfile_content(&edited).await?;
            if session.auto_start {
                manager.start_all().await?;
            }
        }
        Command::Json => {
            let json = serde_json::to_string_pretty(&app.render())
                .context("failed to serialize view")?;
            println!("{}", json);
        }
        Command::Refs => {
            let model = app.render();
            let mut found = false;
            for (idx, (line, reference)) in model.file_refs().enumerate() {
                found = true;
                println!("{:>3}. [{}] {}", idx + 1, line.process_name, reference.location());
            }
            if !found {
                println!("No file references in view.");
            }
        }
        Command::Open(index) => {
            let Some(editor) = session.settings.text_editor().map(str::to_string) else {
                bail!("set {} to open file references", TEXT_EDITOR_KEY);
            };
            let model = app.render();
            let Some((_, reference)) = index
                .checked_sub(1)
                .and_then(|idx| model.file_refs().nth(idx))
            else {
                bail!("no file reference #{}", index);
            };
            let base = app
                .procfile()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let path = reference.resolve(&base);
            editor::open_in_editor(&editor, &path, reference.line, reference.column)?;
            app.set_status_message(format!("Opened {}", reference.location()));
        }
        Command::Save => {
            app.save_log(&std::env::temp_dir())?;
        }
        Command::Set { key, value } => {
            session.settings = session.config.save_setting(&key, &value)?;
            app.linkify = session.settings.text_editor().is_some();
            app.set_status_message(format!("Saved setting {}", key));
        }
        Command::Clear => app.clear_output(),
        Command::Status => {
            for line in session.printer.format_status(&app.registry) {
                println!("{}", line);
            }
            println!("{}", app.status_line());
            if let Some(procfile) = manager.procfile() {
                println!("procfile: {}", procfile.display());
            }
            println!(
                "auto-restart: {}",
                if manager.auto_restart() { "on" } else { "off" }
            );
            for (key, value) in session.settings.iter() {
                println!("setting {} = {}", key, value);
            }
            println!("config: {}", session.config.dir().display());
        }
        Command::Help => println!("{}", console::HELP),
        Command::Quit => app.should_quit = true,
    }
    Ok(())
}

/// Loads a Procfile, records it as a recent project and starts it.
async fn load_project(path: &Path, manager: &mut ProcessManager, session: &Session) -> Result<()> {
    let loaded = manager.load_procfile(path).await?;
    if let Err(err) = session.config.add_recent_project(&loaded.path) {
        tracing::warn!("failed to update recent projects: {err:#}");
    }
    if session.auto_start {
        manager.start_all().await?;
    }
    Ok(())
}

/// `load 3` picks the third recent project unless a file by that name exists.
fn resolve_load_target(path: &Path, config: &ConfigStore) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let Some(index) = path.to_str().and_then(|s| s.parse::<usize>().ok()) else {
        return Ok(path.to_path_buf());
    };
    let recent = config.recent_projects()?;
    index
        .checked_sub(1)
        .and_then(|idx| recent.get(idx))
        .map(PathBuf::from)
        .with_context(|| format!("no recent project #{}", index))
}

fn print_latest(app: &App, printer: &Printer) {
    let Some(record) = app.store.last() else {
        return;
    };
    if app.is_live_visible(record) {
        let marker = app.search.is_active().then_some('>');
        println!("{}", printer.format_line(&app.render_record(record), marker));
    }
}

fn print_view(app: &App, printer: &Printer) {
    for line in printer.format_model(&app.render()) {
        println!("{}", line);
    }
}

fn flush_status(app: &mut App) {
    if let Some((message, level)) = app.take_status() {
        match level {
            StatusLevel::Info => println!("-- {}", message),
            StatusLevel::Error => eprintln!("!! {}", message),
        }
    }
}

fn report(app: &mut App, err: anyhow::Error) {
    app.report_failure(&Error::external(format!("{err:#}")));
}

fn spawn_stdin_listener(tx: mpsc::UnboundedSender<Event>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let interactive = stdin.is_terminal();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(Event::Input(line)).is_err() {
                return;
            }
        }
        if interactive {
            let _ = tx.send(Event::Shutdown);
        }
    });
}

fn spawn_signal_listener(tx: mpsc::UnboundedSender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("shutdown signal received");
        let _ = tx.send(Event::Shutdown);
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
}
