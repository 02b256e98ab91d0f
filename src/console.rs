//! Console command parsing.
//!
//! Each input line is split with shell-words rules, so names and queries may
//! be quoted.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::search::TabFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load(PathBuf),
    Recent,
    Start(String),
    Stop(String),
    Restart(String),
    Enable(String),
    StartAll,
    StopAll,
    AutoRestart(bool),
    Tab(TabFilter),
    Hide(String),
    Show(String),
    /// An empty query clears the search.
    Search(String),
    View,
    /// Print the loaded Procfile.
    Procfile,
    /// Edit the Procfile in the text editor, then reload it.
    Edit,
    Json,
    Refs,
    Open(usize),
    Save,
    Set { key: String, value: String },
    Clear,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  load <path>              load a Procfile (or a number from `recent`)
  recent                   list recent projects
  start|stop|restart <name>
  enable <name>            uncomment a disabled process in the Procfile
  start-all | stop-all
  auto-restart on|off      restart crashed processes after 2s
  tab <name|all>           filter output by process
  hide|show <name>         toggle a process on the all tab
  search [query]           case-insensitive search, empty to clear
  view                     print the current view with context
  procfile                 print the loaded Procfile
  edit                     edit the Procfile in the text editor and reload it
                           (the editor must block, e.g. `code --wait`)
  json                     print the current view as JSON
  refs                     list file references in the current view
  open <n>                 open a file reference in the text editor
  save                     save the current tab's log to a temp file
  set <key> <value>        change a setting (textEditor)
  clear                    clear all output
  status                   show process status
  help | quit";

/// Parses one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    if let Some(query) = search_query(line) {
        return Ok(Some(Command::Search(query.to_string())));
    }
    let words = shell_words::split(line).context("unbalanced quotes")?;
    let Some((head, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match head.as_str() {
        "load" => Command::Load(PathBuf::from(single(head, args)?)),
        "recent" => Command::Recent,
        "start" => Command::Start(single(head, args)?),
        "stop" => Command::Stop(single(head, args)?),
        "restart" => Command::Restart(single(head, args)?),
        "enable" => Command::Enable(single(head, args)?),
        "start-all" => Command::StartAll,
        "stop-all" => Command::StopAll,
        "auto-restart" => match single(head, args)?.as_str() {
            "on" | "true" | "1" => Command::AutoRestart(true),
            "off" | "false" | "0" => Command::AutoRestart(false),
            other => bail!("auto-restart expects on or off, got {}", other),
        },
        "tab" => {
            let name = single(head, args)?;
            if name == "all" {
                Command::Tab(TabFilter::All)
            } else {
                Command::Tab(TabFilter::Process(name))
            }
        }
        "hide" => Command::Hide(single(head, args)?),
        "show" => Command::Show(single(head, args)?),
        "view" => Command::View,
        "procfile" => Command::Procfile,
        "edit" => Command::Edit,
        "json" => Command::Json,
        "refs" => Command::Refs,
        "open" => {
            let raw = single(head, args)?;
            let index = raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("open expects a reference number, got {}", raw))?;
            Command::Open(index)
        }
        "save" => Command::Save,
        "set" => match args {
            [key] => Command::Set {
                key: key.clone(),
                value: String::new(),
            },
            [key, rest @ ..] => Command::Set {
                key: key.clone(),
                value: rest.join(" "),
            },
            [] => bail!("usage: set <key> <value>"),
        },
        "clear" => Command::Clear,
        "status" | "ps" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command: {} (try help)", other),
    };
    Ok(Some(command))
}

/// Text after `search` or `/`, taken verbatim apart from surrounding blanks.
fn search_query(line: &str) -> Option<&str> {
    let line = line.trim();
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    matches!(head, "search" | "/").then(|| rest.trim())
}

fn single(head: &str, args: &[String]) -> Result<String> {
    match args {
        [arg] => Ok(arg.clone()),
        [] => bail!("usage: {} <argument>", head),
        _ => bail!("{} takes exactly one argument", head),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(line: &str) -> Command {
        parse(line).unwrap().unwrap()
    }

    #[test]
    fn blank_line_is_no_command() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn parses_process_commands() {
        assert_eq!(cmd("start web"), Command::Start("web".into()));
        assert_eq!(cmd("restart 'my worker'"), Command::Restart("my worker".into()));
        assert_eq!(cmd("start-all"), Command::StartAll);
        assert_eq!(cmd("auto-restart off"), Command::AutoRestart(false));
        assert_eq!(cmd("load ./Procfile"), Command::Load(PathBuf::from("./Procfile")));
    }

    #[test]
    fn parses_view_commands() {
        assert_eq!(cmd("tab all"), Command::Tab(TabFilter::All));
        assert_eq!(cmd("tab api"), Command::Tab(TabFilter::Process("api".into())));
        assert_eq!(cmd("search connection refused"), Command::Search("connection refused".into()));
        assert_eq!(cmd("search"), Command::Search(String::new()));
        assert_eq!(cmd("open 2"), Command::Open(2));
        assert_eq!(
            cmd("set textEditor \"code --reuse-window\""),
            Command::Set {
                key: "textEditor".into(),
                value: "code --reuse-window".into()
            }
        );
    }

    #[test]
    fn search_takes_the_rest_of_the_line_verbatim() {
        assert_eq!(cmd("search don't"), Command::Search("don't".into()));
        assert_eq!(cmd("/ a  b \"c"), Command::Search("a  b \"c".into()));
        assert_eq!(cmd("  search   spaced  out  "), Command::Search("spaced  out".into()));
        assert!(parse("searching").is_err());
    }

    #[test]
    fn parses_procfile_commands() {
        assert_eq!(cmd("procfile"), Command::Procfile);
        assert_eq!(cmd("edit"), Command::Edit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("start").is_err());
        assert!(parse("start a b").is_err());
        assert!(parse("open 0").is_err());
        assert!(parse("auto-restart maybe").is_err());
        assert!(parse("frobnicate").is_err());
        assert!(parse("start \"open").is_err());
    }
}
