//! Opening file references in an external editor.

use std::fs;
use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};

/// Builds the argument vector for `editor` to open `path` at `line`/`column`.
///
/// `editor` is a shell-words command line; the first word picks the
/// line-number convention.
pub fn editor_command(
    editor: &str,
    path: &Path,
    line: Option<u32>,
    column: Option<u32>,
) -> Result<Vec<String>> {
    let mut argv = shell_words::split(editor)
        .with_context(|| format!("invalid editor command: {}", editor))?;
    let Some(program) = argv.first() else {
        bail!("no text editor configured");
    };
    let kind = Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let path = path.display().to_string();

    match (kind.as_str(), line) {
        ("code" | "code-insiders" | "cursor" | "codium", _) => {
            let target = match (line, column) {
                (Some(line), Some(col)) => format!("{}:{}:{}", path, line, col),
                (Some(line), None) => format!("{}:{}", path, line),
                _ => path,
            };
            argv.push("--goto".to_string());
            argv.push(target);
        }
        ("subl", Some(line)) => argv.push(format!("{}:{}", path, line)),
        ("mate", Some(line)) => {
            argv.push("--line".to_string());
            argv.push(line.to_string());
            argv.push(path);
        }
        _ => argv.push(path),
    }
    Ok(argv)
}

/// Launches the editor detached; its exit status is not awaited.
pub fn open_in_editor(
    editor: &str,
    path: &Path,
    line: Option<u32>,
    column: Option<u32>,
) -> Result<()> {
    let argv = editor_command(editor, path, line, column)?;
    let (program, args) = argv
        .split_first()
        .context("no text editor configured")?;
    tracing::info!(editor = %program, file = %path.display(), ?line, "opening file in editor");
    std::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to launch editor {}", program))?;
    Ok(())
}

/// Opens `content` in the editor from a scratch file, waits for the editor
/// to exit and returns the edited text.
///
/// GUI editors must be configured to block (`code --wait`, `subl -w`).
pub async fn edit_text(editor: &str, name: &str, content: &str) -> Result<String> {
    let scratch = std::env::temp_dir().join(format!("procrack-{}-{}", std::process::id(), name));
    fs::write(&scratch, content)
        .with_context(|| format!("failed to write {}", scratch.display()))?;

    let result = wait_for_editor(editor, &scratch).await.and_then(|()| {
        fs::read_to_string(&scratch)
            .with_context(|| format!("failed to read {}", scratch.display()))
    });
    if let Err(err) = fs::remove_file(&scratch) {
        tracing::debug!(file = %scratch.display(), "failed to remove scratch file: {err}");
    }
    result
}

async fn wait_for_editor(editor: &str, path: &Path) -> Result<()> {
    let argv = editor_command(editor, path, None, None)?;
    let (program, args) = argv
        .split_first()
        .context("no text editor configured")?;
    tracing::info!(editor = %program, file = %path.display(), "waiting for editor");
    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("failed to launch editor {}", program))?;
    if !status.success() {
        bail!("editor {} exited with {}", program, status);
    }
    Ok(())
}
