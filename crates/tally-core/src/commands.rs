use std::io::{BufRead, Write};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument};

use crate::cli::{Command, ThemeCommand};
use crate::clock::Clock;
use crate::config::Config;
use crate::render::Renderer;
use crate::session::{Action, Outcome, Session};
use crate::storage::KeyValueStore;
use crate::task::{Task, TaskId};

const SHELL_HELP: &str = "\
type a task and press Enter to add it
  :t N      toggle task N
  :d N      delete task N
  :theme    switch light/dark
  :l        show the list
  :q        quit
any other line, including one starting with an unknown :word, is added as a task";

#[instrument(skip(session, cfg, renderer, input, out))]
pub fn dispatch<S, C, R, W>(
    session: &mut Session<S, C>,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
    input: R,
    mut out: W,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
    C: Clock,
    R: BufRead,
    W: Write,
{
    match command {
        Command::Add { text } => cmd_add(session, &text.join(" "), &mut out),
        Command::Toggle { selector } => cmd_toggle(session, &selector, &mut out),
        Command::Delete { selector } => cmd_delete(session, &selector, &mut out),
        Command::List => renderer.render_board(&mut out, &session.board()),
        Command::Theme { action } => cmd_theme(session, action, &mut out),
        Command::Shell => run_shell(session, renderer, input, &mut out),
        Command::Export => cmd_export(session, &mut out),
        Command::Show => cmd_show(cfg, &mut out),
    }
}

fn cmd_add<S, C, W>(session: &mut Session<S, C>, text: &str, out: &mut W) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
    C: Clock,
    W: Write,
{
    info!("command add");
    if session.apply(Action::Add(text.to_string())) == Outcome::Ignored {
        debug!("blank task text; nothing added");
        return Ok(());
    }

    let total = session.tasks().total_count();
    writeln!(out, "Created task {total}.")?;
    Ok(())
}

fn cmd_toggle<S, C, W>(
    session: &mut Session<S, C>,
    selector: &str,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
    C: Clock,
    W: Write,
{
    info!("command toggle");
    let (position, id) = resolve_selector(session.tasks().tasks(), selector)?;
    session.apply(Action::Toggle(id.clone()));

    if let Some(task) = session.tasks().get(&id) {
        let verb = if task.is_completed() {
            "Completed"
        } else {
            "Reopened"
        };
        writeln!(out, "{verb} task {position} '{}'.", task.text())?;
    }
    Ok(())
}

fn cmd_delete<S, C, W>(
    session: &mut Session<S, C>,
    selector: &str,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
    C: Clock,
    W: Write,
{
    info!("command delete");
    let (position, id) = resolve_selector(session.tasks().tasks(), selector)?;
    let text = session
        .tasks()
        .get(&id)
        .map(|t| t.text().to_string())
        .unwrap_or_default();

    session.apply(Action::Delete(id));
    writeln!(out, "Deleted task {position} '{text}'.")?;
    Ok(())
}

fn cmd_theme<S, C, W>(
    session: &mut Session<S, C>,
    action: Option<ThemeCommand>,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
    C: Clock,
    W: Write,
{
    match action {
        Some(ThemeCommand::Show) => writeln!(out, "{}", session.theme())?,
        None => {
            session.apply(Action::ToggleTheme);
            writeln!(out, "Theme set to {}.", session.theme())?;
        }
    }
    Ok(())
}

fn cmd_export<S, C, W>(session: &Session<S, C>, out: &mut W) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
    C: Clock,
    W: Write,
{
    let encoded = serde_json::to_string_pretty(session.tasks().tasks())
        .context("failed to encode tasks")?;
    writeln!(out, "{encoded}")?;
    Ok(())
}

fn cmd_show<W: Write>(cfg: &Config, out: &mut W) -> anyhow::Result<()> {
    for (key, value) in cfg.iter() {
        writeln!(out, "{key} = {value}")?;
    }
    for file in &cfg.loaded_files {
        writeln!(out, "# loaded {}", file.display())?;
    }
    Ok(())
}

/// Maps a 1-based list position or a unique id prefix to `(position, id)`.
pub fn resolve_selector(tasks: &[Task], selector: &str) -> anyhow::Result<(usize, TaskId)> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(anyhow!("expected a task number or id"));
    }

    if let Ok(position) = selector.parse::<usize>()
        && let Some(task) = position.checked_sub(1).and_then(|idx| tasks.get(idx))
    {
        return Ok((position, task.id().clone()));
    }

    let mut matches = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.id().as_str().starts_with(selector));
    match (matches.next(), matches.next()) {
        (Some((idx, task)), None) => Ok((idx + 1, task.id().clone())),
        (Some(_), Some(_)) => Err(anyhow!("task selector '{selector}' is ambiguous")),
        (None, _) => Err(anyhow!("no task matches '{selector}'")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellInput {
    Event(Action),
    List,
    Help,
    Quit,
    Invalid(String),
}

fn parse_shell_line(line: &str, tasks: &[Task]) -> ShellInput {
    let Some(rest) = line.trim().strip_prefix(':') else {
        return ShellInput::Event(Action::Add(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let arg = parts.collect::<Vec<_>>().join(" ");

    let select = |build: fn(TaskId) -> Action| match resolve_selector(tasks, &arg) {
        Ok((_, id)) => ShellInput::Event(build(id)),
        Err(err) => ShellInput::Invalid(err.to_string()),
    };

    match command {
        "t" | "toggle" => select(Action::Toggle),
        "d" | "delete" => select(Action::Delete),
        "theme" => ShellInput::Event(Action::ToggleTheme),
        "l" | "list" => ShellInput::List,
        "h" | "help" => ShellInput::Help,
        "q" | "quit" => ShellInput::Quit,
        other => {
            debug!(command = %other, "not a shell command; adding line as a task");
            ShellInput::Event(Action::Add(line.to_string()))
        }
    }
}

/// Line-driven event loop; each line is one event, applied before the next
/// line is read.
#[instrument(skip_all)]
pub fn run_shell<S, C, R, W>(
    session: &mut Session<S, C>,
    renderer: &Renderer,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone,
    C: Clock,
    R: BufRead,
    W: Write,
{
    info!("starting interactive shell");
    renderer.render_board(&mut *out, &session.board())?;
    writeln!(out, "(:help for commands)")?;

    for line in input.lines() {
        let line = line.context("failed reading input")?;
        match parse_shell_line(&line, session.tasks().tasks()) {
            ShellInput::Event(action) => {
                if session.apply(action) == Outcome::Changed {
                    writeln!(out)?;
                    renderer.render_board(&mut *out, &session.board())?;
                    for warning in session.persistence_warnings() {
                        writeln!(out, "warning: not saved: {warning}")?;
                    }
                }
            }
            ShellInput::List => renderer.render_board(&mut *out, &session.board())?,
            ShellInput::Help => writeln!(out, "{SHELL_HELP}")?,
            ShellInput::Quit => break,
            ShellInput::Invalid(message) => writeln!(out, "{message}")?,
        }
    }

    info!("interactive shell finished");
    Ok(())
}
