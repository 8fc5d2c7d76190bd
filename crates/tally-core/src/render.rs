use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::session::Board;
use crate::theme::Theme;

const PROGRESS_CELLS: usize = 10;

/// ANSI codes for one theme.
#[derive(Debug, Clone, Copy)]
struct Palette {
    title: &'static str,
    muted: &'static str,
    accent: &'static str,
    done: &'static str,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                title: "1;30",
                muted: "90",
                accent: "34",
                done: "32",
            },
            Theme::Dark => Self {
                title: "1;97",
                muted: "37",
                accent: "96",
                done: "92",
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let enabled = cfg
            .get_bool("color")
            .ok_or_else(|| anyhow!("invalid color setting: {color_cfg}"))?;

        Ok(Self {
            color: enabled && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(total = board.total, theme = %board.theme))]
    pub fn render_board<W: Write>(&self, mut out: W, board: &Board<'_>) -> anyhow::Result<()> {
        let palette = Palette::for_theme(board.theme);

        writeln!(
            out,
            "{}  {}",
            self.paint("To-Do List", palette.title),
            self.paint(&format!("[{}]", board.theme), palette.muted)
        )?;

        let stats = format!("{} of {} completed", board.completed, board.total);
        if board.total > 0 {
            writeln!(
                out,
                "{}  {} {:.0}%",
                stats,
                self.paint(&progress_bar(board.progress_percent), palette.accent),
                board.progress_percent
            )?;
        } else {
            writeln!(out, "{stats}")?;
        }
        writeln!(out)?;

        if board.tasks.is_empty() {
            writeln!(out, "No tasks yet")?;
            writeln!(
                out,
                "{}",
                self.paint("Add your first task above to get started!", palette.muted)
            )?;
            return Ok(());
        }

        let headers = ["#", "Done", "Task", "Created"].map(str::to_string).to_vec();
        let rows = board
            .tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| {
                let (mark, text) = if task.is_completed() {
                    (
                        self.paint("[x]", palette.done),
                        self.paint(task.text(), palette.muted),
                    )
                } else {
                    ("[ ]".to_string(), task.text().to_string())
                };
                vec![
                    self.paint(&(idx + 1).to_string(), palette.accent),
                    mark,
                    text,
                    self.paint(task.created_at(), palette.muted),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn progress_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * PROGRESS_CELLS as f64).round() as usize;
    let filled = filled.min(PROGRESS_CELLS);
    format!(
        "[{}{}]",
        "#".repeat(filled),
        "-".repeat(PROGRESS_CELLS - filled)
    )
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| visible_width(h)).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_width(cell));
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| pad(header, *width))
        .collect();
    writeln!(writer, "{}", header_line.join(" ").trim_end())?;

    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    writeln!(writer, "{}", rule.join(" "))?;

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad(cell, *width))
            .collect();
        writeln!(writer, "{}", line.join(" ").trim_end())?;
    }

    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    let padding = width.saturating_sub(visible_width(cell));
    format!("{cell}{}", " ".repeat(padding))
}

fn visible_width(s: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(s).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
