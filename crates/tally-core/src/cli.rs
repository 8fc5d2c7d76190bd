use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "todo",
    version,
    about = "Tally: a small persistent to-do list",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "tallyrc")]
    pub tallyrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append a new task; the words are joined with spaces
    Add {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Flip a task between open and done (list number or id prefix)
    Toggle { selector: String },
    /// Remove a task (list number or id prefix)
    Delete { selector: String },
    /// Show the list with completion stats
    List,
    /// Switch between light and dark
    Theme {
        #[command(subcommand)]
        action: Option<ThemeCommand>,
    },
    /// Interactive session: type a task and press Enter to add it
    Shell,
    /// Print the stored task collection as JSON
    Export,
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeCommand {
    /// Print the current theme without changing it
    Show,
}

impl Command {
    /// Resolves `default.command` when no subcommand was given.
    #[tracing::instrument(skip(cfg))]
    pub fn from_default(cfg: &Config) -> anyhow::Result<Self> {
        let name = cfg
            .get("default.command")
            .unwrap_or_else(|| "list".to_string());
        debug!(command = %name, "no explicit command, using default");

        match name.trim() {
            "list" => Ok(Self::List),
            "shell" => Ok(Self::Shell),
            "export" => Ok(Self::Export),
            "show" => Ok(Self::Show),
            other => Err(anyhow!("unsupported default.command: {other}")),
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) => "warn",
        (0, 3..) => "trace",
        (0, 2) => "debug",
        (0, 1) => "info",
        (0, 0) => "warn",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.key=value` / `rc.key:value` tokens out of the argument list.
///
/// Tokens after `add` are task text and are left alone.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> PreprocessedArgs {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    let mut in_task_text = false;
    for arg in iter {
        let s = arg.to_string_lossy();
        if !in_task_text {
            if let Some(rest) = s.strip_prefix("rc.") {
                let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
                if let Some((k, v)) = parsed {
                    debug!(key = %k, value = %v, "captured positional rc override");
                    overrides.push((format!("rc.{k}"), v.to_string()));
                    continue;
                }
            }
            in_task_text = s == "add";
        }

        cleaned.push(arg);
    }

    PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, ThemeCommand, preprocess_args};
    use crate::config::Config;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["todo", "rc.color=off", "list", "rc.theme.ambient:dark"]));

        assert_eq!(pre.cleaned_args, args(&["todo", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.theme.ambient".to_string(), "dark".to_string()),
            ]
        );
    }

    #[test]
    fn task_text_is_never_treated_as_override() {
        let pre = preprocess_args(&args(&["todo", "add", "rc.color=off", "is", "a", "task"]));

        assert!(pre.rc_overrides.is_empty());
        let cli = GlobalCli::parse_from(pre.cleaned_args);
        assert_eq!(
            cli.command,
            Some(Command::Add {
                text: vec!["rc.color=off", "is", "a", "task"]
                    .into_iter()
                    .map(String::from)
                    .collect()
            })
        );
    }

    #[test]
    fn parses_subcommands_and_globals() {
        let cli = GlobalCli::parse_from(["todo", "-vv", "--rc", "color=off", "theme", "show"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.rc_overrides[0].key, "color");
        assert_eq!(
            cli.command,
            Some(Command::Theme {
                action: Some(ThemeCommand::Show)
            })
        );

        let cli = GlobalCli::parse_from(["todo", "--data", "/tmp/tally", "delete", "3"]);
        assert_eq!(cli.data.as_deref(), Some(std::path::Path::new("/tmp/tally")));
        assert_eq!(
            cli.command,
            Some(Command::Delete {
                selector: "3".to_string()
            })
        );
    }

    #[test]
    fn default_command_comes_from_config() {
        let mut cfg = Config::default();
        assert_eq!(Command::from_default(&cfg).expect("default"), Command::List);

        cfg.set("default.command", "shell");
        assert_eq!(Command::from_default(&cfg).expect("default"), Command::Shell);

        cfg.set("default.command", "delete");
        assert!(Command::from_default(&cfg).is_err());
    }
}
