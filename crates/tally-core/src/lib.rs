pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod render;
pub mod session;
pub mod storage;
pub mod task;
pub mod task_store;
pub mod theme;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args);
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tally CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.tallyrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    storage::FileStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open store at {}",
          data_dir.display()
        )
      })?;

  let mut session =
    session::Session::open(
      storage,
      clock::SystemClock,
      clock::TimestampFormat::from_config(
        &cfg
      ),
      &theme::EnvColorSchemeProbe::from_config(
        &cfg
      )
    );

  let renderer =
    render::Renderer::new(&cfg)?;
  let command = match cli.command {
    | Some(command) => command,
    | None => {
      cli::Command::from_default(&cfg)?
    }
  };

  commands::dispatch(
    &mut session,
    &cfg,
    &renderer,
    command,
    io::stdin().lock(),
    io::stdout().lock()
  )?;

  for warning in
    session.persistence_warnings()
  {
    eprintln!(
      "warning: changes were not \
       saved: {warning}"
    );
  }

  info!("done");
  Ok(())
}
