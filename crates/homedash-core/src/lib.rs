pub mod cli;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod datetime;
pub mod provider;
pub mod render;
pub mod sanitize;
pub mod settings;
pub mod storage;
pub mod tasks;
pub mod weather;

use std::ffi::OsString;

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
  let split =
    cli::split_rc_overrides(&raw_args);
  let cli = cli::GlobalCli::parse_from(
    split.argv
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting homedash"
  );

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    split
      .overrides
      .into_iter()
      .chain(cli.rc)
  );
  debug!(
    sources = ?cfg.sources(),
    "configuration ready"
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
    storage::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;

  let timezone =
    datetime::resolve_display_timezone(
      cfg.weather_timezone()
    );
  let mut renderer =
    render::Renderer::new(
      &cfg, timezone
    )?;
  let inv =
    cli::Invocation::parse(cli.command)?;

  let mut dashboard =
    dashboard::Dashboard::open(storage);

  commands::dispatch(
    &mut dashboard,
    &mut renderer,
    inv
  )?;

  info!("done");
  Ok(())
}
