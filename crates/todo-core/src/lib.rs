pub mod cli;
pub mod commands;
pub mod config;
pub mod filter;
pub mod render;
pub mod storage;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use filter::FilterMode;
pub use storage::{
  FileStore,
  KeyValueStore,
  MemoryStore
};
pub use store::TaskStore;
pub use task::Task;

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
    "starting todo CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.todorc.as_deref()
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
  let key = cfg.storage_key()?;
  let default_filter =
    cfg.default_filter()?;

  let backend =
    storage::FileStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open storage at {}",
          data_dir.display()
        )
      })?;
  let mut store =
    TaskStore::open_with_key(
      backend, &key
    )?;
  store.set_filter(default_filter);

  let renderer =
    render::Renderer::new(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &mut store, &cfg, &renderer, &inv
  )?;

  info!("done");
  Ok(())
}
