use std::io::{BufRead, Write};

use tracing::{debug, info, warn};

use super::execute;
use crate::cli::Invocation;
use crate::config::Config;
use crate::render::Renderer;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;

/// Reads one command per line until `quit`, `exit` or end of input. The
/// filter set here lasts for the session only. A failing command is
/// reported and the session carries on.
#[tracing::instrument(skip_all)]
pub fn run_shell<S, R, W>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    input: R,
    out: &mut W,
    prompt: bool,
) -> anyhow::Result<()>
where
    S: KeyValueStore,
    R: BufRead,
    W: Write,
{
    info!("shell started");
    let mut lines = input.lines();

    loop {
        if prompt {
            write!(out, "todo [{}]> ", store.filter())?;
            out.flush()?;
        }

        let Some(line) = lines.next() else {
            debug!("end of input");
            break;
        };
        let line = line?;
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();

        match tokens.first().map(String::as_str) {
            None => continue,
            Some("quit" | "exit") => break,
            Some(_) => {}
        }

        let result = match Invocation::from_tokens(cfg, &tokens) {
            Ok(inv) => execute(store, cfg, renderer, &inv, out),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(line = %line, error = %format!("{err:#}"), "shell command failed");
            writeln!(out, "error: {err:#}")?;
        }
    }

    info!("shell finished");
    Ok(())
}
