mod shell;

use std::io::{self, IsTerminal, Write};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::filter::FilterMode;
use crate::render::{Renderer, Row};
use crate::storage::{self, KeyValueStore};
use crate::store::TaskStore;

pub use shell::run_shell;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "toggle",
        "delete",
        "rename",
        "move",
        "filter",
        "export",
        "shell",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }
    if token.is_empty() {
        return None;
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Entry point for one invocation. `shell` takes over stdin; every other
/// command runs once against `store`.
#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch<S: KeyValueStore>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    inv: &Invocation,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    if inv.command == "shell" {
        let stdin = io::stdin();
        let prompt = stdin.is_terminal();
        return run_shell(store, cfg, renderer, stdin.lock(), &mut out, prompt);
    }
    execute(store, cfg, renderer, inv, &mut out)
}

pub(crate) fn execute<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &Renderer,
    inv: &Invocation,
    out: &mut W,
) -> anyhow::Result<()> {
    let args = inv.args.as_slice();
    debug!(command = %inv.command, ?args, "dispatching command");

    match inv.command.as_str() {
        "add" => cmd_add(store, args, out),
        "list" => cmd_list(store, renderer, args, out),
        "toggle" => cmd_toggle(store, args, out),
        "delete" => cmd_delete(store, args, out),
        "rename" => cmd_rename(store, args, out),
        "move" => cmd_move(store, args, out),
        "filter" => cmd_filter(store, args, out),
        "export" => cmd_export(store, out),
        "shell" => Err(anyhow!("already in a shell")),
        "_commands" => {
            for name in known_command_names() {
                writeln!(out, "{name}")?;
            }
            Ok(())
        }
        "_show" => cmd_show(cfg, out),
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, args, out))]
fn cmd_add<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    let text = args.join(" ");
    match store.add_task(&text)? {
        Some(id) => writeln!(out, "Created task {id}.")?,
        None => writeln!(out, "Nothing to add: task text is empty.")?,
    }
    Ok(())
}

#[instrument(skip(store, renderer, args, out))]
fn cmd_list<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    renderer: &Renderer,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");

    if let Some(mode) = args.first() {
        let mode: FilterMode = mode.parse()?;
        store.set_filter(mode);
    }

    let view = store.filtered_view();
    if view.is_empty() {
        writeln!(out, "No tasks.")?;
    } else {
        let rows: Vec<Row<'_>> = view.iter().enumerate().map(|(idx, t)| (idx + 1, *t)).collect();
        renderer.write_task_table(&mut *out, &rows)?;
    }
    writeln!(
        out,
        "{}",
        renderer.summary_line(view.len(), store.filter(), store.counts())
    )?;
    Ok(())
}

#[instrument(skip(store, args, out))]
fn cmd_toggle<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command toggle");

    let id = parse_id(args)?;
    if store.toggle_task(id)? {
        let state = match store.get(id) {
            Some(task) if task.checked => "completed",
            _ => "not completed",
        };
        writeln!(out, "Task {id} marked {state}.")?;
    } else {
        writeln!(out, "No task with id {id}.")?;
    }
    Ok(())
}

#[instrument(skip(store, args, out))]
fn cmd_delete<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command delete");

    let id = parse_id(args)?;
    if store.delete_task(id)? {
        writeln!(out, "Deleted task {id}.")?;
    } else {
        writeln!(out, "No task with id {id}.")?;
    }
    Ok(())
}

#[instrument(skip(store, args, out))]
fn cmd_rename<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command rename");

    let id = parse_id(args)?;
    let text = args[1..].join(" ");
    if store.get(id).is_none() {
        writeln!(out, "No task with id {id}.")?;
    } else if store.rename_task(id, &text)? {
        writeln!(out, "Renamed task {id}.")?;
    } else {
        writeln!(out, "Task {id} unchanged: new text is empty.")?;
    }
    Ok(())
}

/// Positions are the 1-based `#` column of `list` under the current filter.
#[instrument(skip(store, args, out))]
fn cmd_move<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command move");

    let [from, to] = args else {
        return Err(anyhow!("move requires <from> <to> positions"));
    };
    let from = parse_position(from)?;
    let to = parse_position(to)?;

    let moved = if store.filter() == FilterMode::All {
        store.reorder_task(from - 1, to - 1)?
    } else {
        store.reorder_visible(from - 1, to - 1)?
    };

    if moved {
        writeln!(out, "Moved task from position {from} to {to}.")?;
    } else {
        let shown = store.filtered_view().len();
        writeln!(
            out,
            "Cannot move: positions must be between 1 and {shown}."
        )?;
    }
    Ok(())
}

#[instrument(skip(store, args, out))]
fn cmd_filter<S: KeyValueStore, W: Write>(
    store: &mut TaskStore<S>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let Some(mode) = args.first() else {
        writeln!(out, "Filter: {}", store.filter())?;
        return Ok(());
    };

    if !store.set_filter_str(mode) {
        return Err(anyhow!(
            "unknown filter mode '{mode}' (expected all, completed or incompleted)"
        ));
    }
    writeln!(out, "Filter: {}", store.filter())?;
    Ok(())
}

fn cmd_export<S: KeyValueStore, W: Write>(
    store: &TaskStore<S>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command export");
    writeln!(out, "{}", storage::encode_tasks(store.tasks())?)?;
    Ok(())
}

fn cmd_show<W: Write>(cfg: &Config, out: &mut W) -> anyhow::Result<()> {
    for file in &cfg.loaded_files {
        writeln!(out, "# loaded {}", file.display())?;
    }
    for (k, v) in cfg.iter() {
        writeln!(out, "{k}={v}")?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "todo: a small persisted to-do list

Commands (unique prefixes work):
  add <text...>           append a task
  list [mode]             show tasks; mode is all, completed or incompleted
  toggle <id>             flip a task between done and not done
  delete <id>             remove a task
  rename <id> <text...>   replace a task's text
  move <from> <to>        move the task at position <from> to <to>
  filter [mode]           show or set the filter for this session
  export                  print the stored list as JSON
  shell                   read commands from stdin until quit/exit
  _show                   print effective configuration
  help | version"
    )?;
    Ok(())
}

fn parse_id(args: &[String]) -> anyhow::Result<u64> {
    let raw = args.first().ok_or_else(|| anyhow!("a task id is required"))?;
    raw.parse::<u64>()
        .with_context(|| format!("invalid task id: {raw}"))
}

fn parse_position(raw: &str) -> anyhow::Result<usize> {
    let position = raw
        .parse::<usize>()
        .with_context(|| format!("invalid position: {raw}"))?;
    if position == 0 {
        return Err(anyhow!("positions start at 1"));
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn run(store: &mut TaskStore<MemoryStore>, line: &str) -> anyhow::Result<String> {
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let inv = Invocation::from_tokens(&Config::default(), &tokens)?;
        let mut out = Vec::new();
        execute(store, &Config::default(), &Renderer::plain(), &inv, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn texts(store: &TaskStore<MemoryStore>) -> Vec<&str> {
        store.tasks().iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("ren", &known), Some("rename"));
        assert_eq!(expand_command_abbrev("d", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("_", &known), None);
        assert_eq!(expand_command_abbrev("", &known), None);
    }

    #[test]
    fn add_toggle_and_list_completed() {
        let mut store = TaskStore::open(MemoryStore::new()).expect("open");

        let out = run(&mut store, "add Buy   milk").expect("add");
        assert!(out.starts_with("Created task "));
        run(&mut store, "add Walk dog").expect("add");
        assert_eq!(run(&mut store, "add").expect("blank"), "Nothing to add: task text is empty.\n");

        let milk = store.tasks()[0].id;
        let out = run(&mut store, &format!("toggle {milk}")).expect("toggle");
        assert_eq!(out, format!("Task {milk} marked completed.\n"));

        let out = run(&mut store, "list completed").expect("list");
        assert!(out.contains("Buy milk"));
        assert!(!out.contains("Walk dog"));
        assert!(out.ends_with("1 shown, 1 completed, 1 remaining (filter: completed)\n"));

        assert!(run(&mut store, "list finished").is_err());
        assert_eq!(store.filter(), FilterMode::Completed);
    }

    #[test]
    fn move_rename_delete_by_command() {
        let mut store = TaskStore::open(MemoryStore::new()).expect("open");
        for text in ["A", "B", "C"] {
            run(&mut store, &format!("add {text}")).expect("add");
        }

        run(&mut store, "move 1 3").expect("move");
        assert_eq!(texts(&store), vec!["B", "C", "A"]);
        let out = run(&mut store, "move 1 4").expect("move out of range");
        assert_eq!(out, "Cannot move: positions must be between 1 and 3.\n");
        assert!(run(&mut store, "move 0 1").is_err());
        assert!(run(&mut store, "move 1").is_err());

        let id = store.tasks()[0].id;
        run(&mut store, &format!("rename {id}   Bee  ")).expect("rename");
        assert_eq!(texts(&store), vec!["Bee", "C", "A"]);
        let out = run(&mut store, &format!("rename {id}")).expect("blank rename");
        assert_eq!(out, format!("Task {id} unchanged: new text is empty.\n"));

        run(&mut store, &format!("delete {id}")).expect("delete");
        let out = run(&mut store, &format!("delete {id}")).expect("delete again");
        assert_eq!(out, format!("No task with id {id}.\n"));
        assert_eq!(texts(&store), vec!["C", "A"]);
        assert!(run(&mut store, "delete abc").is_err());
    }

    #[test]
    fn export_prints_stored_shape() {
        let mut store = TaskStore::open(MemoryStore::new()).expect("open");
        run(&mut store, "add x").expect("add");
        let id = store.tasks()[0].id;

        let out = run(&mut store, "export").expect("export");
        assert_eq!(
            out.trim(),
            format!(r#"[{{"id":{id},"text":"x","checked":false}}]"#)
        );
    }

    #[test]
    fn filter_without_argument_reports_current_mode() {
        let mut store = TaskStore::open(MemoryStore::new()).expect("open");
        assert_eq!(run(&mut store, "filter").expect("show"), "Filter: all\n");
        assert_eq!(run(&mut store, "fil incompleted").expect("set"), "Filter: incompleted\n");
        assert!(run(&mut store, "filter nope").is_err());
        assert_eq!(store.filter(), FilterMode::Incompleted);
    }
}
