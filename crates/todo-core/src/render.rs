use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::filter::FilterMode;
use crate::store::TaskCounts;
use crate::task::Task;

/// A row to print: the 1-based position the user addresses the task by,
/// and the task itself.
pub type Row<'a> = (usize, &'a Task);

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true) && io::stdout().is_terminal();
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn write_task_table<W: Write>(&self, writer: W, rows: &[Row<'_>]) -> anyhow::Result<()> {
        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "Done".to_string(),
            "Text".to_string(),
        ];

        let body = rows
            .iter()
            .map(|(position, task)| {
                let done = if task.checked { "[x]" } else { "[ ]" };
                let text = if task.checked {
                    self.paint(&task.text, "9")
                } else {
                    task.text.clone()
                };
                vec![
                    self.paint(&position.to_string(), "33"),
                    task.id.to_string(),
                    done.to_string(),
                    text,
                ]
            })
            .collect();

        write_table(writer, headers, body)
    }

    pub fn summary_line(&self, shown: usize, mode: FilterMode, counts: TaskCounts) -> String {
        let mut line = format!(
            "{shown} shown, {} completed, {} remaining",
            counts.completed, counts.incompleted
        );
        if mode != FilterMode::All {
            line.push_str(&format!(" (filter: {mode})"));
        }
        line
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let last = column_count.saturating_sub(1);
    let write_row = |writer: &mut W, cells: &[String]| -> io::Result<()> {
        for (idx, cell) in cells.iter().enumerate() {
            if idx == last {
                write!(writer, "{cell}")?;
            } else {
                let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
                let padding = widths[idx].saturating_sub(visible_width);
                write!(writer, "{}{} ", cell, " ".repeat(padding))?;
            }
        }
        writeln!(writer)
    };

    write_row(&mut writer, &headers)?;
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    write_row(&mut writer, &rule)?;
    for row in &rows {
        write_row(&mut writer, row)?;
    }

    Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_wide_text() {
        let mut done = Task::new(1700000000000, "寿司を買う").expect("task");
        done.checked = true;
        let open = Task::new(7, "walk").expect("task");

        let mut out = Vec::new();
        Renderer::plain()
            .write_task_table(&mut out, &[(1, &done), (2, &open)])
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "# ID            Done Text");
        assert_eq!(lines[1], "- ------------- ---- ----------");
        assert_eq!(lines[2], "1 1700000000000 [x]  寿司を買う");
        assert_eq!(lines[3], "2 7             [ ]  walk");
    }

    #[test]
    fn color_setting_uses_config_booleans() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("color".to_string(), "n".to_string())]);
        assert!(!Renderer::new(&cfg).expect("renderer").color);

        cfg.apply_overrides([("color".to_string(), "y".to_string())]);
        assert!(Renderer::new(&cfg).is_ok());

        cfg.apply_overrides([("color".to_string(), "sometimes".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[33m12\x1b[0m"), "12");
    }

    #[test]
    fn summary_mentions_non_default_filter() {
        let counts = TaskCounts {
            total: 3,
            completed: 1,
            incompleted: 2,
        };
        let r = Renderer::plain();
        assert_eq!(
            r.summary_line(3, FilterMode::All, counts),
            "3 shown, 1 completed, 2 remaining"
        );
        assert_eq!(
            r.summary_line(1, FilterMode::Completed, counts),
            "1 shown, 1 completed, 2 remaining (filter: completed)"
        );
    }
}
