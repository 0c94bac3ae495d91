use std::io::{self, IsTerminal, Write};

use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::from_millis;
use crate::provider::ProviderIcon;
use crate::settings::{SettingsSnapshot, ShortcutEntry};
use crate::storage::Storage;
use crate::tasks::{List, Task, TaskStore};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    timezone: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, timezone: Tz) -> anyhow::Result<Self> {
        Ok(Self {
            color: cfg.color()?,
            timezone,
        })
    }

    pub fn timezone(&self) -> &Tz {
        &self.timezone
    }

    #[tracing::instrument(skip(self, snapshot))]
    pub fn print_settings(&mut self, snapshot: &SettingsSnapshot) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let icon = match snapshot.provider.icon() {
            ProviderIcon::Simple(slug) => format!("si:{slug}"),
            ProviderIcon::FontAwesome(class) => class.to_string(),
        };

        writeln!(out, "provider  {} ({icon})", self.paint(snapshot.provider.label(), "36"))?;
        writeln!(
            out,
            "open      {} ({})",
            snapshot.open_mode,
            snapshot.open_mode.link_target()
        )?;
        writeln!(out, "order     {}", snapshot.order().join(" "))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, shortcuts))]
    pub fn print_shortcuts(&mut self, shortcuts: &[ShortcutEntry]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if shortcuts.is_empty() {
            writeln!(out, "no shortcuts")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "Label".to_string(),
            "Icon".to_string(),
            "Link".to_string(),
        ];
        let rows = shortcuts
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    entry.id.clone(),
                    entry.label.clone(),
                    entry.icon.clone(),
                    entry.href.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    /// Projects with their lists and tasks, then top-level lists, then
    /// ungrouped tasks.
    #[tracing::instrument(skip(self, store))]
    pub fn print_tree<S: Storage>(&mut self, store: &TaskStore<S>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if store.state().is_empty() {
            writeln!(out, "nothing tracked yet")?;
            return Ok(());
        }

        for project in store.projects() {
            writeln!(
                out,
                "{} {}",
                self.paint(&short_id(&project.id), "33"),
                self.paint(&project.title, "1")
            )?;
            for list in store.lists_by_project(Some(&project.id)) {
                self.write_list(&mut out, store, list, 1)?;
            }
        }

        for list in store.ungrouped_lists() {
            self.write_list(&mut out, store, list, 0)?;
        }

        let ungrouped = store.ungrouped_tasks();
        if !ungrouped.is_empty() {
            writeln!(out, "{}", self.paint("(ungrouped)", "2"))?;
            for task in ungrouped {
                self.write_task(&mut out, task, 1)?;
            }
        }

        Ok(())
    }

    fn write_list<W: Write, S: Storage>(
        &self,
        out: &mut W,
        store: &TaskStore<S>,
        list: &List,
        depth: usize,
    ) -> anyhow::Result<()> {
        let tasks = store.tasks_by_list(Some(&list.id));
        let done = tasks.iter().filter(|task| task.done).count();
        writeln!(
            out,
            "{}{} {} [{done}/{}]",
            "  ".repeat(depth),
            self.paint(&short_id(&list.id), "33"),
            list.title,
            tasks.len()
        )?;
        for task in tasks {
            self.write_task(out, task, depth + 1)?;
        }
        Ok(())
    }

    fn write_task<W: Write>(&self, out: &mut W, task: &Task, depth: usize) -> anyhow::Result<()> {
        let mark = if task.done {
            self.paint("[x]", "32")
        } else {
            "[ ]".to_string()
        };
        writeln!(
            out,
            "{}{} {} {}",
            "  ".repeat(depth),
            mark,
            self.paint(&short_id(&task.id), "33"),
            task.title
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "done      {}", task.done)?;
        writeln!(out, "list      {}", task.list_id.as_deref().unwrap_or("-"))?;
        writeln!(out, "created   {}", self.format_millis(task.created_at))?;
        writeln!(out, "updated   {}", self.format_millis(task.updated_at))?;
        Ok(())
    }

    pub fn print_line(&mut self, line: &str) -> anyhow::Result<()> {
        writeln!(io::stdout().lock(), "{line}")?;
        Ok(())
    }

    fn format_millis(&self, millis: i64) -> String {
        from_millis(millis)
            .map(|dt| {
                dt.with_timezone(&self.timezone)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// First eight characters of an entity id, enough to address it from the
/// command line.
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
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
