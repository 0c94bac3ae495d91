use std::collections::BTreeMap;

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cli::Invocation;
use crate::dashboard::Dashboard;
use crate::provider::Provider;
use crate::render::{Renderer, short_id};
use crate::sanitize::normalize_shortcut;
use crate::settings::ShortcutEntry;
use crate::storage::Storage;
use crate::weather::{
    PLACEHOLDER, code_to_icon, code_to_text, deg_to_arrow, deg_to_compass, fmt_date_short,
    fmt_day, fmt_hm,
};

/// Command run when none is given on the command line.
pub const DEFAULT_COMMAND: &str = "settings";

pub const COMMANDS: &[&str] = &[
    "settings",
    "provider",
    "openmode",
    "shortcuts",
    "pin",
    "unpin",
    "order",
    "reset",
    "search",
    "tree",
    "info",
    "add",
    "addlist",
    "addproject",
    "toggle",
    "rename",
    "delete",
    "seed",
    "weather",
    "wind",
    "when",
    "help",
    "version",
];

/// Resolves an exact command name or a prefix shared by exactly one
/// command.
pub fn resolve_command(token: &str) -> Option<&'static str> {
    if let Some(exact) = COMMANDS.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut candidates = COMMANDS
        .iter()
        .copied()
        .filter(|name| name.starts_with(token));
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Task,
    List,
    Project,
}

impl EntityKind {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "task" | "tasks" => Ok(EntityKind::Task),
            "list" | "lists" => Ok(EntityKind::List),
            "project" | "projects" => Ok(EntityKind::Project),
            other => Err(anyhow!("expected task, list or project, got: {other}")),
        }
    }
}

#[instrument(skip(dashboard, renderer, inv))]
pub fn dispatch<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command;
    let args = inv.command_args.as_slice();
    debug!(command, ?args, "dispatching command");

    match command {
        "settings" => renderer.print_settings(dashboard.settings.snapshot()),
        "provider" => cmd_provider(dashboard, renderer, args),
        "openmode" => cmd_open_mode(dashboard, renderer, args),
        "shortcuts" => renderer.print_shortcuts(dashboard.settings.shortcuts()),
        "pin" => cmd_pin(dashboard, renderer, args),
        "unpin" => cmd_unpin(dashboard, args),
        "order" => cmd_order(dashboard, renderer, args),
        "reset" => {
            dashboard.settings.reset();
            renderer.print_settings(dashboard.settings.snapshot())
        }
        "search" => cmd_search(dashboard, renderer, args),
        "tree" => renderer.print_tree(&dashboard.tasks),
        "info" => cmd_info(dashboard, renderer, args),
        "add" => cmd_add_task(dashboard, renderer, args),
        "addlist" => cmd_add_list(dashboard, renderer, args),
        "addproject" => cmd_add_project(dashboard, renderer, args),
        "toggle" => cmd_toggle(dashboard, renderer, args),
        "rename" => cmd_rename(dashboard, args),
        "delete" => cmd_delete(dashboard, args),
        "seed" => {
            if dashboard.tasks.seed_if_empty() {
                renderer.print_tree(&dashboard.tasks)
            } else {
                renderer.print_line("already tracking items; nothing seeded")
            }
        }
        "weather" => cmd_weather(renderer, args),
        "wind" => cmd_wind(renderer, args),
        "when" => cmd_when(renderer, args),
        "help" => cmd_help(renderer),
        "version" => renderer.print_line(env!("CARGO_PKG_VERSION")),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn cmd_provider<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    if let Some(raw) = args.first() {
        if Provider::parse(raw).is_none() {
            let known: Vec<&str> = Provider::ALL.iter().map(|p| p.as_str()).collect();
            warn!(provider = %raw, "unknown provider; falling back to default");
            renderer.print_line(&format!(
                "unknown provider {raw:?} (known: {}); using {}",
                known.join(", "),
                Provider::default()
            ))?;
        }
        dashboard.settings.set_provider(raw);
    }
    renderer.print_settings(dashboard.settings.snapshot())
}

fn cmd_open_mode<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    if let Some(raw) = args.first() {
        dashboard.settings.set_open_mode(raw);
    }
    renderer.print_settings(dashboard.settings.snapshot())
}

/// `pin <href> [id:..] [label:..] [icon:..] [label words...]`
fn cmd_pin<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let (mods, words) = split_modifiers(args, &["id", "label", "icon"]);
    let (href, label_words) = words
        .split_first()
        .ok_or_else(|| anyhow!("pin requires a link"))?;

    let mut label = mods
        .get("label")
        .map(|label| label.to_string())
        .unwrap_or_else(|| label_words.join(" "));
    let id = mods.get("id").copied().unwrap_or_default();
    if id.trim().is_empty() && label.trim().is_empty() {
        label = Url::parse(href)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default();
    }

    let entry = ShortcutEntry::new(id, label, mods.get("icon").copied().unwrap_or_default(), *href);
    if normalize_shortcut(&entry).is_none() {
        return Err(anyhow!(
            "cannot identify shortcut for {href}; pass id:<slug> or label:<text>"
        ));
    }
    dashboard.settings.upsert_shortcut(&entry);
    info!(href = %href, "pinned shortcut");
    renderer.print_shortcuts(dashboard.settings.shortcuts())
}

fn cmd_unpin<S: Storage>(dashboard: &mut Dashboard<S>, args: &[String]) -> anyhow::Result<()> {
    let id = args
        .first()
        .ok_or_else(|| anyhow!("unpin requires a shortcut id"))?;
    if dashboard.settings.snapshot().shortcut(id.trim()).is_none() {
        return Err(anyhow!("no shortcut with id {id}"));
    }
    dashboard.settings.delete_shortcut(id);
    Ok(())
}

fn cmd_order<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    if args.is_empty() {
        return Err(anyhow!("order requires one or more shortcut ids"));
    }
    dashboard.settings.set_order(args);
    renderer.print_shortcuts(dashboard.settings.shortcuts())
}

fn cmd_search<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let query = args.join(" ");
    if query.trim().is_empty() {
        return Err(anyhow!("search requires a query"));
    }
    let provider = dashboard.settings.provider();
    let url = provider
        .search_url(&query)
        .with_context(|| format!("failed to build {provider} search url"))?;
    renderer.print_line(&format!(
        "{url}\t{}",
        dashboard.settings.open_mode().link_target()
    ))
}

fn cmd_info<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let prefix = args.first().ok_or_else(|| anyhow!("info requires a task id"))?;
    let id = resolve_id(dashboard.tasks.state().tasks.keys(), prefix, "task")?;
    let task = dashboard
        .tasks
        .task(&id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    renderer.print_task_info(task)
}

fn cmd_add_task<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let (mods, words) = split_modifiers(args, &["list"]);
    let title = required_title(&words)?;
    let list_id = mods
        .get("list")
        .map(|prefix| resolve_id(dashboard.tasks.state().lists.keys(), prefix, "list"))
        .transpose()?;

    let id = dashboard.tasks.add_task(&title, list_id.as_deref());
    renderer.print_line(&format!("created task {}", short_id(&id)))
}

fn cmd_add_list<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let (mods, words) = split_modifiers(args, &["project"]);
    let title = required_title(&words)?;
    let project_id = mods
        .get("project")
        .map(|prefix| resolve_id(dashboard.tasks.state().projects.keys(), prefix, "project"))
        .transpose()?;

    let id = dashboard.tasks.add_list(&title, project_id.as_deref());
    renderer.print_line(&format!("created list {}", short_id(&id)))
}

fn cmd_add_project<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let words: Vec<&str> = args.iter().map(String::as_str).collect();
    let title = required_title(&words)?;
    let id = dashboard.tasks.add_project(&title);
    renderer.print_line(&format!("created project {}", short_id(&id)))
}

fn cmd_toggle<S: Storage>(
    dashboard: &mut Dashboard<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    if args.is_empty() {
        return Err(anyhow!("toggle requires one or more task ids"));
    }
    for prefix in args {
        let id = resolve_id(dashboard.tasks.state().tasks.keys(), prefix, "task")?;
        dashboard.tasks.toggle_task(&id);
        if let Some(task) = dashboard.tasks.task(&id) {
            let state = if task.done { "done" } else { "open" };
            renderer.print_line(&format!("{} {state}: {}", short_id(&id), task.title))?;
        }
    }
    Ok(())
}

fn cmd_rename<S: Storage>(dashboard: &mut Dashboard<S>, args: &[String]) -> anyhow::Result<()> {
    let [kind, prefix, rest @ ..] = args else {
        return Err(anyhow!("usage: rename <task|list|project> <id> <title>"));
    };
    let words: Vec<&str> = rest.iter().map(String::as_str).collect();
    let title = required_title(&words)?;

    match EntityKind::parse(kind)? {
        EntityKind::Task => {
            let id = resolve_id(dashboard.tasks.state().tasks.keys(), prefix, "task")?;
            dashboard.tasks.rename_task(&id, &title);
        }
        EntityKind::List => {
            let id = resolve_id(dashboard.tasks.state().lists.keys(), prefix, "list")?;
            dashboard.tasks.rename_list(&id, &title);
        }
        EntityKind::Project => {
            let id = resolve_id(dashboard.tasks.state().projects.keys(), prefix, "project")?;
            dashboard.tasks.rename_project(&id, &title);
        }
    }
    Ok(())
}

fn cmd_delete<S: Storage>(dashboard: &mut Dashboard<S>, args: &[String]) -> anyhow::Result<()> {
    let [kind, prefix] = args else {
        return Err(anyhow!("usage: delete <task|list|project> <id>"));
    };

    match EntityKind::parse(kind)? {
        EntityKind::Task => {
            let id = resolve_id(dashboard.tasks.state().tasks.keys(), prefix, "task")?;
            dashboard.tasks.delete_task(&id);
        }
        EntityKind::List => {
            let id = resolve_id(dashboard.tasks.state().lists.keys(), prefix, "list")?;
            dashboard.tasks.delete_list(&id);
        }
        EntityKind::Project => {
            let id = resolve_id(dashboard.tasks.state().projects.keys(), prefix, "project")?;
            dashboard.tasks.delete_project(&id);
        }
    }
    Ok(())
}

fn cmd_weather(renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    let raw = args.first().ok_or_else(|| anyhow!("weather requires a condition code"))?;
    let code: i64 = raw
        .parse()
        .with_context(|| format!("invalid weather code: {raw}"))?;
    let is_day = !args[1..].iter().any(|arg| arg.eq_ignore_ascii_case("night"));
    renderer.print_line(&format!(
        "{} ({})",
        code_to_text(code),
        code_to_icon(code, is_day)
    ))
}

fn cmd_wind(renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    let deg = args
        .first()
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(f64::NAN);
    renderer.print_line(&format!("{} {}", deg_to_compass(deg), deg_to_arrow(deg)))
}

/// Date-only values print as `Fri, Oct 16`; anything else as a clock time
/// in the display timezone.
fn cmd_when(renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    let raw = args.first().map(String::as_str).unwrap_or(PLACEHOLDER);
    let line = if raw.len() == 10 && raw.as_bytes().get(4) == Some(&b'-') {
        format!("{}, {}", fmt_day(raw), fmt_date_short(raw))
    } else {
        fmt_hm(raw, renderer.timezone())
    };
    renderer.print_line(&line)
}

fn cmd_help(renderer: &mut Renderer) -> anyhow::Result<()> {
    let lines = [
        "settings                              show search settings",
        "provider [Google|DuckDuckGo|Bing|Perplexity]",
        "openmode [current|new]",
        "shortcuts                             list shortcuts",
        "pin <href> [id:..] [label:..] [icon:..] [label words]",
        "unpin <id>",
        "order <id>...                         move shortcuts to the front",
        "reset                                 restore default settings",
        "search <query>                        print the search url",
        "tree                                  show projects, lists and tasks",
        "info <task>",
        "add <title> [list:<id>]",
        "addlist <title> [project:<id>]",
        "addproject <title>",
        "toggle <task>...",
        "rename <task|list|project> <id> <title>",
        "delete <task|list|project> <id>",
        "seed                                  add demo items to an empty store",
        "weather <code> [night]",
        "wind <degrees>",
        "when <YYYY-MM-DD|timestamp>",
    ];
    for line in lines {
        renderer.print_line(line)?;
    }
    Ok(())
}

fn required_title(words: &[&str]) -> anyhow::Result<String> {
    let title = words.join(" ");
    if title.trim().is_empty() {
        return Err(anyhow!("a title is required"));
    }
    Ok(title)
}

/// Separates `key:value` modifiers for the given keys from plain words.
fn split_modifiers<'a>(
    args: &'a [String],
    keys: &[&str],
) -> (BTreeMap<&'a str, &'a str>, Vec<&'a str>) {
    let mut mods = BTreeMap::new();
    let mut words = Vec::new();
    for arg in args {
        match arg.split_once(':') {
            Some((key, value)) if keys.contains(&key) => {
                mods.insert(key, value);
            }
            _ => words.push(arg.as_str()),
        }
    }
    (mods, words)
}

/// Exact id, or the single id starting with `prefix`.
fn resolve_id<'a, I>(ids: I, prefix: &str, kind: &str) -> anyhow::Result<String>
where
    I: Iterator<Item = &'a String>,
{
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(anyhow!("{kind} id cannot be empty"));
    }

    let matches: Vec<&String> = ids.filter(|id| id.starts_with(prefix)).collect();
    if let Some(exact) = matches.iter().find(|id| id.as_str() == prefix) {
        return Ok((*exact).clone());
    }
    match matches.as_slice() {
        [] => Err(anyhow!("no {kind} matches {prefix}")),
        [only] => Ok((*only).clone()),
        many => Err(anyhow!("{kind} id {prefix} is ambiguous ({} matches)", many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn resolves_unique_prefixes_only() {
        assert_eq!(resolve_command("tr"), Some("tree"));
        assert_eq!(resolve_command("add"), Some("add"));
        assert_eq!(resolve_command("addl"), Some("addlist"));
        assert_eq!(resolve_command("se"), None);
        assert_eq!(resolve_command("xyz"), None);
        assert_eq!(resolve_command(""), None);
    }

    #[test]
    fn modifiers_are_split_from_words() {
        let args = strings(&["Buy", "milk", "list:ab12", "note:keep"]);
        let (mods, words) = split_modifiers(&args, &["list"]);
        assert_eq!(mods.get("list"), Some(&"ab12"));
        assert_eq!(words, vec!["Buy", "milk", "note:keep"]);
    }

    #[test]
    fn resolves_unique_prefixes() {
        let ids = strings(&["abc123", "abd456", "abc"]);
        assert_eq!(resolve_id(ids.iter(), "abd", "task").expect("unique"), "abd456");
        assert_eq!(resolve_id(ids.iter(), "abc", "task").expect("exact"), "abc");
        assert!(resolve_id(ids.iter(), "ab", "task").is_err());
        assert!(resolve_id(ids.iter(), "zz", "task").is_err());
        assert!(resolve_id(ids.iter(), " ", "task").is_err());
    }

    #[test]
    fn entity_kinds_parse() {
        assert_eq!(EntityKind::parse("Project").expect("kind"), EntityKind::Project);
        assert!(EntityKind::parse("board").is_err());
    }

    #[test]
    fn titles_must_not_be_blank() {
        assert!(required_title(&[]).is_err());
        assert!(required_title(&[" "]).is_err());
        assert_eq!(required_title(&["a", "b"]).expect("title"), "a b");
    }
}
