use crate::{app::App, controller::RestoreOutcome};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

const DEFAULT_LOG_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct GlobalOptions {
    format: Option<OutputFormat>,
    data_dir: Option<PathBuf>,
    user_dir: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Slots,
    Show(u32),
    Active,
    Backup(u32),
    Restore(u32),
    Rename { index: u32, name: String },
    Saves,
    Import { save: String, slot: Option<u32> },
    Paths,
    Log(usize),
    Shell,
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args)?;
    let command = parse_command(&tokens)?;
    let format = global.format.unwrap_or(OutputFormat::Text);
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("modlist-backup v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut app = App::initialize(global.data_dir.as_deref(), global.user_dir.as_deref())?;
            run_command(&mut app, command, format)
        }
    }
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut global = GlobalOptions::default();
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            inline
                .clone()
                .or_else(|| iter.next().cloned())
                .ok_or_else(|| anyhow!("{name} requires a value"))
        };
        match flag {
            "--format" => {
                let raw = value("--format")?;
                global.format = Some(
                    OutputFormat::parse(&raw)
                        .ok_or_else(|| anyhow!("Unknown format: {raw} (use 'text' or 'json')"))?,
                );
            }
            "--data-dir" => global.data_dir = Some(PathBuf::from(value("--data-dir")?)),
            "--user-dir" => global.user_dir = Some(PathBuf::from(value("--user-dir")?)),
            _ => tokens.push(arg.to_string()),
        }
    }
    Ok((global, tokens))
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = &tokens[1..];
    let command = match head.as_str() {
        "--help" | "-h" | "help" => CliCommand::Help,
        "--version" | "-V" | "version" => CliCommand::Version,
        "slots" => CliCommand::Slots,
        "show" => CliCommand::Show(slot_arg(rest.first(), "show")?),
        "active" => CliCommand::Active,
        "backup" => CliCommand::Backup(slot_arg(rest.first(), "backup")?),
        "restore" => CliCommand::Restore(slot_arg(rest.first(), "restore")?),
        "rename" => {
            let index = slot_arg(rest.first(), "rename")?;
            if rest.len() < 2 {
                bail!("rename requires a slot and a name");
            }
            CliCommand::Rename {
                index,
                name: rest[1..].join(" "),
            }
        }
        "saves" => CliCommand::Saves,
        "import" => parse_import(rest)?,
        "paths" => CliCommand::Paths,
        "log" => {
            let lines = match rest.first() {
                Some(raw) => raw
                    .parse::<usize>()
                    .with_context(|| format!("invalid line count: {raw}"))?,
                None => DEFAULT_LOG_LINES,
            };
            CliCommand::Log(lines)
        }
        "shell" => CliCommand::Shell,
        other => bail!("Unknown command: {other} (see --help)"),
    };
    Ok(command)
}

fn parse_import(args: &[String]) -> Result<CliCommand> {
    let mut save = None;
    let mut slot = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--slot" => slot = Some(slot_arg(iter.next(), "--slot")?),
            value if value.starts_with("--slot=") => {
                let raw = value.trim_start_matches("--slot=").to_string();
                slot = Some(slot_arg(Some(&raw), "--slot")?);
            }
            value => {
                if save.is_some() {
                    bail!("import takes a single save");
                }
                save = Some(value.to_string());
            }
        }
    }
    let save = save.ok_or_else(|| anyhow!("import requires a save name or path"))?;
    Ok(CliCommand::Import { save, slot })
}

fn slot_arg(value: Option<&String>, command: &str) -> Result<u32> {
    let raw = value.ok_or_else(|| anyhow!("{command} requires a slot number"))?;
    raw.parse::<u32>()
        .with_context(|| format!("invalid slot number: {raw}"))
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Slots => list_slots(app, format),
        CliCommand::Show(index) => {
            let mods = app.slot_mods(index)?;
            print_mods(&app.slot_label(index), mods.ids(), format)
        }
        CliCommand::Active => {
            let mods = app.active_mods()?;
            print_mods("Active mods", mods.ids(), format)
        }
        CliCommand::Backup(index) => {
            app.backup(Some(index))?;
            println!("Backed up active mods to {}", app.slot_label(index));
            Ok(())
        }
        CliCommand::Restore(index) => {
            match app.restore(Some(index))? {
                RestoreOutcome::Restored => {
                    println!("Restored {}", app.slot_label(index));
                }
                RestoreOutcome::NotSet => {
                    println!("{} has no saved mod list", app.slot_label(index));
                }
            }
            Ok(())
        }
        CliCommand::Rename { index, name } => {
            app.rename(index, &name)?;
            println!("Renamed to {}", app.slot_label(index));
            Ok(())
        }
        CliCommand::Saves => list_saves(app, format),
        CliCommand::Import { save, slot } => {
            match slot {
                Some(index) => {
                    let count = app.backup_save(index, &save)?;
                    println!("Stored {count} mod(s) from {save} in {}", app.slot_label(index));
                }
                None => {
                    let count = app.import_save(&save)?;
                    println!("Activated {count} mod(s) from {save}");
                }
            }
            Ok(())
        }
        CliCommand::Paths => list_paths(app, format),
        CliCommand::Log(lines) => {
            println!("{}", app.log_tail_text(lines)?);
            Ok(())
        }
        CliCommand::Shell => {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            run_shell(app, stdin.lock(), &mut stdout)
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

#[derive(Serialize)]
struct SlotListItem {
    index: u32,
    name: String,
    set: bool,
    mods: usize,
    saved_at: Option<i64>,
    selected: bool,
}

fn list_slots(app: &App, format: OutputFormat) -> Result<()> {
    let items: Vec<SlotListItem> = app
        .slots()?
        .into_iter()
        .map(|slot| SlotListItem {
            selected: slot.index == app.selected(),
            index: slot.index,
            name: slot.name,
            set: slot.is_set,
            mods: slot.mod_count,
            saved_at: slot.saved_at,
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let marker = if item.set { " " } else { "*" };
                let saved = format_timestamp(item.saved_at);
                println!(
                    "{index:>2}{marker} {mods:>4} mods  {saved}  {name}",
                    index = item.index,
                    mods = item.mods,
                    name = item.name
                );
            }
        }
    }
    Ok(())
}

fn print_mods(title: &str, ids: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(ids)?);
        }
        OutputFormat::Text => {
            println!("{title} ({})", ids.len());
            for (position, id) in ids.iter().enumerate() {
                println!("{:>4} {id}", position + 1);
            }
        }
    }
    Ok(())
}

fn list_saves(app: &App, format: OutputFormat) -> Result<()> {
    let saves = app.saves();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&saves)?);
        }
        OutputFormat::Text => {
            if saves.is_empty() {
                println!("No saves in {}", app.paths.saves_dir.display());
            }
            for save in saves {
                println!("{}  {}", format_timestamp(save.modified_at), save.name);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    data_dir: String,
    slots_dir: String,
    log_file: String,
    user_dir: String,
    mods_config: String,
    saves_dir: String,
    state_limit: u32,
}

fn list_paths(app: &App, format: OutputFormat) -> Result<()> {
    let output = PathsOutput {
        data_dir: app.config.data_dir.display().to_string(),
        slots_dir: app.config.slots_dir().display().to_string(),
        log_file: app.config.log_path().display().to_string(),
        user_dir: app.paths.user_dir.display().to_string(),
        mods_config: app.mods_config_path().display().to_string(),
        saves_dir: app.paths.saves_dir.display().to_string(),
        state_limit: app.state_limit(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Data dir: {}", output.data_dir);
            println!("Slots: {}", output.slots_dir);
            println!("Log: {}", output.log_file);
            println!("RimWorld user dir: {}", output.user_dir);
            println!("ModsConfig: {}", output.mods_config);
            println!("Saves: {}", output.saves_dir);
            println!("Slot count: {}", output.state_limit);
        }
    }
    Ok(())
}

/// Line-based session. The selected slot and the undo buffer last until
/// `quit` or end of input.
fn run_shell(app: &mut App, input: impl BufRead, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "modlist-backup shell, {} slots. Type 'help' for commands.",
        app.state_limit()
    )?;
    write_prompt(app, out)?;
    for line in input.lines() {
        let line = line.context("read shell input")?;
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((head, rest)) = words.split_first() else {
            write_prompt(app, out)?;
            continue;
        };
        if matches!(*head, "quit" | "exit") {
            break;
        }
        if let Err(err) = shell_command(app, head, rest, out) {
            writeln!(out, "error: {err:#}")?;
        }
        write_prompt(app, out)?;
    }
    Ok(())
}

fn shell_command(app: &mut App, head: &str, rest: &[&str], out: &mut impl Write) -> Result<()> {
    let slot = |value: Option<&&str>| -> Result<Option<u32>> {
        value
            .map(|raw| {
                raw.parse::<u32>()
                    .with_context(|| format!("invalid slot number: {raw}"))
            })
            .transpose()
    };
    match head {
        "select" => {
            let index = slot(rest.first())?.ok_or_else(|| anyhow!("select requires a slot"))?;
            app.select(index)?;
        }
        "slots" => {
            for summary in app.slots()? {
                let cursor = if summary.index == app.selected() { ">" } else { " " };
                writeln!(out, "{cursor} {}", summary.label())?;
            }
            return Ok(());
        }
        "backup" => app.backup(slot(rest.first())?)?,
        "restore" => {
            app.restore(slot(rest.first())?)?;
        }
        "undo" => {
            app.undo()?;
        }
        "rename" => {
            let index = slot(rest.first())?.ok_or_else(|| anyhow!("rename requires a slot"))?;
            app.rename(index, &rest[1..].join(" "))?;
        }
        "show" => {
            let index = slot(rest.first())?.unwrap_or(app.selected());
            for id in app.slot_mods(index)?.iter() {
                writeln!(out, "  {id}")?;
            }
            return Ok(());
        }
        "active" => {
            for id in app.active_mods()?.iter() {
                writeln!(out, "  {id}")?;
            }
            return Ok(());
        }
        "import" => {
            let save = rest.join(" ");
            if save.is_empty() {
                bail!("import requires a save name");
            }
            app.import_save(&save)?;
        }
        "help" => {
            writeln!(
                out,
                "select <n> | slots | backup [n] | restore [n] | undo | rename <n> <name> | show [n] | active | import <save> | quit"
            )?;
            return Ok(());
        }
        other => bail!("unknown command: {other}"),
    }
    writeln!(out, "{}", app.status_line())?;
    Ok(())
}

fn write_prompt(app: &App, out: &mut impl Write) -> Result<()> {
    let undo = if app.can_undo() { " (undo)" } else { "" };
    write!(out, "[{}]{undo}> ", app.slot_label(app.selected()))?;
    out.flush()?;
    Ok(())
}

fn print_help() {
    println!("modlist-backup v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  modlist-backup slots                     List backup slots");
    println!("  modlist-backup show <n>                  List mods stored in a slot");
    println!("  modlist-backup active                    List the active mods");
    println!("  modlist-backup backup <n>                Save the active mods to slot n");
    println!("  modlist-backup restore <n>               Make slot n the active mod list");
    println!("  modlist-backup rename <n> <name>         Name a slot");
    println!("  modlist-backup saves                     List save files");
    println!("  modlist-backup import <save> [--slot n]  Activate (or store) a save's mods");
    println!("  modlist-backup paths                     Show resolved paths");
    println!("  modlist-backup log [lines]               Show the end of the log");
    println!("  modlist-backup shell                     Interactive session with undo");
    println!();
    println!("Global options:");
    println!("  --format <json|text>                     Output format for list commands");
    println!("  --data-dir <path>                        Override the backup data directory");
    println!("  --user-dir <path>                        Override the RimWorld user directory");
    println!("  -h, --help                               Show help");
    println!("  -V, --version                            Show version");
}

fn format_timestamp(value: Option<i64>) -> String {
    value
        .filter(|value| *value > 0)
        .and_then(|value| time::OffsetDateTime::from_unix_timestamp(value).ok())
        .and_then(|date| {
            date.format(time::macros::format_description!(
                "[year]-[month]-[day] [hour]:[minute]"
            ))
            .ok()
        })
        .unwrap_or_else(|| "---------- -----".to_string())
}
