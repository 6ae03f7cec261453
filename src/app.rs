use crate::{
    active::ModsConfigFile,
    config::AppConfig,
    controller::{RestoreOutcome, StateController, UndoOutcome},
    error::StoreResult,
    modlist::ModList,
    rimworld::{self, GamePaths},
    savefile::{self, SaveEntry},
    slots::{SlotStore, SlotSummary},
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use time::{macros::format_description, OffsetDateTime};

const LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One user session: the selected slot, the last status line and the log
/// live here, next to the controller that owns the undo buffer.
pub struct App {
    pub config: AppConfig,
    pub paths: GamePaths,
    controller: StateController<ModsConfigFile>,
    selected: u32,
    status: String,
    logs: Vec<LogEntry>,
    log_path: PathBuf,
}

impl App {
    pub fn initialize(data_dir: Option<&Path>, user_dir: Option<&Path>) -> Result<Self> {
        let config = match data_dir {
            Some(dir) => AppConfig::load_or_create_in(dir)?,
            None => AppConfig::load_or_create()?,
        };
        let user_dir = user_dir
            .map(Path::to_path_buf)
            .or_else(|| config.user_dir.clone());
        let paths = rimworld::detect_paths(user_dir.as_deref())?;
        Self::with_paths(config, paths)
    }

    pub fn with_paths(config: AppConfig, paths: GamePaths) -> Result<Self> {
        let store =
            SlotStore::open(config.slots_dir(), config.state_limit).context("open slot store")?;
        let controller =
            StateController::new(store, ModsConfigFile::new(&paths.mods_config_path));
        Ok(Self {
            log_path: config.log_path(),
            config,
            paths,
            controller,
            selected: 1,
            status: String::new(),
            logs: Vec::new(),
        })
    }

    pub fn selected(&self) -> u32 {
        self.selected
    }

    pub fn state_limit(&self) -> u32 {
        self.controller.store().state_limit()
    }

    pub fn can_undo(&self) -> bool {
        self.controller.can_undo()
    }

    pub fn status_line(&self) -> &str {
        &self.status
    }

    #[cfg(test)]
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn select(&mut self, index: u32) -> Result<()> {
        let checked = self.controller.store().check_index(index);
        self.finish(checked, "select slot")?;
        self.selected = index;
        let label = self.slot_label(index);
        self.status = format!("Selected {label}");
        Ok(())
    }

    pub fn backup(&mut self, index: Option<u32>) -> Result<()> {
        let index = index.unwrap_or(self.selected);
        let result = self.controller.backup_current(index);
        self.finish(result, "back up active mods")?;
        let label = self.slot_label(index);
        self.log_info(format!("Backed up active mod list to {label}"));
        self.status = "Backed up".to_string();
        Ok(())
    }

    pub fn restore(&mut self, index: Option<u32>) -> Result<RestoreOutcome> {
        let index = index.unwrap_or(self.selected);
        let result = self.controller.restore(index);
        let outcome = self.finish(result, "restore mod list")?;
        let label = self.slot_label(index);
        match outcome {
            RestoreOutcome::Restored => {
                self.log_info(format!("Restored mod list from {label}"));
                self.status = "Restored".to_string();
            }
            RestoreOutcome::NotSet => {
                self.log_warn(format!("{label} has no saved mod list"));
                self.status = "Slot is empty".to_string();
            }
        }
        Ok(outcome)
    }

    pub fn undo(&mut self) -> Result<UndoOutcome> {
        let result = self.controller.undo();
        let outcome = self.finish(result, "undo restore")?;
        match outcome {
            UndoOutcome::Undone => {
                self.log_info("Undid last restore".to_string());
                self.status = "Undone".to_string();
            }
            UndoOutcome::Nothing => {
                self.status = "Nothing to undo".to_string();
            }
        }
        Ok(outcome)
    }

    pub fn rename(&mut self, index: u32, name: &str) -> Result<()> {
        let result = self.controller.rename(index, name);
        self.finish(result, "rename slot")?;
        let label = self.slot_label(index);
        self.log_info(format!("Renamed slot {index} to {label}"));
        self.status = "Renamed".to_string();
        Ok(())
    }

    pub fn import_save(&mut self, save: &str) -> Result<usize> {
        let path = savefile::resolve_save(&self.paths.saves_dir, save);
        let result = self.controller.import_save(&path);
        let count = self.finish(result, "import mods from save")?;
        self.log_info(format!(
            "Imported {count} mod(s) from {} as the active list",
            path.display()
        ));
        self.status = "Imported".to_string();
        Ok(count)
    }

    pub fn backup_save(&mut self, index: u32, save: &str) -> Result<usize> {
        let path = savefile::resolve_save(&self.paths.saves_dir, save);
        let result = self.controller.backup_from_save(index, &path);
        let count = self.finish(result, "back up mods from save")?;
        let label = self.slot_label(index);
        self.log_info(format!(
            "Stored {count} mod(s) from {} in {label}",
            path.display()
        ));
        self.status = "Backed up".to_string();
        Ok(count)
    }

    pub fn slots(&self) -> Result<Vec<SlotSummary>> {
        self.controller.slots().context("list slots")
    }

    pub fn slot_mods(&self, index: u32) -> Result<ModList> {
        self.controller
            .store()
            .load(index)
            .with_context(|| format!("load slot {index}"))
    }

    pub fn active_mods(&self) -> Result<ModList> {
        self.controller.active_list().context("read active mods")
    }

    pub fn mods_config_path(&self) -> &Path {
        self.controller.active().path()
    }

    pub fn saves(&self) -> Vec<SaveEntry> {
        savefile::list_saves(&self.paths.saves_dir)
    }

    pub fn slot_label(&self, index: u32) -> String {
        match self.controller.name_for(index) {
            Ok(name) => format!("{index}. {name}"),
            Err(_) => format!("slot {index}"),
        }
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    pub fn log_tail_text(&self, lines: usize) -> Result<String> {
        if lines == 0 {
            return Ok(String::new());
        }
        let raw = if self.log_path.exists() {
            fs::read_to_string(&self.log_path).context("read log file")?
        } else {
            self.log_text_from_entries()
        };
        let entries: Vec<&str> = raw.lines().collect();
        let start = entries.len().saturating_sub(lines);
        Ok(entries[start..].join("\n"))
    }

    fn log_text_from_entries(&self) -> String {
        self.logs
            .iter()
            .map(|entry| format!("[{}] {}", log_level_label(entry.level), entry.message))
            .collect::<Vec<String>>()
            .join("\n")
    }

    /// Logs a failed operation and turns it into an `anyhow` error with
    /// `action` as context. Storage failures are errors; rejected input and
    /// unreadable game files are warnings.
    fn finish<T>(&mut self, result: StoreResult<T>, action: &'static str) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_persistence_failure() {
                    self.log_error(format!("{action} failed, slot storage unusable: {err}"));
                    self.status = format!("Storage error: {err}");
                } else {
                    self.log_warn(format!("{action}: {err}"));
                    self.status = err.to_string();
                }
                Err(anyhow::Error::new(err).context(action))
            }
        }
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogEntry {
            level,
            message: message.clone(),
        });

        if self.logs.len() > LOG_CAPACITY {
            let overflow = self.logs.len() - LOG_CAPACITY;
            self.logs.drain(0..overflow);
        }

        if self.config.log_to_file {
            let _ = append_log_file(&self.log_path, level, &message);
        }
    }
}

fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{stamp} [{label}] {message}")
}
