use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_STATE_LIMIT: u32 = 10;
pub const MAX_STATE_LIMIT: u32 = 99;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    #[serde(default = "default_state_limit")]
    pub state_limit: u32,
    #[serde(default)]
    pub user_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub log_to_file: bool,
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_in(&base_data_dir()?)
    }

    pub fn load_or_create_in(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("create app data dir")?;
        let path = data_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            config.data_dir = data_dir.to_path_buf();
            config.validate()?;
            return Ok(config);
        }

        let config = AppConfig {
            data_dir: data_dir.to_path_buf(),
            state_limit: DEFAULT_STATE_LIMIT,
            user_dir: None,
            log_to_file: true,
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).context("create app data dir")?;
        let path = self.data_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    pub fn slots_dir(&self) -> PathBuf {
        self.data_dir.join("slots")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("modlist-backup.log")
    }

    fn validate(&self) -> Result<()> {
        if self.state_limit == 0 || self.state_limit > MAX_STATE_LIMIT {
            bail!(
                "state_limit must be between 1 and {MAX_STATE_LIMIT}, got {}",
                self.state_limit
            );
        }
        Ok(())
    }
}

fn default_state_limit() -> u32 {
    DEFAULT_STATE_LIMIT
}

fn default_true() -> bool {
    true
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("modlist-backup"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert_eq!(config.state_limit, DEFAULT_STATE_LIMIT);
        assert!(config.log_to_file);
        assert!(dir.path().join("config.json").exists());
        assert_eq!(config.slots_dir(), dir.path().join("slots"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"user_dir":"/games/rim"}"#).unwrap();
        let config = AppConfig::load_or_create_in(dir.path()).unwrap();
        assert_eq!(config.state_limit, DEFAULT_STATE_LIMIT);
        assert_eq!(config.user_dir, Some(PathBuf::from("/games/rim")));
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn out_of_range_state_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"state_limit":0}"#).unwrap();
        assert!(AppConfig::load_or_create_in(dir.path()).is_err());
        fs::write(dir.path().join("config.json"), r#"{"state_limit":100}"#).unwrap();
        assert!(AppConfig::load_or_create_in(dir.path()).is_err());
    }
}
