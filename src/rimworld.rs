use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const GAME_NAME: &str = "RimWorld";
const STEAM_APP_ID: &str = "294100";
const UNITY_COMPANY_DIR: &str = "Ludeon Studios";
const UNITY_PRODUCT_DIR: &str = "RimWorld by Ludeon Studios";

#[derive(Debug, Clone, Serialize)]
pub struct GamePaths {
    pub user_dir: PathBuf,
    pub config_dir: PathBuf,
    pub mods_config_path: PathBuf,
    pub saves_dir: PathBuf,
}

impl GamePaths {
    pub fn from_user_dir(user_dir: &Path) -> Self {
        let config_dir = user_dir.join("Config");
        Self {
            user_dir: user_dir.to_path_buf(),
            mods_config_path: config_dir.join("ModsConfig.xml"),
            config_dir,
            saves_dir: user_dir.join("Saves"),
        }
    }
}

pub fn detect_paths(user_dir_override: Option<&Path>) -> Result<GamePaths> {
    let user_dir = match user_dir_override {
        Some(path) => path.to_path_buf(),
        None => find_user_dir()
            .with_context(|| format!("locate {GAME_NAME} user data directory"))?,
    };

    if !looks_like_user_dir(&user_dir) {
        bail!(
            "invalid {GAME_NAME} user dir: expected Config/ in {}",
            user_dir.display()
        );
    }

    Ok(GamePaths::from_user_dir(&user_dir))
}

fn find_user_dir() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    let home = base.home_dir();
    let unity_dir = |root: PathBuf| root.join(UNITY_COMPANY_DIR).join(UNITY_PRODUCT_DIR);

    let candidates = [
        // Native Linux build
        unity_dir(base.config_dir().join("unity3d")),
        // Proton
        unity_dir(
            home.join(".local/share/Steam/steamapps/compatdata")
                .join(STEAM_APP_ID)
                .join("pfx/drive_c/users/steamuser/AppData/LocalLow"),
        ),
        // Windows
        unity_dir(home.join("AppData").join("LocalLow")),
        // macOS
        home.join("Library/Application Support/RimWorld"),
    ];

    candidates
        .into_iter()
        .find(|candidate| looks_like_user_dir(candidate))
}

pub fn looks_like_user_dir(path: &Path) -> bool {
    path.join("Config").is_dir()
}
