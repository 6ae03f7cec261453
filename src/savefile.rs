use crate::{
    error::{StoreError, StoreResult},
    modlist::ModList,
};
use quick_xml::{events::Event, Reader};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use walkdir::WalkDir;

pub const SAVE_EXTENSION: &str = "rws";

const MOD_IDS_PATH: [&[u8]; 3] = [b"savegame", b"meta", b"modIds"];
const MOD_ID_PATH: [&[u8]; 4] = [b"savegame", b"meta", b"modIds", b"li"];

#[derive(Debug, Clone, Serialize)]
pub struct SaveEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified_at: Option<i64>,
}

/// Reads the mod ids a save was made with from its `savegame/meta/modIds`
/// header. The file is streamed and closed once `meta` ends.
pub fn extract_mod_list(path: &Path) -> StoreResult<ModList> {
    let file = File::open(path).map_err(|err| StoreError::io("read save", path, err))?;
    parse_save_mod_ids(BufReader::new(file)).map_err(|reason| StoreError::MalformedXml {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_save_mod_ids<R: BufRead>(source: R) -> Result<ModList, String> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut ids = Vec::new();
    let mut found = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(e.name().as_ref().to_vec());
                if path_is(&stack, &MOD_IDS_PATH) {
                    found = true;
                }
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"modIds" && path_is(&stack, &MOD_IDS_PATH[..2]) {
                    found = true;
                }
            }
            Ok(Event::Text(e)) => {
                if path_is(&stack, &MOD_ID_PATH) {
                    let value = e.unescape().map_err(|err| err.to_string())?;
                    if !value.is_empty() {
                        ids.push(value.into_owned());
                    }
                }
            }
            Ok(Event::End(_)) => {
                let closed_meta = path_is(&stack, &MOD_IDS_PATH[..2]);
                stack.pop();
                // The rest of the save is world data; nothing past the header matters.
                if closed_meta {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(format!(
                    "at byte {}: {err}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    if !found {
        return Err("no meta/modIds list in save header".to_string());
    }
    Ok(ModList::new(ids))
}

fn path_is(stack: &[Vec<u8>], expected: &[&[u8]]) -> bool {
    stack.len() == expected.len()
        && stack
            .iter()
            .zip(expected)
            .all(|(name, want)| name.as_slice() == *want)
}

/// Save files in `saves_dir`, newest first. A missing directory has no saves.
pub fn list_saves(saves_dir: &Path) -> Vec<SaveEntry> {
    let mut saves: Vec<SaveEntry> = WalkDir::new(saves_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(SAVE_EXTENSION))
        })
        .map(|entry| {
            let modified_at = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .and_then(system_time_to_epoch);
            SaveEntry {
                name: entry
                    .path()
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path: entry.path().to_path_buf(),
                modified_at,
            }
        })
        .collect();
    saves.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    saves
}

pub fn resolve_save(saves_dir: &Path, name_or_path: &str) -> PathBuf {
    let direct = PathBuf::from(name_or_path);
    if direct.is_file() {
        return direct;
    }
    saves_dir.join(format!("{name_or_path}.{SAVE_EXTENSION}"))
}

fn system_time_to_epoch(time: SystemTime) -> Option<i64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|duration| duration.as_secs() as i64)
}
