use crate::{
    error::{StoreError, StoreResult},
    modlist::ModList,
};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

pub const SLOT_RECORD_VERSION: u32 = 1;
const LOCK_FILE_NAME: &str = ".lock";

/// On-disk form of one slot, stored as `<root>/<index>.json`.
///
/// `mod_ids` is the "set" marker: `None` means the slot was only renamed and
/// never backed up, while `Some` of an empty list is a real (empty) backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotRecord {
    version: u32,
    index: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mod_ids: Option<ModList>,
    #[serde(default)]
    saved_at: Option<i64>,
}

impl SlotRecord {
    fn empty(index: u32) -> Self {
        Self {
            version: SLOT_RECORD_VERSION,
            index,
            name: None,
            mod_ids: None,
            saved_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSummary {
    pub index: u32,
    pub name: String,
    pub custom_name: bool,
    pub is_set: bool,
    pub mod_count: usize,
    pub saved_at: Option<i64>,
}

impl SlotSummary {
    pub fn label(&self) -> String {
        let marker = if self.is_set { "" } else { " [*]" };
        format!("{}. {}{marker}", self.index, self.name)
    }
}

/// Every mutation is committed with a temp file, fsync and rename while an
/// exclusive lock on `<root>/.lock` is held. Reads take no lock: a reader sees
/// either the previous record or the new one, never a partial write.
#[derive(Debug, Clone)]
pub struct SlotStore {
    root: PathBuf,
    state_limit: u32,
}

impl SlotStore {
    pub fn open(root: impl Into<PathBuf>, state_limit: u32) -> StoreResult<Self> {
        if state_limit == 0 {
            return Err(StoreError::InvalidStateLimit);
        }
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StoreError::io("create slots dir", &root, err))?;
        Ok(Self { root, state_limit })
    }

    pub fn state_limit(&self) -> u32 {
        self.state_limit
    }

    pub fn slot_path(&self, index: u32) -> PathBuf {
        self.root.join(format!("{index}.json"))
    }

    pub fn backup(&self, index: u32, list: &ModList) -> StoreResult<()> {
        self.check_index(index)?;
        let _lock = self.lock()?;

        // A backup replaces the whole record; only the custom name carries over.
        let name = match self.read_record(index) {
            Ok(record) => record.and_then(|record| record.name),
            Err(StoreError::Corrupt { .. }) => None,
            Err(err) => return Err(err),
        };
        let record = SlotRecord {
            name,
            mod_ids: Some(list.clone()),
            saved_at: Some(now_timestamp()),
            ..SlotRecord::empty(index)
        };
        self.write_record(&record)
    }

    pub fn load(&self, index: u32) -> StoreResult<ModList> {
        self.check_index(index)?;
        self.read_record(index)?
            .and_then(|record| record.mod_ids)
            .ok_or(StoreError::SlotNotSet(index))
    }

    pub fn is_set(&self, index: u32) -> StoreResult<bool> {
        self.check_index(index)?;
        Ok(self
            .read_record(index)?
            .is_some_and(|record| record.mod_ids.is_some()))
    }

    pub fn rename(&self, index: u32, name: &str) -> StoreResult<()> {
        self.check_index(index)?;
        let _lock = self.lock()?;
        let mut record = self
            .read_record(index)?
            .unwrap_or_else(|| SlotRecord::empty(index));
        record.version = SLOT_RECORD_VERSION;
        record.name = Some(name.to_string());
        self.write_record(&record)
    }

    pub fn display_name(&self, index: u32) -> StoreResult<String> {
        self.check_index(index)?;
        Ok(self
            .read_record(index)?
            .and_then(|record| record.name)
            .unwrap_or_else(|| default_slot_name(index)))
    }

    pub fn summaries(&self) -> StoreResult<Vec<SlotSummary>> {
        (1..=self.state_limit)
            .map(|index| {
                let record = self.read_record(index)?;
                let custom = record.as_ref().and_then(|record| record.name.clone());
                let list = record.as_ref().and_then(|record| record.mod_ids.as_ref());
                Ok(SlotSummary {
                    index,
                    custom_name: custom.is_some(),
                    name: custom.unwrap_or_else(|| default_slot_name(index)),
                    is_set: list.is_some(),
                    mod_count: list.map(ModList::len).unwrap_or(0),
                    saved_at: record.and_then(|record| record.saved_at),
                })
            })
            .collect()
    }

    pub fn check_index(&self, index: u32) -> StoreResult<()> {
        if index == 0 || index > self.state_limit {
            return Err(StoreError::InvalidSlotIndex {
                index,
                limit: self.state_limit,
            });
        }
        Ok(())
    }

    fn read_record(&self, index: u32) -> StoreResult<Option<SlotRecord>> {
        let path = self.slot_path(index);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io("read slot", path, err)),
        };
        let record: SlotRecord = serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        if record.index != index {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("record belongs to slot {}", record.index),
            });
        }
        if record.version > SLOT_RECORD_VERSION {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("unsupported record version {}", record.version),
            });
        }
        Ok(Some(record))
    }

    fn write_record(&self, record: &SlotRecord) -> StoreResult<()> {
        let path = self.slot_path(record.index);
        let raw = serde_json::to_string_pretty(record).map_err(|err| StoreError::Corrupt {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        write_atomic(&path, raw.as_bytes()).map_err(|err| StoreError::io("write slot", path, err))
    }

    fn lock(&self) -> StoreResult<File> {
        let path = self.root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| StoreError::io("open slots lock", &path, err))?;
        file.lock()
            .map_err(|err| StoreError::io("lock slots dir", &path, err))?;
        Ok(file)
    }
}

pub fn default_slot_name(index: u32) -> String {
    format!("State {index}")
}

/// Writes `contents` next to `path` as `<name>.tmp`, syncs it, then renames it
/// over `path`. On failure the previous file is left untouched.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut temp_name = OsString::from(file_name);
    temp_name.push(".tmp");
    let temp_path = parent.join(temp_name);

    let committed = write_temp(&temp_path, contents).and_then(|()| fs::rename(&temp_path, path));
    if let Err(err) = committed {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    sync_dir(parent);
    Ok(())
}

fn write_temp(temp_path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> ModList {
        ids.iter().copied().collect()
    }

    fn store(limit: u32) -> (tempfile::TempDir, SlotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path().join("slots"), limit).unwrap();
        (dir, store)
    }

    #[test]
    fn backup_then_load_round_trips() {
        let (_dir, store) = store(5);
        let mods = list(&["ludeon.rimworld", "brrainz.harmony", "unlimitedhugs.hugslib"]);
        store.backup(3, &mods).unwrap();
        assert_eq!(store.load(3).unwrap(), mods);
    }

    #[test]
    fn out_of_range_indices_are_rejected_without_touching_disk() {
        let (dir, store) = store(5);
        for index in [0, 6, u32::MAX] {
            assert!(matches!(
                store.backup(index, &list(&["a"])),
                Err(StoreError::InvalidSlotIndex { limit: 5, .. })
            ));
            assert!(matches!(
                store.load(index),
                Err(StoreError::InvalidSlotIndex { .. })
            ));
            assert!(matches!(
                store.rename(index, "name"),
                Err(StoreError::InvalidSlotIndex { .. })
            ));
        }
        let entries: Vec<_> = fs::read_dir(dir.path().join("slots")).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[test]
    fn unset_slot_reports_not_set() {
        let (_dir, store) = store(5);
        assert!(matches!(store.load(2), Err(StoreError::SlotNotSet(2))));
        assert!(!store.is_set(2).unwrap());
        store.backup(2, &list(&["a"])).unwrap();
        assert!(store.is_set(2).unwrap());
    }

    #[test]
    fn empty_backup_is_distinct_from_unset() {
        let (_dir, store) = store(5);
        store.backup(1, &ModList::default()).unwrap();
        assert!(store.is_set(1).unwrap());
        assert!(store.load(1).unwrap().is_empty());
    }

    #[test]
    fn last_backup_wins_and_keeps_custom_name() {
        let (_dir, store) = store(5);
        store.rename(2, "Combat overhaul").unwrap();
        store.backup(2, &list(&["modA", "modB"])).unwrap();
        store.backup(2, &list(&["modC"])).unwrap();
        assert_eq!(store.load(2).unwrap(), list(&["modC"]));
        assert_eq!(store.display_name(2).unwrap(), "Combat overhaul");
    }

    #[test]
    fn rename_of_unset_slot_keeps_it_unset() {
        let (_dir, store) = store(5);
        assert_eq!(store.display_name(4).unwrap(), "State 4");
        store.rename(4, "Later").unwrap();
        assert_eq!(store.display_name(4).unwrap(), "Later");
        assert!(!store.is_set(4).unwrap());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("slots");
        {
            let store = SlotStore::open(&root, 5).unwrap();
            store.backup(1, &list(&["x", "y"])).unwrap();
            store.rename(1, "Main").unwrap();
        }
        let store = SlotStore::open(&root, 5).unwrap();
        assert_eq!(store.load(1).unwrap(), list(&["x", "y"]));
        assert_eq!(store.display_name(1).unwrap(), "Main");
    }

    #[test]
    fn returned_list_is_a_copy() {
        let (_dir, store) = store(5);
        store.backup(1, &list(&["a", "b"])).unwrap();
        let mut ids = store.load(1).unwrap().into_ids();
        ids.clear();
        assert_eq!(store.load(1).unwrap().len(), 2);
    }

    #[test]
    fn interrupted_write_leaves_previous_version() {
        let (dir, store) = store(5);
        let root = dir.path().join("slots");
        store.backup(2, &list(&["old"])).unwrap();

        // Simulate a crash after the temp file was partially written.
        fs::write(root.join("2.json.tmp"), "{\"version\":1,\"index\":2,\"mod_").unwrap();
        fs::write(root.join("3.json.tmp"), "{\"vers").unwrap();

        assert_eq!(store.load(2).unwrap(), list(&["old"]));
        assert!(matches!(store.load(3), Err(StoreError::SlotNotSet(3))));

        store.backup(2, &list(&["new"])).unwrap();
        assert_eq!(store.load(2).unwrap(), list(&["new"]));
        assert!(!root.join("2.json.tmp").exists());
    }

    #[test]
    fn failed_write_keeps_committed_version() {
        let (_dir, store) = store(5);
        store.backup(2, &list(&["old"])).unwrap();

        let temp = store.slot_path(2).with_extension("json.tmp");
        fs::create_dir(&temp).unwrap();
        let err = store.backup(2, &list(&["new"])).unwrap_err();
        assert!(err.is_persistence_failure());
        assert!(matches!(err, StoreError::Persistence { action: "write slot", .. }));
        assert_eq!(store.load(2).unwrap(), list(&["old"]));

        fs::remove_dir(&temp).unwrap();
        store.backup(2, &list(&["new"])).unwrap();
        assert_eq!(store.load(2).unwrap(), list(&["new"]));
    }

    #[test]
    fn corrupt_record_is_a_persistence_failure() {
        let (_dir, store) = store(5);
        fs::write(store.slot_path(1), "not json").unwrap();
        let err = store.load(1).unwrap_err();
        assert!(err.is_persistence_failure());

        fs::write(
            store.slot_path(2),
            r#"{"version":1,"index":5,"name":null,"mod_ids":["a"]}"#,
        )
        .unwrap();
        assert!(matches!(store.load(2), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn backup_replaces_corrupt_record() {
        let (_dir, store) = store(5);
        fs::write(store.slot_path(1), "{{{").unwrap();
        store.backup(1, &list(&["fresh"])).unwrap();
        assert_eq!(store.load(1).unwrap(), list(&["fresh"]));
    }

    #[test]
    fn summaries_cover_every_index() {
        let (_dir, store) = store(3);
        store.backup(1, &list(&["a", "b"])).unwrap();
        store.rename(3, "Named").unwrap();
        let summaries = store.summaries().unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].label(), "1. State 1");
        assert_eq!(summaries[0].mod_count, 2);
        assert!(summaries[0].saved_at.is_some());
        assert_eq!(summaries[1].label(), "2. State 2 [*]");
        assert_eq!(summaries[2].label(), "3. Named [*]");
        assert!(summaries[2].custom_name);
    }

    #[test]
    fn zero_state_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SlotStore::open(dir.path(), 0),
            Err(StoreError::InvalidStateLimit)
        ));
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert!(!dir.path().join("nested").join("file.txt.tmp").exists());
    }

    #[test]
    fn write_atomic_failure_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("child"), "x").unwrap();

        assert!(write_atomic(&target, b"data").is_err());
        assert!(!dir.path().join("occupied.tmp").exists());
        assert!(target.join("child").exists());
    }
}
