use crate::{
    error::{StoreError, StoreResult},
    modlist::ModList,
    slots::write_atomic,
};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// The host's live mod configuration. The controller only ever reads it whole
/// and overwrites it whole.
pub trait ActiveList {
    fn get_active(&self) -> StoreResult<ModList>;

    /// Makes `list` the active configuration. Whether the game picks it up
    /// immediately or on next launch is up to the game.
    fn set_active(&mut self, list: &ModList) -> StoreResult<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename = "ModsConfigData")]
struct ModsConfigData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(rename = "activeMods", default)]
    active_mods: LiList,
    #[serde(
        rename = "knownExpansions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    known_expansions: Option<LiList>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct LiList {
    #[serde(rename = "li", default)]
    items: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModsConfigFile {
    path: PathBuf,
}

impl ModsConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreResult<ModsConfigData> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ModsConfigData::default())
            }
            Err(err) => return Err(StoreError::io("read mods config", &self.path, err)),
        };
        quick_xml::de::from_str(&raw).map_err(|err| StoreError::MalformedXml {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    fn write(&self, data: &ModsConfigData) -> StoreResult<()> {
        let mut xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n".to_string();
        let mut ser = quick_xml::se::Serializer::new(&mut xml);
        ser.indent(' ', 2);
        data.serialize(ser)
            .map_err(|err| StoreError::MalformedXml {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        xml.push('\n');
        write_atomic(&self.path, xml.as_bytes())
            .map_err(|err| StoreError::io("write mods config", &self.path, err))
    }
}

impl ActiveList for ModsConfigFile {
    fn get_active(&self) -> StoreResult<ModList> {
        Ok(ModList::new(self.read()?.active_mods.items))
    }

    fn set_active(&mut self, list: &ModList) -> StoreResult<()> {
        let mut data = self.read()?;
        data.active_mods.items = list.ids().to_vec();
        self.write(&data)
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryActiveList {
    pub list: ModList,
    pub writes: usize,
    pub fail_writes: bool,
}

#[cfg(test)]
impl MemoryActiveList {
    pub fn with(ids: &[&str]) -> Self {
        Self {
            list: ids.iter().copied().collect(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
impl ActiveList for MemoryActiveList {
    fn get_active(&self) -> StoreResult<ModList> {
        Ok(self.list.clone())
    }

    fn set_active(&mut self, list: &ModList) -> StoreResult<()> {
        if self.fail_writes {
            return Err(StoreError::io(
                "write mods config",
                "memory",
                io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            ));
        }
        self.list = list.clone();
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ModsConfigData>
  <version>1.5.4104 rev435</version>
  <activeMods>
    <li>brrainz.harmony</li>
    <li>ludeon.rimworld</li>
    <li>ludeon.rimworld.royalty</li>
  </activeMods>
  <knownExpansions>
    <li>ludeon.rimworld.royalty</li>
  </knownExpansions>
</ModsConfigData>
"#;

    #[test]
    fn reads_active_mods_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ModsConfig.xml");
        fs::write(&path, SAMPLE).unwrap();
        let file = ModsConfigFile::new(&path);
        assert_eq!(
            file.get_active().unwrap().ids(),
            ["brrainz.harmony", "ludeon.rimworld", "ludeon.rimworld.royalty"]
        );
    }

    #[test]
    fn write_keeps_version_and_expansions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ModsConfig.xml");
        fs::write(&path, SAMPLE).unwrap();
        let mut file = ModsConfigFile::new(&path);
        let next: ModList = ["ludeon.rimworld", "unlimitedhugs.hugslib"].into_iter().collect();
        file.set_active(&next).unwrap();

        assert_eq!(file.get_active().unwrap(), next);
        let data = file.read().unwrap();
        assert_eq!(data.version.as_deref(), Some("1.5.4104 rev435"));
        assert_eq!(
            data.known_expansions.unwrap().items,
            ["ludeon.rimworld.royalty"]
        );
    }

    #[test]
    fn missing_file_reads_empty_and_is_created_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Config").join("ModsConfig.xml");
        let mut file = ModsConfigFile::new(&path);
        assert!(file.get_active().unwrap().is_empty());
        file.set_active(&["ludeon.rimworld"].into_iter().collect())
            .unwrap();
        assert!(path.exists());
        assert_eq!(file.get_active().unwrap().ids(), ["ludeon.rimworld"]);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ModsConfig.xml");
        fs::write(&path, "<ModsConfigData><activeMods><li>a</activeMods>").unwrap();
        let file = ModsConfigFile::new(&path);
        assert!(matches!(
            file.get_active(),
            Err(StoreError::MalformedXml { .. })
        ));
    }
}
