//! Per-tuner MD plugin settings (`cards.toml`).
//!
//! ```toml
//! [[cards]]
//! name = "SkyWalker1"
//! device_path = "@device:pnp:\\\\?\\usb#vid_09c0&pid_0203"
//! enable_mdapi = 2
//! ```
//!
//! `enable_mdapi` is the number of decode slots. The text `"no"` disables the
//! plugin; any other text is rewritten to one slot.

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::ca::StoreError;

/// File name of the card settings inside the plugin configuration directory.
pub const CARDS_FILE: &str = "cards.toml";

/// Slot count of a new entry.
pub const DEFAULT_SLOT_COUNT: i64 = 1;

/// Most decode slots one tuner may use. Larger counts are clamped.
pub const MAX_SLOT_COUNT: usize = 16;

/// Raw `enable_mdapi` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotSetting {
    Count(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEntry {
    pub name: String,
    pub device_path: String,
    pub enable_mdapi: SlotSetting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardConfig {
    #[serde(default)]
    pub cards: Vec<CardEntry>,
}

/// Settings resolved for one tuner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSettings {
    /// Plugin directory prefix.
    pub name: String,
    pub slot_count: usize,
}

impl CardConfig {
    /// Load `path`; a missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Index of the entry for `device_path`.
    pub fn find(&self, device_path: &str) -> Option<usize> {
        self.cards.iter().position(|c| c.device_path == device_path)
    }
}

/// Resolve a slot setting. Returns the count and whether the entry must be
/// rewritten.
fn resolve_slot_setting(setting: &SlotSetting) -> (i64, bool) {
    match setting {
        SlotSetting::Count(n) => (*n, false),
        SlotSetting::Text(text) => match text.trim().parse::<i64>() {
            Ok(n) => (n, false),
            Err(_) if text == "no" => (0, true),
            Err(_) => (DEFAULT_SLOT_COUNT, true),
        },
    }
}

/// Find the settings for `device_path` in `path`, creating (and saving) a
/// one-slot entry named `default_name` if there is none.
pub fn lookup_or_create(
    path: &Path,
    device_path: &str,
    default_name: &str,
) -> Result<CardSettings, StoreError> {
    debug!("MD plugin: searching for device configuration");
    let mut config = CardConfig::load(path)?;

    let Some(index) = config.find(device_path) else {
        debug!("MD plugin: creating device configuration");
        config.cards.push(CardEntry {
            name: default_name.to_string(),
            device_path: device_path.to_string(),
            enable_mdapi: SlotSetting::Count(DEFAULT_SLOT_COUNT),
        });
        config.save(path)?;
        return Ok(CardSettings {
            name: default_name.to_string(),
            slot_count: DEFAULT_SLOT_COUNT as usize,
        });
    };

    let entry = &mut config.cards[index];
    let (count, rewrite) = resolve_slot_setting(&entry.enable_mdapi);
    let mut slot_count = usize::try_from(count).unwrap_or(0);
    if slot_count > MAX_SLOT_COUNT {
        warn!(
            "MD plugin: {} decode slots configured for {}, using {}",
            count, entry.name, MAX_SLOT_COUNT
        );
        slot_count = MAX_SLOT_COUNT;
    }
    let settings = CardSettings {
        name: entry.name.clone(),
        slot_count,
    };
    if rewrite {
        entry.enable_mdapi = SlotSetting::Count(count);
        config.save(path)?;
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = r"@device:pnp:\\?\usb#vid_09c0&pid_0203";

    fn write(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join(CARDS_FILE);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_entry_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CARDS_FILE);

        let settings = lookup_or_create(&path, PATH, "SkyWalker1").unwrap();
        assert_eq!(
            settings,
            CardSettings {
                name: "SkyWalker1".to_string(),
                slot_count: 1
            }
        );

        let saved = CardConfig::load(&path).unwrap();
        assert_eq!(saved.cards.len(), 1);
        assert_eq!(saved.cards[0].device_path, PATH);
        assert_eq!(saved.cards[0].enable_mdapi, SlotSetting::Count(1));
    }

    #[test]
    fn test_existing_entry_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
            [[cards]]
            name = "Other"
            device_path = "other"
            enable_mdapi = 3

            [[cards]]
            name = "Dish"
            device_path = '@device:pnp:\\?\usb#vid_09c0&pid_0203'
            enable_mdapi = 2
            "#,
        );

        let settings = lookup_or_create(&path, PATH, "SkyWalker1").unwrap();
        assert_eq!(settings.name, "Dish");
        assert_eq!(settings.slot_count, 2);
        assert_eq!(CardConfig::load(&path).unwrap().cards.len(), 2);
    }

    #[test]
    fn test_text_settings_are_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
            [[cards]]
            name = "A"
            device_path = "a"
            enable_mdapi = "no"

            [[cards]]
            name = "B"
            device_path = "b"
            enable_mdapi = "yes"
            "#,
        );

        assert_eq!(lookup_or_create(&path, "a", "A").unwrap().slot_count, 0);
        assert_eq!(lookup_or_create(&path, "b", "B").unwrap().slot_count, 1);

        let saved = CardConfig::load(&path).unwrap();
        assert_eq!(saved.cards[0].enable_mdapi, SlotSetting::Count(0));
        assert_eq!(saved.cards[1].enable_mdapi, SlotSetting::Count(1));
    }

    #[test]
    fn test_slot_count_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
            [[cards]]
            name = "Typo"
            device_path = "a"
            enable_mdapi = 99999

            [[cards]]
            name = "Text"
            device_path = "b"
            enable_mdapi = "500"
            "#,
        );

        assert_eq!(lookup_or_create(&path, "a", "A").unwrap().slot_count, MAX_SLOT_COUNT);
        assert_eq!(lookup_or_create(&path, "b", "B").unwrap().slot_count, MAX_SLOT_COUNT);
        // The file keeps what the user wrote.
        assert_eq!(
            CardConfig::load(&path).unwrap().cards[0].enable_mdapi,
            SlotSetting::Count(99999)
        );
    }

    #[test]
    fn test_slot_setting_resolution() {
        assert_eq!(resolve_slot_setting(&SlotSetting::Text("4".into())), (4, false));
        assert_eq!(resolve_slot_setting(&SlotSetting::Count(-1)), (-1, false));
        assert_eq!(resolve_slot_setting(&SlotSetting::Text("No".into())), (1, true));
    }
}
