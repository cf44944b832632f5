//! Configuration loading and management
//!
//! Handles parsing of `.stageboard.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::drag::{DragSettings, OverlapPolicy, DEFAULT_WRITE_TIMEOUT_MS};
use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::store::FileStore;

pub const CONFIG_FILE: &str = ".stageboard.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Drag and drop configuration
    #[serde(default)]
    pub drag: DragConfig,

    /// Board rendering configuration
    #[serde(default)]
    pub board: BoardConfig,
}

/// File store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data directory, relative to the board root
    #[serde(default = "default_store_dir")]
    pub dir: String,

    /// Maximum wait for a collection lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Quiet period before a changed collection is re-read
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

fn default_store_dir() -> String {
    ".stageboard/data".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_watch_debounce_ms() -> u64 {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

impl StoreConfig {
    pub fn data_dir(&self, root: &Path) -> PathBuf {
        root.join(self.dir.trim())
    }

    /// File store rooted at this configuration's data directory.
    pub fn open(&self, root: &Path) -> FileStore {
        FileStore::new(self.data_dir(root))
            .with_lock_timeout_ms(self.lock_timeout_ms)
            .with_debounce(Duration::from_millis(self.watch_debounce_ms))
    }

    fn validate(&self) -> Result<()> {
        if self.dir.trim().is_empty() {
            return Err(Error::InvalidConfig("store.dir cannot be empty".to_string()));
        }
        if self.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "store.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Drag and drop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DragConfig {
    /// Second drag on a task whose move is still in flight: reject or queue
    #[serde(default)]
    pub overlap: OverlapPolicy,

    /// Maximum wait for the store to acknowledge a move
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            overlap: OverlapPolicy::default(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl DragConfig {
    pub fn settings(&self) -> DragSettings {
        DragSettings {
            overlap: self.overlap,
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.write_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "drag.write_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Board rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Heading of the bucket holding tasks without a stage
    #[serde(default = "default_unassigned_label")]
    pub unassigned_label: String,
}

fn default_unassigned_label() -> String {
    "Unassigned".to_string()
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            unassigned_label: default_unassigned_label(),
        }
    }
}

impl Config {
    /// Load configuration from a `.stageboard.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the board root, or return defaults when the
    /// file does not exist
    pub fn load_from_root(root: &Path) -> Result<Self> {
        let config_path = Self::path_for(root);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn path_for(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.drag.validate()?;
        if self.board.unassigned_label.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "board.unassigned_label cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.store.dir, ".stageboard/data");
        assert_eq!(cfg.store.lock_timeout_ms, 5000);
        assert_eq!(cfg.store.watch_debounce_ms, 100);
        assert_eq!(cfg.drag.overlap, OverlapPolicy::Reject);
        assert_eq!(cfg.drag.write_timeout_ms, 5000);
        assert_eq!(cfg.board.unassigned_label, "Unassigned");
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[store]
dir = "data"
lock_timeout_ms = 250
watch_debounce_ms = 20

[drag]
overlap = "queue"
write_timeout_ms = 1500

[board]
unassigned_label = "Inbox"
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.store.dir, "data");
        assert_eq!(cfg.store.lock_timeout_ms, 250);
        assert_eq!(cfg.store.watch_debounce_ms, 20);
        assert_eq!(cfg.drag.overlap, OverlapPolicy::Queue);
        assert_eq!(
            cfg.drag.settings().write_timeout,
            Duration::from_millis(1500)
        );
        assert_eq!(cfg.board.unassigned_label, "Inbox");
        assert_eq!(cfg.store.data_dir(dir.path()), dir.path().join("data"));
    }

    #[test]
    fn unknown_overlap_policy_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[drag]\noverlap = \"merge\"").expect("write config");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[drag]\nwrite_timeout_ms = 0").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        match err {
            Error::InvalidConfig(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_from_root_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_root(dir.path()).expect("defaults");
        assert_eq!(cfg.drag.overlap, OverlapPolicy::Reject);
    }

    #[test]
    fn load_from_root_surfaces_invalid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "[store]\ndir = \"  \"").expect("write config");
        assert!(matches!(
            Config::load_from_root(dir.path()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        let cfg = Config::default();
        cfg.save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("overlap = \"reject\""));
        let reloaded = Config::load(&path).expect("reload");
        assert_eq!(reloaded.store.dir, cfg.store.dir);
    }
}
