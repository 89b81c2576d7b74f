//! Persisted UI settings (`settings.json` in the app config dir)

use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::events::{Signal, SignalBus};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key-value settings shared with the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    /// Hide addresses with a zero balance. Stored under the historical
    /// `showzerobalance` key.
    #[serde(rename = "showzerobalance")]
    pub hide_zero_balances: bool,
    pub encrypted: bool,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            hide_zero_balances: true,
            encrypted: false,
        }
    }
}

impl WalletSettings {
    pub fn default_path() -> PathBuf {
        AppConfig::app_dir().join("settings.json")
    }

    /// Load settings, falling back to defaults when missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid settings at {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).map_err(io_err)?;
        Ok(())
    }
}

/// Settings file plus the in-memory copy the wallet works with
pub struct SettingsStore {
    path: PathBuf,
    current: Mutex<WalletSettings>,
    signals: SignalBus,
}

impl SettingsStore {
    pub fn open(path: PathBuf, signals: SignalBus) -> Self {
        let current = WalletSettings::load_from(&path);
        Self {
            path,
            current: Mutex::new(current),
            signals,
        }
    }

    pub fn get(&self) -> WalletSettings {
        self.current.lock().unwrap().clone()
    }

    fn update<F: FnOnce(&mut WalletSettings)>(&self, change: F) -> Result<(), ConfigError> {
        let mut current = self.current.lock().unwrap();
        change(&mut current);
        current.save_to(&self.path)
    }

    /// Persist the zero-balance filter and have the address list reload
    pub fn set_hide_zero_balances(&self, hide: bool) -> Result<(), ConfigError> {
        self.update(|s| s.hide_zero_balances = hide)?;
        self.signals.emit(Signal::ReloadAddresses);
        Ok(())
    }

    pub fn set_encrypted(&self, encrypted: bool) -> Result<(), ConfigError> {
        self.update(|s| s.encrypted = encrypted)
    }
}
