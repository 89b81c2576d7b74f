//! Wallet configuration types and persistence
//!
//! Handles loading and saving the wallet configuration from disk and
//! applying environment overrides on top of it.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default RPC port of the current daemon
pub const DEFAULT_RPC_PORT: u16 = 51992;

/// RPC port used by daemons before the port change
pub const LEGACY_RPC_PORT: u16 = 35075;

/// GitHub repository for wallet releases
pub const GITHUB_REPO_OWNER: &str = "unigrid-project";
pub const GITHUB_REPO_NAME: &str = "unigrid-wallet";

/// Public block explorer used to estimate network height
pub const DEFAULT_EXPLORER_URL: &str = "http://explorer.unigrid.org";

#[cfg(target_os = "windows")]
pub const DAEMON_BINARY_NAME: &str = "unigridd.exe";

#[cfg(not(target_os = "windows"))]
pub const DAEMON_BINARY_NAME: &str = "unigridd";

/// Environment variables that override the file configuration
pub const ENV_RPC_PORT: &str = "UNIGRID_RPC_PORT";
pub const ENV_RPC_USER: &str = "UNIGRID_RPC_USER";
pub const ENV_RPC_PASSWORD: &str = "UNIGRID_RPC_PASSWORD";
pub const ENV_DAEMON_PATH: &str = "UNIGRID_DAEMON_PATH";
pub const ENV_DATA_DIR: &str = "UNIGRID_DATA_DIR";

/// Credentials and port of the local daemon RPC endpoint.
///
/// Resolved once at startup and never changed for the lifetime of an
/// [`AppContext`](crate::app::AppContext).
#[derive(Clone, PartialEq, Eq)]
pub struct RpcCredentials {
    pub user: String,
    pub password: String,
    pub port: u16,
}

impl std::fmt::Debug for RpcCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

impl RpcCredentials {
    /// Random credentials for a daemon we spawn ourselves
    pub fn generate(port: u16) -> Self {
        use rand::RngCore;

        let mut rng = rand::thread_rng();
        let mut user = [0u8; 8];
        let mut password = [0u8; 24];
        rng.fill_bytes(&mut user);
        rng.fill_bytes(&mut password);

        Self {
            user: format!("unigrid-{}", hex::encode(user)),
            password: hex::encode(password),
            port,
        }
    }
}

/// Wallet configuration stored in wallet_config.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// RPC port of the daemon
    pub rpc_port: u16,

    /// Fixed RPC username (random credentials are generated when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_user: Option<String>,

    /// Fixed RPC password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_password: Option<String>,

    /// Path to the daemon binary (defaults to the one shipped next to the wallet)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_path: Option<String>,

    /// Daemon data directory (daemon default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<String>,

    /// Extra daemon command-line arguments
    pub custom_args: String,

    /// Delay between readiness probes while the daemon starts (ms)
    pub ready_poll_interval_ms: u64,

    /// Number of readiness probes before giving up
    pub ready_max_attempts: u32,

    /// Delay between polls in the loading and synchronizing stages (ms)
    pub sync_poll_interval_ms: u64,

    /// Oldest daemon version accepted, in the daemon's numeric encoding
    /// (e.g. 2000000 for 2.0.0)
    pub min_daemon_version: u64,

    /// Block explorer base URL
    pub explorer_url: String,

    /// GitHub owner of the release feed
    pub update_owner: String,

    /// GitHub repository of the release feed
    pub update_repo: String,

    /// Interval between update checks (seconds)
    pub update_check_interval_secs: u64,

    /// How many times the mandatory-update warning may be dismissed
    pub allotted_update_skips: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_port: DEFAULT_RPC_PORT,
            rpc_user: None,
            rpc_password: None,
            daemon_path: None,
            data_directory: None,
            custom_args: String::new(),
            ready_poll_interval_ms: 500,
            ready_max_attempts: 120,
            sync_poll_interval_ms: 1000,
            min_daemon_version: 2_000_000,
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            update_owner: GITHUB_REPO_OWNER.to_string(),
            update_repo: GITHUB_REPO_NAME.to_string(),
            update_check_interval_secs: 60 * 60,
            allotted_update_skips: 20,
        }
    }
}

impl AppConfig {
    /// Application directory under the platform config dir
    pub fn app_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("UNIGRID")
    }

    /// Get the path to the wallet config file
    pub fn config_path() -> PathBuf {
        Self::app_dir().join("wallet_config.json")
    }

    /// Directory for log files
    pub fn log_dir() -> PathBuf {
        Self::app_dir().join("logs")
    }

    /// Directory downloaded updates are stored in
    pub fn update_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("UNIGRID")
            .join("updates")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from disk, or return default if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config at {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save config to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(io_err)?;

        log::info!("Wallet config saved to {}", path.display());
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_RPC_PORT) {
            self.rpc_port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_RPC_PORT.to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(user) = lookup(ENV_RPC_USER) {
            self.rpc_user = Some(user);
        }
        if let Some(password) = lookup(ENV_RPC_PASSWORD) {
            self.rpc_password = Some(password);
        }
        if let Some(path) = lookup(ENV_DAEMON_PATH) {
            self.daemon_path = Some(path);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_directory = Some(dir);
        }
        Ok(())
    }

    /// Resolve the credentials used for this run
    pub fn credentials(&self) -> RpcCredentials {
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => RpcCredentials {
                user: user.clone(),
                password: password.clone(),
                port: self.rpc_port,
            },
            _ => RpcCredentials::generate(self.rpc_port),
        }
    }

    /// Path to the daemon binary
    pub fn daemon_binary(&self) -> PathBuf {
        match &self.daemon_path {
            Some(path) if !path.is_empty() => expand_path(path),
            _ => std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DAEMON_BINARY_NAME),
        }
    }

    /// Daemon data directory, if one is configured
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_directory
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .map(expand_path)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms)
    }

    pub fn update_check_interval(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_secs.max(1))
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
