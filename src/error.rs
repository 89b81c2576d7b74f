//! Error types for the wallet core
//!
//! Each concern gets its own error enum so callers can tell a failed RPC call
//! apart from a daemon that never came up or a stalled synchronization stage.

use crate::sync::SyncStage;
use thiserror::Error;

/// JSON-RPC error code the daemon returns while it is still warming up
/// (loading block index, verifying blocks, ...)
pub const RPC_IN_WARMUP: i64 = -28;

/// JSON-RPC error code for an unknown method
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;

/// Failure of a single RPC call
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC transport failure: {0}")]
    Transport(String),

    #[error("RPC endpoint returned HTTP {status}")]
    Http { status: u16 },

    #[error("RPC error {code}: {message}")]
    Daemon { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Malformed(String),

    #[error("Failed to decode result of {method}: {reason}")]
    Decode { method: String, reason: String },
}

impl RpcError {
    /// The daemon answered but is still loading
    pub fn is_warmup(&self) -> bool {
        matches!(self, RpcError::Daemon { code, .. } if *code == RPC_IN_WARMUP)
    }

    /// The daemon answered with a JSON-RPC payload (as opposed to the
    /// connection failing)
    pub fn is_daemon_response(&self) -> bool {
        matches!(self, RpcError::Daemon { .. })
    }

    /// The endpoint answered but rejected our credentials
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RpcError::Http { status } if *status == 401)
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Transport(e.to_string())
    }
}

/// The daemon process failed to become reachable
#[derive(Debug, Error)]
pub enum DaemonStartError {
    #[error("Daemon binary not found at {0}. Please install the UNIGRID daemon first.")]
    NotInstalled(String),

    #[error("Failed to start daemon: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Daemon exited during startup ({0})")]
    Exited(String),

    #[error("Daemon failed to become ready after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Daemon rejected the RPC credentials; another unigridd may be running with a different rpcuser/rpcpassword")]
    Unauthorized,
}

/// One of the synchronization stages rejected
#[derive(Debug, Error)]
#[error("{stage} failed: {reason}")]
pub struct SyncStageError {
    pub stage: SyncStage,
    pub reason: String,
}

impl SyncStageError {
    pub fn new(stage: SyncStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Update feed, download or install failure
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Update feed unreachable: {0}")]
    Feed(String),

    #[error("Malformed update feed response: {0}")]
    Malformed(String),

    #[error("No update asset for this platform in release {0}")]
    NoAsset(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Checksum mismatch for {file}: expected {expected}, got {computed}")]
    Checksum {
        file: String,
        expected: String,
        computed: String,
    },

    #[error("No downloaded update to install")]
    NothingDownloaded,

    #[error("Failed to launch installer: {0}")]
    Install(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for UpdateError {
    fn from(e: reqwest::Error) -> Self {
        UpdateError::Feed(e.to_string())
    }
}

/// Configuration or settings persistence failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// Top-level error of the application controller
#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    DaemonStart(#[from] DaemonStartError),

    #[error(transparent)]
    Sync(#[from] SyncStageError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Passphrases do not match")]
    PassphraseMismatch,

    #[error("Wallet is encrypted; a passphrase is required")]
    Locked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_detection() {
        let warmup = RpcError::Daemon {
            code: RPC_IN_WARMUP,
            message: "Loading block index...".to_string(),
        };
        assert!(warmup.is_warmup());
        assert!(warmup.is_daemon_response());

        let transport = RpcError::Transport("connection refused".to_string());
        assert!(!transport.is_warmup());
        assert!(!transport.is_daemon_response());

        assert!(RpcError::Http { status: 401 }.is_unauthorized());
        assert!(!RpcError::Http { status: 500 }.is_unauthorized());
    }

    #[test]
    fn test_stage_error_message() {
        let err = SyncStageError::new(SyncStage::ErrorCheck, "disk full");
        assert_eq!(err.to_string(), "error check failed: disk full");
    }
}
