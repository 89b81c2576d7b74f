//! Wallet self-update
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    update module                         │
//! ├─────────────────────────────────────────────────────────┤
//! │  version.rs     - Version ordering and mandatory policy  │
//! │  feed.rs        - Release feed, download, SHA256 check   │
//! │  coordinator.rs - Periodic check, warnings, update now   │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod coordinator;
pub mod feed;
pub mod version;

use serde::Serialize;

pub use coordinator::{
    DismissOutcome, Installer, LaunchInstaller, UpdateCoordinator, UpdateOptions, WarningTracker,
};
pub use feed::{GitHubFeed, ReleaseAsset, ReleaseInfo, UpdateFeed};
pub use version::{UpdateKind, UpdatePolicy, Version};

/// Progress of the current update check, rebuilt every run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    NotAvailable,
    Available(String),
    Downloading { downloaded: u64, total: u64 },
    Downloaded(String),
    Error(String),
}
