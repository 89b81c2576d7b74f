//! Periodic update checks and the "update now" flow

use super::feed::{find_platform_asset, verify_file_hash, UpdateFeed};
use super::version::{UpdateKind, UpdatePolicy, Version};
use super::UpdateState;
use crate::config::AppConfig;
use crate::daemon::DaemonSupervisor;
use crate::error::UpdateError;
use crate::events::{Signal, SignalBus, WarningData};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Result of dismissing the mandatory-update warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissOutcome {
    Skipped { remaining: u32 },
    /// The allotted number of skips is used up
    Escalated,
}

/// Counts dismissals of the mandatory-update warning for this run
#[derive(Debug, Clone)]
pub struct WarningTracker {
    allotted: u32,
    dismissed: u32,
}

impl WarningTracker {
    pub fn new(allotted: u32) -> Self {
        Self {
            allotted,
            dismissed: 0,
        }
    }

    pub fn dismissed(&self) -> u32 {
        self.dismissed
    }

    pub fn remaining(&self) -> u32 {
        self.allotted.saturating_sub(self.dismissed)
    }

    pub fn dismiss(&mut self) -> DismissOutcome {
        self.dismissed = self.dismissed.saturating_add(1);

        if self.dismissed > self.allotted {
            self.escalate();
            DismissOutcome::Escalated
        } else {
            DismissOutcome::Skipped {
                remaining: self.remaining(),
            }
        }
    }

    /// No enforcement beyond logging yet
    fn escalate(&self) {
        log::info!(
            "Mandatory update warning dismissed {} times (allotted {})",
            self.dismissed,
            self.allotted
        );
    }
}

/// Hands a downloaded installer over to the OS
pub trait Installer: Send + Sync {
    fn install(&self, installer: &Path) -> Result<(), UpdateError>;
}

/// Launches the installer as a detached process
pub struct LaunchInstaller;

impl Installer for LaunchInstaller {
    fn install(&self, installer: &Path) -> Result<(), UpdateError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(installer)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(installer, perms)?;
        }

        #[cfg(target_os = "macos")]
        let mut cmd = {
            let mut cmd = Command::new("open");
            cmd.arg(installer);
            cmd
        };

        #[cfg(not(target_os = "macos"))]
        let mut cmd = Command::new(installer);

        let child = cmd
            .spawn()
            .map_err(|e| UpdateError::Install(format!("{}: {}", installer.display(), e)))?;
        log::info!("Installer started with PID {}", child.id());
        Ok(())
    }
}

/// Settings of the update coordinator
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub check_interval: Duration,
    pub cache_dir: PathBuf,
    pub allotted_skips: u32,
}

impl UpdateOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            check_interval: config.update_check_interval(),
            cache_dir: AppConfig::update_cache_dir(),
            allotted_skips: config.allotted_update_skips,
        }
    }
}

#[derive(Debug, Clone)]
struct DownloadedUpdate {
    version: Version,
    path: PathBuf,
    kind: UpdateKind,
}

/// Checks the release feed and keeps the last downloaded update around
pub struct UpdateCoordinator {
    feed: Arc<dyn UpdateFeed>,
    signals: SignalBus,
    current: Version,
    options: UpdateOptions,
    state: Mutex<UpdateState>,
    downloaded: Mutex<Option<DownloadedUpdate>>,
    warnings: Mutex<WarningTracker>,
}

impl UpdateCoordinator {
    pub fn new(feed: Arc<dyn UpdateFeed>, signals: SignalBus, options: UpdateOptions) -> Self {
        Self::with_current_version(feed, signals, options, Version::current())
    }

    pub fn with_current_version(
        feed: Arc<dyn UpdateFeed>,
        signals: SignalBus,
        options: UpdateOptions,
        current: Version,
    ) -> Self {
        let warnings = WarningTracker::new(options.allotted_skips);
        Self {
            feed,
            signals,
            current,
            options,
            state: Mutex::new(UpdateState::Idle),
            downloaded: Mutex::new(None),
            warnings: Mutex::new(warnings),
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state.lock().unwrap().clone()
    }

    fn set_state(&self, state: UpdateState) {
        *self.state.lock().unwrap() = state.clone();
        self.signals.emit(Signal::UpdateStatus(state));
    }

    /// Check on every interval tick; the first tick fires immediately
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.options.check_interval);
            loop {
                interval.tick().await;
                self.run_check().await;
            }
        })
    }

    /// One check; failures are logged and never propagate
    pub async fn run_check(&self) {
        if let Err(e) = self.check_once().await {
            log::warn!("Update check failed: {}", e);
            self.set_state(UpdateState::Error(e.to_string()));
        }
    }

    /// Look for a newer release, download and verify it, then announce it
    pub async fn check_once(&self) -> Result<Option<UpdateKind>, UpdateError> {
        self.set_state(UpdateState::Checking);

        let release = self.feed.latest_release().await?;
        let latest = Version::parse(&release.version)
            .ok_or_else(|| UpdateError::Malformed(format!("unparsable version {}", release.tag)))?;

        if !latest.is_newer_than(&self.current) {
            log::info!("Wallet {} is up to date (latest {})", self.current, latest);
            self.set_state(UpdateState::NotAvailable);
            return Ok(None);
        }

        let already = self.downloaded.lock().unwrap().clone();
        if let Some(update) = already.filter(|u| u.version == latest) {
            self.set_state(UpdateState::Downloaded(latest.to_string()));
            self.announce(update.kind, &latest);
            return Ok(Some(update.kind));
        }

        log::info!("Update available: {} -> {}", self.current, latest);
        self.set_state(UpdateState::Available(latest.to_string()));

        let asset = find_platform_asset(&release.assets)
            .ok_or_else(|| UpdateError::NoAsset(release.tag.clone()))?;
        let dest = self.options.cache_dir.join(&asset.name);

        let on_progress = |downloaded: u64, total: u64| {
            self.set_state(UpdateState::Downloading { downloaded, total });
        };
        let path = self.feed.download(asset, &dest, &on_progress).await?;

        if let Some(expected) = &asset.sha256 {
            if let Err(e) = verify_file_hash(&path, expected) {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        }

        let kind = UpdatePolicy::classify(&self.current, &latest);
        *self.downloaded.lock().unwrap() = Some(DownloadedUpdate {
            version: latest.clone(),
            path,
            kind,
        });

        self.set_state(UpdateState::Downloaded(latest.to_string()));
        self.announce(kind, &latest);
        Ok(Some(kind))
    }

    fn announce(&self, kind: UpdateKind, latest: &Version) {
        match kind {
            UpdateKind::Mandatory => {
                let remaining = self.warnings.lock().unwrap().remaining();
                self.signals.emit(Signal::WarningData(WarningData {
                    title: "Mandatory update".to_string(),
                    message: format!(
                        "UNIGRID Wallet {} is required to stay on the network. \
                         Please update now.",
                        latest
                    ),
                    current_version: self.current.to_string(),
                    new_version: latest.to_string(),
                    skips_remaining: remaining,
                }));
            }
            UpdateKind::Optional => {
                self.signals.emit(Signal::WalletUpdateAvailable {
                    version: latest.to_string(),
                });
            }
        }
    }

    /// The user closed the mandatory-update warning without updating
    pub fn dismiss_warning(&self) -> DismissOutcome {
        self.warnings.lock().unwrap().dismiss()
    }

    /// Stop the daemon and launch the downloaded installer
    pub async fn update_now(
        &self,
        supervisor: &DaemonSupervisor,
        installer: &dyn Installer,
    ) -> Result<(), UpdateError> {
        let update = self
            .downloaded
            .lock()
            .unwrap()
            .clone()
            .ok_or(UpdateError::NothingDownloaded)?;

        log::info!("Installing update {}", update.version);
        if let Err(e) = supervisor.stop().await {
            log::warn!("Daemon did not stop cleanly before update: {}", e);
        }

        installer.install(&update.path)
    }
}
