//! Application controller
//!
//! Owns the per-run [`AppContext`], walks the splash screen through daemon
//! start and synchronization, and reacts to restart and exit requests.

use crate::config::{AppConfig, RpcCredentials};
use crate::daemon::{DaemonLaunch, DaemonSupervisor, RpcClient};
use crate::error::WalletError;
use crate::events::{Signal, SignalBus};
use crate::logging::NOTIFY_TARGET;
use crate::settings::{SettingsStore, WalletSettings};
use crate::shell::WindowShell;
use crate::sync::explorer::HeightSource;
use crate::sync::{Explorer, NoHeightSource, Sequencer, SequencerOptions, SyncReport};
use crate::update::{GitHubFeed, Installer, UpdateCoordinator, UpdateOptions};
use crate::wallet::WalletOps;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Everything one application run shares, created at launch and dropped
/// at shutdown
pub struct AppContext {
    pub config: AppConfig,
    pub credentials: RpcCredentials,
    pub signals: SignalBus,
    pub rpc: RpcClient,
    pub supervisor: Arc<DaemonSupervisor>,
    pub heights: Arc<dyn HeightSource>,
    pub settings: Arc<SettingsStore>,
    pub wallet: WalletOps,
    pub updates: Arc<UpdateCoordinator>,
}

impl AppContext {
    /// Build the context for a real daemon on localhost
    pub fn new(config: AppConfig, signals: SignalBus) -> Result<Self, WalletError> {
        let credentials = config.credentials();
        let rpc = RpcClient::connect(credentials.clone())?;
        let feed = GitHubFeed::new(&config.update_owner, &config.update_repo)?;
        let updates = UpdateCoordinator::new(Arc::new(feed), signals.clone(), UpdateOptions::from_config(&config));

        let heights: Arc<dyn HeightSource> = match Explorer::new(&config.explorer_url) {
            Ok(explorer) => Arc::new(explorer),
            Err(e) => {
                log::warn!("{}; sync progress will be indeterminate", e);
                Arc::new(NoHeightSource)
            }
        };

        Ok(Self::assemble(config, credentials, signals, rpc, heights, updates))
    }

    /// Wire the components around an already built RPC client
    pub fn assemble(
        config: AppConfig,
        credentials: RpcCredentials,
        signals: SignalBus,
        rpc: RpcClient,
        heights: Arc<dyn HeightSource>,
        updates: UpdateCoordinator,
    ) -> Self {
        let launch = DaemonLaunch::from_config(&config, credentials.clone());
        let supervisor = Arc::new(DaemonSupervisor::new(launch, rpc.clone(), signals.clone()));
        let settings = Arc::new(SettingsStore::open(
            WalletSettings::default_path(),
            signals.clone(),
        ));
        let wallet = WalletOps::new(rpc.clone(), signals.clone(), settings.clone());

        Self {
            config,
            credentials,
            signals,
            rpc,
            supervisor,
            heights,
            settings,
            wallet,
            updates: Arc::new(updates),
        }
    }
}

/// Drives one application run against a window shell
pub struct App<S: WindowShell> {
    ctx: AppContext,
    shell: S,
}

impl<S: WindowShell> App<S> {
    pub fn new(ctx: AppContext, shell: S) -> Self {
        Self { ctx, shell }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Start the daemon and synchronize. The main window opens (and the
    /// splash closes) only when every stage resolved; otherwise the splash
    /// stays up.
    pub async fn startup(&self) -> Result<SyncReport, WalletError> {
        self.ctx.supervisor.start().await?;
        self.synchronize().await
    }

    /// Restart the daemon behind the splash screen and synchronize again
    pub async fn restart(&self) -> Result<SyncReport, WalletError> {
        log::info!("Restarting wallet");
        self.shell.show_splash();
        self.ctx.supervisor.restart().await?;
        self.synchronize().await
    }

    async fn synchronize(&self) -> Result<SyncReport, WalletError> {
        let mut sequencer = Sequencer::new(
            self.ctx.rpc.clone(),
            self.ctx.signals.clone(),
            self.ctx.heights.clone(),
            SequencerOptions {
                poll_interval: self.ctx.config.sync_poll_interval(),
                min_daemon_version: self.ctx.config.min_daemon_version,
            },
        );
        let report = sequencer.run().await?;

        self.shell.show_main_window();
        self.shell.close_splash();
        Ok(report)
    }

    /// Stop the daemon and install the downloaded update
    pub async fn update_now(&self, installer: &dyn Installer) -> Result<(), WalletError> {
        if let Err(e) = self.ctx.updates.update_now(&self.ctx.supervisor, installer).await {
            log::error!(target: NOTIFY_TARGET, "Update failed: {}", e);
            return Err(e.into());
        }
        self.shell.request_exit();
        Ok(())
    }

    /// Stop the supervised daemon; safe to call more than once
    pub async fn shutdown(&self) {
        log::info!("Shutting down");
        if let Err(e) = self.ctx.supervisor.stop().await {
            log::warn!("Daemon stop failed: {}", e);
        }
    }

    /// Run until `exit` resolves, then shut the daemon down. `exit` is
    /// watched during startup and restarts too, so closing the splash while
    /// the daemon is still loading stops it.
    pub async fn run<F: Future<Output = ()>>(&self, exit: F) {
        let mut rx = self.ctx.signals.subscribe();
        let updates = self.ctx.updates.clone().spawn();
        tokio::pin!(exit);

        let started = tokio::select! {
            biased;
            _ = &mut exit => false,
            result = self.startup() => {
                match result {
                    Ok(report) => log::info!(
                        "Wallet ready (daemon {})",
                        report.daemon_version.as_deref().unwrap_or("unknown")
                    ),
                    Err(e) => log::error!("Startup halted: {}", e),
                }
                true
            }
        };

        if started {
            loop {
                let signal = tokio::select! {
                    biased;
                    _ = &mut exit => break,
                    signal = rx.recv() => signal,
                };

                match signal {
                    Ok(Signal::WalletRestart) => {
                        tokio::select! {
                            biased;
                            _ = &mut exit => break,
                            result = self.restart() => {
                                if let Err(e) = result {
                                    log::error!("Restart halted: {}", e);
                                }
                            }
                        }
                    }
                    Ok(Signal::OpenAsteroids) => log::debug!("Asteroids requested; no game in this build"),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => log::debug!("Skipped {} signals", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        }

        updates.abort();
        self.shutdown().await;
    }
}
