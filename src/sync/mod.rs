//! Daemon bring-up sequencing
//!
//! After the daemon answers RPC, the splash screen walks through four
//! readiness checks in a fixed order. The main window may only be created
//! once every one of them has resolved.
//!
//! ```text
//! VersionCheck -> Loading -> Synchronizing -> ErrorCheck -> Complete
//!       \            \              \              \
//!        +------------+--------------+--------------+--> Failed(reason)
//! ```

pub mod explorer;

use crate::daemon::methods::{format_daemon_version, GetInfo};
use crate::daemon::RpcClient;
use crate::error::{RpcError, SyncStageError};
use crate::events::{Signal, SignalBus};
use explorer::HeightSource;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use explorer::{Explorer, NoHeightSource};

/// Stages of the bring-up sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "stage", content = "reason")]
pub enum SyncStage {
    VersionCheck,
    Loading,
    Synchronizing,
    ErrorCheck,
    Complete,
    Failed(String),
}

impl SyncStage {
    /// The stage that follows a successful `self`
    pub fn advance(&self) -> SyncStage {
        match self {
            SyncStage::VersionCheck => SyncStage::Loading,
            SyncStage::Loading => SyncStage::Synchronizing,
            SyncStage::Synchronizing => SyncStage::ErrorCheck,
            SyncStage::ErrorCheck => SyncStage::Complete,
            SyncStage::Complete => SyncStage::Complete,
            SyncStage::Failed(reason) => SyncStage::Failed(reason.clone()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStage::Complete | SyncStage::Failed(_))
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStage::VersionCheck => write!(f, "version check"),
            SyncStage::Loading => write!(f, "loading"),
            SyncStage::Synchronizing => write!(f, "synchronization"),
            SyncStage::ErrorCheck => write!(f, "error check"),
            SyncStage::Complete => write!(f, "complete"),
            SyncStage::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Stages that resolved, in execution order
    pub completed: Vec<SyncStage>,
    /// Daemon version reported during the run
    pub daemon_version: Option<String>,
}

/// Tunables for one sequencer run
#[derive(Debug, Clone)]
pub struct SequencerOptions {
    pub poll_interval: Duration,
    /// Oldest acceptable daemon version (numeric encoding)
    pub min_daemon_version: u64,
}

type StepResult = Result<(), String>;

/// Drives the bring-up stages against the daemon
pub struct Sequencer {
    rpc: RpcClient,
    signals: SignalBus,
    heights: Arc<dyn HeightSource>,
    options: SequencerOptions,
    stage: SyncStage,
    /// The daemon was warming up during the version check
    version_deferred: bool,
    daemon_version: Option<String>,
}

impl Sequencer {
    pub fn new(
        rpc: RpcClient,
        signals: SignalBus,
        heights: Arc<dyn HeightSource>,
        options: SequencerOptions,
    ) -> Self {
        Self {
            rpc,
            signals,
            heights,
            options,
            stage: SyncStage::VersionCheck,
            version_deferred: false,
            daemon_version: None,
        }
    }

    /// Current stage
    pub fn stage(&self) -> &SyncStage {
        &self.stage
    }

    /// Run every stage in order; the first failure halts the chain
    pub async fn run(&mut self) -> Result<SyncReport, SyncStageError> {
        let mut completed = Vec::new();
        self.stage = SyncStage::VersionCheck;

        while !self.stage.is_terminal() {
            let stage = self.stage.clone();
            log::info!("Sync stage: {}", stage);

            let result = match stage {
                SyncStage::VersionCheck => self.version_control().await,
                SyncStage::Loading => self.daemon_loading().await,
                SyncStage::Synchronizing => self.synchronize_wallet().await,
                SyncStage::ErrorCheck => self.check_errors().await,
                SyncStage::Complete | SyncStage::Failed(_) => Ok(()),
            };

            match result {
                Ok(()) => {
                    self.stage = stage.advance();
                    completed.push(stage);
                }
                Err(reason) => {
                    log::error!("Sync stage {} failed: {}", stage, reason);
                    self.stage = SyncStage::Failed(reason.clone());
                    return Err(SyncStageError::new(stage, reason));
                }
            }
        }

        log::info!("Wallet synchronization complete");
        Ok(SyncReport {
            completed,
            daemon_version: self.daemon_version.clone(),
        })
    }

    fn progress(&self, text: impl Into<String>) {
        self.signals.emit(Signal::indeterminate(text));
    }

    fn accept_version(&mut self, info: &GetInfo) -> StepResult {
        let version = info.version_string();
        if info.version < self.options.min_daemon_version {
            return Err(format!(
                "daemon version {} is older than the required {}",
                version,
                format_daemon_version(self.options.min_daemon_version)
            ));
        }
        log::info!("Daemon version {} (protocol {})", version, info.protocolversion);
        self.daemon_version = Some(version);
        Ok(())
    }

    async fn version_control(&mut self) -> StepResult {
        self.progress("Checking daemon version...");

        match self.rpc.get_info().await {
            Ok(info) => self.accept_version(&info),
            Err(e) if e.is_warmup() => {
                log::info!("Daemon warming up, version checked once loaded");
                self.version_deferred = true;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn daemon_loading(&mut self) -> StepResult {
        self.progress("Loading daemon...");

        loop {
            match self.rpc.get_info().await {
                Ok(info) => {
                    if self.version_deferred {
                        self.version_deferred = false;
                        self.accept_version(&info)?;
                    }
                    self.progress("Daemon loaded");
                    return Ok(());
                }
                Err(RpcError::Daemon { code, message }) if code == crate::error::RPC_IN_WARMUP => {
                    self.progress(message);
                }
                Err(e) => return Err(e.to_string()),
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn synchronize_wallet(&mut self) -> StepResult {
        self.progress("Synchronizing wallet...");

        loop {
            let local = self.rpc.get_block_count().await.map_err(|e| e.to_string())?;

            match self.heights.network_height().await {
                Some(network) if network > 0 => {
                    self.signals.emit(Signal::determinate(
                        format!("Synchronizing wallet ({} / {} blocks)", local, network),
                        local as f32 / network as f32,
                    ));
                    if local >= network {
                        return Ok(());
                    }
                }
                _ => {
                    let status = self
                        .rpc
                        .get_staking_status()
                        .await
                        .map_err(|e| e.to_string())?;
                    self.progress(format!("Synchronizing wallet (block {})", local));
                    if status.mnsync {
                        return Ok(());
                    }
                }
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn check_errors(&mut self) -> StepResult {
        self.progress("Checking for errors...");

        let info = self.rpc.get_info().await.map_err(|e| e.to_string())?;
        let errors = info.errors.trim();
        if !errors.is_empty() {
            return Err(errors.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::rpc::testing::ScriptedTransport;
    use crate::events::{drain, ProgressMode};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedHeight(Option<u64>);

    #[async_trait]
    impl HeightSource for FixedHeight {
        async fn network_height(&self) -> Option<u64> {
            self.0
        }
    }

    fn info(version: u64, errors: &str) -> serde_json::Value {
        json!({
            "version": version,
            "protocolversion": 70920,
            "blocks": 100,
            "connections": 8,
            "errors": errors
        })
    }

    fn sequencer(transport: Arc<ScriptedTransport>, height: Option<u64>, bus: &SignalBus) -> Sequencer {
        Sequencer::new(
            RpcClient::from_transport(transport),
            bus.clone(),
            Arc::new(FixedHeight(height)),
            SequencerOptions {
                poll_interval: Duration::from_millis(1),
                min_daemon_version: 2_000_000,
            },
        )
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let mut stage = SyncStage::VersionCheck;
        let mut order = vec![stage.clone()];
        while !stage.is_terminal() {
            stage = stage.advance();
            order.push(stage.clone());
        }
        assert_eq!(
            order,
            vec![
                SyncStage::VersionCheck,
                SyncStage::Loading,
                SyncStage::Synchronizing,
                SyncStage::ErrorCheck,
                SyncStage::Complete,
            ]
        );

        let failed = SyncStage::Failed("boom".into());
        assert_eq!(failed.advance(), failed);
        assert_eq!(SyncStage::Complete.advance(), SyncStage::Complete);
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let transport = ScriptedTransport::new();
        transport.ok("getinfo", info(2_000_100, ""));
        transport.ok("getblockcount", json!(90)).ok("getblockcount", json!(100));

        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let mut seq = sequencer(transport.clone(), Some(100), &bus);

        let report = seq.run().await.unwrap();
        assert_eq!(
            report.completed,
            vec![
                SyncStage::VersionCheck,
                SyncStage::Loading,
                SyncStage::Synchronizing,
                SyncStage::ErrorCheck,
            ]
        );
        assert_eq!(report.daemon_version.as_deref(), Some("2.0.1"));
        assert_eq!(seq.stage(), &SyncStage::Complete);

        assert_eq!(
            transport.methods_called(),
            vec!["getinfo", "getinfo", "getblockcount", "getblockcount", "getinfo"]
        );

        let determinate: Vec<f32> = drain(&mut rx)
            .into_iter()
            .filter_map(|s| match s {
                Signal::Progress(p) if p.mode == ProgressMode::Determinate => p.value,
                _ => None,
            })
            .collect();
        assert_eq!(determinate, vec![0.9, 1.0]);
    }

    #[tokio::test]
    async fn test_loading_waits_out_warmup() {
        let transport = ScriptedTransport::new();
        transport
            .err("getinfo", -28, "Loading block index...")
            .err("getinfo", -28, "Verifying blocks...")
            .ok("getinfo", info(2_000_100, ""));
        transport.ok("getblockcount", json!(100));

        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let mut seq = sequencer(transport.clone(), Some(100), &bus);

        let report = seq.run().await.unwrap();
        assert_eq!(report.completed.len(), 4);
        // Version was checked once the daemon finished loading
        assert_eq!(report.daemon_version.as_deref(), Some("2.0.1"));

        let texts: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|s| match s {
                Signal::Progress(p) => Some(p.text),
                _ => None,
            })
            .collect();
        assert!(texts.contains(&"Verifying blocks...".to_string()));
    }

    #[tokio::test]
    async fn test_old_daemon_fails_version_check() {
        let transport = ScriptedTransport::new();
        transport.ok("getinfo", info(1_090_000, ""));

        let bus = SignalBus::default();
        let mut seq = sequencer(transport.clone(), Some(100), &bus);

        let err = seq.run().await.unwrap_err();
        assert_eq!(err.stage, SyncStage::VersionCheck);
        assert!(matches!(seq.stage(), SyncStage::Failed(_)));
        // Nothing after the failed stage ran
        assert_eq!(transport.methods_called(), vec!["getinfo"]);
    }

    #[tokio::test]
    async fn test_loading_fails_on_other_errors() {
        let transport = ScriptedTransport::new();
        transport
            .ok("getinfo", info(2_000_100, ""))
            .err("getinfo", -1, "database corrupted");

        let bus = SignalBus::default();
        let mut seq = sequencer(transport.clone(), Some(100), &bus);

        let err = seq.run().await.unwrap_err();
        assert_eq!(err.stage, SyncStage::Loading);
        assert!(err.reason.contains("database corrupted"));
        assert!(!transport.methods_called().contains(&"getblockcount".to_string()));
    }

    #[tokio::test]
    async fn test_sync_falls_back_to_mnsync() {
        let transport = ScriptedTransport::new();
        transport.ok("getinfo", info(2_000_100, ""));
        transport.ok("getblockcount", json!(50));
        transport
            .ok("getstakingstatus", json!({"mnsync": false}))
            .ok("getstakingstatus", json!({"mnsync": true}));

        let bus = SignalBus::default();
        let mut seq = sequencer(transport.clone(), None, &bus);

        seq.run().await.unwrap();
        let polls = transport
            .methods_called()
            .into_iter()
            .filter(|m| m == "getstakingstatus")
            .count();
        assert_eq!(polls, 2);
    }

    #[tokio::test]
    async fn test_daemon_errors_fail_error_check() {
        let transport = ScriptedTransport::new();
        transport.ok("getinfo", info(2_000_100, "Warning: unknown new rules activated"));
        transport.ok("getblockcount", json!(100));

        let bus = SignalBus::default();
        let mut seq = sequencer(transport, Some(100), &bus);

        let err = seq.run().await.unwrap_err();
        assert_eq!(err.stage, SyncStage::ErrorCheck);
        assert_eq!(err.reason, "Warning: unknown new rules activated");
    }

    #[tokio::test]
    async fn test_block_count_failure_halts_synchronizing() {
        let transport = ScriptedTransport::new();
        transport.ok("getinfo", info(2_000_100, ""));
        transport.err("getblockcount", -1, "block index unavailable");

        let bus = SignalBus::default();
        let mut seq = sequencer(transport.clone(), Some(100), &bus);

        let err = seq.run().await.unwrap_err();
        assert_eq!(err.stage, SyncStage::Synchronizing);
        assert!(err.reason.contains("block index unavailable"));
        assert!(matches!(seq.stage(), SyncStage::Failed(_)));
        // ErrorCheck never ran
        assert_eq!(
            transport.methods_called(),
            vec!["getinfo", "getinfo", "getblockcount"]
        );
    }

    #[tokio::test]
    async fn test_staking_status_failure_halts_synchronizing() {
        let transport = ScriptedTransport::new();
        transport.ok("getinfo", info(2_000_100, ""));
        transport.ok("getblockcount", json!(50));
        transport.err("getstakingstatus", -32601, "Method not found");

        let bus = SignalBus::default();
        let mut seq = sequencer(transport, None, &bus);

        let err = seq.run().await.unwrap_err();
        assert_eq!(err.stage, SyncStage::Synchronizing);
        assert!(err.reason.contains("Method not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_height_keeps_polling() {
        let transport = ScriptedTransport::new();
        transport.ok("getinfo", info(2_000_100, ""));
        transport.ok("getblockcount", json!(100));

        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let mut seq = sequencer(transport.clone(), Some(1_000), &bus);

        let outcome = tokio::time::timeout(Duration::from_millis(50), seq.run()).await;
        assert!(outcome.is_err());
        assert_eq!(seq.stage(), &SyncStage::Synchronizing);

        let polls = transport
            .methods_called()
            .into_iter()
            .filter(|m| m == "getblockcount")
            .count();
        assert!(polls > 1);

        let progress: Vec<f32> = drain(&mut rx)
            .into_iter()
            .filter_map(|s| match s {
                Signal::Progress(p) if p.mode == ProgressMode::Determinate => p.value,
                _ => None,
            })
            .collect();
        assert!(!progress.is_empty());
        assert!(progress.iter().all(|v| *v == 0.1));
    }
}
