//! Interactive wallet actions triggered from the UI
//!
//! Every action talks to the daemon over RPC. Long running actions toggle
//! the busy spinner (`state` signal); outcomes and failures are reported as
//! desktop notifications.

use crate::daemon::{AddressGroupingEntry, RpcClient};
use crate::error::{RpcError, WalletError};
use crate::events::{BusyState, Signal, SignalBus};
use crate::settings::SettingsStore;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// How long a passphrase unlocks the wallet for a key dump
const DUMP_UNLOCK_SECS: u64 = 60;

/// RPC-backed wallet operations
pub struct WalletOps {
    rpc: RpcClient,
    signals: SignalBus,
    settings: Arc<SettingsStore>,
}

impl WalletOps {
    pub fn new(rpc: RpcClient, signals: SignalBus, settings: Arc<SettingsStore>) -> Self {
        Self {
            rpc,
            signals,
            settings,
        }
    }

    fn notify(&self, text: impl Into<String>) {
        self.signals.emit(Signal::Notification(text.into()));
    }

    /// Report a failed call once; the log file keeps the full error
    fn notify_error(&self, error: &RpcError) {
        log::error!("{}", error);
        match error {
            RpcError::Daemon { message, .. } => self.notify(message.clone()),
            other => self.notify(other.to_string()),
        }
    }

    /// Run `action` with the busy spinner shown
    async fn busy<T, F>(&self, action: F) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, RpcError>>,
    {
        self.signals.emit(Signal::State(BusyState::Working));
        let result = action.await;
        self.signals.emit(Signal::State(BusyState::Completed));
        if let Err(e) = &result {
            self.notify_error(e);
        }
        result
    }

    /// Encrypt the wallet; the daemon shuts itself down afterwards, so a
    /// restart is requested on success.
    pub async fn encrypt_wallet(&self, passphrase: &str, repeat: &str) -> Result<(), WalletError> {
        if passphrase != repeat {
            return Err(WalletError::PassphraseMismatch);
        }

        let response = self.busy(self.rpc.encrypt_wallet(passphrase)).await?;
        self.notify(response);

        if let Err(e) = self.settings.set_encrypted(true) {
            log::warn!("Failed to persist encryption flag: {}", e);
        }
        self.signals.emit(Signal::WalletRestart);
        Ok(())
    }

    /// Copy wallet.dat to `destination`
    pub async fn backup_wallet(&self, destination: &str) -> Result<(), WalletError> {
        self.rpc.backup_wallet(destination).await.inspect_err(|e| self.notify_error(e))?;

        match self.rpc.get_data_directory().await {
            Ok(data) => log::info!("Backed up wallet.dat from {}", data.directory),
            Err(e) => log::debug!("Data directory unknown: {}", e),
        }
        self.notify("Saved backup of wallet.dat");
        Ok(())
    }

    /// Write the private keys to `destination`. An encrypted wallet needs
    /// its passphrase and is locked again afterwards.
    pub async fn dump_wallet(&self, destination: &str, passphrase: Option<&str>) -> Result<(), WalletError> {
        let encrypted = self.settings.get().encrypted;

        if encrypted {
            let passphrase = passphrase.ok_or(WalletError::Locked)?;
            self.rpc
                .wallet_passphrase(passphrase, DUMP_UNLOCK_SECS, false)
                .await
                .inspect_err(|e| self.notify_error(e))?;
        }

        let result = self.rpc.dump_wallet(destination).await;

        if encrypted {
            if let Err(e) = self.rpc.wallet_lock().await {
                log::warn!("Failed to relock wallet after dump: {}", e);
            }
        }

        result.inspect_err(|e| self.notify_error(e))?;
        self.notify("Successfully dumped private keys");
        Ok(())
    }

    /// Import keys from a dump file, then refresh the wallet info
    pub async fn import_wallet(&self, filename: &str) -> Result<(), WalletError> {
        self.busy(self.rpc.import_wallet(filename)).await?;
        self.notify("Successfully imported private keys");
        self.signals.emit(Signal::TriggerInfoUpdate);
        Ok(())
    }

    /// Combine rewards below `threshold` that sit on the same address
    pub async fn enable_auto_combine(&self, threshold: u64) -> Result<(), WalletError> {
        self.rpc
            .auto_combine_rewards(true, threshold)
            .await
            .inspect_err(|e| self.notify_error(e))?;
        self.notify("Combine rewards enabled");
        Ok(())
    }

    /// Local addresses, richest first, honouring the zero-balance filter
    pub async fn list_addresses(&self) -> Result<Vec<AddressGroupingEntry>, WalletError> {
        let groupings = self.rpc.list_address_groupings().await?;
        let hide_zero = self.settings.get().hide_zero_balances;

        let mut addresses: Vec<AddressGroupingEntry> = groupings
            .into_iter()
            .flatten()
            .filter(|entry| !hide_zero || entry.amount > 0.0)
            .collect();
        addresses.sort_by(|a, b| b.amount.total_cmp(&a.amount));

        Ok(addresses)
    }

    pub async fn set_account_name(&self, address: &str, name: &str) -> Result<(), WalletError> {
        self.rpc
            .set_account_name(address, name)
            .await
            .inspect_err(|e| self.notify_error(e))?;
        self.signals.emit(Signal::ReloadAddresses);
        Ok(())
    }

    pub async fn generate_address(&self, label: &str) -> Result<String, WalletError> {
        let label = (!label.is_empty()).then_some(label);
        let address = self
            .rpc
            .get_new_address(label)
            .await
            .inspect_err(|e| self.notify_error(e))?;
        log::info!("Generated address {}", address);
        Ok(address)
    }

    /// Path of a daemon config file (e.g. `masternode.conf`) in its data dir
    pub async fn conf_file_path(&self, file: &str) -> Result<PathBuf, WalletError> {
        let data = self.rpc.get_data_directory().await?;
        Ok(PathBuf::from(data.directory).join(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::rpc::testing::ScriptedTransport;
    use crate::events::drain;
    use crate::logging::testing::LogCapture;
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};

    fn ops(transport: Arc<ScriptedTransport>, bus: &SignalBus) -> (WalletOps, Arc<SettingsStore>, TempDir) {
        let dir = tempdir().unwrap();
        let settings = Arc::new(SettingsStore::open(dir.path().join("settings.json"), bus.clone()));
        (
            WalletOps::new(RpcClient::from_transport(transport), bus.clone(), settings.clone()),
            settings,
            dir,
        )
    }

    #[tokio::test]
    async fn test_encrypt_requests_restart() {
        let transport = ScriptedTransport::new();
        transport.ok("encryptwallet", json!("wallet encrypted; server stopping"));
        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let (ops, settings, _dir) = ops(transport.clone(), &bus);

        ops.encrypt_wallet("secret", "secret").await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                Signal::State(BusyState::Working),
                Signal::State(BusyState::Completed),
                Signal::Notification("wallet encrypted; server stopping".into()),
                Signal::WalletRestart,
            ]
        );
        assert!(settings.get().encrypted);
    }

    #[tokio::test]
    async fn test_encrypt_mismatch_makes_no_call() {
        let transport = ScriptedTransport::new();
        let bus = SignalBus::default();
        let (ops, _settings, _dir) = ops(transport.clone(), &bus);

        let err = ops.encrypt_wallet("secret", "secrte").await.unwrap_err();
        assert!(matches!(err, WalletError::PassphraseMismatch));
        assert!(transport.methods_called().is_empty());
    }

    #[tokio::test]
    async fn test_encrypt_failure_resets_spinner() {
        let transport = ScriptedTransport::new();
        transport.err("encryptwallet", -15, "Error: running with an encrypted wallet");
        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let (ops, settings, _dir) = ops(transport, &bus);

        assert!(ops.encrypt_wallet("a", "a").await.is_err());
        assert_eq!(
            drain(&mut rx),
            vec![
                Signal::State(BusyState::Working),
                Signal::State(BusyState::Completed),
                Signal::Notification("Error: running with an encrypted wallet".into()),
            ]
        );
        assert!(!settings.get().encrypted);
    }

    #[tokio::test]
    async fn test_failed_backup_notifies_once() {
        let transport = ScriptedTransport::new();
        transport.err("backupwallet", -4, "Error: Wallet backup failed!");
        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let (ops, _settings, _dir) = ops(transport, &bus);

        // The logged error goes through the appender too, as in the real app
        let appender = crate::logging::SignalAppender::new(bus.clone());
        let _log = LogCapture::install(appender);

        assert!(ops.backup_wallet("/tmp/wallet.dat").await.is_err());
        assert_eq!(
            drain(&mut rx),
            vec![Signal::Notification("Error: Wallet backup failed!".into())]
        );
    }

    #[tokio::test]
    async fn test_import_triggers_info_update() {
        let transport = ScriptedTransport::new();
        transport.ok("importwallet", Value::Null);
        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let (ops, _settings, _dir) = ops(transport, &bus);

        ops.import_wallet("/tmp/keys.txt").await.unwrap();
        assert_eq!(drain(&mut rx).last(), Some(&Signal::TriggerInfoUpdate));
    }

    #[tokio::test]
    async fn test_dump_encrypted_wallet() {
        let transport = ScriptedTransport::new();
        transport
            .ok("walletpassphrase", Value::Null)
            .ok("dumpwallet", Value::Null)
            .ok("walletlock", Value::Null);
        let bus = SignalBus::default();
        let (ops, settings, _dir) = ops(transport.clone(), &bus);
        settings.set_encrypted(true).unwrap();

        let err = ops.dump_wallet("/tmp/dump.txt", None).await.unwrap_err();
        assert!(matches!(err, WalletError::Locked));
        assert!(transport.methods_called().is_empty());

        ops.dump_wallet("/tmp/dump.txt", Some("secret")).await.unwrap();
        assert_eq!(
            transport.methods_called(),
            vec!["walletpassphrase", "dumpwallet", "walletlock"]
        );
    }

    #[tokio::test]
    async fn test_list_addresses_sorted_and_filtered() {
        let transport = ScriptedTransport::new();
        transport.ok(
            "listaddressgroupings",
            json!([
                [["UaddrA", 1.5, "a"], ["UaddrB", 0.0]],
                [["UaddrC", 12.0, "c"]],
                [["UaddrD", 3.25]]
            ]),
        );
        let bus = SignalBus::default();
        let (ops, settings, _dir) = ops(transport, &bus);

        let names = |list: Vec<AddressGroupingEntry>| -> Vec<String> {
            list.into_iter().map(|e| e.address).collect()
        };

        assert_eq!(
            names(ops.list_addresses().await.unwrap()),
            vec!["UaddrC", "UaddrD", "UaddrA"]
        );

        settings.set_hide_zero_balances(false).unwrap();
        assert_eq!(
            names(ops.list_addresses().await.unwrap()),
            vec!["UaddrC", "UaddrD", "UaddrA", "UaddrB"]
        );
    }

    #[tokio::test]
    async fn test_rename_reloads_addresses() {
        let transport = ScriptedTransport::new();
        transport.ok("setaccountname", Value::Null);
        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let (ops, _settings, _dir) = ops(transport.clone(), &bus);

        ops.set_account_name("UaddrA", "savings").await.unwrap();
        assert_eq!(drain(&mut rx), vec![Signal::ReloadAddresses]);

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec![json!("UaddrA"), json!("savings")]);
    }

    #[tokio::test]
    async fn test_combine_rewards_params() {
        let transport = ScriptedTransport::new();
        transport.ok("autocombinerewards", Value::Null);
        let bus = SignalBus::default();
        let (ops, _settings, _dir) = ops(transport.clone(), &bus);

        ops.enable_auto_combine(50).await.unwrap();
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec![json!(true), json!(50)]);
    }

    #[tokio::test]
    async fn test_generate_address_without_label() {
        let transport = ScriptedTransport::new();
        transport.ok("getnewaddress", json!("UnewAddr"));
        let bus = SignalBus::default();
        let (ops, _settings, _dir) = ops(transport.clone(), &bus);

        assert_eq!(ops.generate_address("").await.unwrap(), "UnewAddr");
        assert!(transport.calls.lock().unwrap()[0].1.is_empty());
    }
}
