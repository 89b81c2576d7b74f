//! Typed request/response schema for the daemon RPC methods the wallet uses

use super::rpc::RpcClient;
use crate::error::RpcError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// `getinfo` result
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GetInfo {
    /// Daemon version, encoded as `MMmmppbb` (2000100 = 2.0.1)
    pub version: u64,
    pub protocolversion: u64,
    pub walletversion: Option<u64>,
    pub balance: Option<f64>,
    pub blocks: u64,
    pub connections: u32,
    pub difficulty: Option<f64>,
    pub testnet: bool,
    pub unlocked_until: Option<u64>,
    /// Warnings the daemon wants surfaced (empty when healthy)
    pub errors: String,
}

impl GetInfo {
    /// Human readable version (`2000100` -> `2.0.1`)
    pub fn version_string(&self) -> String {
        format_daemon_version(self.version)
    }
}

/// Format the daemon's numeric client version
pub fn format_daemon_version(version: u64) -> String {
    let major = version / 1_000_000;
    let minor = (version / 10_000) % 100;
    let patch = (version / 100) % 100;
    let build = version % 100;
    if build == 0 {
        format!("{}.{}.{}", major, minor, patch)
    } else {
        format!("{}.{}.{}.{}", major, minor, patch, build)
    }
}

/// `getstakingstatus` result
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StakingStatus {
    pub validtime: bool,
    pub haveconnections: bool,
    pub walletunlocked: bool,
    pub mintablecoins: bool,
    pub enoughcoins: bool,
    /// Masternode/blockchain sync finished
    pub mnsync: bool,
    #[serde(rename = "staking status")]
    pub staking: bool,
}

/// One row of `listmasternodes`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MasternodeEntry {
    pub rank: u32,
    pub network: String,
    pub txhash: String,
    pub outidx: u32,
    pub pubkey: String,
    pub status: String,
    pub addr: String,
    pub version: u32,
    pub lastseen: u64,
    pub activetime: u64,
    pub lastpaidtime: u64,
}

/// One row of `masternode list-conf`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MasternodeConf {
    pub alias: String,
    pub address: String,
    pub private_key: String,
    pub tx_hash: String,
    pub output_index: String,
    pub status: String,
}

/// One `[address, amount, account]` tuple of `listaddressgroupings`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressGroupingEntry {
    pub address: String,
    pub amount: f64,
    pub account: Option<String>,
}

impl<'de> Deserialize<'de> for AddressGroupingEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let raw = Vec::<Value>::deserialize(deserializer)?;
        let address = raw
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom("grouping entry without address"))?
            .to_string();
        let amount = raw
            .get(1)
            .and_then(Value::as_f64)
            .ok_or_else(|| D::Error::custom("grouping entry without amount"))?;
        let account = raw.get(2).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            address,
            amount,
            account,
        })
    }
}

/// `getdatadirectory` result
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DataDirectory {
    pub directory: String,
}

/// Typed wrappers, one per RPC method
impl RpcClient {
    pub async fn get_info(&self) -> Result<GetInfo, RpcError> {
        self.call_as("getinfo", vec![]).await
    }

    pub async fn get_balance(&self) -> Result<f64, RpcError> {
        self.call_as("getbalance", vec![]).await
    }

    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        self.call_as("getblockcount", vec![]).await
    }

    pub async fn get_staking_status(&self) -> Result<StakingStatus, RpcError> {
        self.call_as("getstakingstatus", vec![]).await
    }

    pub async fn help(&self, command: Option<&str>) -> Result<String, RpcError> {
        let params = command.map(|c| vec![json!(c)]).unwrap_or_default();
        self.call_as("help", params).await
    }

    pub async fn wallet_lock(&self) -> Result<(), RpcError> {
        self.call("walletlock", vec![]).await.map(|_| ())
    }

    /// Unlock for `timeout_secs`; `staking_only` keeps spending locked
    pub async fn wallet_passphrase(
        &self,
        passphrase: &str,
        timeout_secs: u64,
        staking_only: bool,
    ) -> Result<(), RpcError> {
        self.call(
            "walletpassphrase",
            vec![json!(passphrase), json!(timeout_secs), json!(staking_only)],
        )
        .await
        .map(|_| ())
    }

    /// Ask the daemon to shut down
    pub async fn stop(&self) -> Result<String, RpcError> {
        let value = self.call("stop", vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn list_masternodes(&self, filter: Option<&str>) -> Result<Vec<MasternodeEntry>, RpcError> {
        let params = filter.map(|f| vec![json!(f)]).unwrap_or_default();
        self.call_as("listmasternodes", params).await
    }

    pub async fn masternode_list_conf(&self) -> Result<Vec<MasternodeConf>, RpcError> {
        self.call_as("masternode list-conf", vec![]).await
    }

    pub async fn list_address_groupings(&self) -> Result<Vec<Vec<AddressGroupingEntry>>, RpcError> {
        self.call_as("listaddressgroupings", vec![]).await
    }

    pub async fn set_account_name(&self, address: &str, name: &str) -> Result<(), RpcError> {
        self.call("setaccountname", vec![json!(address), json!(name)])
            .await
            .map(|_| ())
    }

    pub async fn get_new_address(&self, label: Option<&str>) -> Result<String, RpcError> {
        let params = label.map(|l| vec![json!(l)]).unwrap_or_default();
        self.call_as("getnewaddress", params).await
    }

    pub async fn encrypt_wallet(&self, passphrase: &str) -> Result<String, RpcError> {
        self.call_as("encryptwallet", vec![json!(passphrase)]).await
    }

    pub async fn backup_wallet(&self, destination: &str) -> Result<(), RpcError> {
        self.call("backupwallet", vec![json!(destination)])
            .await
            .map(|_| ())
    }

    pub async fn dump_wallet(&self, filename: &str) -> Result<(), RpcError> {
        self.call("dumpwallet", vec![json!(filename)]).await.map(|_| ())
    }

    pub async fn import_wallet(&self, filename: &str) -> Result<(), RpcError> {
        self.call("importwallet", vec![json!(filename)]).await.map(|_| ())
    }

    pub async fn get_data_directory(&self) -> Result<DataDirectory, RpcError> {
        self.call_as("getdatadirectory", vec![]).await
    }

    pub async fn auto_combine_rewards(&self, enable: bool, threshold: u64) -> Result<(), RpcError> {
        self.call("autocombinerewards", vec![json!(enable), json!(threshold)])
            .await
            .map(|_| ())
    }
}
