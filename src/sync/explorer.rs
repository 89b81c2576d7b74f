//! Public block explorer client
//!
//! Gives the synchronization stage a network height to measure local
//! progress against.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Source of the network's current block height
#[async_trait]
pub trait HeightSource: Send + Sync {
    /// `None` when the height cannot be determined right now
    async fn network_height(&self) -> Option<u64>;
}

/// Block explorer reachable over plain HTTP (`<base>/api/getblockcount`)
pub struct Explorer {
    base: Url,
    client: reqwest::Client,
}

impl Explorer {
    pub fn new(base: &str) -> Result<Self, String> {
        let base = Url::parse(base).map_err(|e| format!("Invalid explorer URL {}: {}", base, e))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("UNIGRID-Wallet/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self { base, client })
    }

    fn endpoint(&self, command: &str) -> Result<Url, url::ParseError> {
        self.base.join(&format!("api/{}", command))
    }

    pub async fn get_block_count(&self) -> Result<u64, String> {
        let url = self
            .endpoint("getblockcount")
            .map_err(|e| format!("Invalid explorer endpoint: {}", e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Explorer request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Explorer returned status {}", response.status()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read explorer response: {}", e))?;

        serde_json::from_str::<u64>(body.trim())
            .map_err(|e| format!("Failed to parse explorer block count: {}", e))
    }
}

#[async_trait]
impl HeightSource for Explorer {
    async fn network_height(&self) -> Option<u64> {
        match self.get_block_count().await {
            Ok(height) => Some(height),
            Err(e) => {
                log::debug!("Network height unavailable: {}", e);
                None
            }
        }
    }
}

/// Height source that never knows the network height
pub struct NoHeightSource;

#[async_trait]
impl HeightSource for NoHeightSource {
    async fn network_height(&self) -> Option<u64> {
        None
    }
}
