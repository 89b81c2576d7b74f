//! Daemon management module for the UNIGRID Wallet
//!
//! The daemon is an external full node. The wallet launches (or adopts) it,
//! talks to it over local JSON-RPC and shuts it down on exit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    daemon module                         │
//! ├─────────────────────────────────────────────────────────┤
//! │  rpc.rs      - JSON-RPC transport and client             │
//! │  methods.rs  - Typed request/response schema per method  │
//! │  manager.rs  - Process lifecycle (start/stop/restart)    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod manager;
pub mod methods;
pub mod rpc;

pub use manager::{DaemonLaunch, DaemonSupervisor};
pub use methods::{AddressGroupingEntry, GetInfo, MasternodeConf, MasternodeEntry, StakingStatus};
pub use rpc::{HttpTransport, Reachability, RpcClient, RpcTransport};
