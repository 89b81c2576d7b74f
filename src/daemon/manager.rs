//! Daemon process supervision
//!
//! Handles starting, adopting, stopping and monitoring the UNIGRID daemon.

use super::rpc::{Reachability, RpcClient};
use crate::config::{AppConfig, RpcCredentials, DAEMON_BINARY_NAME};
use crate::error::{DaemonStartError, RpcError};
use crate::events::{Signal, SignalBus};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// How long a daemon we spawned gets to exit after `stop`
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Interval between exit checks while waiting for shutdown
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to launch the daemon and how long to wait for it
#[derive(Debug, Clone)]
pub struct DaemonLaunch {
    pub binary: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub custom_args: String,
    pub credentials: RpcCredentials,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl DaemonLaunch {
    pub fn from_config(config: &AppConfig, credentials: RpcCredentials) -> Self {
        Self {
            binary: config.daemon_binary(),
            data_dir: config.data_dir(),
            custom_args: config.custom_args.clone(),
            credentials,
            poll_interval: config.ready_poll_interval(),
            max_attempts: config.ready_max_attempts.max(1),
        }
    }

    /// Build the daemon command line
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);

        cmd.arg("-server");
        cmd.arg(format!("-rpcuser={}", self.credentials.user));
        cmd.arg(format!("-rpcpassword={}", self.credentials.password));
        cmd.arg(format!("-rpcport={}", self.credentials.port));
        cmd.arg("-rpcbind=127.0.0.1");
        cmd.arg("-rpcallowip=127.0.0.1");

        if let Some(dir) = &self.data_dir {
            cmd.arg(format!("-datadir={}", dir.display()));
        }

        for arg in self.custom_args.split_whitespace() {
            cmd.arg(arg);
        }

        // Redirect to null to prevent blocking
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        cmd.stdin(Stdio::null());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }
}

/// The daemon process the supervisor is responsible for
#[derive(Debug)]
enum DaemonHandle {
    /// We spawned it
    Spawned(Child),
    /// It was already running when we started
    Adopted { pid: Option<u32> },
}

impl DaemonHandle {
    fn pid(&self) -> Option<u32> {
        match self {
            DaemonHandle::Spawned(child) => Some(child.id()),
            DaemonHandle::Adopted { pid } => *pid,
        }
    }
}

/// Owns the daemon process for one application run
pub struct DaemonSupervisor {
    launch: DaemonLaunch,
    rpc: RpcClient,
    signals: SignalBus,
    handle: Mutex<Option<DaemonHandle>>,
}

impl DaemonSupervisor {
    pub fn new(launch: DaemonLaunch, rpc: RpcClient, signals: SignalBus) -> Self {
        Self {
            launch,
            rpc,
            signals,
            handle: Mutex::new(None),
        }
    }

    /// Find the PID of a running daemon process
    pub fn find_daemon_pid() -> Option<u32> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

        for (pid, process) in sys.processes() {
            let name = process.name().to_string_lossy().to_lowercase();
            if name == DAEMON_BINARY_NAME.to_lowercase() {
                return Some(pid.as_u32());
            }
        }
        None
    }

    /// Whether we currently hold a daemon handle
    pub fn is_running(&self) -> bool {
        self.handle.lock().unwrap().is_some()
    }

    /// PID of the supervised daemon, when known
    pub fn pid(&self) -> Option<u32> {
        self.handle.lock().unwrap().as_ref().and_then(DaemonHandle::pid)
    }

    /// Start (or adopt) the daemon and wait until its RPC interface answers
    pub async fn start(&self) -> Result<(), DaemonStartError> {
        self.signals
            .emit(Signal::indeterminate("Initializing UNIGRID daemon..."));

        if self.is_running() {
            log::info!("Daemon already supervised");
            return Ok(());
        }

        match self.rpc.reachability().await {
            Reachability::Answered => {
                let pid = Self::find_daemon_pid();
                log::info!("Adopting running daemon (pid {:?})", pid);
                *self.handle.lock().unwrap() = Some(DaemonHandle::Adopted { pid });
                return Ok(());
            }
            Reachability::Unauthorized => {
                log::error!("Daemon on port {} rejected our credentials", self.launch.credentials.port);
                return Err(DaemonStartError::Unauthorized);
            }
            Reachability::Unreachable => {}
        }

        if let Some(pid) = Self::find_daemon_pid() {
            log::info!("Daemon process {} found, waiting for its RPC interface", pid);
            *self.handle.lock().unwrap() = Some(DaemonHandle::Adopted { pid: Some(pid) });
        } else {
            self.spawn()?;
        }

        match self.wait_until_ready().await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("Daemon failed to start: {}", e);
                self.abandon();
                Err(e)
            }
        }
    }

    fn spawn(&self) -> Result<(), DaemonStartError> {
        let binary = &self.launch.binary;
        if !binary.exists() {
            return Err(DaemonStartError::NotInstalled(binary.display().to_string()));
        }

        if let Some(dir) = &self.launch.data_dir {
            std::fs::create_dir_all(dir)?;
        }

        let mut cmd = self.launch.command();
        log::info!("Starting daemon: {}", binary.display());
        let child = cmd.spawn()?;

        log::info!("Daemon started with PID {}", child.id());
        *self.handle.lock().unwrap() = Some(DaemonHandle::Spawned(child));
        Ok(())
    }

    /// Poll the readiness RPC until the daemon answers or the bound is hit
    async fn wait_until_ready(&self) -> Result<(), DaemonStartError> {
        let start = std::time::Instant::now();
        let attempts = self.launch.max_attempts;

        log::info!(
            "Waiting for daemon RPC (up to {} attempts, {:?} apart)",
            attempts,
            self.launch.poll_interval
        );

        for attempt in 1..=attempts {
            if let Some(status) = self.child_exit_status() {
                return Err(DaemonStartError::Exited(status));
            }

            match self.rpc.reachability().await {
                Reachability::Answered => {
                    log::info!("Daemon is reachable (took {:?}, attempt {})", start.elapsed(), attempt);
                    return Ok(());
                }
                Reachability::Unauthorized => return Err(DaemonStartError::Unauthorized),
                Reachability::Unreachable => {}
            }

            tokio::time::sleep(self.launch.poll_interval).await;
        }

        Err(DaemonStartError::Timeout { attempts })
    }

    /// Exit status of a spawned child that is no longer running
    fn child_exit_status(&self) -> Option<String> {
        let mut guard = self.handle.lock().unwrap();
        match guard.as_mut() {
            Some(DaemonHandle::Spawned(child)) => match child.try_wait() {
                Ok(Some(status)) => Some(status.to_string()),
                Ok(None) => None,
                Err(e) => Some(e.to_string()),
            },
            _ => None,
        }
    }

    /// Drop the handle after a failed start, killing a child we spawned
    fn abandon(&self) {
        if let Some(DaemonHandle::Spawned(mut child)) = self.handle.lock().unwrap().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Stop the daemon gracefully using the RPC `stop` command.
    ///
    /// Without a daemon handle this is a no-op: no RPC call is made.
    pub async fn stop(&self) -> Result<(), RpcError> {
        let Some(handle) = self.handle.lock().unwrap().take() else {
            log::debug!("No daemon to stop");
            return Ok(());
        };

        log::info!("Stopping daemon (pid {:?})...", handle.pid());

        let result = match self.rpc.stop().await {
            Ok(msg) => {
                log::info!("Daemon stop response: {}", msg);
                Ok(())
            }
            Err(RpcError::Transport(e)) => {
                log::info!("Daemon appears to already be stopped ({})", e);
                Ok(())
            }
            Err(e) => {
                log::warn!("RPC stop command failed: {}", e);
                Err(e)
            }
        };

        if let DaemonHandle::Spawned(child) = handle {
            wait_for_exit(child, STOP_GRACE_PERIOD).await;
        }

        result
    }

    /// Stop and start again
    pub async fn restart(&self) -> Result<(), DaemonStartError> {
        log::info!("Restarting daemon...");
        if let Err(e) = self.stop().await {
            log::warn!("Ignoring stop failure during restart: {}", e);
        }
        self.start().await
    }
}

/// Wait for a spawned daemon to exit, killing it after `grace`
async fn wait_for_exit(mut child: Child, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                log::info!("Daemon exited ({})", status);
                return;
            }
            Ok(None) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
            }
            Ok(None) => {
                log::warn!("Daemon did not exit within {:?}, killing it", grace);
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
            Err(e) => {
                log::warn!("Failed to query daemon exit status: {}", e);
                return;
            }
        }
    }
}
