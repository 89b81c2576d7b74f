//! UNIGRID Wallet core
//!
//! Supervises the local full-node daemon, gates the splash screen on its
//! synchronization, keeps the wallet itself up to date and exposes the
//! interactive wallet actions. Rendering is left to a [`shell::WindowShell`]
//! implementation that listens on the [`events::SignalBus`].

pub mod app;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod logging;
pub mod settings;
pub mod shell;
pub mod sync;
pub mod update;
pub mod wallet;

use app::{App, AppContext};
use config::AppConfig;
use events::SignalBus;
use shell::HeadlessShell;

/// Run the wallet headless until Ctrl-C or an exit request
pub fn run() -> anyhow::Result<()> {
    let signals = SignalBus::default();

    if let Err(e) = logging::init_logger(AppConfig::log_dir(), signals.clone()) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    log::info!("UNIGRID Wallet {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load();
    if !AppConfig::config_path().exists() {
        if let Err(e) = config.save() {
            log::warn!("Could not write default config: {}", e);
        }
    }
    config.apply_env()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let ctx = AppContext::new(config, signals)?;
        let shell = HeadlessShell::new();
        let exit = shell.clone();
        let app = App::new(ctx, shell);

        app.run(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        log::warn!("Ctrl-C handler failed: {}", e);
                    }
                    log::info!("Interrupted");
                }
                _ = exit.exit_requested() => {}
            }
        })
        .await;

        Ok::<(), anyhow::Error>(())
    })
}
