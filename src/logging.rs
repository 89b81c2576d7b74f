//! Logging configuration for the UNIGRID Wallet
//!
//! Uses log4rs with appenders:
//! 1. ConsoleAppender - stdout output
//! 2. RollingFileAppender - log files with rotation
//! 3. SignalAppender - forwards records logged on [`NOTIFY_TARGET`] to the
//!    UI as notifications

use crate::events::{Signal, SignalBus};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::PathBuf;

/// Log target for messages the user should see as a desktop notification.
/// Everything else only reaches the console and the log file.
pub const NOTIFY_TARGET: &str = "unigrid_wallet::notify";

/// Custom log4rs appender that turns [`NOTIFY_TARGET`] records into
/// `notification` signals
#[derive(Debug)]
pub struct SignalAppender {
    signals: SignalBus,
}

impl SignalAppender {
    pub fn new(signals: SignalBus) -> Self {
        Self { signals }
    }
}

impl log4rs::append::Append for SignalAppender {
    fn append(&self, record: &log::Record) -> anyhow::Result<()> {
        if record.target() != NOTIFY_TARGET {
            return Ok(());
        }

        self.signals
            .emit(Signal::Notification(format!("{}", record.args())));
        Ok(())
    }

    fn flush(&self) {}
}

/// Initialize log4rs with console, rolling file and signal appenders
///
/// # Log File Configuration
/// - File: `{log_dir}/unigrid.1.log`
/// - Max size: 20 MB per file
/// - Max count: 10 files (rotation)
/// - Pattern: `{timestamp} [{level}] {target} - {message}`
pub fn init_logger(
    log_dir: PathBuf,
    signals: SignalBus,
) -> Result<log4rs::Handle, Box<dyn std::error::Error>> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build();

    std::fs::create_dir_all(&log_dir)?;

    let log_file = log_dir.join("unigrid.1.log");
    let log_pattern = log_dir.join("unigrid.{}.log");
    let log_pattern = log_pattern
        .to_str()
        .ok_or("log directory is not valid UTF-8")?;

    // Rolling file appender (20MB per file, 10 files max)
    let roller = FixedWindowRoller::builder().base(1).build(log_pattern, 10)?;
    let trigger = SizeTrigger::new(20 * 1024 * 1024);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(log_file, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .appender(Appender::builder().build("signals", Box::new(SignalAppender::new(signals))))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .appender("signals")
                .build(LevelFilter::Info),
        )?;

    Ok(log4rs::init_config(config)?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::drain;
    use log4rs::append::Append;

    fn emit(appender: &SignalAppender, target: &str, level: log::Level, text: &str) {
        appender
            .append(
                &log::Record::builder()
                    .target(target)
                    .level(level)
                    .args(format_args!("{}", text))
                    .build(),
            )
            .unwrap();
    }

    #[test]
    fn test_forwards_notify_target_only() {
        let bus = SignalBus::default();
        let mut rx = bus.subscribe();
        let appender = SignalAppender::new(bus);

        // Background failures stay in the log
        emit(&appender, "unigrid_wallet_lib::update::coordinator", log::Level::Warn, "Update check failed");
        emit(&appender, "unigrid_wallet_lib::sync", log::Level::Error, "Sync stage loading failed");
        emit(&appender, "unigrid_wallet_lib::wallet", log::Level::Error, "RPC error -4: backup failed");
        emit(&appender, "reqwest::connect", log::Level::Error, "connection reset");

        emit(&appender, NOTIFY_TARGET, log::Level::Error, "Update failed: installer missing");

        assert_eq!(
            drain(&mut rx),
            vec![Signal::Notification("Update failed: installer missing".into())]
        );
    }
}
