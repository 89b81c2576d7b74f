//! Process-local signal bus
//!
//! The UI layer subscribes here instead of being called directly. Every
//! signal carries the channel name the UI listens on and a JSON-friendly
//! payload.

use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_SIGNAL_LIMIT: usize = 1024;

/// How the splash progress bar should render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    Indeterminate,
    Determinate,
}

/// Busy spinner state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyState {
    Working,
    Completed,
}

/// Splash progress update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub mode: ProgressMode,
    pub text: String,
    /// Fraction in `0.0..=1.0`, only set in determinate mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
}

/// Payload of the mandatory-update modal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningData {
    pub title: String,
    pub message: String,
    pub current_version: String,
    pub new_version: String,
    pub skips_remaining: u32,
}

/// A string-tagged message for the UI layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum Signal {
    Progress(Progress),
    State(BusyState),
    WalletUpdateAvailable { version: String },
    WarningData(WarningData),
    WalletRestart,
    OpenAsteroids,
    ReloadAddresses,
    TriggerInfoUpdate,
    Notification(String),
    UpdateStatus(crate::update::UpdateState),
}

impl Signal {
    pub fn indeterminate(text: impl Into<String>) -> Self {
        Signal::Progress(Progress {
            mode: ProgressMode::Indeterminate,
            text: text.into(),
            value: None,
        })
    }

    pub fn determinate(text: impl Into<String>, value: f32) -> Self {
        Signal::Progress(Progress {
            mode: ProgressMode::Determinate,
            text: text.into(),
            value: Some(value.clamp(0.0, 1.0)),
        })
    }

    /// Channel name as seen by the UI
    pub fn channel(&self) -> &'static str {
        match self {
            Signal::Progress(_) => "progress",
            Signal::State(_) => "state",
            Signal::WalletUpdateAvailable { .. } => "wallet-update-available",
            Signal::WarningData(_) => "warning-data",
            Signal::WalletRestart => "wallet-restart",
            Signal::OpenAsteroids => "open-asteroids",
            Signal::ReloadAddresses => "reload-addresses",
            Signal::TriggerInfoUpdate => "trigger-info-update",
            Signal::Notification(_) => "notification",
            Signal::UpdateStatus(_) => "update-status",
        }
    }
}

/// Broadcasts signals to every subscriber.
///
/// Late subscribers do not receive past signals; emitting without
/// subscribers is not an error.
#[derive(Debug, Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    pub fn emit(&self, signal: Signal) {
        log::debug!("signal {}", signal.channel());
        let _ = self.sender.send(signal);
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNAL_LIMIT)
    }
}

/// Drain everything currently buffered in a receiver
#[cfg(test)]
pub(crate) fn drain(rx: &mut broadcast::Receiver<Signal>) -> Vec<Signal> {
    let mut out = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        out.push(signal);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_wire_format() {
        let json = serde_json::to_value(Signal::indeterminate("Initializing UNIGRID daemon...")).unwrap();
        assert_eq!(json["channel"], "progress");
        assert_eq!(json["payload"]["mode"], "indeterminate");
        assert_eq!(json["payload"]["text"], "Initializing UNIGRID daemon...");
        assert!(json["payload"].get("value").is_none());

        let json = serde_json::to_value(Signal::State(BusyState::Working)).unwrap();
        assert_eq!(json["channel"], "state");
        assert_eq!(json["payload"], "working");

        let json = serde_json::to_value(Signal::WalletRestart).unwrap();
        assert_eq!(json["channel"], "wallet-restart");
    }

    #[test]
    fn test_channel_matches_serialized_tag() {
        for signal in [
            Signal::ReloadAddresses,
            Signal::TriggerInfoUpdate,
            Signal::OpenAsteroids,
            Signal::WalletUpdateAvailable { version: "2.0.15".into() },
            Signal::Notification("hi".into()),
        ] {
            let json = serde_json::to_value(&signal).unwrap();
            assert_eq!(json["channel"], signal.channel());
        }
    }

    #[test]
    fn test_determinate_is_clamped() {
        match Signal::determinate("Synchronizing", 1.7) {
            Signal::Progress(p) => assert_eq!(p.value, Some(1.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = SignalBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(Signal::ReloadAddresses);

        assert_eq!(rx1.recv().await.unwrap(), Signal::ReloadAddresses);
        assert_eq!(rx2.recv().await.unwrap(), Signal::ReloadAddresses);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = SignalBus::new(4);
        bus.emit(Signal::TriggerInfoUpdate);
    }
}
