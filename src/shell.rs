//! Window layer seam
//!
//! The core never renders anything. It only tells the shell which window
//! should be visible and when the application should exit.

use std::sync::Arc;
use tokio::sync::Notify;

pub trait WindowShell: Send + Sync {
    fn show_splash(&self);
    fn show_main_window(&self);
    fn close_splash(&self);
    /// Ask the host to quit after the current operation
    fn request_exit(&self);
}

/// Shell without windows; logs transitions and exposes exit requests
#[derive(Debug, Clone, Default)]
pub struct HeadlessShell {
    exit: Arc<Notify>,
}

impl HeadlessShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once `request_exit` has been called
    pub async fn exit_requested(&self) {
        self.exit.notified().await
    }
}

impl WindowShell for HeadlessShell {
    fn show_splash(&self) {
        log::info!("Splash screen shown");
    }

    fn show_main_window(&self) {
        log::info!("Main window opened");
    }

    fn close_splash(&self) {
        log::info!("Splash screen closed");
    }

    fn request_exit(&self) {
        log::info!("Exit requested");
        self.exit.notify_one();
    }
}
