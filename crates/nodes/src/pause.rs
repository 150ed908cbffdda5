//! Pause gate shared by the scheduler and the retry driver.

use std::sync::Arc;

use tokio::sync::watch;

/// A resumable barrier. While paused, [`PauseGate::wait_until_resumed`] blocks;
/// `resume` wakes every waiter at once.
///
/// Clones share the same gate.
#[derive(Debug, Clone)]
pub struct PauseGate {
    paused: Arc<watch::Sender<bool>>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Returns immediately when not paused.
    pub async fn wait_until_resumed(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
