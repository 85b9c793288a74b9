use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use lifeline_types::events::ChangeEvent;

/// Buffered events per subscription before the feed starts dropping.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 256;

/// A live change-feed subscription.
///
/// Events arrive through a channel fed by a background task; dropping the
/// subscription aborts that task, which is what unsubscribes.
pub struct Subscription {
    name: String,
    rx: mpsc::Receiver<ChangeEvent>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(name: &str, rx: mpsc::Receiver<ChangeEvent>, task: JoinHandle<()>) -> Self {
        debug!("Subscription {} opened", name);
        Self {
            name: name.to_string(),
            rx,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next change. `None` once the feed has closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// A change that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Subscription {} closed", self.name);
    }
}
