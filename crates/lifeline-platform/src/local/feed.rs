use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use lifeline_types::events::{ChangeEvent, ChangeFilter, ChangeKind};

use crate::subscription::{SUBSCRIPTION_BUFFER, Subscription};

/// Fans row changes out to every open subscription.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish a change. Nobody listening is fine.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to changes matching `filter`. Must be called inside a tokio
    /// runtime: a forwarding task applies the filter.
    pub fn subscribe(&self, name: &str, filter: ChangeFilter) -> Subscription {
        let mut broadcast_rx = self.tx.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let label = name.to_string();

        let task = tokio::spawn(async move {
            loop {
                let event = match broadcast_rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Subscription {} lagged by {} changes, forcing a resync", label, n);
                        // Missed changes are unknown; an empty update still makes
                        // consumers re-fetch.
                        ChangeEvent {
                            table: filter.table,
                            kind: ChangeKind::Update,
                            record: serde_json::Value::Null,
                            old_record: None,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let resync = event.record.is_null() && event.old_record.is_none();
                if !resync && !filter.matches(&event) {
                    continue;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Subscription::new(name, rx, task)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
