use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lifeline_platform::{Platform, PlatformResult};
use lifeline_types::api::Session;
use lifeline_types::events::ChangeFilter;

/// A list snapshot plus how many refreshes produced it (0 = initial fetch).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub rows: Vec<T>,
    pub generation: u64,
}

/// A list kept current by re-fetching whenever the change feed reports a
/// change. Change payloads are never patched in; the fetch is the source of
/// truth.
///
/// Owns its subscription: `dispose` (or drop) closes it.
pub struct LiveList<T> {
    name: String,
    rx: watch::Receiver<Snapshot<T>>,
    task: JoinHandle<()>,
}

impl<T> LiveList<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Subscribe, fetch once, then refresh on every change. The subscription
    /// opens before the first fetch so nothing between the two is missed.
    pub async fn open<P, F, Fut>(
        platform: &P,
        session: &Session,
        name: &str,
        filter: ChangeFilter,
        fetch: F,
    ) -> PlatformResult<Self>
    where
        P: Platform,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = PlatformResult<Vec<T>>> + Send,
    {
        let mut subscription = platform.subscribe(session, name, filter).await?;
        let initial = fetch().await?;
        info!("Live list {} opened with {} rows", name, initial.len());

        let (tx, rx) = watch::channel(Snapshot { rows: initial, generation: 0 });
        let label = name.to_string();

        let task = tokio::spawn(async move {
            let mut generation = 0;
            while let Some(event) = subscription.next().await {
                // A burst of changes becomes one fetch.
                let mut coalesced = 1;
                while subscription.try_next().is_some() {
                    coalesced += 1;
                }
                debug!("{} {} change(s) on {} ({:?} first)", label, coalesced, event.table, event.kind);

                match fetch().await {
                    Ok(rows) => {
                        generation += 1;
                        if tx.send(Snapshot { rows, generation }).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Refreshing {} failed, keeping last snapshot: {}", label, e),
                }
            }
            debug!("Live list {} stopped", label);
        });

        Ok(Self { name: name.to_string(), rx, task })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.rx.borrow().rows.clone()
    }

    pub fn generation(&self) -> u64 {
        self.rx.borrow().generation
    }

    /// Wait for the next refresh. `None` once the list has stopped.
    pub async fn refreshed(&mut self) -> Option<Vec<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().rows.clone())
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot<T>> {
        self.rx.clone()
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl<T> Drop for LiveList<T> {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Live list {} disposed", self.name);
    }
}
