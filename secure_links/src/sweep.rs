use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::registry::MappingStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodic eviction of non-live mappings. Safety net only: expired and
/// exhausted links are already dropped lazily when a resolve touches them,
/// this bounds growth from links that are never resolved again.
pub struct Sweeper {
    store: Arc<dyn MappingStore>,
    interval: Duration,
    shutdown_rx: watch::Receiver<()>,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn MappingStore>,
        interval: Duration,
        shutdown_rx: watch::Receiver<()>,
    ) -> Self {
        Self {
            store,
            interval,
            shutdown_rx,
        }
    }

    pub async fn start(&mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick fires immediately; skip it so a fresh registry is
        // not swept at startup
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.store.sweep(Utc::now()).await;
                    if removed > 0 {
                        info!(removed, "swept non-live secure link mappings");
                    } else {
                        debug!("sweep pass found nothing to remove");
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    info!("shutdown signal received, stopping secure link sweeper");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::registry::{InMemoryMappingStore, SecureUrlMapping};

    fn mapping(id: &str, expires_in_ms: Option<i64>) -> SecureUrlMapping {
        let now = Utc::now();
        SecureUrlMapping {
            id: id.to_string(),
            original_url: format!("https://origin/{id}"),
            bucket_name: "photos".to_string(),
            object_key: format!("{id}.png"),
            created_at: now,
            expires_at: expires_in_ms.map(|ms| now + chrono::Duration::milliseconds(ms)),
            max_accesses: None,
            access_count: 0,
        }
    }

    #[tokio::test]
    async fn test_sweeper_runs_until_shutdown() {
        let store = Arc::new(InMemoryMappingStore::new());
        store.insert(mapping("dead", Some(-1000))).await;
        store.insert(mapping("live", Some(60_000))).await;
        store.insert(mapping("forever", None)).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let mut sweeper = Sweeper::new(store.clone(), Duration::from_millis(10), shutdown_rx);
        let handle = tokio::spawn(async move { sweeper.start().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let remaining = store.list().await;
        let mut ids: Vec<String> = remaining.into_iter().map(|m| m.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["forever", "live"]);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
