use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

use shared_models::OrderStatus;
use shared_store::MemoryStore;

use crate::error::WaitlistError;
use crate::services::queue::WaitlistQueue;

/// One-directional reconciliation: ephemeral queue positions are upserted
/// into `Order.waitlist_position` so a queue outage degrades to slightly
/// stale reads instead of losing the ordering fact.
pub struct WaitlistSyncJob {
    store: Arc<MemoryStore>,
    queue: Arc<dyn WaitlistQueue>,
    is_shutdown: RwLock<bool>,
}

impl WaitlistSyncJob {
    pub fn new(store: Arc<MemoryStore>, queue: Arc<dyn WaitlistQueue>) -> Self {
        Self { store, queue, is_shutdown: RwLock::new(false) }
    }

    /// Single reconciliation pass. Idempotent: positions already in sync are
    /// left untouched. Returns the number of orders updated.
    pub async fn run_once(&self) -> Result<u32, WaitlistError> {
        let mut updated = 0u32;

        for schedule_id in self.queue.queued_schedules().await? {
            let entries = self.queue.entries(schedule_id).await?;
            for (idx, entry) in entries.iter().enumerate() {
                let position = idx as u32 + 1;
                let Some(mut order) = self.store.order(entry.order_id).await else {
                    debug!("queued order {} missing from durable store", entry.order_id);
                    continue;
                };
                if order.status != OrderStatus::Waitlist {
                    continue;
                }
                if order.waitlist_position == Some(position) {
                    continue;
                }
                order.waitlist_position = Some(position);
                order.touch(Utc::now());
                self.store.update_order(order).await?;
                updated += 1;
            }
        }

        if updated > 0 {
            info!("waitlist reconciliation updated {} orders", updated);
        }
        Ok(updated)
    }

    /// Periodic driver; runs until `shutdown` is called.
    #[instrument(skip(self))]
    pub async fn run(&self, interval_secs: u64) {
        let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if *self.is_shutdown.read().await {
                info!("waitlist sync job shutting down");
                break;
            }
            if let Err(e) = self.run_once().await {
                error!("waitlist reconciliation pass failed: {}", e);
            }
        }
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }
}
