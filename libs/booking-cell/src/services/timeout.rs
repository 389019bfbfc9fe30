use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use shared_config::AppConfig;
use shared_store::MemoryStore;

use crate::services::booking::BookingService;

/// Periodic sweep that expires unpaid orders past the payment window,
/// reusing the cancel path so each expiry releases its slot and cascades
/// the waitlist exactly like a user cancellation.
pub struct PaymentTimeoutSweep {
    store: Arc<MemoryStore>,
    booking: Arc<BookingService>,
    config: AppConfig,
    is_shutdown: RwLock<bool>,
}

impl PaymentTimeoutSweep {
    pub fn new(store: Arc<MemoryStore>, booking: Arc<BookingService>, config: AppConfig) -> Self {
        Self { store, booking, config, is_shutdown: RwLock::new(false) }
    }

    /// One scan. Failures on individual orders are logged and skipped so a
    /// single bad row never stalls the sweep. Returns orders expired.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> u32 {
        let cutoff = Utc::now() - Duration::minutes(self.config.payment_timeout_minutes);
        let stale = self.store.stale_pending_orders(cutoff).await;

        let mut processed = 0u32;
        for order in stale {
            match self.booking.expire_unpaid(order.order_id).await {
                Ok(()) => processed += 1,
                Err(e) => warn!("failed to expire order {}: {}", order.order_id, e),
            }
        }

        if processed > 0 {
            info!("payment timeout sweep expired {} orders", processed);
        }
        processed
    }

    /// Periodic driver; runs until `shutdown` is called.
    pub async fn run(&self, interval_secs: u64) {
        let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if *self.is_shutdown.read().await {
                info!("payment timeout sweep shutting down");
                break;
            }
            self.run_once().await;
        }
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }
}
