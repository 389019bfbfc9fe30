use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{NotificationGateway, Order, OrderStatus};
use shared_store::{LedgerError, MemoryStore, ScheduleSections, SlotLedger};

use crate::error::WaitlistError;
use crate::models::{WaitlistEntry, WaitlistTicket};
use crate::services::queue::WaitlistQueue;

/// FIFO arbiter for exhausted schedules.
///
/// Joins are accepted only once capacity is gone; every release cascades
/// through `cascade_convert`, promoting heads until the queue drains, the
/// freed capacity is used up, or the per-invocation bound is hit.
pub struct WaitlistCoordinator {
    store: Arc<MemoryStore>,
    ledger: Arc<SlotLedger>,
    sections: Arc<ScheduleSections>,
    queue: Arc<dyn WaitlistQueue>,
    notifier: Arc<dyn NotificationGateway>,
    config: AppConfig,
}

impl WaitlistCoordinator {
    pub fn new(
        store: Arc<MemoryStore>,
        ledger: Arc<SlotLedger>,
        sections: Arc<ScheduleSections>,
        queue: Arc<dyn WaitlistQueue>,
        notifier: Arc<dyn NotificationGateway>,
        config: AppConfig,
    ) -> Self {
        Self { store, ledger, sections, queue, notifier, config }
    }

    /// Join the waitlist of an exhausted schedule. Returns the new claim and
    /// its 1-based queue position.
    pub async fn join(
        &self,
        actor_user_id: Uuid,
        patient_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<WaitlistTicket, WaitlistError> {
        let patient = self
            .store
            .patient(patient_id)
            .await
            .ok_or_else(|| WaitlistError::NotFound(format!("patient {}", patient_id)))?;
        if !patient.is_owned_by(actor_user_id) {
            return Err(WaitlistError::Authorization { user_id: actor_user_id, patient_id });
        }

        let _guard = self.sections.enter(schedule_id).await;

        let schedule = self
            .store
            .schedule(schedule_id)
            .await
            .ok_or_else(|| WaitlistError::NotFound(format!("schedule {}", schedule_id)))?;

        // Waitlisting only applies once the session is sold out.
        if schedule.remaining_slots > 0 {
            return Err(WaitlistError::NotExhausted(schedule_id));
        }

        let patient_orders = self.store.orders_for_patient(patient_id).await;
        if patient_orders.iter().any(|o| o.schedule_id == schedule_id && o.status.is_active()) {
            return Err(WaitlistError::DuplicateClaim { patient_id, schedule_id });
        }

        let window_start = Utc::now() - Duration::days(self.config.quota_window_days);
        let active_in_window = patient_orders
            .iter()
            .filter(|o| o.status.is_active() && o.created_at >= window_start)
            .count();
        if active_in_window >= self.config.quota_max_active {
            return Err(WaitlistError::QuotaExceeded(patient_id));
        }

        let mut order = Order::new_waitlist(patient_id, schedule_id, schedule.price, None, 0);
        self.store.insert_order(order.clone()).await?;

        let entry = WaitlistEntry {
            order_id: order.order_id,
            patient_id,
            joined_at: order.created_at,
        };
        let position = match self.queue.push_back(schedule_id, entry).await {
            Ok(position) => position,
            Err(e) => {
                // Never leave a durable claim the queue does not know about.
                self.store.remove_order(order.order_id).await?;
                return Err(e);
            }
        };

        order.waitlist_position = Some(position);
        order.touch(Utc::now());
        self.store.update_order(order.clone()).await?;

        info!(
            "patient {} joined waitlist of schedule {} at position {}",
            patient_id, schedule_id, position
        );
        Ok(WaitlistTicket { order_id: order.order_id, queue_position: position })
    }

    /// Promotion loop run after every capacity release. Returns the number of
    /// claims promoted to PENDING.
    pub async fn cascade_convert(&self, schedule_id: Uuid) -> Result<u32, WaitlistError> {
        let mut promoted = 0u32;

        for _ in 0..self.config.cascade_limit {
            let guard = self.sections.enter(schedule_id).await;

            let Some(schedule) = self.store.schedule(schedule_id).await else {
                break;
            };
            if schedule.remaining_slots == 0 {
                break;
            }

            let Some(entry) = self.queue.pop_front(schedule_id).await? else {
                break;
            };

            // The head may have been cancelled or converted since it queued.
            let order = self.store.order(entry.order_id).await;
            let Some(mut order) = order.filter(|o| o.status == OrderStatus::Waitlist) else {
                debug!("discarding stale waitlist entry for order {}", entry.order_id);
                continue;
            };

            match self.ledger.reserve(schedule_id).await {
                Ok(remaining) => {
                    let now = Utc::now();
                    order.promote_from_waitlist(now);
                    if let Err(e) = self.store.update_order(order.clone()).await {
                        // Hand the unit back rather than losing it.
                        self.ledger.release(schedule_id).await?;
                        self.queue.push_front(schedule_id, entry).await?;
                        return Err(e.into());
                    }
                    promoted += 1;
                    info!(
                        "promoted order {} on schedule {}, {} slots remaining",
                        order.order_id, schedule_id, remaining
                    );

                    // Notify outside the schedule section.
                    drop(guard);
                    self.notify_promoted(&order).await;
                }
                Err(LedgerError::Exhausted(_)) => {
                    // Lost the race for the freed unit; restore the head.
                    self.queue.push_front(schedule_id, entry).await?;
                    break;
                }
                Err(e) => {
                    self.queue.push_front(schedule_id, entry).await?;
                    return Err(e.into());
                }
            }
        }

        Ok(promoted)
    }

    /// Withdraw a waitlisted claim. No capacity effect.
    pub async fn leave(&self, order_id: Uuid) -> Result<(), WaitlistError> {
        let order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| WaitlistError::NotFound(format!("order {}", order_id)))?;

        let _guard = self.sections.enter(order.schedule_id).await;

        // Re-read inside the section: a cascade may have promoted this claim.
        let mut order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| WaitlistError::NotFound(format!("order {}", order_id)))?;
        if order.status != OrderStatus::Waitlist {
            return Err(WaitlistError::InvalidStatusTransition { order_id, from: order.status });
        }

        order.status = OrderStatus::Cancelled;
        order.payment_status = shared_models::PaymentStatus::Cancelled;
        order.waitlist_position = None;
        order.touch(Utc::now());
        self.store.update_order(order.clone()).await?;
        self.queue.remove(order.schedule_id, order_id).await?;

        info!("order {} left the waitlist of schedule {}", order_id, order.schedule_id);
        Ok(())
    }

    /// Current 1-based position of a patient's claim. Served from the
    /// ephemeral queue; falls back to the durable mirror when the queue is
    /// unreachable.
    pub async fn queue_position(
        &self,
        schedule_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<u32>, WaitlistError> {
        match self.queue.entries(schedule_id).await {
            Ok(entries) => Ok(entries
                .iter()
                .position(|e| e.patient_id == patient_id)
                .map(|idx| idx as u32 + 1)),
            Err(WaitlistError::QueueUnavailable(reason)) => {
                warn!("ephemeral queue unreachable ({}), serving durable mirror", reason);
                let orders = self.store.orders_for_schedule(schedule_id).await;
                Ok(orders
                    .iter()
                    .find(|o| o.patient_id == patient_id && o.status == OrderStatus::Waitlist)
                    .and_then(|o| o.waitlist_position))
            }
            Err(e) => Err(e),
        }
    }

    async fn notify_promoted(&self, order: &Order) {
        let Some(patient) = self.store.patient(order.patient_id).await else {
            return;
        };
        let fields = json!({
            "orderId": order.order_id,
            "scheduleId": order.schedule_id,
            "payWithinMinutes": self.config.payment_timeout_minutes,
        });
        if let Err(e) = self.notifier.send(patient.user_id, "waitlist.promoted", fields).await {
            warn!("promotion notification for order {} failed: {}", order.order_id, e);
        }
    }
}
