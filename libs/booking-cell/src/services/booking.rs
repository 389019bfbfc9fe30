use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    NotificationGateway, Order, OrderStatus, PaymentGateway, PaymentStatus, Schedule,
};
use shared_store::{LedgerError, MemoryStore, ScheduleSections, SlotLedger};
use waitlist_cell::WaitlistCoordinator;

use crate::error::BookingError;
use crate::models::{BookingConfirmation, CancelActor, CancellationOutcome, RescheduleOutcome};
use crate::services::pricing::PricingService;

/// Booking policy over the slot ledger: create, pay, cancel, reschedule.
///
/// Every capacity mutation pairs with exactly one order transition inside a
/// schedule section; releases always end in a waitlist cascade.
pub struct BookingService {
    store: Arc<MemoryStore>,
    ledger: Arc<SlotLedger>,
    sections: Arc<ScheduleSections>,
    waitlist: Arc<WaitlistCoordinator>,
    pricing: PricingService,
    payments: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationGateway>,
    config: AppConfig,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<MemoryStore>,
        ledger: Arc<SlotLedger>,
        sections: Arc<ScheduleSections>,
        waitlist: Arc<WaitlistCoordinator>,
        pricing: PricingService,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationGateway>,
        config: AppConfig,
    ) -> Self {
        Self { store, ledger, sections, waitlist, pricing, payments, notifier, config }
    }

    /// Book one slot. Fails closed with `CapacityExhausted` on a sold-out
    /// session; the caller routes the patient to the waitlist, never retries.
    pub async fn create(
        &self,
        actor_user_id: Uuid,
        patient_id: Uuid,
        schedule_id: Uuid,
        symptoms: Option<String>,
    ) -> Result<BookingConfirmation, BookingError> {
        let patient = self
            .store
            .patient(patient_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("patient {}", patient_id)))?;
        if !patient.is_owned_by(actor_user_id) {
            return Err(BookingError::Authorization { user_id: actor_user_id, patient_id });
        }

        let schedule = self
            .store
            .schedule(schedule_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", schedule_id)))?;
        self.validate_bookable(&schedule)?;

        let fee = self.pricing.consultation_fee(&schedule, patient.identity).await;

        let guard = self.sections.enter(schedule_id).await;

        let patient_orders = self.store.orders_for_patient(patient_id).await;
        if patient_orders.iter().any(|o| o.schedule_id == schedule_id && o.status.is_active()) {
            return Err(BookingError::DuplicateBooking { patient_id, schedule_id });
        }
        self.check_quota(&patient_orders, patient_id)?;

        match self.ledger.reserve(schedule_id).await {
            Ok(_) => {}
            Err(LedgerError::Exhausted(_)) => return Err(BookingError::CapacityExhausted(schedule_id)),
            Err(e) => return Err(e.into()),
        }

        let order = Order::new_pending(patient_id, schedule_id, fee, symptoms);
        if let Err(e) = self.store.insert_order(order.clone()).await {
            // The reservation rolls back with the failed order write.
            self.ledger.release(schedule_id).await?;
            return Err(e.into());
        }
        drop(guard);

        info!(
            "order {} created for patient {} on schedule {} (fee {:.2})",
            order.order_id, patient_id, schedule_id, fee
        );
        self.notify(
            patient.user_id,
            "booking.created",
            json!({
                "orderId": order.order_id,
                "scheduleId": schedule_id,
                "payAmount": fee,
                "payWithinMinutes": self.config.payment_timeout_minutes,
            }),
        )
        .await;

        Ok(BookingConfirmation {
            order_id: order.order_id,
            need_pay: fee > 0.0,
            pay_amount: fee,
            status: order.status,
        })
    }

    /// Settle an unpaid order. Capacity was reserved at creation, so the
    /// ledger is never touched here.
    pub async fn pay(&self, order_id: Uuid) -> Result<Order, BookingError> {
        let mut order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("order {}", order_id)))?;

        if order.status != OrderStatus::Pending || order.payment_status != PaymentStatus::Pending {
            return Err(BookingError::InvalidStatusTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Confirmed,
            });
        }

        self.payments.charge(order_id, order.price).await?;

        order.status = OrderStatus::Confirmed;
        order.payment_status = PaymentStatus::Paid;
        order.touch(Utc::now());
        self.store.update_order(order.clone()).await?;

        info!("order {} confirmed and paid ({:.2})", order_id, order.price);
        if let Some(patient) = self.store.patient(order.patient_id).await {
            self.notify(
                patient.user_id,
                "booking.confirmed",
                json!({ "orderId": order_id, "scheduleId": order.schedule_id }),
            )
            .await;
        }
        Ok(order)
    }

    /// Cancel an active order, refund if paid, free the slot, cascade.
    pub async fn cancel(
        &self,
        order_id: Uuid,
        actor: CancelActor,
    ) -> Result<CancellationOutcome, BookingError> {
        let order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("order {}", order_id)))?;

        if let CancelActor::User(user_id) = actor {
            let patient = self
                .store
                .patient(order.patient_id)
                .await
                .ok_or_else(|| BookingError::NotFound(format!("patient {}", order.patient_id)))?;
            if !patient.is_owned_by(user_id) {
                return Err(BookingError::Authorization { user_id, patient_id: order.patient_id });
            }
        }

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed) {
            return Err(BookingError::InvalidStatusTransition {
                order_id,
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        if actor != CancelActor::System {
            let schedule = self
                .store
                .schedule(order.schedule_id)
                .await
                .ok_or_else(|| BookingError::NotFound(format!("schedule {}", order.schedule_id)))?;
            let cutoff = schedule.starts_at() - Duration::hours(self.config.cancel_cutoff_hours);
            if Utc::now() >= cutoff {
                return Err(BookingError::CancelCutoffPassed {
                    order_id,
                    cutoff_hours: self.config.cancel_cutoff_hours,
                });
            }
        }

        let refund_amount = self.release_with_transition(order_id, OrderStatus::Cancelled).await?;
        Ok(CancellationOutcome { success: true, refund_amount })
    }

    /// Move an active order between interchangeable sessions. The new slot is
    /// reserved before the old one is released, so the order never holds
    /// capacity on neither schedule.
    pub async fn reschedule(
        &self,
        actor_user_id: Uuid,
        order_id: Uuid,
        new_schedule_id: Uuid,
    ) -> Result<RescheduleOutcome, BookingError> {
        let order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("order {}", order_id)))?;

        let patient = self
            .store
            .patient(order.patient_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("patient {}", order.patient_id)))?;
        if !patient.is_owned_by(actor_user_id) {
            return Err(BookingError::Authorization {
                user_id: actor_user_id,
                patient_id: order.patient_id,
            });
        }

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed) {
            return Err(BookingError::Validation(
                "only pending or confirmed orders can be rescheduled".to_string(),
            ));
        }
        if order.schedule_id == new_schedule_id {
            return Err(BookingError::Validation("order already on this session".to_string()));
        }

        let old_schedule = self
            .store
            .schedule(order.schedule_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", order.schedule_id)))?;
        let new_schedule = self
            .store
            .schedule(new_schedule_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", new_schedule_id)))?;
        self.validate_bookable(&new_schedule)?;

        if !old_schedule.is_reschedule_peer(&new_schedule) {
            return Err(BookingError::ScheduleMismatch(
                "reschedule requires the same doctor, clinic and slot category".to_string(),
            ));
        }

        let new_fee = self.pricing.consultation_fee(&new_schedule, patient.identity).await;
        let was_paid = order.payment_status == PaymentStatus::Paid;
        if was_paid && self.pricing.price_diff(new_fee, order.price) != 0.0 {
            return Err(BookingError::PriceMismatch { current: order.price, target: new_fee });
        }

        // Take the new slot first.
        {
            let _guard = self.sections.enter(new_schedule_id).await;
            match self.ledger.reserve(new_schedule_id).await {
                Ok(_) => {}
                Err(LedgerError::Exhausted(_)) => {
                    return Err(BookingError::CapacityExhausted(new_schedule_id))
                }
                Err(e) => return Err(e.into()),
            }
        }

        let old_schedule_id = order.schedule_id;
        let price_diff = self.pricing.price_diff(new_fee, order.price);
        let moved = {
            let _guard = self.sections.enter(old_schedule_id).await;

            // Re-read: a cancel or timeout may have won the race.
            let current = self.store.order(order_id).await;
            let Some(mut current) =
                current.filter(|o| matches!(o.status, OrderStatus::Pending | OrderStatus::Confirmed))
            else {
                self.ledger.release(new_schedule_id).await?;
                return Err(BookingError::Validation(
                    "order changed state during reschedule".to_string(),
                ));
            };

            current.schedule_id = new_schedule_id;
            if !was_paid {
                current.price = new_fee;
            }
            current.touch(Utc::now());
            if let Err(e) = self.store.update_order(current.clone()).await {
                self.ledger.release(new_schedule_id).await?;
                return Err(e.into());
            }
            self.ledger.release(old_schedule_id).await?;
            current
        };

        let promoted = self.waitlist.cascade_convert(old_schedule_id).await?;
        debug!(
            "order {} moved {} -> {}, cascade promoted {}",
            order_id, old_schedule_id, new_schedule_id, promoted
        );

        Ok(RescheduleOutcome { order_id, price_diff, status: moved.status })
    }

    /// Timeout path for the sweep: same release-and-cascade as a cancel, but
    /// the order terminates as TIMEOUT/FAILED.
    pub(crate) async fn expire_unpaid(&self, order_id: Uuid) -> Result<(), BookingError> {
        self.release_with_transition(order_id, OrderStatus::Timeout).await?;
        Ok(())
    }

    // The one place a slot release pairs with an order transition. Re-reads
    // the order inside the schedule section so a concurrent cancel cannot
    // release twice.
    async fn release_with_transition(
        &self,
        order_id: Uuid,
        terminal: OrderStatus,
    ) -> Result<Option<f64>, BookingError> {
        let order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| BookingError::NotFound(format!("order {}", order_id)))?;
        let schedule_id = order.schedule_id;

        let refund_amount;
        {
            let _guard = self.sections.enter(schedule_id).await;

            let mut order = self
                .store
                .order(order_id)
                .await
                .ok_or_else(|| BookingError::NotFound(format!("order {}", order_id)))?;
            if !order.status.can_transition_to(&terminal) {
                return Err(BookingError::InvalidStatusTransition {
                    order_id,
                    from: order.status,
                    to: terminal,
                });
            }

            let was_paid = order.payment_status == PaymentStatus::Paid;
            refund_amount = if was_paid {
                self.payments.refund(order_id, order.price).await?;
                Some(order.price)
            } else {
                None
            };

            // Release first so a failure aborts before any order write;
            // losing capacity is the one unrecoverable mistake.
            self.ledger.release(schedule_id).await?;

            order.status = terminal;
            order.payment_status = match (was_paid, terminal) {
                (true, _) => PaymentStatus::Refunded,
                (false, OrderStatus::Timeout) => PaymentStatus::Failed,
                (false, _) => PaymentStatus::Cancelled,
            };
            order.touch(Utc::now());
            if let Err(e) = self.store.update_order(order.clone()).await {
                // Take the unit back so ledger and orders stay consistent.
                self.ledger.reserve(schedule_id).await?;
                return Err(e.into());
            }
        }

        let promoted = self.waitlist.cascade_convert(schedule_id).await?;
        info!(
            "order {} -> {:?}, slot released on schedule {}, {} promoted",
            order_id, terminal, schedule_id, promoted
        );

        if let Some(patient) = self.store.patient(order.patient_id).await {
            let template = match terminal {
                OrderStatus::Timeout => "booking.timeout",
                _ => "booking.cancelled",
            };
            self.notify(
                patient.user_id,
                template,
                json!({ "orderId": order_id, "scheduleId": schedule_id, "refund": refund_amount }),
            )
            .await;
        }

        Ok(refund_amount)
    }

    fn validate_bookable(&self, schedule: &Schedule) -> Result<(), BookingError> {
        if !schedule.is_bookable() {
            return Err(BookingError::ScheduleUnavailable(schedule.schedule_id));
        }
        let today = Utc::now().date_naive();
        if schedule.date < today {
            return Err(BookingError::Validation("session date has passed".to_string()));
        }
        if schedule.date > today + Duration::days(self.config.max_advance_days) {
            return Err(BookingError::Validation(format!(
                "sessions open at most {} days ahead",
                self.config.max_advance_days
            )));
        }
        Ok(())
    }

    fn check_quota(&self, patient_orders: &[Order], patient_id: Uuid) -> Result<(), BookingError> {
        let window_start = Utc::now() - Duration::days(self.config.quota_window_days);
        let active_in_window = patient_orders
            .iter()
            .filter(|o| o.status.is_active() && o.created_at >= window_start)
            .count();
        if active_in_window >= self.config.quota_max_active {
            return Err(BookingError::QuotaExceeded(patient_id));
        }
        Ok(())
    }

    async fn notify(&self, target_user: Uuid, template_key: &str, fields: serde_json::Value) {
        if let Err(e) = self.notifier.send(target_user, template_key, fields).await {
            warn!("notification {} failed: {}", template_key, e);
        }
    }
}
