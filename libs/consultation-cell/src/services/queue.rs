use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Order, OrderStatus};
use shared_store::{MemoryStore, ScheduleSections};

use crate::error::ConsultationError;
use crate::models::{PassOutcome, PassedPatient, QueueEntry, QueueSnapshot, QueueStats, WaitlistRow};

/// Same-day call sequence over one schedule's CONFIRMED orders.
///
/// Arbitration runs under the schedule section, so "who is calling" is
/// single-valued: `call_next` refuses while a patient is already called, and
/// `pass`/`complete` re-read the order inside the section before mutating.
pub struct ConsultationQueueService {
    store: Arc<MemoryStore>,
    sections: Arc<ScheduleSections>,
    config: AppConfig,
}

/// Call order: priority first (negative jumps the queue), then pass count so
/// passed-over patients sort behind fresh arrivals, then arrival time.
fn call_order(a: &Order, b: &Order) -> Ordering {
    (a.priority, a.pass_count, a.created_at).cmp(&(b.priority, b.pass_count, b.created_at))
}

impl ConsultationQueueService {
    pub fn new(store: Arc<MemoryStore>, sections: Arc<ScheduleSections>, config: AppConfig) -> Self {
        Self { store, sections, config }
    }

    /// Live view of the queue: stats, the called patient, the next patient,
    /// the waiting list in call order and the session's waitlist.
    pub async fn get_queue(&self, schedule_id: Uuid) -> Result<QueueSnapshot, ConsultationError> {
        if self.store.schedule(schedule_id).await.is_none() {
            return Err(ConsultationError::NotFound(format!("schedule {}", schedule_id)));
        }

        let orders = self.store.orders_for_schedule(schedule_id).await;

        let mut confirmed: Vec<Order> =
            orders.iter().filter(|o| o.status == OrderStatus::Confirmed).cloned().collect();
        confirmed.sort_by(call_order);

        let mut waitlisted: Vec<Order> =
            orders.iter().filter(|o| o.status == OrderStatus::Waitlist).cloned().collect();
        waitlisted.sort_by_key(|o| o.created_at);

        let completed_count =
            orders.iter().filter(|o| o.status == OrderStatus::Completed).count() as u32;

        let mut current_patient = None;
        let mut waiting = Vec::new();
        for (idx, order) in confirmed.iter().enumerate() {
            let entry = QueueEntry::from_order(
                order,
                self.patient_name(order.patient_id).await,
                format!("A{:03}", idx + 1),
            );
            if order.is_calling {
                current_patient = Some(entry);
            } else {
                waiting.push(entry);
            }
        }

        let mut waitlist = Vec::new();
        for order in &waitlisted {
            waitlist.push(WaitlistRow {
                order_id: order.order_id,
                patient_id: order.patient_id,
                patient_name: self.patient_name(order.patient_id).await,
                waitlist_position: order.waitlist_position,
                joined_at: order.created_at,
            });
        }

        let stats = QueueStats {
            total_orders: confirmed.len() as u32 + waitlisted.len() as u32 + completed_count,
            confirmed_count: confirmed.len() as u32,
            waitlist_count: waitlisted.len() as u32,
            completed_count,
            waiting_count: waiting.len() as u32,
            passed_count: confirmed.iter().filter(|o| o.pass_count > 0).count() as u32,
        };

        Ok(QueueSnapshot {
            schedule_id,
            stats,
            next_patient: waiting.first().cloned(),
            current_patient,
            waiting,
            waitlist,
        })
    }

    /// Call the head of the waiting queue. Refuses while another patient is
    /// already being called; returns `None` on an empty queue.
    pub async fn call_next(&self, schedule_id: Uuid) -> Result<Option<QueueEntry>, ConsultationError> {
        if self.store.schedule(schedule_id).await.is_none() {
            return Err(ConsultationError::NotFound(format!("schedule {}", schedule_id)));
        }

        let _guard = self.sections.enter(schedule_id).await;

        let orders = self.store.orders_for_schedule(schedule_id).await;
        if orders.iter().any(|o| o.status == OrderStatus::Confirmed && o.is_calling) {
            return Err(ConsultationError::Conflict(
                "a patient is already being called for this schedule".to_string(),
            ));
        }

        let mut waiting: Vec<Order> =
            orders.into_iter().filter(|o| o.status == OrderStatus::Confirmed).collect();
        waiting.sort_by(call_order);

        let Some(mut next) = waiting.into_iter().next() else {
            debug!("call queue of schedule {} is empty", schedule_id);
            return Ok(None);
        };

        next.is_calling = true;
        next.call_time = Some(Utc::now());
        next.touch(Utc::now());
        self.store.update_order(next.clone()).await?;

        info!("calling order {} on schedule {}", next.order_id, schedule_id);
        let name = self.patient_name(next.patient_id).await;
        Ok(Some(QueueEntry::from_order(&next, name, "--".to_string())))
    }

    /// The called patient was seen; terminal COMPLETED.
    pub async fn complete(&self, order_id: Uuid) -> Result<QueueEntry, ConsultationError> {
        let order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| ConsultationError::NotFound(format!("order {}", order_id)))?;

        let _guard = self.sections.enter(order.schedule_id).await;

        let mut order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| ConsultationError::NotFound(format!("order {}", order_id)))?;
        if order.status != OrderStatus::Confirmed {
            return Err(ConsultationError::InvalidStatusTransition { order_id, from: order.status });
        }
        if !order.is_calling {
            return Err(ConsultationError::NotCalling(order_id));
        }

        let now = Utc::now();
        order.status = OrderStatus::Completed;
        order.is_calling = false;
        if order.visit_time.is_none() {
            order.visit_time = Some(now);
        }
        order.touch(now);
        self.store.update_order(order.clone()).await?;

        info!("order {} completed on schedule {}", order_id, order.schedule_id);
        let name = self.patient_name(order.patient_id).await;
        Ok(QueueEntry::from_order(&order, name, "--".to_string()))
    }

    /// The called patient did not show up. Below the pass limit they rejoin
    /// the waiting queue behind fresh arrivals; at the limit they terminate
    /// as NO_SHOW with the limit snapshotted onto the order. Chains a
    /// `call_next` either way.
    pub async fn pass(
        &self,
        order_id: Uuid,
        max_pass_count: Option<u32>,
    ) -> Result<PassOutcome, ConsultationError> {
        let order = self
            .store
            .order(order_id)
            .await
            .ok_or_else(|| ConsultationError::NotFound(format!("order {}", order_id)))?;
        let schedule_id = order.schedule_id;

        let passed = {
            let _guard = self.sections.enter(schedule_id).await;

            let mut order = self
                .store
                .order(order_id)
                .await
                .ok_or_else(|| ConsultationError::NotFound(format!("order {}", order_id)))?;
            if order.status != OrderStatus::Confirmed {
                return Err(ConsultationError::InvalidStatusTransition { order_id, from: order.status });
            }
            if !order.is_calling {
                return Err(ConsultationError::NotCalling(order_id));
            }

            let limit = match max_pass_count {
                Some(limit) => limit,
                None => self.resolve_pass_limit(schedule_id).await,
            };

            order.pass_count += 1;
            order.is_calling = false;
            let is_no_show = order.pass_count >= limit;
            if is_no_show {
                // Capacity stays consumed: the booking was confirmed.
                order.status = OrderStatus::NoShow;
                order.pass_limit_applied = Some(limit);
            }
            order.touch(Utc::now());
            self.store.update_order(order.clone()).await?;

            info!(
                "order {} passed over ({}/{}) on schedule {}{}",
                order_id,
                order.pass_count,
                limit,
                schedule_id,
                if is_no_show { ", now a no-show" } else { "" }
            );

            PassedPatient {
                order_id,
                patient_name: self.patient_name(order.patient_id).await,
                pass_count: order.pass_count,
                is_no_show,
                status: order.status,
            }
        };

        // Convenience chain, outside the section held above.
        let next_patient = self.call_next(schedule_id).await?;
        Ok(PassOutcome { passed, next_patient })
    }

    /// Pass-over limit: doctor override, then the global setting.
    async fn resolve_pass_limit(&self, schedule_id: Uuid) -> u32 {
        if let Some(schedule) = self.store.schedule(schedule_id).await {
            if let Some(limit) = self.store.pass_limit(schedule.doctor_id).await {
                return limit;
            }
        }
        self.config.max_pass_count
    }

    async fn patient_name(&self, patient_id: Uuid) -> String {
        self.store
            .patient(patient_id)
            .await
            .map(|p| p.name)
            .unwrap_or_else(|| "unknown".to_string())
    }
}
