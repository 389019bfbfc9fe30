use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::{Order, OrderStatus, Patient, PaymentStatus, Schedule, SlotCategory};

use crate::error::StoreError;

/// Scope level of a fee override, walked doctor -> clinic -> department ->
/// global by the price resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceScope {
    Doctor(Uuid),
    Clinic(Uuid),
    Department(Uuid),
    Global,
}

#[derive(Default)]
struct Inner {
    schedules: HashMap<Uuid, Schedule>,
    orders: HashMap<Uuid, Order>,
    patients: HashMap<Uuid, Patient>,
    price_rules: HashMap<(PriceScope, SlotCategory), f64>,
    pass_limits: HashMap<Uuid, u32>,
}

/// Reference adapter over the durable relational store.
///
/// A single writer guards all tables, which gives every compound mutation the
/// transactional behavior the production store provides with row locks. The
/// capacity counter is reachable only through [`crate::SlotLedger`]; this
/// module deliberately exposes no public way to touch `remaining_slots`.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    // Patients

    pub async fn insert_patient(&self, patient: Patient) {
        let mut inner = self.inner.write().await;
        inner.patients.insert(patient.patient_id, patient);
    }

    pub async fn patient(&self, patient_id: Uuid) -> Option<Patient> {
        let inner = self.inner.read().await;
        inner.patients.get(&patient_id).cloned()
    }

    // Schedules

    pub async fn insert_schedule(&self, schedule: Schedule) -> Result<(), StoreError> {
        if schedule.remaining_slots > schedule.total_slots {
            return Err(StoreError::Conflict(format!(
                "schedule {} remaining {} exceeds total {}",
                schedule.schedule_id, schedule.remaining_slots, schedule.total_slots
            )));
        }
        let mut inner = self.inner.write().await;
        if inner.schedules.contains_key(&schedule.schedule_id) {
            return Err(StoreError::Conflict(format!("schedule {} already exists", schedule.schedule_id)));
        }
        inner.schedules.insert(schedule.schedule_id, schedule);
        Ok(())
    }

    pub async fn schedule(&self, schedule_id: Uuid) -> Option<Schedule> {
        let inner = self.inner.read().await;
        inner.schedules.get(&schedule_id).cloned()
    }

    /// Exclusive read-modify-write of one schedule row. Not public: the slot
    /// ledger is the only caller, which keeps every capacity mutation on the
    /// reserve/release path.
    pub(crate) async fn update_schedule<F, T>(&self, schedule_id: Uuid, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Schedule) -> T,
    {
        let mut inner = self.inner.write().await;
        let schedule = inner
            .schedules
            .get_mut(&schedule_id)
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", schedule_id)))?;
        Ok(f(schedule))
    }

    // Orders

    pub async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.order_id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.order_id)));
        }
        inner.orders.insert(order.order_id, order);
        Ok(())
    }

    pub async fn order(&self, order_id: Uuid) -> Option<Order> {
        let inner = self.inner.read().await;
        inner.orders.get(&order_id).cloned()
    }

    pub async fn update_order(&self, order: Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.orders.contains_key(&order.order_id) {
            return Err(StoreError::NotFound(format!("order {}", order.order_id)));
        }
        inner.orders.insert(order.order_id, order);
        Ok(())
    }

    pub async fn remove_order(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .orders
            .remove(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))
    }

    pub async fn orders_for_schedule(&self, schedule_id: Uuid) -> Vec<Order> {
        let inner = self.inner.read().await;
        inner.orders.values().filter(|o| o.schedule_id == schedule_id).cloned().collect()
    }

    pub async fn orders_for_patient(&self, patient_id: Uuid) -> Vec<Order> {
        let inner = self.inner.read().await;
        inner.orders.values().filter(|o| o.patient_id == patient_id).cloned().collect()
    }

    /// Unpaid PENDING orders whose payment window opened at or before
    /// `cutoff`; the timeout sweep feeds on this.
    pub async fn stale_pending_orders(&self, cutoff: DateTime<Utc>) -> Vec<Order> {
        let inner = self.inner.read().await;
        inner
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Pending
                    && o.payment_status == PaymentStatus::Pending
                    && o.pending_since <= cutoff
            })
            .cloned()
            .collect()
    }

    // Config tables

    pub async fn set_price_rule(&self, scope: PriceScope, category: SlotCategory, price: f64) {
        let mut inner = self.inner.write().await;
        inner.price_rules.insert((scope, category), price);
    }

    pub async fn price_rule(&self, scope: PriceScope, category: SlotCategory) -> Option<f64> {
        let inner = self.inner.read().await;
        inner.price_rules.get(&(scope, category)).copied()
    }

    pub async fn set_pass_limit(&self, doctor_id: Uuid, limit: u32) {
        let mut inner = self.inner.write().await;
        inner.pass_limits.insert(doctor_id, limit);
    }

    pub async fn pass_limit(&self, doctor_id: Uuid) -> Option<u32> {
        let inner = self.inner.read().await;
        inner.pass_limits.get(&doctor_id).copied()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate};
    use shared_models::{ScheduleStatus, TimeSection};

    fn schedule(total: u32, remaining: u32) -> Schedule {
        Schedule {
            schedule_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            time_section: TimeSection::Morning,
            category: SlotCategory::Normal,
            total_slots: total,
            remaining_slots: remaining,
            price: 50.0,
            status: ScheduleStatus::Normal,
        }
    }

    #[tokio::test]
    async fn test_insert_schedule_rejects_remaining_above_total() {
        let store = MemoryStore::new();
        let result = store.insert_schedule(schedule(2, 3)).await;
        assert_matches!(result, Err(StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_stale_pending_orders_honors_cutoff_and_status() {
        let store = MemoryStore::new();
        let schedule_id = Uuid::new_v4();

        let mut fresh = Order::new_pending(Uuid::new_v4(), schedule_id, 50.0, None);
        fresh.pending_since = Utc::now();
        let mut stale = Order::new_pending(Uuid::new_v4(), schedule_id, 50.0, None);
        stale.pending_since = Utc::now() - Duration::minutes(31);
        let mut paid = Order::new_pending(Uuid::new_v4(), schedule_id, 50.0, None);
        paid.pending_since = Utc::now() - Duration::minutes(31);
        paid.status = OrderStatus::Confirmed;
        paid.payment_status = PaymentStatus::Paid;

        store.insert_order(fresh).await.unwrap();
        store.insert_order(stale.clone()).await.unwrap();
        store.insert_order(paid).await.unwrap();

        let found = store.stale_pending_orders(Utc::now() - Duration::minutes(30)).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_id, stale.order_id);
    }

    #[tokio::test]
    async fn test_update_order_requires_existing_row() {
        let store = MemoryStore::new();
        let order = Order::new_pending(Uuid::new_v4(), Uuid::new_v4(), 50.0, None);
        assert_matches!(store.update_order(order).await, Err(StoreError::NotFound(_)));
    }
}
