use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Waitlist,
    Cancelled,
    Timeout,
    Completed,
    NoShow,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Timeout | OrderStatus::Completed | OrderStatus::NoShow
        )
    }

    /// Statuses that hold a capacity unit on their schedule. Waitlist claims
    /// never occupy capacity.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Statuses counted as a live claim for duplicate and quota checks.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Waitlist)
    }

    pub fn can_transition_to(&self, target: &OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, target) {
            (Pending, Confirmed) => true,
            (Pending, Cancelled) => true,
            (Pending, Timeout) => true,
            (Confirmed, Cancelled) => true,
            (Confirmed, Completed) => true,
            (Confirmed, NoShow) => true,
            (Waitlist, Pending) => true,
            (Waitlist, Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Cancelled,
    Failed,
}

/// How the order obtained its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    Direct,
    Waitlist,
}

/// A patient's claim against one schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub patient_id: Uuid,
    pub schedule_id: Uuid,
    pub price: f64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub source: OrderSource,
    pub symptoms: Option<String>,

    /// Durable mirror of the ephemeral waitlist ordering; reconciled by the
    /// sync job, authoritative only when the ephemeral store is unreachable.
    pub waitlist_position: Option<u32>,

    pub pass_count: u32,
    /// Pass-over limit in force when a no-show verdict was reached.
    pub pass_limit_applied: Option<u32>,
    pub is_calling: bool,
    pub call_time: Option<DateTime<Utc>>,
    pub visit_time: Option<DateTime<Utc>>,
    /// Call ordering bias; add-on orders jump the queue with negative values.
    pub priority: i32,

    /// Start of the current payment window; reset when a waitlist claim is
    /// promoted so the timeout clock restarts at promotion.
    pub pending_since: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new_pending(patient_id: Uuid, schedule_id: Uuid, price: f64, symptoms: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4(),
            patient_id,
            schedule_id,
            price,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            source: OrderSource::Direct,
            symptoms,
            waitlist_position: None,
            pass_count: 0,
            pass_limit_applied: None,
            is_calling: false,
            call_time: None,
            visit_time: None,
            priority: 0,
            pending_since: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_waitlist(
        patient_id: Uuid,
        schedule_id: Uuid,
        price: f64,
        symptoms: Option<String>,
        position: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4(),
            patient_id,
            schedule_id,
            price,
            status: OrderStatus::Waitlist,
            payment_status: PaymentStatus::Pending,
            source: OrderSource::Direct,
            symptoms,
            waitlist_position: Some(position),
            pass_count: 0,
            pass_limit_applied: None,
            is_calling: false,
            call_time: None,
            visit_time: None,
            priority: 0,
            pending_since: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Waitlist claim won a freed unit: it becomes an ordinary unpaid order
    /// and its payment-timeout clock restarts now.
    pub fn promote_from_waitlist(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::Pending;
        self.payment_status = PaymentStatus::Pending;
        self.source = OrderSource::Waitlist;
        self.waitlist_position = None;
        self.pending_since = now;
        self.updated_at = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
