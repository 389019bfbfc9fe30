use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{Order, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_orders: u32,
    pub confirmed_count: u32,
    pub waitlist_count: u32,
    pub completed_count: u32,
    pub waiting_count: u32,
    pub passed_count: u32,
}

/// One row of the workbench queue view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub order_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    /// Display number in call order, `A001` onwards.
    pub queue_number: String,
    pub status: OrderStatus,
    pub is_calling: bool,
    pub call_time: Option<DateTime<Utc>>,
    pub visit_time: Option<DateTime<Utc>>,
    pub pass_count: u32,
    pub priority: i32,
}

impl QueueEntry {
    pub fn from_order(order: &Order, patient_name: String, queue_number: String) -> Self {
        Self {
            order_id: order.order_id,
            patient_id: order.patient_id,
            patient_name,
            queue_number,
            status: order.status,
            is_calling: order.is_calling,
            call_time: order.call_time,
            visit_time: order.visit_time,
            pass_count: order.pass_count,
            priority: order.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistRow {
    pub order_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub waitlist_position: Option<u32>,
    pub joined_at: DateTime<Utc>,
}

/// Live view of one session's call queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub schedule_id: Uuid,
    pub stats: QueueStats,
    pub current_patient: Option<QueueEntry>,
    pub next_patient: Option<QueueEntry>,
    pub waiting: Vec<QueueEntry>,
    pub waitlist: Vec<WaitlistRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassedPatient {
    pub order_id: Uuid,
    pub patient_name: String,
    pub pass_count: u32,
    pub is_no_show: bool,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassOutcome {
    pub passed: PassedPatient,
    pub next_patient: Option<QueueEntry>,
}
