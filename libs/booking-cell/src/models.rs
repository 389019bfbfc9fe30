use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub order_id: Uuid,
    pub need_pay: bool,
    pub pay_amount: f64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub success: bool,
    pub refund_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleOutcome {
    pub order_id: Uuid,
    /// New fee minus old fee; zero for paid orders, which may only move to
    /// an identically priced session.
    pub price_diff: f64,
    pub status: OrderStatus,
}

/// Who asked for the cancellation. The system actor is the timeout sweep and
/// is exempt from ownership and cutoff checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelActor {
    User(Uuid),
    Doctor(Uuid),
    Admin(Uuid),
    System,
}
