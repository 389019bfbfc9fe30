use thiserror::Error;
use uuid::Uuid;

use shared_models::{GatewayError, OrderStatus};
use shared_store::{LedgerError, StoreError};
use waitlist_cell::WaitlistError;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("user {user_id} may not act for patient {patient_id}")]
    Authorization { user_id: Uuid, patient_id: Uuid },

    #[error("patient {patient_id} already holds an active order on schedule {schedule_id}")]
    DuplicateBooking { patient_id: Uuid, schedule_id: Uuid },

    #[error("patient {0} has reached the active-order quota")]
    QuotaExceeded(Uuid),

    #[error("schedule {0} is sold out, join the waitlist instead")]
    CapacityExhausted(Uuid),

    #[error("schedule {0} is not open for booking")]
    ScheduleUnavailable(Uuid),

    #[error("order {order_id} can no longer be cancelled within {cutoff_hours}h of the session")]
    CancelCutoffPassed { order_id: Uuid, cutoff_hours: i64 },

    #[error("sessions are not interchangeable: {0}")]
    ScheduleMismatch(String),

    #[error("paid orders may only move to a session with the same fee ({current:.2} vs {target:.2})")]
    PriceMismatch { current: f64, target: f64 },

    #[error("order {order_id} cannot move from {from:?} to {to:?}")]
    InvalidStatusTransition { order_id: Uuid, from: OrderStatus, to: OrderStatus },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("payment gateway error: {0}")]
    Payment(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("waitlist error: {0}")]
    Waitlist(#[from] WaitlistError),
}
