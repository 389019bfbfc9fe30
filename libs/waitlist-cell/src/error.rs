use thiserror::Error;
use uuid::Uuid;

use shared_models::OrderStatus;
use shared_store::{LedgerError, StoreError};

#[derive(Error, Debug)]
pub enum WaitlistError {
    #[error("schedule {0} still has open capacity, book it directly")]
    NotExhausted(Uuid),

    #[error("patient {patient_id} already holds an active claim on schedule {schedule_id}")]
    DuplicateClaim { patient_id: Uuid, schedule_id: Uuid },

    #[error("patient {0} has reached the active-order quota")]
    QuotaExceeded(Uuid),

    #[error("user {user_id} may not act for patient {patient_id}")]
    Authorization { user_id: Uuid, patient_id: Uuid },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("order {order_id} cannot leave the waitlist from status {from:?}")]
    InvalidStatusTransition { order_id: Uuid, from: OrderStatus },

    #[error("ephemeral queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
