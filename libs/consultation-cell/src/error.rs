use thiserror::Error;
use uuid::Uuid;

use shared_models::OrderStatus;
use shared_store::StoreError;

#[derive(Error, Debug)]
pub enum ConsultationError {
    /// Queue arbitration invariant would break; re-read the queue and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("order {0} is not the patient currently being called")]
    NotCalling(Uuid),

    #[error("order {order_id} in status {from:?} cannot take this transition")]
    InvalidStatusTransition { order_id: Uuid, from: OrderStatus },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
