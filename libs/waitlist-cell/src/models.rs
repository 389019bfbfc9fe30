use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One queued claim, as stored in the ephemeral queue. FIFO by `joined_at`
/// within a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub order_id: Uuid,
    pub patient_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistTicket {
    pub order_id: Uuid,
    /// 1-based position at join time.
    pub queue_position: u32,
}
