use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::memory::MemoryStore;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("schedule {0} has no remaining capacity")]
    Exhausted(Uuid),

    #[error("release on schedule {0} would exceed total capacity")]
    OverRelease(Uuid),

    #[error("schedule {0} not found")]
    NotFound(Uuid),
}

/// The only mutation path for `Schedule.remaining_slots`.
///
/// Reserve fails closed at zero; callers route the patient to the waitlist
/// rather than retrying. Release is tied to exactly one order transition and
/// refuses to push remaining above total, so a double release surfaces as an
/// error instead of minting capacity.
pub struct SlotLedger {
    store: Arc<MemoryStore>,
}

impl SlotLedger {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Take one unit. Returns the remaining count after the decrement.
    pub async fn reserve(&self, schedule_id: Uuid) -> Result<u32, LedgerError> {
        let outcome = self
            .store
            .update_schedule(schedule_id, |schedule| {
                if schedule.remaining_slots == 0 {
                    None
                } else {
                    schedule.remaining_slots -= 1;
                    Some(schedule.remaining_slots)
                }
            })
            .await
            .map_err(|_| LedgerError::NotFound(schedule_id))?;

        match outcome {
            Some(remaining) => {
                debug!("reserved slot on schedule {}, {} remaining", schedule_id, remaining);
                Ok(remaining)
            }
            None => Err(LedgerError::Exhausted(schedule_id)),
        }
    }

    /// Return one unit. Returns the remaining count after the increment.
    pub async fn release(&self, schedule_id: Uuid) -> Result<u32, LedgerError> {
        let outcome = self
            .store
            .update_schedule(schedule_id, |schedule| {
                if schedule.remaining_slots >= schedule.total_slots {
                    None
                } else {
                    schedule.remaining_slots += 1;
                    Some(schedule.remaining_slots)
                }
            })
            .await
            .map_err(|_| LedgerError::NotFound(schedule_id))?;

        match outcome {
            Some(remaining) => {
                debug!("released slot on schedule {}, {} remaining", schedule_id, remaining);
                Ok(remaining)
            }
            None => Err(LedgerError::OverRelease(schedule_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use shared_models::{Schedule, ScheduleStatus, SlotCategory, TimeSection};

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
    async fn test_reserve_fails_closed_at_zero() {
        let store = Arc::new(MemoryStore::new());
        let s = schedule(1, 1);
        let id = s.schedule_id;
        store.insert_schedule(s).await.unwrap();
        let ledger = SlotLedger::new(store.clone());

        assert_eq!(ledger.reserve(id).await.unwrap(), 0);
        assert_matches!(ledger.reserve(id).await, Err(LedgerError::Exhausted(_)));
        assert_eq!(store.schedule(id).await.unwrap().remaining_slots, 0);
    }

    #[tokio::test]
    async fn test_reserve_then_release_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let s = schedule(5, 5);
        let id = s.schedule_id;
        store.insert_schedule(s).await.unwrap();
        let ledger = SlotLedger::new(store.clone());

        ledger.reserve(id).await.unwrap();
        ledger.release(id).await.unwrap();
        assert_eq!(store.schedule(id).await.unwrap().remaining_slots, 5);
    }

    #[tokio::test]
    async fn test_release_refuses_to_exceed_total() {
        let store = Arc::new(MemoryStore::new());
        let s = schedule(3, 3);
        let id = s.schedule_id;
        store.insert_schedule(s).await.unwrap();
        let ledger = SlotLedger::new(store.clone());

        assert_matches!(ledger.release(id).await, Err(LedgerError::OverRelease(_)));
        assert_eq!(store.schedule(id).await.unwrap().remaining_slots, 3);
    }

    #[tokio::test]
    async fn test_unknown_schedule_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let ledger = SlotLedger::new(store);
        assert_matches!(ledger.reserve(Uuid::new_v4()).await, Err(LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        let s = schedule(4, 4);
        let id = s.schedule_id;
        store.insert_schedule(s).await.unwrap();
        let ledger = Arc::new(SlotLedger::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move { ledger.reserve(id).await }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }

        assert_eq!(granted, 4);
        assert_eq!(store.schedule(id).await.unwrap().remaining_slots, 0);
    }
}
