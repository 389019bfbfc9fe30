use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-schedule exclusive sections, the in-process analogue of the store's
/// `SELECT ... FOR UPDATE` row lock.
///
/// Every compound mutation scoped to one schedule (reserve + order write,
/// call-next arbitration, cascade promotion) runs inside `enter`. Unrelated
/// schedules never contend. Sections must not be held across slow I/O such
/// as notification sends.
#[derive(Default)]
pub struct ScheduleSections {
    cells: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ScheduleSections {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter(&self, schedule_id: Uuid) -> OwnedMutexGuard<()> {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(schedule_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        cell.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_same_schedule_serializes() {
        let sections = Arc::new(ScheduleSections::new());
        let schedule_id = Uuid::new_v4();
        let in_section = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sections = Arc::clone(&sections);
            let in_section = Arc::clone(&in_section);
            handles.push(tokio::spawn(async move {
                let _guard = sections.enter(schedule_id).await;
                let now_inside = in_section.fetch_add(1, Ordering::SeqCst);
                assert_eq!(now_inside, 0, "two tasks inside one schedule section");
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_different_schedules_do_not_block_each_other() {
        let sections = ScheduleSections::new();
        let _a = sections.enter(Uuid::new_v4()).await;
        // Entering a second schedule completes while the first is held.
        let _b = sections.enter(Uuid::new_v4()).await;
    }
}
