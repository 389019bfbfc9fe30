use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::WaitlistError;
use crate::models::WaitlistEntry;

/// Ordered per-schedule FIFO behind the waitlist coordinator.
///
/// The ephemeral store is authoritative for ordering while reachable; the
/// durable mirror (`Order.waitlist_position`) only serves reads when this
/// store is down, via the coordinator's fallback path.
#[async_trait]
pub trait WaitlistQueue: Send + Sync {
    /// Append and return the entry's 1-based position.
    async fn push_back(&self, schedule_id: Uuid, entry: WaitlistEntry) -> Result<u32, WaitlistError>;

    /// Re-insert at the head; used when a promotion loses the capacity race.
    async fn push_front(&self, schedule_id: Uuid, entry: WaitlistEntry) -> Result<(), WaitlistError>;

    async fn pop_front(&self, schedule_id: Uuid) -> Result<Option<WaitlistEntry>, WaitlistError>;

    /// Remove a specific claim; true when something was removed.
    async fn remove(&self, schedule_id: Uuid, order_id: Uuid) -> Result<bool, WaitlistError>;

    async fn entries(&self, schedule_id: Uuid) -> Result<Vec<WaitlistEntry>, WaitlistError>;

    /// Schedules that currently have queued entries; drives the sync job.
    async fn queued_schedules(&self) -> Result<Vec<Uuid>, WaitlistError>;
}

const QUEUE_KEY_PREFIX: &str = "waitlist:queue";

fn queue_key(schedule_id: Uuid) -> String {
    format!("{}:{}", QUEUE_KEY_PREFIX, schedule_id)
}

/// Redis-backed queue: one list per schedule, JSON entries, TTL-bounded so
/// abandoned queues age out between reconciliation runs.
pub struct RedisWaitlistQueue {
    pool: Pool,
    ttl_secs: i64,
}

impl RedisWaitlistQueue {
    pub async fn new(config: &AppConfig) -> Result<Self, WaitlistError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| WaitlistError::QueueUnavailable(format!("pool creation failed: {}", e)))?;

        // Test connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| WaitlistError::QueueUnavailable(format!("connection failed: {}", e)))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("redis waitlist queue initialized");

        Ok(Self { pool, ttl_secs: config.waitlist_ttl_secs })
    }

    async fn conn(&self) -> Result<Connection, WaitlistError> {
        self.pool
            .get()
            .await
            .map_err(|e| WaitlistError::QueueUnavailable(e.to_string()))
    }
}

#[async_trait]
impl WaitlistQueue for RedisWaitlistQueue {
    async fn push_back(&self, schedule_id: Uuid, entry: WaitlistEntry) -> Result<u32, WaitlistError> {
        let mut conn = self.conn().await?;
        let key = queue_key(schedule_id);
        let payload = serde_json::to_string(&entry)?;

        let len: i64 = conn.rpush(&key, payload).await?;
        let _: () = conn.expire(&key, self.ttl_secs).await?;

        debug!("queued order {} on schedule {} at position {}", entry.order_id, schedule_id, len);
        Ok(len as u32)
    }

    async fn push_front(&self, schedule_id: Uuid, entry: WaitlistEntry) -> Result<(), WaitlistError> {
        let mut conn = self.conn().await?;
        let key = queue_key(schedule_id);
        let payload = serde_json::to_string(&entry)?;

        let _: () = conn.lpush(&key, payload).await?;
        let _: () = conn.expire(&key, self.ttl_secs).await?;
        Ok(())
    }

    async fn pop_front(&self, schedule_id: Uuid) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.lpop(&queue_key(schedule_id), None).await?;
        match raw {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, schedule_id: Uuid, order_id: Uuid) -> Result<bool, WaitlistError> {
        let mut conn = self.conn().await?;
        let key = queue_key(schedule_id);

        let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;
        let mut kept = Vec::with_capacity(raw.len());
        let mut removed = false;
        for item in raw {
            match serde_json::from_str::<WaitlistEntry>(&item) {
                Ok(entry) if entry.order_id == order_id => removed = true,
                Ok(_) => kept.push(item),
                Err(e) => {
                    warn!("dropping unparsable waitlist entry on schedule {}: {}", schedule_id, e);
                }
            }
        }

        if removed {
            let _: () = conn.del(&key).await?;
            if !kept.is_empty() {
                let _: () = conn.rpush(&key, kept).await?;
                let _: () = conn.expire(&key, self.ttl_secs).await?;
            }
        }
        Ok(removed)
    }

    async fn entries(&self, schedule_id: Uuid) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.lrange(&queue_key(schedule_id), 0, -1).await?;

        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str(&item) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("skipping unparsable waitlist entry on schedule {}: {}", schedule_id, e),
            }
        }
        Ok(entries)
    }

    async fn queued_schedules(&self) -> Result<Vec<Uuid>, WaitlistError> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn.keys(format!("{}:*", QUEUE_KEY_PREFIX)).await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.rsplit(':').next())
            .filter_map(|suffix| Uuid::parse_str(suffix).ok())
            .collect())
    }
}

/// In-process queue with identical semantics; used in tests and as the
/// deployment fallback when no redis is configured.
#[derive(Default)]
pub struct MemoryWaitlistQueue {
    queues: Mutex<HashMap<Uuid, VecDeque<WaitlistEntry>>>,
}

impl MemoryWaitlistQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WaitlistQueue for MemoryWaitlistQueue {
    async fn push_back(&self, schedule_id: Uuid, entry: WaitlistEntry) -> Result<u32, WaitlistError> {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(schedule_id).or_default();
        queue.push_back(entry);
        Ok(queue.len() as u32)
    }

    async fn push_front(&self, schedule_id: Uuid, entry: WaitlistEntry) -> Result<(), WaitlistError> {
        let mut queues = self.queues.lock().await;
        queues.entry(schedule_id).or_default().push_front(entry);
        Ok(())
    }

    async fn pop_front(&self, schedule_id: Uuid) -> Result<Option<WaitlistEntry>, WaitlistError> {
        let mut queues = self.queues.lock().await;
        Ok(queues.get_mut(&schedule_id).and_then(|q| q.pop_front()))
    }

    async fn remove(&self, schedule_id: Uuid, order_id: Uuid) -> Result<bool, WaitlistError> {
        let mut queues = self.queues.lock().await;
        match queues.get_mut(&schedule_id) {
            Some(queue) => {
                let before = queue.len();
                queue.retain(|entry| entry.order_id != order_id);
                Ok(queue.len() < before)
            }
            None => Ok(false),
        }
    }

    async fn entries(&self, schedule_id: Uuid) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let queues = self.queues.lock().await;
        Ok(queues.get(&schedule_id).map(|q| q.iter().cloned().collect()).unwrap_or_default())
    }

    async fn queued_schedules(&self) -> Result<Vec<Uuid>, WaitlistError> {
        let queues = self.queues.lock().await;
        Ok(queues.iter().filter(|(_, q)| !q.is_empty()).map(|(id, _)| *id).collect())
    }
}
