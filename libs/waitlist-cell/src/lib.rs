pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::coordinator::WaitlistCoordinator;
pub use services::queue::{MemoryWaitlistQueue, RedisWaitlistQueue, WaitlistQueue};
pub use services::sync::WaitlistSyncJob;
