pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::queue::ConsultationQueueService;
