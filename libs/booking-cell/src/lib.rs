pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::booking::BookingService;
pub use services::pricing::{PriceResolver, PricingService, StorePriceResolver};
pub use services::timeout::PaymentTimeoutSweep;
