use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("payment gateway rejected the operation: {0}")]
    Payment(String),
}

/// Best-effort side channel fired after state transitions commit.
///
/// Callers must never let a failure here roll back a booking, cascade, or
/// queue transition: invoke after commit, log on error, no synchronous retry.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, target_user: Uuid, template_key: &str, fields: Value) -> Result<(), GatewayError>;
}

/// Default gateway: writes the notification to the log and succeeds.
pub struct LoggingNotificationGateway;

#[async_trait]
impl NotificationGateway for LoggingNotificationGateway {
    async fn send(&self, target_user: Uuid, template_key: &str, fields: Value) -> Result<(), GatewayError> {
        info!("notify user {} template {} fields {}", target_user, template_key, fields);
        Ok(())
    }
}

/// The payment provider, reduced to the two opaque calls the core makes.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order_id: Uuid, amount: f64) -> Result<(), GatewayError>;
    async fn refund(&self, order_id: Uuid, amount: f64) -> Result<(), GatewayError>;
}

/// Development gateway that approves every charge and refund.
pub struct AutoApproveGateway;

#[async_trait]
impl PaymentGateway for AutoApproveGateway {
    async fn charge(&self, order_id: Uuid, amount: f64) -> Result<(), GatewayError> {
        info!("charge approved: order {} amount {:.2}", order_id, amount);
        Ok(())
    }

    async fn refund(&self, order_id: Uuid, amount: f64) -> Result<(), GatewayError> {
        info!("refund approved: order {} amount {:.2}", order_id, amount);
        Ok(())
    }
}
