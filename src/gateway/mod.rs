use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::order::PaymentMethod;
use crate::utils::IsTransient;

pub mod mock;

pub use mock::MockPaymentGateway;

// ============================================================================
// Payment Gateway Contract
// ============================================================================
//
// The gateway is opaque to the order engine: it receives a charge and
// answers with a reference id or a failure. Timeouts and the circuit
// breaker live in the payment coordinator, not here.
//
// ============================================================================

/// What a payer submits. The amount is never taken from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Overrides the method chosen at checkout when present
    pub method: Option<PaymentMethod>,
    /// Opaque token issued to the client by the gateway
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: Money,
    pub method: PaymentMethod,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub reference_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Charge declined: {0}")]
    Declined(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Gateway did not answer within {0:?}")]
    Timeout(Duration),
}

/// Outages and timeouts say something about the gateway's health; a
/// decline is a healthy answer about one payer.
impl IsTransient for GatewayError {
    fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError>;

    /// Return a settled charge to the payer
    async fn refund(&self, reference_id: &str, amount: Money) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_outages_are_transient() {
        assert!(GatewayError::Unavailable("down".into()).is_transient());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!GatewayError::Declined("card declined".into()).is_transient());
    }
}
