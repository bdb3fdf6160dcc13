use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{ChargeReceipt, ChargeRequest, GatewayError, PaymentGateway};
use crate::domain::money::Money;

/// Token that the simulated gateway always declines
pub const DECLINE_TOKEN: &str = "tok_decline";

/// Simulated gateway used by local runs and tests.
pub struct MockPaymentGateway {
    latency: Duration,
    offline: AtomicBool,
    calls: AtomicU32,
    refunds: Mutex<Vec<String>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(0))
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            offline: AtomicBool::new(false),
            calls: AtomicU32::new(0),
            refunds: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent charge fail as unavailable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// References refunded so far, oldest first
    pub fn refunds(&self) -> Vec<String> {
        self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = %request.amount))]
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("simulated outage".to_string()));
        }
        if request.amount.minor_units() <= 0 {
            return Err(GatewayError::Declined("amount must be greater than zero".to_string()));
        }
        if request.token.as_deref() == Some(DECLINE_TOKEN) {
            info!(order_number = %request.order_number, "Simulated charge declined");
            return Err(GatewayError::Declined("card declined".to_string()));
        }

        let reference_id = format!("mock_ch_{}", Uuid::new_v4().simple());
        info!(order_number = %request.order_number, reference_id = %reference_id, "Simulated charge succeeded");
        Ok(ChargeReceipt { reference_id })
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn refund(&self, reference_id: &str, amount: Money) -> Result<(), GatewayError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("simulated outage".to_string()));
        }

        if let Ok(mut refunds) = self.refunds.lock() {
            refunds.push(reference_id.to_string());
        }
        info!(reference_id = %reference_id, "Simulated refund issued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::PaymentMethod;

    fn request(token: Option<&str>) -> ChargeRequest {
        ChargeRequest {
            order_id: Uuid::new_v4(),
            order_number: "ORD-20260101-00000001".to_string(),
            amount: Money::from_major(1150),
            method: PaymentMethod::Card,
            token: token.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_successful_charge_returns_reference() {
        let gateway = MockPaymentGateway::new();
        let receipt = gateway.charge(request(Some("tok_ok"))).await.unwrap();
        assert!(receipt.reference_id.starts_with("mock_ch_"));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_decline_token() {
        let gateway = MockPaymentGateway::new();
        let result = gateway.charge(request(Some(DECLINE_TOKEN))).await;
        assert!(matches!(result, Err(GatewayError::Declined(_))));
    }

    #[tokio::test]
    async fn test_refund_is_recorded() {
        let gateway = MockPaymentGateway::new();
        let receipt = gateway.charge(request(Some("tok_ok"))).await.unwrap();
        gateway.refund(&receipt.reference_id, Money::from_major(1150)).await.unwrap();
        assert_eq!(gateway.refunds(), vec![receipt.reference_id]);
    }

    #[tokio::test]
    async fn test_offline_gateway() {
        let gateway = MockPaymentGateway::new();
        gateway.set_offline(true);
        let result = gateway.charge(request(None)).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }
}
