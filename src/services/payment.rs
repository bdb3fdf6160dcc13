use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::authorization;
use crate::domain::money::Money;
use crate::domain::order::{Actor, ActorRole, Order, OrderCommand, OrderCommandHandler, OrderError};
use crate::gateway::{ChargeRequest, GatewayError, PaymentDetails, PaymentGateway};
use crate::metrics::Metrics;
use crate::utils::{
    retry_on_transient, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, IsTransient, RetryConfig,
};

// ============================================================================
// Payment Coordinator
// ============================================================================
//
// Drives the payment axis of an order:
// 1. Claim the order (one attempt at a time; cancellation waits)
// 2. Charge inside a timeout and the gateway circuit breaker
// 3. Record the outcome as the claim holder, refunding a charge that
//    cannot be recorded
//
// Only outages and timeouts count against the breaker. Charges are never
// retried here.
//
// ============================================================================

/// Lease slack past the gateway timeout before a stuck claim may be taken over
const CLAIM_GRACE: Duration = Duration::from_secs(30);

pub struct PaymentCoordinator {
    handler: Arc<OrderCommandHandler>,
    gateway: Arc<dyn PaymentGateway>,
    breaker: CircuitBreaker,
    timeout: Duration,
    reversal_retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl PaymentCoordinator {
    pub fn new(
        handler: Arc<OrderCommandHandler>,
        gateway: Arc<dyn PaymentGateway>,
        breaker_config: CircuitBreakerConfig,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            handler,
            gateway,
            breaker: CircuitBreaker::new("payment_gateway", breaker_config),
            timeout,
            reversal_retry: RetryConfig::compensation(),
            metrics,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Charge the order's total. On success the order is marked paid and,
    /// if still pending, confirmed. A concurrent attempt on the same order
    /// fails with `PaymentInProgress` before reaching the gateway.
    pub async fn process(&self, order_id: Uuid, payer_id: Uuid, details: PaymentDetails) -> Result<Order, OrderError> {
        let order = self.handler.load(order_id).await?;

        let payer = Actor::new(payer_id, ActorRole::Buyer);
        if !authorization::can_pay(&payer, &order) {
            return Err(OrderError::unauthorized("only the buyer who placed the order may pay for it"));
        }
        order.ensure_payable()?;

        let attempt_id = Uuid::new_v4();
        let lease = chrono::Duration::from_std(self.timeout + CLAIM_GRACE)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        self.handler
            .handle(order_id, OrderCommand::BeginPayment { attempt_id, expires_at: Utc::now() + lease })
            .await?;

        let amount = order.totals.total_amount();
        let request = ChargeRequest {
            order_id,
            order_number: order.order_number.clone(),
            amount,
            method: details.method.unwrap_or(order.payment_method),
            token: details.token,
        };

        match self.charge(request).await {
            Ok(reference) => {
                let recorded = self
                    .handler
                    .handle(order_id, OrderCommand::RecordPaymentSuccess { attempt_id, reference: reference.clone() })
                    .await;
                let paid = match recorded {
                    Ok(paid) => paid,
                    Err(e) => {
                        tracing::error!(
                            order_id = %order_id,
                            reference = %reference,
                            error = %e,
                            "Charge succeeded but could not be recorded, refunding"
                        );
                        self.reverse(order_id, &reference, amount).await;
                        return Err(e);
                    }
                };

                tracing::info!(
                    order_id = %order_id,
                    order_number = %paid.order.order_number,
                    reference = %reference,
                    amount = %amount,
                    "Payment recorded"
                );

                let confirmed = self.handler.handle(order_id, OrderCommand::ConfirmAfterPayment).await?;
                Ok(confirmed.order)
            }
            Err(reason) => {
                if let Err(e) = self
                    .handler
                    .handle(order_id, OrderCommand::RecordPaymentFailure { attempt_id, reason: reason.clone() })
                    .await
                {
                    // The claim lapses on its own once the lease expires
                    tracing::warn!(order_id = %order_id, error = %e, "Could not record payment failure");
                }
                Err(OrderError::InvalidPayment(reason))
            }
        }
    }

    /// Mark a paid order refunded. Already refunded orders are left alone.
    pub async fn refund(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let outcome = self.handler.handle(order_id, OrderCommand::Refund).await?;
        if outcome.changed() {
            tracing::info!(
                order_id = %order_id,
                amount = %outcome.order.totals.total_amount(),
                "Payment refunded"
            );
        }
        Ok(outcome.order)
    }

    /// Give back a captured charge the order never recorded
    async fn reverse(&self, order_id: Uuid, reference: &str, amount: Money) {
        let result = retry_on_transient(&self.reversal_retry, || self.gateway.refund(reference, amount)).await;
        match result {
            Ok(()) => {
                self.metrics.record_payment_reversal(true);
                tracing::warn!(order_id = %order_id, reference = %reference, amount = %amount, "Unrecorded charge refunded");
            }
            Err(e) => {
                self.metrics.record_payment_reversal(false);
                tracing::error!(
                    order_id = %order_id,
                    reference = %reference,
                    amount = %amount,
                    error = %e,
                    "Unrecorded charge could not be refunded"
                );
            }
        }
    }

    /// Returns the gateway reference, or the failure reason
    async fn charge(&self, request: ChargeRequest) -> Result<String, String> {
        let started = Instant::now();
        let timeout = self.timeout;
        let gateway = self.gateway.clone();
        let order_id = request.order_id;

        let result = self
            .breaker
            .call_with(
                async move {
                    match tokio::time::timeout(timeout, gateway.charge(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(GatewayError::Timeout(timeout)),
                    }
                },
                |e: &GatewayError| e.is_transient(),
            )
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics
            .update_payment_circuit_state(self.breaker.state().await.as_gauge());

        match result {
            Ok(receipt) => {
                self.metrics.record_payment("paid", elapsed);
                Ok(receipt.reference_id)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                self.metrics.record_payment("circuit_open", elapsed);
                tracing::warn!(order_id = %order_id, "Payment gateway circuit open, charge not attempted");
                Err("payment gateway temporarily unavailable".to_string())
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                let outcome = match e {
                    GatewayError::Declined(_) => "declined",
                    GatewayError::Unavailable(_) => "unavailable",
                    GatewayError::Timeout(_) => "timeout",
                };
                self.metrics.record_payment(outcome, elapsed);
                tracing::warn!(order_id = %order_id, outcome = outcome, error = %e, "Charge failed");
                Err(e.to_string())
            }
        }
    }
}
