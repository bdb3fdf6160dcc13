mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub use server::{encode_text, metrics_handler};

// ============================================================================
// Metrics Module - Prometheus metrics for the order engine
// ============================================================================
//
// Covers:
// - Order creation throughput and rejections by error kind
// - Status transitions (from -> to)
// - Payment outcomes, gateway latency, gateway circuit state
// - Charges reversed because their outcome could not be recorded
// - Stock reservations and compensating releases
// - Tracking ledger append failures
//
// Scraped via GET /metrics on the API server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order Lifecycle
    pub orders_created: IntCounter,
    pub order_creation_failures: IntCounterVec,
    pub status_transitions: IntCounterVec,

    // Payments
    pub payments: IntCounterVec,
    pub payment_duration: HistogramVec,
    pub payment_circuit_state: IntGauge,
    pub payment_reversals: IntCounterVec,

    // Inventory
    pub stock_reservations: IntCounterVec,
    pub compensations: IntCounterVec,

    // Ledger
    pub ledger_append_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_creation_failures = IntCounterVec::new(
            Opts::new("order_creation_failures_total", "Order creations rejected, by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(order_creation_failures.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let payments = IntCounterVec::new(
            Opts::new("order_payments_total", "Payment attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(payments.clone()))?;

        let payment_duration = HistogramVec::new(
            HistogramOpts::new("order_payment_duration_seconds", "Payment gateway call duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(payment_duration.clone()))?;

        let payment_circuit_state = IntGauge::new(
            "payment_circuit_breaker_state",
            "Payment gateway circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(payment_circuit_state.clone()))?;

        let payment_reversals = IntCounterVec::new(
            Opts::new(
                "payment_reversals_total",
                "Settled charges refunded because the order could not record them",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(payment_reversals.clone()))?;

        let stock_reservations = IntCounterVec::new(
            Opts::new("stock_reservations_total", "Stock reservation attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(stock_reservations.clone()))?;

        let compensations = IntCounterVec::new(
            Opts::new("stock_compensations_total", "Compensating stock releases by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(compensations.clone()))?;

        let ledger_append_failures = IntCounter::new(
            "tracking_ledger_append_failures_total",
            "Tracking entries that could not be appended after a committed change",
        )?;
        registry.register(Box::new(ledger_append_failures.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_creation_failures,
            status_transitions,
            payments,
            payment_duration,
            payment_circuit_state,
            payment_reversals,
            stock_reservations,
            compensations,
            ledger_append_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    pub fn record_creation_failure(&self, kind: &str) {
        self.order_creation_failures.with_label_values(&[kind]).inc();
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    /// `outcome` is one of paid, declined, unavailable, timeout, circuit_open
    pub fn record_payment(&self, outcome: &str, duration_secs: f64) {
        self.payments.with_label_values(&[outcome]).inc();
        self.payment_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn update_payment_circuit_state(&self, state: i64) {
        self.payment_circuit_state.set(state);
    }

    /// A failed reversal leaves money captured for an unpaid order
    pub fn record_payment_reversal(&self, refunded: bool) {
        let outcome = if refunded { "refunded" } else { "failed" };
        self.payment_reversals.with_label_values(&[outcome]).inc();
    }

    pub fn record_reservation(&self, reserved: bool) {
        let outcome = if reserved { "reserved" } else { "insufficient" };
        self.stock_reservations.with_label_values(&[outcome]).inc();
    }

    pub fn record_compensation(&self, success: bool) {
        let outcome = if success { "released" } else { "failed" };
        self.compensations.with_label_values(&[outcome]).inc();
    }

    pub fn record_ledger_failure(&self) {
        self.ledger_append_failures.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_transition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition("pending", "confirmed");
        metrics.record_transition("pending", "confirmed");
        metrics.record_transition("confirmed", "processing");

        let text = encode_text(metrics.registry()).unwrap();
        assert!(text.contains("order_status_transitions_total{from=\"pending\",to=\"confirmed\"} 2"));
        assert!(text.contains("order_status_transitions_total{from=\"confirmed\",to=\"processing\"} 1"));
    }

    #[test]
    fn test_record_payment_and_circuit_state() {
        let metrics = Metrics::new().unwrap();
        metrics.record_payment("paid", 0.12);
        metrics.record_payment("timeout", 10.0);
        metrics.update_payment_circuit_state(1);
        metrics.record_payment_reversal(true);

        let text = encode_text(metrics.registry()).unwrap();
        assert!(text.contains("order_payments_total{outcome=\"paid\"} 1"));
        assert!(text.contains("order_payments_total{outcome=\"timeout\"} 1"));
        assert!(text.contains("payment_circuit_breaker_state 1"));
        assert!(text.contains("payment_reversals_total{outcome=\"refunded\"} 1"));
    }

    #[test]
    fn test_record_stock_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reservation(true);
        metrics.record_reservation(false);
        metrics.record_compensation(true);
        metrics.record_ledger_failure();

        let text = encode_text(metrics.registry()).unwrap();
        assert!(text.contains("stock_reservations_total{outcome=\"insufficient\"} 1"));
        assert!(text.contains("stock_compensations_total{outcome=\"released\"} 1"));
        assert!(text.contains("tracking_ledger_append_failures_total 1"));
    }
}
