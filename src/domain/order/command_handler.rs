use std::sync::Arc;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::OrderStatus;
use crate::ledger::{NewTrackingEntry, TrackingEntry, TrackingLedger};
use crate::metrics::Metrics;
use crate::store::{OrderRepository, Precondition};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Conditional Update → Ledger
//
// The order row is the source of truth. The update is conditioned on the
// row version observed at load time, so two racing commands cannot both
// commit and a stale copy never overwrites newer fields. Ledger appends
// follow the commit and never undo it.
//
// ============================================================================

/// Attempts `handle` makes before giving up on a hot order
const COMMIT_ATTEMPTS: usize = 3;

/// Result of a committed (or no-op) command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub previous: Order,
    pub order: Order,
    pub events: Vec<OrderEvent>,
    pub tracking: Vec<TrackingEntry>,
    /// Non-fatal problems, e.g. a ledger append that failed after commit
    pub warnings: Vec<String>,
}

impl CommandOutcome {
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

enum Commit {
    Done(CommandOutcome),
    /// The stored row moved past the loaded version
    Stale,
}

pub struct OrderCommandHandler {
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<dyn TrackingLedger>,
    metrics: Arc<Metrics>,
}

impl OrderCommandHandler {
    pub fn new(orders: Arc<dyn OrderRepository>, ledger: Arc<dyn TrackingLedger>, metrics: Arc<Metrics>) -> Self {
        Self { orders, ledger, metrics }
    }

    pub async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Handle a command against the stored order and persist the result.
    /// A lost race reloads and decides again, so the command is judged
    /// against the newest row.
    pub async fn handle(&self, order_id: Uuid, command: OrderCommand) -> Result<CommandOutcome, OrderError> {
        for attempt in 1..=COMMIT_ATTEMPTS {
            let current = self.load(order_id).await?;
            match self.commit(&current, &command).await? {
                Commit::Done(outcome) => return Ok(outcome),
                Commit::Stale => {
                    tracing::debug!(order_id = %order_id, attempt = attempt, "Order changed before commit, reloading")
                }
            }
        }

        tracing::warn!(order_id = %order_id, attempts = COMMIT_ATTEMPTS, "Giving up on contended order");
        Err(OrderError::ConcurrentUpdate(order_id))
    }

    /// Same as `handle` for a caller that already loaded the order and
    /// authorized against that copy. A stale copy is never retried.
    pub async fn handle_loaded(&self, current: Order, command: OrderCommand) -> Result<CommandOutcome, OrderError> {
        match self.commit(&current, &command).await? {
            Commit::Done(outcome) => Ok(outcome),
            Commit::Stale => Err(self.conflict(&current, &command).await),
        }
    }

    async fn commit(&self, current: &Order, command: &OrderCommand) -> Result<Commit, OrderError> {
        let events = current.handle_command(command)?;

        if events.is_empty() {
            return Ok(Commit::Done(CommandOutcome {
                previous: current.clone(),
                order: current.clone(),
                events,
                tracking: Vec::new(),
                warnings: Vec::new(),
            }));
        }

        let mut next = current.clone();
        for event in &events {
            next.apply_event(event);
        }

        if !self.orders.update_if(&next, Precondition::of(current)).await? {
            return Ok(Commit::Stale);
        }
        next.version = current.version + 1;

        let mut outcome = CommandOutcome {
            previous: current.clone(),
            order: next,
            events,
            tracking: Vec::new(),
            warnings: Vec::new(),
        };
        self.record_history(&mut outcome).await;

        Ok(Commit::Done(outcome))
    }

    /// Build the error for a command whose precondition missed. The command
    /// is re-validated against the fresh row so the caller sees the rule it
    /// now breaks. A still-legal status command reports a transition
    /// conflict against the newer status; anything else a concurrent update.
    async fn conflict(&self, stale: &Order, command: &OrderCommand) -> OrderError {
        let fresh = match self.load(stale.id).await {
            Ok(order) => order,
            Err(e) => return e,
        };

        tracing::warn!(
            order_id = %stale.id,
            expected_version = stale.version,
            actual_version = fresh.version,
            actual_status = %fresh.status,
            "Order changed concurrently, command rejected"
        );

        if let Err(e) = fresh.handle_command(command) {
            return e;
        }

        match target_status(command) {
            Some(to) => OrderError::InvalidStatusTransition { from: fresh.status, to },
            None => OrderError::ConcurrentUpdate(fresh.id),
        }
    }

    async fn record_history(&self, outcome: &mut CommandOutcome) {
        for event in &outcome.events {
            let OrderEvent::StatusChanged(change) = event else {
                continue;
            };

            self.metrics.record_transition(change.from.as_str(), change.to.as_str());
            tracing::info!(
                order_id = %outcome.order.id,
                order_number = %outcome.order.order_number,
                from = %change.from,
                to = %change.to,
                "Order status changed"
            );

            let entry = NewTrackingEntry::new(outcome.order.id, change.to, change.description())
                .with_location(change.location.clone())
                .with_notes(change.notes.clone());

            match self.ledger.append(entry).await {
                Ok(stored) => outcome.tracking.push(stored),
                Err(e) => {
                    self.metrics.record_ledger_failure();
                    tracing::warn!(
                        order_id = %outcome.order.id,
                        status = %change.to,
                        error = %e,
                        "Failed to append tracking entry"
                    );
                    outcome
                        .warnings
                        .push(format!("tracking entry for status {} was not recorded", change.to));
                }
            }
        }
    }
}

fn target_status(command: &OrderCommand) -> Option<OrderStatus> {
    match command {
        OrderCommand::ChangeStatus { to, .. } => Some(*to),
        OrderCommand::Cancel { .. } => Some(OrderStatus::Cancelled),
        OrderCommand::ConfirmAfterPayment => Some(OrderStatus::Confirmed),
        _ => None,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::sample_order;
    use crate::domain::order::{ActorRole, PaymentStatus};
    use crate::store::{InMemoryLedger, InMemoryOrderRepository, OrderFilter, StoreError};
    use crate::domain::order::OrderItem;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BrokenLedger;

    #[async_trait]
    impl TrackingLedger for BrokenLedger {
        async fn append(&self, _entry: NewTrackingEntry) -> Result<TrackingEntry, StoreError> {
            Err(StoreError::Unavailable("ledger offline".into()))
        }

        async fn history(&self, _order_id: Uuid) -> Result<Vec<TrackingEntry>, StoreError> {
            Ok(Vec::new())
        }
    }

    /// Misses the first `misses` conditional updates as if another writer
    /// committed in between
    struct ContendedOrders {
        inner: Arc<InMemoryOrderRepository>,
        misses: AtomicUsize,
    }

    #[async_trait]
    impl OrderRepository for ContendedOrders {
        async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<(), StoreError> {
            self.inner.insert_order(order, items).await
        }

        async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
            self.inner.get_order(order_id).await
        }

        async fn get_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
            self.inner.get_items(order_id).await
        }

        async fn list_orders(&self, filter: OrderFilter, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
            self.inner.list_orders(filter, limit, offset).await
        }

        async fn update_if(&self, order: &Order, expected: Precondition) -> Result<bool, StoreError> {
            let missed = self
                .misses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if missed {
                return Ok(false);
            }
            self.inner.update_if(order, expected).await
        }
    }

    async fn handler_with(ledger: Arc<dyn TrackingLedger>) -> (OrderCommandHandler, Arc<InMemoryOrderRepository>, Order) {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order = sample_order();
        repo.insert_order(&order, &[]).await.unwrap();
        let handler = OrderCommandHandler::new(repo.clone(), ledger, Arc::new(Metrics::new().unwrap()));
        (handler, repo, order)
    }

    fn farmer_moves_to(to: OrderStatus) -> OrderCommand {
        OrderCommand::ChangeStatus {
            by: ActorRole::Farmer,
            to,
            notes: Some("packed".to_string()),
            location: Some("Farm gate".to_string()),
            tracking_number: None,
            tracking_url: None,
        }
    }

    #[tokio::test]
    async fn test_status_change_is_persisted_and_tracked() {
        let ledger = Arc::new(InMemoryLedger::new());
        let (handler, repo, order) = handler_with(ledger.clone()).await;

        let outcome = handler.handle(order.id, farmer_moves_to(OrderStatus::Confirmed)).await.unwrap();
        assert!(outcome.changed());
        assert_eq!(outcome.previous.status, OrderStatus::Pending);
        assert_eq!(outcome.order.status, OrderStatus::Confirmed);
        assert_eq!(outcome.tracking.len(), 1);
        assert_eq!(outcome.tracking[0].notes.as_deref(), Some("packed"));
        assert_eq!(outcome.tracking[0].location.as_deref(), Some("Farm gate"));

        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(ledger.history(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (handler, _, _) = handler_with(Arc::new(InMemoryLedger::new())).await;
        let missing = Uuid::new_v4();
        let result = handler.handle(missing, OrderCommand::Cancel { notes: None }).await;
        assert!(matches!(result, Err(OrderError::OrderNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_stale_command_loses_race() {
        let (handler, repo, order) = handler_with(Arc::new(InMemoryLedger::new())).await;

        // Another writer cancels after our load
        let stale = order.clone();
        let mut cancelled = order.clone();
        cancelled.status = OrderStatus::Cancelled;
        assert!(repo.update_if(&cancelled, Precondition::of(&order)).await.unwrap());

        let result = handler.handle_loaded(stale, farmer_moves_to(OrderStatus::Confirmed)).await;
        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition { from: OrderStatus::Cancelled, to: OrderStatus::Confirmed })
        ));
        assert_eq!(repo.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_stale_status_change_keeps_newer_assignment() {
        let (handler, repo, order) = handler_with(Arc::new(InMemoryLedger::new())).await;
        let stale = handler.load(order.id).await.unwrap();

        let transporter = Uuid::new_v4();
        handler
            .handle(
                order.id,
                OrderCommand::AssignTransporter {
                    transporter_id: transporter,
                    vehicle_id: Some("KDA 123X".to_string()),
                    estimated_delivery: None,
                },
            )
            .await
            .unwrap();

        // Same status as the stored row, but the copy predates the assignment
        let result = handler.handle_loaded(stale, farmer_moves_to(OrderStatus::Confirmed)).await;
        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition { from: OrderStatus::Pending, to: OrderStatus::Confirmed })
        ));

        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.transporter_id, Some(transporter));
        assert_eq!(stored.vehicle_id.as_deref(), Some("KDA 123X"));
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_handle_reloads_after_lost_race() {
        let inner = Arc::new(InMemoryOrderRepository::new());
        let order = sample_order();
        inner.insert_order(&order, &[]).await.unwrap();
        let orders = Arc::new(ContendedOrders { inner: inner.clone(), misses: AtomicUsize::new(1) });
        let handler = OrderCommandHandler::new(orders, Arc::new(InMemoryLedger::new()), Arc::new(Metrics::new().unwrap()));

        let outcome = handler.handle(order.id, farmer_moves_to(OrderStatus::Confirmed)).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Confirmed);
        assert_eq!(inner.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_handle_gives_up_on_contended_order() {
        let inner = Arc::new(InMemoryOrderRepository::new());
        let order = sample_order();
        inner.insert_order(&order, &[]).await.unwrap();
        let orders = Arc::new(ContendedOrders { inner: inner.clone(), misses: AtomicUsize::new(usize::MAX) });
        let handler = OrderCommandHandler::new(orders, Arc::new(InMemoryLedger::new()), Arc::new(Metrics::new().unwrap()));

        let result = handler.handle(order.id, farmer_moves_to(OrderStatus::Confirmed)).await;
        assert!(matches!(result, Err(OrderError::ConcurrentUpdate(id)) if id == order.id));
        assert_eq!(inner.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_undo_commit() {
        let (handler, repo, order) = handler_with(Arc::new(BrokenLedger)).await;

        let outcome = handler.handle(order.id, OrderCommand::Cancel { notes: None }).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Cancelled);
        assert!(outcome.tracking.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(repo.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_payment_events_write_no_tracking() {
        let ledger = Arc::new(InMemoryLedger::new());
        let (handler, _, order) = handler_with(ledger.clone()).await;

        let attempt_id = Uuid::new_v4();
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(30);
        handler
            .handle(order.id, OrderCommand::BeginPayment { attempt_id, expires_at })
            .await
            .unwrap();
        let outcome = handler
            .handle(order.id, OrderCommand::RecordPaymentSuccess { attempt_id, reference: "gw_1".to_string() })
            .await
            .unwrap();
        assert_eq!(outcome.order.payment_status, PaymentStatus::Paid);
        assert_eq!(outcome.order.version, 2);
        assert!(ledger.history(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_noop_command_skips_write() {
        let (handler, repo, order) = handler_with(Arc::new(InMemoryLedger::new())).await;
        handler.handle(order.id, farmer_moves_to(OrderStatus::Confirmed)).await.unwrap();
        let before = repo.get_order(order.id).await.unwrap().unwrap();

        let outcome = handler.handle(order.id, OrderCommand::ConfirmAfterPayment).await.unwrap();
        assert!(!outcome.changed());
        assert_eq!(repo.get_order(order.id).await.unwrap().unwrap(), before);
    }
}
