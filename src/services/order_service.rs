use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::builder::{CreatedOrder, NewOrder, OrderBuilder};
use super::payment::PaymentCoordinator;
use super::stock::StockCoordinator;
use crate::catalog::{ProductCatalog, VendorDirectory};
use crate::domain::authorization;
use crate::domain::order::{
    Actor, ActorRole, Order, OrderCommand, OrderCommandHandler, OrderError, OrderStatus, OrderView,
    ParseEnumError, PaymentStatus,
};
use crate::domain::pricing::{PricingEngine, PricingPolicy};
use crate::gateway::{PaymentDetails, PaymentGateway};
use crate::ledger::{TrackingEntry, TrackingLedger};
use crate::metrics::Metrics;
use crate::store::{OrderFilter, OrderRepository};
use crate::utils::CircuitBreakerConfig;

// ============================================================================
// Order Service - transport-agnostic facade
// ============================================================================
//
// Every externally visible operation enters here. Each one checks the
// authorization policy before anything reaches the builder, the command
// handler or the payment coordinator.
//
// ============================================================================

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Backing stores, shared by every component
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn ProductCatalog>,
    pub vendors: Arc<dyn VendorDirectory>,
    pub orders: Arc<dyn OrderRepository>,
    pub ledger: Arc<dyn TrackingLedger>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub pricing: PricingPolicy,
    pub delivery_lead_time: chrono::Duration,
    pub payment_timeout: Duration,
    pub payment_breaker: CircuitBreakerConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            delivery_lead_time: chrono::Duration::days(3),
            payment_timeout: Duration::from_secs(10),
            payment_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListScope {
    Buyer,
    Farmer,
    Transporter,
    All,
}

impl ListScope {
    pub fn default_for(role: ActorRole) -> Option<Self> {
        match role {
            ActorRole::Buyer => Some(ListScope::Buyer),
            ActorRole::Farmer => Some(ListScope::Farmer),
            ActorRole::Transporter => Some(ListScope::Transporter),
            ActorRole::Admin => Some(ListScope::All),
            ActorRole::Vendor => None,
        }
    }
}

impl FromStr for ListScope {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(ListScope::Buyer),
            "farmer" => Ok(ListScope::Farmer),
            "transporter" => Ok(ListScope::Transporter),
            "all" => Ok(ListScope::All),
            other => Err(ParseEnumError { kind: "list scope", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub scope: Option<ListScope>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListQuery {
    /// (limit, offset) with `page` starting at 1 and the size clamped
    pub fn window(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1) as i64;
        let size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as i64;
        (size, (page - 1) * size)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub notes: Option<String>,
    /// Where the goods are, recorded on the tracking entry
    pub location: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransporterAssignment {
    pub transporter_id: Uuid,
    pub vehicle_id: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store_ok: bool,
    pub payment_circuit: &'static str,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.store_ok
    }
}

pub struct OrderService {
    stores: Stores,
    handler: Arc<OrderCommandHandler>,
    builder: OrderBuilder,
    payments: PaymentCoordinator,
    stock: Arc<StockCoordinator>,
}

impl OrderService {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, settings: EngineSettings, metrics: Arc<Metrics>) -> Self {
        let handler = Arc::new(OrderCommandHandler::new(
            stores.orders.clone(),
            stores.ledger.clone(),
            metrics.clone(),
        ));
        let stock = Arc::new(StockCoordinator::new(stores.catalog.clone(), metrics.clone()));
        let builder = OrderBuilder::new(
            PricingEngine::new(stores.catalog.clone(), settings.pricing),
            stock.clone(),
            stores.vendors.clone(),
            stores.orders.clone(),
            stores.ledger.clone(),
            metrics.clone(),
            settings.delivery_lead_time,
        );
        let payments = PaymentCoordinator::new(
            handler.clone(),
            gateway,
            settings.payment_breaker,
            settings.payment_timeout,
            metrics,
        );

        Self {
            stores,
            handler,
            builder,
            payments,
            stock,
        }
    }

    pub async fn create_order(&self, actor: &Actor, request: NewOrder) -> Result<CreatedOrder, OrderError> {
        if actor.role != ActorRole::Buyer {
            return Err(OrderError::unauthorized("only buyers may place orders"));
        }
        self.builder.create_order(actor.id, request).await
    }

    pub async fn get_order(&self, order_id: Uuid, actor: &Actor) -> Result<OrderView, OrderError> {
        let order = self.handler.load(order_id).await?;
        if !authorization::can_read(actor, &order) {
            return Err(OrderError::unauthorized("not a party to this order"));
        }
        self.view_of(order).await
    }

    pub async fn list_orders(&self, actor: &Actor, query: &ListQuery) -> Result<Vec<OrderView>, OrderError> {
        let scope = match query.scope.or_else(|| ListScope::default_for(actor.role)) {
            Some(scope) => scope,
            None => return Err(OrderError::unauthorized("role has no order listing")),
        };
        let filter = filter_for(actor, scope)?;
        let (limit, offset) = query.window();

        let orders = self.stores.orders.list_orders(filter, limit, offset).await?;
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(self.view_of(order).await?);
        }
        Ok(views)
    }

    pub async fn update_status(&self, order_id: Uuid, actor: &Actor, update: StatusUpdate) -> Result<Order, OrderError> {
        let order = self.handler.load(order_id).await?;
        if !authorization::can_modify(actor, &order) {
            return Err(OrderError::unauthorized("not allowed to modify this order"));
        }

        if update.status == OrderStatus::Cancelled {
            return self.cancel_loaded(order, actor, update.notes).await;
        }

        let command = OrderCommand::ChangeStatus {
            by: actor.role,
            to: update.status,
            notes: update.notes,
            location: update.location,
            tracking_number: update.tracking_number,
            tracking_url: update.tracking_url,
        };
        Ok(self.handler.handle_loaded(order, command).await?.order)
    }

    pub async fn assign_transporter(
        &self,
        order_id: Uuid,
        actor: &Actor,
        assignment: TransporterAssignment,
    ) -> Result<Order, OrderError> {
        let order = self.handler.load(order_id).await?;
        if !authorization::can_assign_transporter(actor, &order) {
            return Err(OrderError::unauthorized("only the order's farmer may assign a transporter"));
        }

        let command = OrderCommand::AssignTransporter {
            transporter_id: assignment.transporter_id,
            vehicle_id: assignment.vehicle_id,
            estimated_delivery: assignment.estimated_delivery,
        };
        let outcome = self.handler.handle_loaded(order, command).await?;

        tracing::info!(
            order_id = %order_id,
            transporter_id = %assignment.transporter_id,
            "Transporter assigned"
        );
        Ok(outcome.order)
    }

    pub async fn pay(&self, order_id: Uuid, actor: &Actor, details: PaymentDetails) -> Result<Order, OrderError> {
        self.payments.process(order_id, actor.id, details).await
    }

    pub async fn cancel(&self, order_id: Uuid, actor: &Actor, notes: Option<String>) -> Result<Order, OrderError> {
        let order = self.handler.load(order_id).await?;
        if !authorization::can_modify(actor, &order) {
            return Err(OrderError::unauthorized("not allowed to cancel this order"));
        }
        self.cancel_loaded(order, actor, notes).await
    }

    pub async fn tracking_history(&self, order_id: Uuid, actor: &Actor) -> Result<Vec<TrackingEntry>, OrderError> {
        let order = self.handler.load(order_id).await?;
        if !authorization::can_read(actor, &order) {
            return Err(OrderError::unauthorized("not a party to this order"));
        }
        Ok(self.stores.ledger.history(order_id).await?)
    }

    pub async fn health(&self) -> HealthReport {
        let store_ok = match self.stores.orders.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Store health check failed");
                false
            }
        };
        let payment_circuit = self.payments.breaker().state().await.as_str();
        HealthReport { store_ok, payment_circuit }
    }

    /// Cancel, then refund a settled payment, then put the stock back.
    /// Refund and release happen after the cancellation is committed and
    /// their failures are logged, not returned.
    async fn cancel_loaded(&self, order: Order, actor: &Actor, notes: Option<String>) -> Result<Order, OrderError> {
        let order_id = order.id;
        let outcome = self.handler.handle_loaded(order, OrderCommand::Cancel { notes }).await?;
        let mut current = outcome.order;

        tracing::info!(
            order_id = %order_id,
            actor_id = %actor.id,
            role = actor.role.as_str(),
            from = %outcome.previous.status,
            "Order cancelled"
        );

        if outcome.previous.payment_status == PaymentStatus::Paid {
            match self.payments.refund(order_id).await {
                Ok(refunded) => current = refunded,
                Err(e) => tracing::error!(order_id = %order_id, error = %e, "Refund after cancellation failed"),
            }
        }

        match self.stores.orders.get_items(order_id).await {
            Ok(items) => {
                let lines: Vec<(Uuid, i32)> = items.iter().map(|i| (i.product_id, i.quantity)).collect();
                let failed = self.stock.release_all(&lines).await;
                if failed > 0 {
                    tracing::error!(order_id = %order_id, failed = failed, "Some stock was not released");
                }
            }
            Err(e) => tracing::error!(order_id = %order_id, error = %e, "Could not load items to release stock"),
        }

        Ok(current)
    }

    async fn view_of(&self, order: Order) -> Result<OrderView, OrderError> {
        let items = self.stores.orders.get_items(order.id).await?;
        let tracking = self.stores.ledger.history(order.id).await?;
        Ok(OrderView { order, items, tracking })
    }
}

fn filter_for(actor: &Actor, scope: ListScope) -> Result<OrderFilter, OrderError> {
    let allowed = actor.role == ActorRole::Admin
        || matches!(
            (actor.role, scope),
            (ActorRole::Buyer, ListScope::Buyer)
                | (ActorRole::Farmer, ListScope::Farmer)
                | (ActorRole::Transporter, ListScope::Transporter)
        );
    if !allowed {
        return Err(OrderError::unauthorized(format!(
            "role {} may not list {:?} orders",
            actor.role.as_str(),
            scope
        )));
    }

    Ok(match scope {
        ListScope::Buyer => OrderFilter::Buyer(actor.id),
        ListScope::Farmer => OrderFilter::Farmer(actor.id),
        ListScope::Transporter => OrderFilter::Transporter(actor.id),
        ListScope::All => OrderFilter::All,
    })
}

// ============================================================================
// Scenario Tests
// ============================================================================
