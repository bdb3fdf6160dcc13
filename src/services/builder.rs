use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::stock::StockCoordinator;
use crate::catalog::VendorDirectory;
use crate::domain::order::{
    LineRequest, Order, OrderError, OrderItem, OrderStatus, OrderView, PaymentMethod, PaymentStatus, ShippingInfo,
};
use crate::domain::pricing::{PricedOrder, PricingEngine};
use crate::ledger::{NewTrackingEntry, TrackingLedger};
use crate::metrics::Metrics;
use crate::store::{OrderRepository, StoreError};

// ============================================================================
// Order Aggregate Builder
// ============================================================================
//
// createOrder, in order:
//   1. order number
//   2. pricing & validation
//   3. stock reservation (all or nothing)
//   4. estimated delivery
//   5-6. order + item snapshots, one atomic insert
//   7. initial tracking entry (best-effort, surfaced as a warning)
//
// Any failure after step 3 releases the reserved stock.
//
// ============================================================================

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    pub items: Vec<LineRequest>,
}

/// A created order plus anything that went wrong after it was committed
#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    #[serde(flatten)]
    pub view: OrderView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// `ORD-YYYYMMDD-XXXXXXXX`, UTC date and 8 upper-case hex characters
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

pub struct OrderBuilder {
    pricing: PricingEngine,
    stock: Arc<StockCoordinator>,
    vendors: Arc<dyn VendorDirectory>,
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<dyn TrackingLedger>,
    metrics: Arc<Metrics>,
    lead_time: Duration,
}

impl OrderBuilder {
    pub fn new(
        pricing: PricingEngine,
        stock: Arc<StockCoordinator>,
        vendors: Arc<dyn VendorDirectory>,
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<dyn TrackingLedger>,
        metrics: Arc<Metrics>,
        lead_time: Duration,
    ) -> Self {
        Self {
            pricing,
            stock,
            vendors,
            orders,
            ledger,
            metrics,
            lead_time,
        }
    }

    pub async fn create_order(&self, buyer_id: Uuid, request: NewOrder) -> Result<CreatedOrder, OrderError> {
        match self.build(buyer_id, request).await {
            Ok(created) => {
                self.metrics.record_order_created();
                Ok(created)
            }
            Err(e) => {
                self.metrics.record_creation_failure(e.kind().as_str());
                tracing::warn!(buyer_id = %buyer_id, error = %e, "Order creation rejected");
                Err(e)
            }
        }
    }

    async fn build(&self, buyer_id: Uuid, request: NewOrder) -> Result<CreatedOrder, OrderError> {
        validate_shipping(&request.shipping)?;

        let now = Utc::now();
        let mut order_number = generate_order_number(now);

        let priced = self.pricing.price(buyer_id, &request.items, &request.shipping.city).await?;
        let vendor_id = self.vendors.vendor_for_farmer(priced.farmer_id).await?;

        let reserved: Vec<(Uuid, i32)> = priced
            .lines
            .iter()
            .map(|line| (line.product.id, line.quantity))
            .collect();
        self.stock.reserve_all(&reserved).await?;

        let order_id = Uuid::new_v4();
        let mut order = Order {
            id: order_id,
            order_number: order_number.clone(),
            buyer_id,
            farmer_id: priced.farmer_id,
            vendor_id,
            transporter_id: None,
            vehicle_id: None,
            totals: priced.totals,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            payment_reference: None,
            payment_claim: None,
            shipping: request.shipping,
            estimated_delivery: Some(now + self.lead_time),
            actual_delivery: None,
            tracking_number: None,
            tracking_url: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let items = item_snapshots(order_id, &priced, now);

        let mut attempt = 1;
        loop {
            match self.orders.insert_order(&order, &items).await {
                Ok(()) => break,
                Err(StoreError::Conflict(reason)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    tracing::warn!(
                        order_number = %order_number,
                        attempt = attempt,
                        reason = %reason,
                        "Order number collision, regenerating"
                    );
                    attempt += 1;
                    order_number = generate_order_number(now);
                    order.order_number = order_number.clone();
                }
                Err(e) => {
                    tracing::error!(order_id = %order_id, error = %e, "Failed to persist order, releasing stock");
                    self.stock.release_all(&reserved).await;
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            buyer_id = %buyer_id,
            farmer_id = %order.farmer_id,
            total = %order.totals.total_amount(),
            "Order created"
        );

        let mut warnings = Vec::new();
        let mut tracking = Vec::new();
        let entry = NewTrackingEntry::new(order.id, OrderStatus::Pending, "Order placed");
        match self.ledger.append(entry).await {
            Ok(stored) => tracking.push(stored),
            Err(e) => {
                self.metrics.record_ledger_failure();
                tracing::warn!(order_id = %order.id, error = %e, "Failed to append initial tracking entry");
                warnings.push("order was created but its initial tracking entry was not recorded".to_string());
            }
        }

        Ok(CreatedOrder {
            view: OrderView { order, items, tracking },
            warnings,
        })
    }
}

fn validate_shipping(shipping: &ShippingInfo) -> Result<(), OrderError> {
    if shipping.address.trim().is_empty() {
        return Err(OrderError::InvalidRequest("shipping address is required".to_string()));
    }
    if shipping.city.trim().is_empty() {
        return Err(OrderError::InvalidRequest("shipping city is required".to_string()));
    }
    Ok(())
}

fn item_snapshots(order_id: Uuid, priced: &PricedOrder, now: DateTime<Utc>) -> Vec<OrderItem> {
    priced
        .lines
        .iter()
        .map(|line| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: line.product.id,
            product_name: line.product.name.clone(),
            product_image: line.product.image.clone(),
            unit_price: line.product.price,
            unit: line.product.unit.clone(),
            quality_grade: line.product.quality_grade.clone(),
            organic: line.product.organic,
            harvest_date: line.product.harvest_date,
            quantity: line.quantity,
            total_price: line.line_total,
            created_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ListingStatus, ProductSnapshot};
    use crate::domain::money::Money;
    use crate::domain::pricing::PricingPolicy;
    use crate::ledger::TrackingEntry;
    use crate::store::{
        InMemoryCatalog, InMemoryLedger, InMemoryOrderRepository, InMemoryVendorDirectory, OrderFilter, Precondition,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

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

    /// Refuses every insert with the error `reject` builds
    struct RejectingOrders {
        reject: fn() -> StoreError,
        inserts: AtomicU32,
    }

    impl RejectingOrders {
        fn new(reject: fn() -> StoreError) -> Self {
            Self { reject, inserts: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl OrderRepository for RejectingOrders {
        async fn insert_order(&self, _order: &Order, _items: &[OrderItem]) -> Result<(), StoreError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Err((self.reject)())
        }

        async fn get_order(&self, _order_id: Uuid) -> Result<Option<Order>, StoreError> {
            Ok(None)
        }

        async fn get_items(&self, _order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
            Ok(Vec::new())
        }

        async fn list_orders(&self, _filter: OrderFilter, _limit: i64, _offset: i64) -> Result<Vec<Order>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_if(&self, _order: &Order, _expected: Precondition) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    struct Fixture {
        builder: OrderBuilder,
        catalog: Arc<InMemoryCatalog>,
        vendors: Arc<InMemoryVendorDirectory>,
        orders: Arc<InMemoryOrderRepository>,
        product: ProductSnapshot,
    }

    async fn fixture(ledger: Arc<dyn TrackingLedger>) -> Fixture {
        let orders = Arc::new(InMemoryOrderRepository::new());
        fixture_with(ledger, orders.clone(), orders).await
    }

    async fn fixture_with(
        ledger: Arc<dyn TrackingLedger>,
        store: Arc<dyn OrderRepository>,
        orders: Arc<InMemoryOrderRepository>,
    ) -> Fixture {
        let catalog = Arc::new(InMemoryCatalog::new());
        let product = ProductSnapshot {
            id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            name: "Avocados".to_string(),
            image: Some("avocado.png".to_string()),
            price: Money::from_major(250),
            unit: "crate".to_string(),
            available_stock: 10,
            status: ListingStatus::Available,
            quality_grade: Some("A".to_string()),
            organic: true,
            harvest_date: None,
        };
        catalog.upsert_product(product.clone()).await;

        let metrics = Arc::new(Metrics::new().unwrap());
        let vendors = Arc::new(InMemoryVendorDirectory::new());
        let builder = OrderBuilder::new(
            PricingEngine::new(catalog.clone(), PricingPolicy::default()),
            Arc::new(StockCoordinator::new(catalog.clone(), metrics.clone())),
            vendors.clone(),
            store,
            ledger,
            metrics,
            Duration::days(3),
        );

        Fixture { builder, catalog, vendors, orders, product }
    }

    fn request(product_id: Uuid, quantity: i32) -> NewOrder {
        NewOrder {
            shipping: ShippingInfo {
                address: "4 Kenyatta Avenue".to_string(),
                city: "Nakuru".to_string(),
                state: "Rift Valley".to_string(),
                zip: "20100".to_string(),
                notes: None,
            },
            payment_method: PaymentMethod::MobileMoney,
            items: vec![LineRequest { product_id, quantity }],
        }
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc::now();
        let number = generate_order_number(now);
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], now.format("%Y%m%d").to_string());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_create_order_reserves_stock_and_snapshots_items() {
        let f = fixture(Arc::new(InMemoryLedger::new())).await;
        let vendor = Uuid::new_v4();
        f.vendors.link(f.product.farmer_id, vendor).await;

        let buyer = Uuid::new_v4();
        let created = f.builder.create_order(buyer, request(f.product.id, 4)).await.unwrap();
        let order = &created.view.order;

        assert!(created.warnings.is_empty());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.vendor_id, Some(vendor));
        assert_eq!(order.totals.total_amount(), Money::from_major(1150));
        assert_eq!(order.estimated_delivery, Some(order.created_at + Duration::days(3)));
        assert_eq!(f.catalog.available_stock(f.product.id).await, Some(6));

        assert_eq!(created.view.items.len(), 1);
        assert_eq!(created.view.items[0].unit_price, Money::from_major(250));
        assert_eq!(created.view.items[0].total_price, Money::from_major(1000));
        assert_eq!(created.view.tracking.len(), 1);
        assert_eq!(created.view.tracking[0].status, OrderStatus::Pending);

        // Later catalog edits must not reach the stored snapshot
        f.catalog.set_price(f.product.id, Money::from_major(999)).await;
        let items = f.orders.get_items(order.id).await.unwrap();
        assert_eq!(items[0].unit_price, Money::from_major(250));
    }

    #[tokio::test]
    async fn test_missing_vendor_mapping_leaves_vendor_empty() {
        let f = fixture(Arc::new(InMemoryLedger::new())).await;
        let created = f.builder.create_order(Uuid::new_v4(), request(f.product.id, 1)).await.unwrap();
        assert_eq!(created.view.order.vendor_id, None);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_a_warning() {
        let f = fixture(Arc::new(BrokenLedger)).await;
        let created = f.builder.create_order(Uuid::new_v4(), request(f.product.id, 2)).await.unwrap();

        assert_eq!(created.warnings.len(), 1);
        assert!(created.view.tracking.is_empty());
        assert!(f.orders.get_order(created.view.order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_blank_address_rejected_before_reserving() {
        let f = fixture(Arc::new(InMemoryLedger::new())).await;
        let mut bad = request(f.product.id, 2);
        bad.shipping.address = "  ".to_string();

        let result = f.builder.create_order(Uuid::new_v4(), bad).await;
        assert!(matches!(result, Err(OrderError::InvalidRequest(_))));
        assert_eq!(f.catalog.available_stock(f.product.id).await, Some(10));
    }

    #[tokio::test]
    async fn test_validation_failure_leaves_stock_untouched() {
        let f = fixture(Arc::new(InMemoryLedger::new())).await;
        let result = f.builder.create_order(Uuid::new_v4(), request(f.product.id, 11)).await;

        assert!(matches!(result, Err(OrderError::InsufficientStock { .. })));
        assert_eq!(f.catalog.available_stock(f.product.id).await, Some(10));
    }

    #[tokio::test]
    async fn test_insert_failure_releases_reserved_stock() {
        let store = Arc::new(RejectingOrders::new(|| StoreError::Unavailable("primary went away".into())));
        let f = fixture_with(Arc::new(InMemoryLedger::new()), store.clone(), Arc::new(InMemoryOrderRepository::new())).await;

        let result = f.builder.create_order(Uuid::new_v4(), request(f.product.id, 4)).await;
        assert!(matches!(result, Err(OrderError::Storage(StoreError::Unavailable(_)))));
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(f.catalog.available_stock(f.product.id).await, Some(10));
    }

    #[tokio::test]
    async fn test_repeated_number_collisions_release_reserved_stock() {
        let store = Arc::new(RejectingOrders::new(|| StoreError::Conflict("order_number taken".into())));
        let f = fixture_with(Arc::new(InMemoryLedger::new()), store.clone(), Arc::new(InMemoryOrderRepository::new())).await;

        let result = f.builder.create_order(Uuid::new_v4(), request(f.product.id, 4)).await;
        assert!(matches!(result, Err(OrderError::Storage(StoreError::Conflict(_)))));
        assert_eq!(store.inserts.load(Ordering::SeqCst), ORDER_NUMBER_ATTEMPTS);
        assert_eq!(f.catalog.available_stock(f.product.id).await, Some(10));
    }
}
