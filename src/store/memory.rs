use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{OrderFilter, OrderRepository, Precondition, StoreError};
use crate::catalog::{ProductCatalog, ProductSnapshot, Reservation, VendorDirectory};
use crate::domain::order::{Order, OrderItem};
use crate::ledger::{NewTrackingEntry, TrackingEntry, TrackingLedger};

// ============================================================================
// In-Memory Stores
// ============================================================================
//
// Same contracts and the same atomicity as the PostgreSQL store: each
// conditional write happens under a single write-lock acquisition, so the
// check and the mutation cannot interleave with another caller.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<Uuid, ProductSnapshot>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_product(&self, product: ProductSnapshot) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn available_stock(&self, product_id: Uuid) -> Option<i32> {
        self.products.read().await.get(&product_id).map(|p| p.available_stock)
    }

    /// Catalog-side price edit, used to show item snapshots do not follow it
    pub async fn set_price(&self, product_id: Uuid, price: crate::domain::money::Money) {
        if let Some(product) = self.products.write().await.get_mut(&product_id) {
            product.price = price;
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, StoreError> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }

    async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> Result<Reservation, StoreError> {
        let mut products = self.products.write().await;

        match products.get_mut(&product_id) {
            Some(product) if product.available_stock >= quantity => {
                product.available_stock -= quantity;
                Ok(Reservation::Reserved)
            }
            _ => Ok(Reservation::Insufficient),
        }
    }

    async fn release_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), StoreError> {
        let mut products = self.products.write().await;

        match products.get_mut(&product_id) {
            Some(product) => {
                product.available_stock = product.available_stock.saturating_add(quantity);
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("product {} no longer exists", product_id))),
        }
    }
}

#[derive(Default)]
struct OrderTables {
    orders: HashMap<Uuid, Order>,
    items: HashMap<Uuid, Vec<OrderItem>>,
    order_numbers: HashSet<String>,
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    tables: RwLock<OrderTables>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if tables.order_numbers.contains(&order.order_number) {
            return Err(StoreError::Conflict(format!(
                "order number {} already exists",
                order.order_number
            )));
        }
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }

        tables.order_numbers.insert(order.order_number.clone());
        tables.orders.insert(order.id, order.clone());
        tables.items.insert(order.id, items.to_vec());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn get_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_orders(&self, filter: OrderFilter, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.read().await;

        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_if(&self, order: &Order, expected: Precondition) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;

        match tables.orders.get_mut(&order.id) {
            Some(stored) if Precondition::of(stored) == expected => {
                *stored = order.clone();
                stored.version = expected.version + 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
struct LedgerTables {
    next_id: i64,
    entries: HashMap<Uuid, Vec<TrackingEntry>>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    tables: Mutex<LedgerTables>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackingLedger for InMemoryLedger {
    async fn append(&self, entry: NewTrackingEntry) -> Result<TrackingEntry, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_id += 1;
        let id = tables.next_id;

        let history = tables.entries.entry(entry.order_id).or_default();
        // Clock skew must not reorder history
        let created_at = match history.last() {
            Some(last) if last.created_at > Utc::now() => last.created_at,
            _ => Utc::now(),
        };

        let stored = TrackingEntry {
            id,
            order_id: entry.order_id,
            status: entry.status,
            location: entry.location,
            description: entry.description,
            notes: entry.notes,
            created_at,
        };
        history.push(stored.clone());
        Ok(stored)
    }

    async fn history(&self, order_id: Uuid) -> Result<Vec<TrackingEntry>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .entries
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryVendorDirectory {
    vendors: RwLock<HashMap<Uuid, Uuid>>,
}

impl InMemoryVendorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn link(&self, farmer_id: Uuid, vendor_id: Uuid) {
        self.vendors.write().await.insert(farmer_id, vendor_id);
    }
}

#[async_trait]
impl VendorDirectory for InMemoryVendorDirectory {
    async fn vendor_for_farmer(&self, farmer_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(self.vendors.read().await.get(&farmer_id).copied())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
