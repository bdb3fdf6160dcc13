use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::{OrderFilter, OrderRepository, Precondition, StoreError};
use crate::catalog::{ListingStatus, ProductCatalog, ProductSnapshot, Reservation, VendorDirectory};
use crate::domain::money::Money;
use crate::domain::order::{
    Order, OrderItem, OrderStatus, OrderTotals, ParseEnumError, PaymentClaim, PaymentMethod, PaymentStatus,
    ShippingInfo,
};
use crate::ledger::{NewTrackingEntry, TrackingEntry, TrackingLedger};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Responsibilities:
// 1. Conditional stock decrement (single UPDATE, affected-row check)
// 2. Order + item insert in one transaction
// 3. Order updates conditioned on the row version read at load time
// 4. Append-only tracking rows, ordered by (created_at, id)
//
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn parse<T: FromStr<Err = ParseEnumError>>(value: &str) -> Result<T, StoreError> {
    value.parse::<T>().map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(err),
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    farmer_id: Uuid,
    name: String,
    image: Option<String>,
    price_minor: i64,
    unit: String,
    available_stock: i32,
    status: String,
    quality_grade: Option<String>,
    organic: bool,
    harvest_date: Option<NaiveDate>,
}

impl TryFrom<ProductRow> for ProductSnapshot {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(ProductSnapshot {
            id: row.id,
            farmer_id: row.farmer_id,
            name: row.name,
            image: row.image,
            price: Money::from_minor(row.price_minor),
            unit: row.unit,
            available_stock: row.available_stock,
            status: parse::<ListingStatus>(&row.status)?,
            quality_grade: row.quality_grade,
            organic: row.organic,
            harvest_date: row.harvest_date,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    buyer_id: Uuid,
    farmer_id: Uuid,
    vendor_id: Option<Uuid>,
    transporter_id: Option<Uuid>,
    vehicle_id: Option<String>,
    sub_total: i64,
    tax_amount: i64,
    shipping_cost: i64,
    discount_amount: i64,
    total_amount: i64,
    status: String,
    payment_status: String,
    payment_method: String,
    payment_reference: Option<String>,
    payment_attempt_id: Option<Uuid>,
    payment_claim_expires_at: Option<DateTime<Utc>>,
    shipping_address: String,
    shipping_city: String,
    shipping_state: String,
    shipping_zip: String,
    shipping_notes: Option<String>,
    estimated_delivery: Option<DateTime<Utc>>,
    actual_delivery: Option<DateTime<Utc>>,
    tracking_number: Option<String>,
    tracking_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let totals = OrderTotals::new(
            Money::from_minor(row.sub_total),
            Money::from_minor(row.tax_amount),
            Money::from_minor(row.shipping_cost),
            Money::from_minor(row.discount_amount),
        );
        if totals.total_amount().minor_units() != row.total_amount {
            return Err(StoreError::Corrupt(format!(
                "order {} total {} does not reconcile with its components",
                row.id, row.total_amount
            )));
        }

        let payment_claim = match (row.payment_attempt_id, row.payment_claim_expires_at) {
            (Some(attempt_id), Some(expires_at)) => Some(PaymentClaim { attempt_id, expires_at }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "order {} has a partial payment claim",
                    row.id
                )))
            }
        };

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            buyer_id: row.buyer_id,
            farmer_id: row.farmer_id,
            vendor_id: row.vendor_id,
            transporter_id: row.transporter_id,
            vehicle_id: row.vehicle_id,
            totals,
            status: parse::<OrderStatus>(&row.status)?,
            payment_status: parse::<PaymentStatus>(&row.payment_status)?,
            payment_method: parse::<PaymentMethod>(&row.payment_method)?,
            payment_reference: row.payment_reference,
            payment_claim,
            shipping: ShippingInfo {
                address: row.shipping_address,
                city: row.shipping_city,
                state: row.shipping_state,
                zip: row.shipping_zip,
                notes: row.shipping_notes,
            },
            estimated_delivery: row.estimated_delivery,
            actual_delivery: row.actual_delivery,
            tracking_number: row.tracking_number,
            tracking_url: row.tracking_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    product_image: Option<String>,
    unit_price: i64,
    unit: String,
    quality_grade: Option<String>,
    organic: bool,
    harvest_date: Option<NaiveDate>,
    quantity: i32,
    total_price: i64,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_image: row.product_image,
            unit_price: Money::from_minor(row.unit_price),
            unit: row.unit,
            quality_grade: row.quality_grade,
            organic: row.organic,
            harvest_date: row.harvest_date,
            quantity: row.quantity,
            total_price: Money::from_minor(row.total_price),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct TrackingRow {
    id: i64,
    order_id: Uuid,
    status: String,
    location: Option<String>,
    description: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TrackingRow> for TrackingEntry {
    type Error = StoreError;

    fn try_from(row: TrackingRow) -> Result<Self, Self::Error> {
        Ok(TrackingEntry {
            id: row.id,
            order_id: row.order_id,
            status: parse::<OrderStatus>(&row.status)?,
            location: row.location,
            description: row.description,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, order_number, buyer_id, farmer_id, vendor_id, transporter_id, vehicle_id, \
     sub_total, tax_amount, shipping_cost, discount_amount, total_amount, \
     status, payment_status, payment_method, payment_reference, payment_attempt_id, payment_claim_expires_at, \
     shipping_address, shipping_city, shipping_state, shipping_zip, shipping_notes, \
     estimated_delivery, actual_delivery, tracking_number, tracking_url, created_at, updated_at, version";

// ============================================================================
// Catalog
// ============================================================================

#[async_trait]
impl ProductCatalog for PgStore {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, farmer_id, name, image, price_minor, unit, available_stock, status,
                    quality_grade, organic, harvest_date
             FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProductSnapshot::try_from).transpose()
    }

    async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> Result<Reservation, StoreError> {
        let result = sqlx::query(
            "UPDATE products
             SET available_stock = available_stock - $2
             WHERE id = $1 AND available_stock >= $2",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(Reservation::Reserved)
        } else {
            Ok(Reservation::Insufficient)
        }
    }

    async fn release_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET available_stock = available_stock + $2 WHERE id = $1",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("product {} no longer exists", product_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl VendorDirectory for PgStore {
    async fn vendor_for_farmer(&self, farmer_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let vendor = sqlx::query_scalar::<_, Uuid>("SELECT vendor_id FROM farmer_vendors WHERE farmer_id = $1")
            .bind(farmer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(vendor)
    }
}

// ============================================================================
// Orders
// ============================================================================

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (
                id, order_number, buyer_id, farmer_id, vendor_id, transporter_id, vehicle_id,
                sub_total, tax_amount, shipping_cost, discount_amount, total_amount,
                status, payment_status, payment_method, payment_reference,
                shipping_address, shipping_city, shipping_state, shipping_zip, shipping_notes,
                estimated_delivery, actual_delivery, tracking_number, tracking_url,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.buyer_id)
        .bind(order.farmer_id)
        .bind(order.vendor_id)
        .bind(order.transporter_id)
        .bind(order.vehicle_id.as_deref())
        .bind(order.totals.sub_total().minor_units())
        .bind(order.totals.tax_amount().minor_units())
        .bind(order.totals.shipping_cost().minor_units())
        .bind(order.totals.discount_amount().minor_units())
        .bind(order.totals.total_amount().minor_units())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payment_reference.as_deref())
        .bind(&order.shipping.address)
        .bind(&order.shipping.city)
        .bind(&order.shipping.state)
        .bind(&order.shipping.zip)
        .bind(order.shipping.notes.as_deref())
        .bind(order.estimated_delivery)
        .bind(order.actual_delivery)
        .bind(order.tracking_number.as_deref())
        .bind(order.tracking_url.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        for item in items {
            sqlx::query(
                "INSERT INTO order_items (
                    id, order_id, product_id, product_name, product_image, unit_price, unit,
                    quality_grade, organic, harvest_date, quantity, total_price, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.product_image.as_deref())
            .bind(item.unit_price.minor_units())
            .bind(&item.unit)
            .bind(item.quality_grade.as_deref())
            .bind(item.organic)
            .bind(item.harvest_date)
            .bind(item.quantity)
            .bind(item.total_price.minor_units())
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_id = %order.id,
            order_number = %order.order_number,
            item_count = items.len(),
            "Inserted order with items"
        );
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn get_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, product_name, product_image, unit_price, unit,
                    quality_grade, organic, harvest_date, quantity, total_price, created_at
             FROM order_items WHERE order_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn list_orders(&self, filter: OrderFilter, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError> {
        let (clause, party) = match filter {
            OrderFilter::Buyer(id) => ("WHERE buyer_id = $3", Some(id)),
            OrderFilter::Farmer(id) => ("WHERE farmer_id = $3", Some(id)),
            OrderFilter::Transporter(id) => ("WHERE transporter_id = $3", Some(id)),
            OrderFilter::All => ("", None),
        };

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders {clause}
             ORDER BY created_at DESC, id DESC
             LIMIT $1 OFFSET $2"
        );

        let mut query = sqlx::query_as::<_, OrderRow>(&sql).bind(limit).bind(offset);
        if let Some(id) = party {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn update_if(&self, order: &Order, expected: Precondition) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET
                transporter_id = $2,
                vehicle_id = $3,
                status = $4,
                payment_status = $5,
                payment_reference = $6,
                payment_attempt_id = $7,
                payment_claim_expires_at = $8,
                estimated_delivery = $9,
                actual_delivery = $10,
                tracking_number = $11,
                tracking_url = $12,
                updated_at = $13,
                version = version + 1
             WHERE id = $1 AND version = $14",
        )
        .bind(order.id)
        .bind(order.transporter_id)
        .bind(order.vehicle_id.as_deref())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_reference.as_deref())
        .bind(order.payment_claim.map(|claim| claim.attempt_id))
        .bind(order.payment_claim.map(|claim| claim.expires_at))
        .bind(order.estimated_delivery)
        .bind(order.actual_delivery)
        .bind(order.tracking_number.as_deref())
        .bind(order.tracking_url.as_deref())
        .bind(order.updated_at)
        .bind(expected.version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.ping().await
    }
}

// ============================================================================
// Tracking Ledger
// ============================================================================

#[async_trait]
impl TrackingLedger for PgStore {
    async fn append(&self, entry: NewTrackingEntry) -> Result<TrackingEntry, StoreError> {
        let row = sqlx::query_as::<_, TrackingRow>(
            "INSERT INTO order_tracking (order_id, status, location, description, notes, created_at)
             VALUES (
                $1, $2, $3, $4, $5,
                GREATEST(now(), COALESCE(
                    (SELECT max(created_at) FROM order_tracking WHERE order_id = $1),
                    now()
                ))
             )
             RETURNING id, order_id, status, location, description, notes, created_at",
        )
        .bind(entry.order_id)
        .bind(entry.status.as_str())
        .bind(entry.location.as_deref())
        .bind(&entry.description)
        .bind(entry.notes.as_deref())
        .fetch_one(&self.pool)
        .await?;

        TrackingEntry::try_from(row)
    }

    async fn history(&self, order_id: Uuid) -> Result<Vec<TrackingEntry>, StoreError> {
        let rows = sqlx::query_as::<_, TrackingRow>(
            "SELECT id, order_id, status, location, description, notes, created_at
             FROM order_tracking WHERE order_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrackingEntry::try_from).collect()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Query execution needs a live PostgreSQL instance; these cover the row
// mapping that guards against corrupt records.
//
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn order_row(total_amount: i64, status: &str) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            id: Uuid::new_v4(),
            order_number: "ORD-20260101-00000001".to_string(),
            buyer_id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            vendor_id: None,
            transporter_id: None,
            vehicle_id: None,
            sub_total: 100_000,
            tax_amount: 10_000,
            shipping_cost: 5_000,
            discount_amount: 0,
            total_amount,
            status: status.to_string(),
            payment_status: "pending".to_string(),
            payment_method: "mobile_money".to_string(),
            payment_reference: None,
            payment_attempt_id: None,
            payment_claim_expires_at: None,
            shipping_address: "Plot 4".to_string(),
            shipping_city: "Eldoret".to_string(),
            shipping_state: "Uasin Gishu".to_string(),
            shipping_zip: "30100".to_string(),
            shipping_notes: None,
            estimated_delivery: None,
            actual_delivery: None,
            tracking_number: None,
            tracking_url: None,
            created_at: now,
            updated_at: now,
            version: 3,
        }
    }

    #[test]
    fn test_order_row_maps_enums_and_totals() {
        let order = Order::try_from(order_row(115_000, "in_transit")).unwrap();
        assert_eq!(order.status, OrderStatus::InTransit);
        assert_eq!(order.payment_method, PaymentMethod::MobileMoney);
        assert_eq!(order.totals.total_amount(), Money::from_minor(115_000));
        assert_eq!(order.version, 3);
        assert!(order.payment_claim.is_none());
    }

    #[test]
    fn test_payment_claim_columns() {
        let mut row = order_row(115_000, "pending");
        let attempt_id = Uuid::new_v4();
        row.payment_attempt_id = Some(attempt_id);
        row.payment_claim_expires_at = Some(Utc::now());
        let order = Order::try_from(row).unwrap();
        assert_eq!(order.payment_claim.map(|c| c.attempt_id), Some(attempt_id));

        let mut partial = order_row(115_000, "pending");
        partial.payment_attempt_id = Some(attempt_id);
        assert!(matches!(Order::try_from(partial), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_unreconciled_total_is_corrupt() {
        let result = Order::try_from(order_row(999, "pending"));
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let result = Order::try_from(order_row(115_000, "lost"));
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
