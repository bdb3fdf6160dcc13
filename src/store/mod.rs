// ============================================================================
// Persistence Layer
// ============================================================================
//
// Store contracts consumed by the order engine plus two implementations:
// - memory/   - async-locked in-process store (tests, local runs)
// - postgres/ - sqlx/PostgreSQL store (production)
//
// Every mutation is conditional: stock decrements are guarded by the
// available quantity and order updates by the row version.
//
// ============================================================================

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::{Order, OrderItem};
use crate::utils::IsTransient;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryCatalog, InMemoryLedger, InMemoryOrderRepository, InMemoryVendorDirectory};
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StoreError::Unavailable(_) => true,
            StoreError::Migration(_) | StoreError::Conflict(_) | StoreError::Corrupt(_) => false,
        }
    }
}

/// The row version an update is conditioned on. Any committed write bumps
/// the version, so a writer holding an older copy always misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precondition {
    pub version: i64,
}

impl Precondition {
    pub fn of(order: &Order) -> Self {
        Self { version: order.version }
    }
}

/// Which orders a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    Buyer(Uuid),
    Farmer(Uuid),
    Transporter(Uuid),
    All,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderFilter::Buyer(id) => order.buyer_id == *id,
            OrderFilter::Farmer(id) => order.farmer_id == *id,
            OrderFilter::Transporter(id) => order.transporter_id == Some(*id),
            OrderFilter::All => true,
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order together with its items. Fails with
    /// `StoreError::Conflict` when the order number is already taken.
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<(), StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn get_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;

    /// Newest first
    async fn list_orders(&self, filter: OrderFilter, limit: i64, offset: i64) -> Result<Vec<Order>, StoreError>;

    /// Write the mutable fields of `order` only if the stored row still
    /// matches `expected`, bumping the stored version. Returns false when
    /// the precondition missed.
    async fn update_if(&self, order: &Order, expected: Precondition) -> Result<bool, StoreError>;

    /// Liveness probe for the health endpoint
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
