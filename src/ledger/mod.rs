use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::OrderStatus;
use crate::store::StoreError;

// ============================================================================
// Tracking Ledger
// ============================================================================
//
// Append-only history of order status changes, kept apart from the mutable
// order row. Entries are never updated or deleted. The ledger does not
// check state-machine legality; only the order command handler appends.
//
// ============================================================================

/// A persisted ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub id: i64,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub location: Option<String>,
    pub description: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry to append
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackingEntry {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub location: Option<String>,
    pub description: String,
    pub notes: Option<String>,
}

impl NewTrackingEntry {
    pub fn new(order_id: Uuid, status: OrderStatus, description: impl Into<String>) -> Self {
        Self {
            order_id,
            status,
            location: None,
            description: description.into(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }
}

#[async_trait]
pub trait TrackingLedger: Send + Sync {
    /// Pure insert. `created_at` is assigned by the ledger and is never
    /// earlier than the previous entry for the same order.
    async fn append(&self, entry: NewTrackingEntry) -> Result<TrackingEntry, StoreError>;

    /// All entries for an order, oldest first
    async fn history(&self, order_id: Uuid) -> Result<Vec<TrackingEntry>, StoreError>;
}
