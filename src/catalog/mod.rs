use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::order::ParseEnumError;
use crate::store::StoreError;

// ============================================================================
// Product Catalog Contract
// ============================================================================
//
// The catalog is owned by another part of the marketplace. The order engine
// reads product snapshots and mutates availability only through the atomic
// reserve/release pair, and only via the stock coordinator.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Available,
    OutOfStock,
    Inactive,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::OutOfStock => "out_of_stock",
            ListingStatus::Inactive => "inactive",
        }
    }

    pub fn is_purchasable(&self) -> bool {
        matches!(self, ListingStatus::Available)
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ListingStatus::Available),
            "out_of_stock" => Ok(ListingStatus::OutOfStock),
            "inactive" => Ok(ListingStatus::Inactive),
            other => Err(ParseEnumError { kind: "listing status", value: other.to_string() }),
        }
    }
}

/// Read-only view of a catalog product at lookup time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub price: Money,
    pub unit: String,
    pub available_stock: i32,
    pub status: ListingStatus,
    pub quality_grade: Option<String>,
    pub organic: bool,
    pub harvest_date: Option<NaiveDate>,
}

/// Outcome of an atomic conditional decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    Insufficient,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, StoreError>;

    /// Decrement available stock by `quantity` only if at least `quantity`
    /// is available. Check and decrement are one indivisible operation.
    async fn reserve_stock(&self, product_id: Uuid, quantity: i32) -> Result<Reservation, StoreError>;

    /// Add `quantity` back to available stock.
    async fn release_stock(&self, product_id: Uuid, quantity: i32) -> Result<(), StoreError>;
}

/// Farmer to vendor attribution, owned outside the order engine
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    async fn vendor_for_farmer(&self, farmer_id: Uuid) -> Result<Option<Uuid>, StoreError>;
}
