use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::{ProductCatalog, Reservation};
use crate::domain::order::OrderError;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Stock Coordinator
// ============================================================================
//
// Sole writer of product availability for the order engine. Reservation is
// the catalog's atomic conditional decrement; there is no hold/commit step.
// Releases are compensations: retried on transient store errors, logged,
// never surfaced as failures of the operation that triggered them.
//
// ============================================================================

pub struct StockCoordinator {
    catalog: Arc<dyn ProductCatalog>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
}

impl StockCoordinator {
    pub fn new(catalog: Arc<dyn ProductCatalog>, metrics: Arc<Metrics>) -> Self {
        Self {
            catalog,
            metrics,
            retry: RetryConfig::compensation(),
        }
    }

    pub async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<(), OrderError> {
        let reservation = self.catalog.reserve_stock(product_id, quantity).await?;
        self.metrics.record_reservation(reservation == Reservation::Reserved);

        match reservation {
            Reservation::Reserved => {
                tracing::debug!(product_id = %product_id, quantity = quantity, "Stock reserved");
                Ok(())
            }
            Reservation::Insufficient => Err(OrderError::InsufficientStock {
                product_id,
                requested: quantity,
            }),
        }
    }

    /// Reserve every line or none: on the first failure the lines already
    /// reserved are released before the error is returned.
    pub async fn reserve_all(&self, lines: &[(Uuid, i32)]) -> Result<(), OrderError> {
        for (index, (product_id, quantity)) in lines.iter().enumerate() {
            if let Err(e) = self.reserve(*product_id, *quantity).await {
                tracing::warn!(
                    product_id = %product_id,
                    error = %e,
                    compensating = index,
                    "Reservation failed, releasing earlier reservations"
                );
                self.release_all(&lines[..index]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Best-effort release. Returns false when the quantity could not be
    /// put back.
    pub async fn release(&self, product_id: Uuid, quantity: i32) -> bool {
        let result = retry_on_transient(&self.retry, || self.catalog.release_stock(product_id, quantity)).await;

        match result {
            Ok(()) => {
                self.metrics.record_compensation(true);
                tracing::debug!(product_id = %product_id, quantity = quantity, "Stock released");
                true
            }
            Err(e) => {
                self.metrics.record_compensation(false);
                tracing::error!(
                    product_id = %product_id,
                    quantity = quantity,
                    error = %e,
                    "Failed to release stock"
                );
                false
            }
        }
    }

    /// Release every line, returning how many releases failed.
    pub async fn release_all(&self, lines: &[(Uuid, i32)]) -> usize {
        let mut failed = 0;
        for (product_id, quantity) in lines {
            if !self.release(*product_id, *quantity).await {
                failed += 1;
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ListingStatus, ProductSnapshot};
    use crate::domain::money::Money;
    use crate::store::InMemoryCatalog;

    fn product(stock: i32) -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            name: "Beans".to_string(),
            image: None,
            price: Money::from_major(120),
            unit: "kg".to_string(),
            available_stock: stock,
            status: ListingStatus::Available,
            quality_grade: None,
            organic: false,
            harvest_date: None,
        }
    }

    async fn setup(stocks: &[i32]) -> (StockCoordinator, Arc<InMemoryCatalog>, Vec<Uuid>) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let mut ids = Vec::new();
        for stock in stocks {
            let p = product(*stock);
            ids.push(p.id);
            catalog.upsert_product(p).await;
        }
        let coordinator = StockCoordinator::new(catalog.clone(), Arc::new(Metrics::new().unwrap()));
        (coordinator, catalog, ids)
    }

    #[tokio::test]
    async fn test_reserve_maps_shortage_to_insufficient_stock() {
        let (stock, catalog, ids) = setup(&[2]).await;
        let result = stock.reserve(ids[0], 3).await;
        assert!(matches!(result, Err(OrderError::InsufficientStock { requested: 3, .. })));
        assert_eq!(catalog.available_stock(ids[0]).await, Some(2));
    }

    #[tokio::test]
    async fn test_reserve_all_compensates_earlier_lines() {
        let (stock, catalog, ids) = setup(&[10, 10, 1]).await;

        let result = stock.reserve_all(&[(ids[0], 4), (ids[1], 5), (ids[2], 2)]).await;
        assert!(matches!(result, Err(OrderError::InsufficientStock { .. })));

        assert_eq!(catalog.available_stock(ids[0]).await, Some(10));
        assert_eq!(catalog.available_stock(ids[1]).await, Some(10));
        assert_eq!(catalog.available_stock(ids[2]).await, Some(1));
    }

    #[tokio::test]
    async fn test_release_of_unknown_product_is_reported() {
        let (stock, _, _) = setup(&[]).await;
        assert!(!stock.release(Uuid::new_v4(), 1).await);
        assert_eq!(stock.release_all(&[(Uuid::new_v4(), 1), (Uuid::new_v4(), 2)]).await, 2);
    }
}
