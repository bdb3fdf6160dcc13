use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::{ProductCatalog, ProductSnapshot};
use crate::domain::money::Money;
use crate::domain::order::{LineRequest, OrderError, OrderTotals};

// ============================================================================
// Pricing & Validation Engine
// ============================================================================
//
// Validates a cart against the catalog and computes every monetary figure
// of the order. Read-only: catalog lookups are its only side effect.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct PricingPolicy {
    pub tax_rate_bps: u32,
    pub shipping_base_fee: Money,
    /// Shipping is waived only when the sub total is strictly above this
    pub free_shipping_threshold: Money,
    pub remote_surcharge: Money,
    /// Lower-case substrings matched against the destination city
    pub remote_keywords: Vec<String>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1_000,
            shipping_base_fee: Money::from_major(50),
            free_shipping_threshold: Money::from_major(1_000),
            remote_surcharge: Money::from_major(30),
            remote_keywords: ["island", "remote", "highland", "mountain"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl PricingPolicy {
    pub fn is_remote(&self, city: &str) -> bool {
        let city = city.to_lowercase();
        self.remote_keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && city.contains(keyword.as_str()))
    }

    pub fn tax_for(&self, sub_total: Money) -> Money {
        sub_total.apply_bps(self.tax_rate_bps)
    }

    pub fn shipping_for(&self, sub_total: Money, city: &str) -> Money {
        let base = if sub_total > self.free_shipping_threshold {
            Money::ZERO
        } else {
            self.shipping_base_fee
        };

        if self.is_remote(city) {
            base + self.remote_surcharge
        } else {
            base
        }
    }
}

/// A validated cart line with the catalog snapshot it was priced from
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product: ProductSnapshot,
    pub quantity: i32,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedOrder {
    pub farmer_id: Uuid,
    pub lines: Vec<PricedLine>,
    pub totals: OrderTotals,
}

/// Merge repeated products and reject empty carts or non-positive quantities.
pub fn normalize_lines(lines: &[LineRequest]) -> Result<Vec<LineRequest>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyItems);
    }

    let mut merged: Vec<LineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }

        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                    OrderError::InvalidQuantity {
                        product_id: line.product_id,
                        quantity: line.quantity,
                    },
                )?;
            }
            None => merged.push(*line),
        }
    }

    Ok(merged)
}

#[derive(Clone)]
pub struct PricingEngine {
    catalog: Arc<dyn ProductCatalog>,
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(catalog: Arc<dyn ProductCatalog>, policy: PricingPolicy) -> Self {
        Self { catalog, policy }
    }

    pub async fn price(
        &self,
        buyer_id: Uuid,
        lines: &[LineRequest],
        destination_city: &str,
    ) -> Result<PricedOrder, OrderError> {
        let lines = normalize_lines(lines)?;

        let mut farmer_id: Option<Uuid> = None;
        let mut priced = Vec::with_capacity(lines.len());

        for line in &lines {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            if !product.status.is_purchasable() {
                return Err(OrderError::ProductUnavailable(product.id));
            }

            if line.quantity > product.available_stock {
                return Err(OrderError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                });
            }

            match farmer_id {
                None => farmer_id = Some(product.farmer_id),
                Some(id) if id != product.farmer_id => return Err(OrderError::MixedFarmerOrder),
                Some(_) => {}
            }

            priced.push(PricedLine {
                line_total: product.price.times(line.quantity),
                quantity: line.quantity,
                product,
            });
        }

        let farmer_id = farmer_id.ok_or(OrderError::EmptyItems)?;
        let sub_total: Money = priced.iter().map(|line| line.line_total).sum();
        let totals = OrderTotals::new(
            sub_total,
            self.policy.tax_for(sub_total),
            self.policy.shipping_for(sub_total, destination_city),
            Money::ZERO,
        );

        tracing::debug!(
            buyer_id = %buyer_id,
            farmer_id = %farmer_id,
            lines = priced.len(),
            sub_total = %totals.sub_total(),
            total = %totals.total_amount(),
            "Priced order"
        );

        Ok(PricedOrder { farmer_id, lines: priced, totals })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
