use serde::Serialize;
use uuid::Uuid;

use super::value_objects::OrderStatus;
use crate::store::StoreError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Cannot {action} an order in status {status}")]
    OrderClosed { status: OrderStatus, action: &'static str },

    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock { product_id: Uuid, requested: i32 },

    #[error("Product is not available for purchase: {0}")]
    ProductUnavailable(Uuid),

    #[error("All items in an order must belong to a single farmer")]
    MixedFarmerOrder,

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Payment failed: {0}")]
    InvalidPayment(String),

    #[error("Another payment attempt holds this order")]
    PaymentInProgress,

    #[error("Order {0} kept changing concurrently")]
    ConcurrentUpdate(Uuid),

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: i32 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Stable error classification for presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidStatusTransition,
    InsufficientStock,
    ProductUnavailable,
    MixedFarmerOrder,
    AlreadyPaid,
    InvalidPayment,
    /// Lost a race with another writer; retrying may succeed
    Conflict,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidStatusTransition => "invalid_status_transition",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::ProductUnavailable => "product_unavailable",
            ErrorKind::MixedFarmerOrder => "mixed_farmer_order",
            ErrorKind::AlreadyPaid => "already_paid",
            ErrorKind::InvalidPayment => "invalid_payment",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::OrderNotFound(_) | OrderError::ProductNotFound(_) => ErrorKind::NotFound,
            OrderError::Unauthorized(_) => ErrorKind::Unauthorized,
            OrderError::InvalidStatusTransition { .. } | OrderError::OrderClosed { .. } => {
                ErrorKind::InvalidStatusTransition
            }
            OrderError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            OrderError::ProductUnavailable(_) => ErrorKind::ProductUnavailable,
            OrderError::MixedFarmerOrder => ErrorKind::MixedFarmerOrder,
            OrderError::AlreadyPaid => ErrorKind::AlreadyPaid,
            OrderError::InvalidPayment(_) => ErrorKind::InvalidPayment,
            OrderError::PaymentInProgress | OrderError::ConcurrentUpdate(_) => ErrorKind::Conflict,
            OrderError::EmptyItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidRequest(_) => ErrorKind::Validation,
            OrderError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        OrderError::Unauthorized(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds() {
        assert_eq!(OrderError::OrderNotFound(Uuid::new_v4()).kind(), ErrorKind::NotFound);
        assert_eq!(OrderError::ProductNotFound(Uuid::new_v4()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_closed_order_reports_as_transition_error() {
        let err = OrderError::OrderClosed { status: OrderStatus::Cancelled, action: "pay" };
        assert_eq!(err.kind(), ErrorKind::InvalidStatusTransition);
        assert_eq!(err.kind().as_str(), "invalid_status_transition");
    }

    #[test]
    fn test_races_report_as_conflict() {
        assert_eq!(OrderError::PaymentInProgress.kind().as_str(), "conflict");
        assert_eq!(OrderError::ConcurrentUpdate(Uuid::new_v4()).kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_storage_errors_are_internal() {
        let err = OrderError::from(StoreError::Unavailable("db down".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
