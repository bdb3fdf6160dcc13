// ============================================================================
// Application Services
// ============================================================================
//
// - stock         - Stock Coordinator (reserve / compensating release)
// - builder       - Order Aggregate Builder (createOrder)
// - payment       - Payment Coordinator (charge, refund)
// - order_service - facade exposing every order operation
//
// ============================================================================

pub mod stock;
pub mod builder;
pub mod payment;
pub mod order_service;

pub use builder::{generate_order_number, CreatedOrder, NewOrder, OrderBuilder};
pub use order_service::{
    EngineSettings, HealthReport, ListQuery, ListScope, OrderService, StatusUpdate, Stores, TransporterAssignment,
};
pub use payment::PaymentCoordinator;
pub use stock::StockCoordinator;
