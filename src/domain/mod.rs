// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - money          - integer minor-unit amounts
// - order/         - order aggregate, state machine, command handler
// - pricing        - cart validation and totals
// - authorization  - who may read or act on an order
//
// Nothing in here talks HTTP. Store access goes through the traits in
// `catalog`, `store` and `ledger`.
//
// ============================================================================

pub mod money;
pub mod order;
pub mod pricing;
pub mod authorization;
