// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// - Value objects (statuses, actors, item snapshots)
// - State machine (legal transitions and who may trigger them)
// - Commands and the events they produce
// - Errors (OrderError and its stable kinds)
// - Aggregate (Order with command handling)
// - Command Handler (load, decide, conditional update, ledger)
//
// ============================================================================

pub mod value_objects;
pub mod state_machine;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
