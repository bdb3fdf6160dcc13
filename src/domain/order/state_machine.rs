use super::errors::OrderError;
use super::value_objects::{ActorRole, OrderStatus};

// ============================================================================
// Order State Machine
// ============================================================================
//
//   pending -> confirmed -> processing -> shipped -> in_transit -> delivered
//      |           |            |           |            |
//      +-----------+------------+-----------+------------+--> cancelled
//
// The table is the single source of truth for status edges. `delivered`,
// `cancelled` and `refunded` have no outgoing edges. The cancellation guard
// narrows the table further: goods in a carrier's possession cannot be
// cancelled unilaterally.
//
// ============================================================================

const TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (OrderStatus::Pending, &[OrderStatus::Confirmed, OrderStatus::Cancelled]),
    (OrderStatus::Confirmed, &[OrderStatus::Processing, OrderStatus::Cancelled]),
    (OrderStatus::Processing, &[OrderStatus::Shipped, OrderStatus::Cancelled]),
    (OrderStatus::Shipped, &[OrderStatus::InTransit, OrderStatus::Cancelled]),
    (OrderStatus::InTransit, &[OrderStatus::Delivered, OrderStatus::Cancelled]),
    (OrderStatus::Delivered, &[]),
    (OrderStatus::Cancelled, &[]),
    (OrderStatus::Refunded, &[]),
];

const CANCELLABLE: &[OrderStatus] = &[
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Processing,
];

/// Legal next states for `from`, before guards are applied
pub fn next_states(from: OrderStatus) -> &'static [OrderStatus] {
    TRANSITIONS
        .iter()
        .find(|(state, _)| *state == from)
        .map(|(_, next)| *next)
        .unwrap_or(&[])
}

pub fn is_terminal(status: OrderStatus) -> bool {
    next_states(status).is_empty()
}

pub fn is_cancellable(status: OrderStatus) -> bool {
    CANCELLABLE.contains(&status)
}

/// Validate a status edge including the cancellation guard.
pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
    if !next_states(from).contains(&to) {
        return Err(OrderError::InvalidStatusTransition { from, to });
    }
    if to == OrderStatus::Cancelled && !is_cancellable(from) {
        return Err(OrderError::InvalidStatusTransition { from, to });
    }
    Ok(())
}

/// Which roles may initiate an edge. Buyers may only cancel; ownership and
/// the buyer's pending-only window are checked by the authorization policy.
pub fn role_may_trigger(role: ActorRole, to: OrderStatus) -> bool {
    match role {
        ActorRole::Admin | ActorRole::Farmer => true,
        ActorRole::Buyer => to == OrderStatus::Cancelled,
        ActorRole::Transporter | ActorRole::Vendor => false,
    }
}

/// Check that an ordered sequence of statuses is a walk through the table,
/// starting from `pending`.
pub fn is_valid_walk(statuses: &[OrderStatus]) -> bool {
    match statuses.first() {
        None => true,
        Some(OrderStatus::Pending) => statuses
            .windows(2)
            .all(|pair| validate_transition(pair[0], pair[1]).is_ok()),
        Some(_) => false,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
