use crate::domain::order::{Actor, ActorRole, Order, OrderStatus};

// ============================================================================
// Authorization Policy
// ============================================================================
//
// Pure predicates over (actor, order). Every mutating entry point checks
// the relevant predicate before touching the store.
//
// ============================================================================

pub fn can_read(actor: &Actor, order: &Order) -> bool {
    match actor.role {
        ActorRole::Admin => true,
        ActorRole::Buyer => actor.id == order.buyer_id,
        ActorRole::Farmer => actor.id == order.farmer_id,
        ActorRole::Transporter => order.transporter_id == Some(actor.id),
        ActorRole::Vendor => false,
    }
}

pub fn can_modify(actor: &Actor, order: &Order) -> bool {
    match actor.role {
        ActorRole::Admin => true,
        ActorRole::Farmer => actor.id == order.farmer_id,
        ActorRole::Buyer => actor.id == order.buyer_id && order.status == OrderStatus::Pending,
        ActorRole::Transporter | ActorRole::Vendor => false,
    }
}

pub fn can_assign_transporter(actor: &Actor, order: &Order) -> bool {
    actor.role == ActorRole::Farmer && actor.id == order.farmer_id
}

/// Only the buyer who placed the order may pay for it
pub fn can_pay(actor: &Actor, order: &Order) -> bool {
    actor.id == order.buyer_id
}
