use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::{ActorRole, OrderStatus};

// ============================================================================
// Order Commands - Represent actor intent against an existing order
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    ChangeStatus {
        by: ActorRole,
        to: OrderStatus,
        notes: Option<String>,
        location: Option<String>,
        tracking_number: Option<String>,
        tracking_url: Option<String>,
    },
    Cancel {
        notes: Option<String>,
    },
    /// Issued by the payment coordinator once the gateway accepted a charge
    ConfirmAfterPayment,
    AssignTransporter {
        transporter_id: Uuid,
        vehicle_id: Option<String>,
        estimated_delivery: Option<DateTime<Utc>>,
    },
    /// Take the payment claim before the gateway is called
    BeginPayment {
        attempt_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    RecordPaymentSuccess {
        attempt_id: Uuid,
        reference: String,
    },
    RecordPaymentFailure {
        attempt_id: Uuid,
        reason: String,
    },
    Refund,
}
