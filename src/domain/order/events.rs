use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{OrderStatus, PaymentStatus};

// ============================================================================
// Order Events - facts produced by handling a command
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    StatusChanged(StatusChanged),
    TransporterAssigned(TransporterAssigned),
    PaymentStarted(PaymentStarted),
    PaymentRecorded(PaymentRecorded),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusChanged {
    /// Human readable description stored in the tracking ledger
    pub fn description(&self) -> String {
        match self.to {
            OrderStatus::Pending => "Order placed".to_string(),
            OrderStatus::Confirmed => "Order confirmed".to_string(),
            OrderStatus::Processing => "Order is being prepared".to_string(),
            OrderStatus::Shipped => match &self.tracking_number {
                Some(number) => format!("Order shipped (tracking {number})"),
                None => "Order shipped".to_string(),
            },
            OrderStatus::InTransit => "Order in transit".to_string(),
            OrderStatus::Delivered => "Order delivered".to_string(),
            OrderStatus::Cancelled => "Order cancelled".to_string(),
            OrderStatus::Refunded => "Order refunded".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransporterAssigned {
    pub transporter_id: Uuid,
    pub vehicle_id: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStarted {
    pub attempt_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub reference: Option<String>,
    pub reason: Option<String>,
}
