use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::money::Money;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Error returned when a stored or transmitted enum label is not recognised
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Fulfillment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    InTransit,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "order status", value: s.to_string() })
    }
}

/// Payment axis of an order, independent of fulfillment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Payment status never regresses: once paid it can only become
    /// refunded, and refunded is final.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Failed, PaymentStatus::Paid)
                | (PaymentStatus::Failed, PaymentStatus::Failed)
                | (PaymentStatus::Paid, PaymentStatus::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ParseEnumError { kind: "payment status", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    MobileMoney,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "cash_on_delivery" => Ok(PaymentMethod::CashOnDelivery),
            other => Err(ParseEnumError { kind: "payment method", value: other.to_string() }),
        }
    }
}

/// Role resolved by the identity service for the calling actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Buyer,
    Farmer,
    Transporter,
    Vendor,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Buyer => "buyer",
            ActorRole::Farmer => "farmer",
            ActorRole::Transporter => "transporter",
            ActorRole::Vendor => "vendor",
            ActorRole::Admin => "admin",
        }
    }
}

impl FromStr for ActorRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buyer" => Ok(ActorRole::Buyer),
            "farmer" => Ok(ActorRole::Farmer),
            "transporter" => Ok(ActorRole::Transporter),
            "vendor" => Ok(ActorRole::Vendor),
            "admin" => Ok(ActorRole::Admin),
            _ => Err(ParseEnumError { kind: "actor role", value: s.to_string() }),
        }
    }
}

/// Authenticated caller. Trusted as supplied by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub notes: Option<String>,
}

/// An in-flight payment attempt holding the order. Only the holder may
/// record the charge outcome; the lease lets a crashed attempt be taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentClaim {
    pub attempt_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl PaymentClaim {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A requested cart line before pricing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Order line item. Everything except `quantity` and `total_price` is a
/// snapshot copied from the catalog when the order was created and is never
/// recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image: Option<String>,
    pub unit_price: Money,
    pub unit: String,
    pub quality_grade: Option<String>,
    pub organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub quantity: i32,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_round_trips_through_labels() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("archived".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::InTransit).unwrap();
        assert_eq!(json, "\"in_transit\"");
    }

    #[test]
    fn test_payment_status_never_regresses() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Failed.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Paid.can_transition_to(PaymentStatus::Refunded));

        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_payment_claim_lease() {
        let now = Utc::now();
        let claim = PaymentClaim { attempt_id: Uuid::new_v4(), expires_at: now + chrono::Duration::seconds(30) };
        assert!(claim.is_active(now));
        assert!(!claim.is_active(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn test_actor_role_parsing_is_case_insensitive() {
        assert_eq!("Farmer".parse::<ActorRole>().unwrap(), ActorRole::Farmer);
        assert!("courier".parse::<ActorRole>().is_err());
    }
}
