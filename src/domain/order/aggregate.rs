use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::state_machine;
use super::value_objects::{OrderItem, OrderStatus, PaymentClaim, PaymentMethod, PaymentStatus, ShippingInfo};
use crate::domain::money::Money;
use crate::ledger::TrackingEntry;

// ============================================================================
// Order Totals
// ============================================================================

/// Monetary breakdown of an order. `total_amount` is only ever computed by
/// `OrderTotals::new`, so `total = sub_total + tax + shipping - discount`
/// holds for every value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    sub_total: Money,
    tax_amount: Money,
    shipping_cost: Money,
    discount_amount: Money,
    total_amount: Money,
}

impl OrderTotals {
    pub fn new(sub_total: Money, tax_amount: Money, shipping_cost: Money, discount_amount: Money) -> Self {
        Self {
            sub_total,
            tax_amount,
            shipping_cost,
            discount_amount,
            total_amount: sub_total + tax_amount + shipping_cost - discount_amount,
        }
    }

    pub fn sub_total(&self) -> Money {
        self.sub_total
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }
}

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub order_number: String,

    // Parties
    pub buyer_id: Uuid,
    pub farmer_id: Uuid,
    pub vendor_id: Option<Uuid>,
    pub transporter_id: Option<Uuid>,
    pub vehicle_id: Option<String>,

    #[serde(flatten)]
    pub totals: OrderTotals,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_claim: Option<PaymentClaim>,

    pub shipping: ShippingInfo,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every committed update
    #[serde(default)]
    pub version: i64,
}

impl Order {
    /// Reject payment attempts on closed or already settled orders.
    pub fn ensure_payable(&self) -> Result<(), OrderError> {
        if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
            return Err(OrderError::OrderClosed { status: self.status, action: "pay" });
        }
        match self.payment_status {
            PaymentStatus::Paid | PaymentStatus::Refunded => Err(OrderError::AlreadyPaid),
            PaymentStatus::Pending | PaymentStatus::Failed => Ok(()),
        }
    }

    fn active_claim(&self) -> Option<&PaymentClaim> {
        self.payment_claim.as_ref().filter(|claim| claim.is_active(Utc::now()))
    }

    /// Payment outcomes may only be written by the attempt holding the claim
    fn ensure_claimed_by(&self, attempt_id: Uuid) -> Result<(), OrderError> {
        match self.payment_claim {
            Some(claim) if claim.attempt_id == attempt_id => Ok(()),
            _ => Err(OrderError::PaymentInProgress),
        }
    }

    fn status_change(
        &self,
        to: OrderStatus,
        notes: Option<String>,
        location: Option<String>,
        tracking_number: Option<String>,
        tracking_url: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        state_machine::validate_transition(self.status, to)?;
        // A charge in flight would otherwise settle against a cancelled order
        if to == OrderStatus::Cancelled && self.active_claim().is_some() {
            return Err(OrderError::PaymentInProgress);
        }

        Ok(vec![OrderEvent::StatusChanged(StatusChanged {
            from: self.status,
            to,
            notes,
            location,
            tracking_number,
            tracking_url,
            at: Utc::now(),
        })])
    }

    fn payment_change(
        &self,
        to: PaymentStatus,
        reference: Option<String>,
        reason: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.payment_status.can_transition_to(to) {
            return Err(OrderError::InvalidPayment(format!(
                "payment status cannot move from {} to {}",
                self.payment_status, to
            )));
        }

        Ok(vec![OrderEvent::PaymentRecorded(PaymentRecorded {
            from: self.payment_status,
            to,
            reference,
            reason,
        })])
    }

    /// Validate a command against the current state and emit the resulting
    /// events. Authorization is decided before this is called.
    pub fn handle_command(&self, command: &OrderCommand) -> Result<Vec<OrderEvent>, OrderError> {
        match command {
            OrderCommand::ChangeStatus { by, to, notes, location, tracking_number, tracking_url } => {
                if !state_machine::role_may_trigger(*by, *to) {
                    return Err(OrderError::unauthorized(format!(
                        "role {} may not move an order to {}",
                        by.as_str(),
                        to
                    )));
                }
                self.status_change(
                    *to,
                    notes.clone(),
                    location.clone(),
                    tracking_number.clone(),
                    tracking_url.clone(),
                )
            }

            OrderCommand::Cancel { notes } => {
                self.status_change(OrderStatus::Cancelled, notes.clone(), None, None, None)
            }

            OrderCommand::ConfirmAfterPayment => match self.status {
                OrderStatus::Pending => self.status_change(
                    OrderStatus::Confirmed,
                    Some("Payment received".to_string()),
                    None,
                    None,
                    None,
                ),
                // Already confirmed by the farmer before payment arrived
                _ => Ok(vec![]),
            },

            OrderCommand::AssignTransporter { transporter_id, vehicle_id, estimated_delivery } => {
                match self.status {
                    OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing => {}
                    status => {
                        return Err(OrderError::OrderClosed {
                            status,
                            action: "assign a transporter to",
                        })
                    }
                }

                Ok(vec![OrderEvent::TransporterAssigned(TransporterAssigned {
                    transporter_id: *transporter_id,
                    vehicle_id: vehicle_id.clone(),
                    estimated_delivery: *estimated_delivery,
                })])
            }

            OrderCommand::BeginPayment { attempt_id, expires_at } => {
                self.ensure_payable()?;
                if self.active_claim().is_some() {
                    return Err(OrderError::PaymentInProgress);
                }

                Ok(vec![OrderEvent::PaymentStarted(PaymentStarted {
                    attempt_id: *attempt_id,
                    expires_at: *expires_at,
                })])
            }

            OrderCommand::RecordPaymentSuccess { attempt_id, reference } => {
                self.ensure_claimed_by(*attempt_id)?;
                self.ensure_payable()?;
                self.payment_change(PaymentStatus::Paid, Some(reference.clone()), None)
            }

            OrderCommand::RecordPaymentFailure { attempt_id, reason } => {
                self.ensure_claimed_by(*attempt_id)?;
                self.ensure_payable()?;
                self.payment_change(PaymentStatus::Failed, None, Some(reason.clone()))
            }

            OrderCommand::Refund => match self.payment_status {
                PaymentStatus::Refunded => Ok(vec![]),
                _ => self.payment_change(PaymentStatus::Refunded, None, None),
            },
        }
    }

    pub fn apply_event(&mut self, event: &OrderEvent) {
        self.updated_at = Utc::now();

        match event {
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                self.updated_at = e.at;
                if e.to == OrderStatus::Delivered {
                    self.actual_delivery = Some(e.at);
                }
                if e.tracking_number.is_some() {
                    self.tracking_number = e.tracking_number.clone();
                }
                if e.tracking_url.is_some() {
                    self.tracking_url = e.tracking_url.clone();
                }
            }
            OrderEvent::TransporterAssigned(e) => {
                self.transporter_id = Some(e.transporter_id);
                self.vehicle_id = e.vehicle_id.clone();
                if e.estimated_delivery.is_some() {
                    self.estimated_delivery = e.estimated_delivery;
                }
            }
            OrderEvent::PaymentStarted(e) => {
                self.payment_claim = Some(PaymentClaim {
                    attempt_id: e.attempt_id,
                    expires_at: e.expires_at,
                });
            }
            OrderEvent::PaymentRecorded(e) => {
                self.payment_claim = None;
                self.payment_status = e.to;
                if e.reference.is_some() {
                    self.payment_reference = e.reference.clone();
                }
            }
        }
    }
}

// ============================================================================
// Read Model
// ============================================================================

/// Everything a caller sees about an order: the row, its item snapshots and
/// the full tracking history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub tracking: Vec<TrackingEntry>,
}

// ============================================================================
// Unit Tests
// ============================================================================
