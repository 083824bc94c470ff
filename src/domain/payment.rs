use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;
use super::order::{CustomerInfo, Order, OrderPaymentStatus, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Mock,
    Payplug,
    Floa,
    Findomestic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mock => "mock",
            ProviderKind::Payplug => "payplug",
            ProviderKind::Floa => "floa",
            ProviderKind::Findomestic => "findomestic",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(ProviderKind::Mock),
            "payplug" => Ok(ProviderKind::Payplug),
            "floa" => Ok(ProviderKind::Floa),
            "findomestic" => Ok(ProviderKind::Findomestic),
            _ => Err(DomainError::not_found(format!("Payment provider '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    PartiallyRefunded,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Completed, PartiallyRefunded)
                | (Completed, Refunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    pub fn is_refundable(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::PartiallyRefunded)
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "partially_refunded" => Ok(PaymentStatus::PartiallyRefunded),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::validation(
                "status",
                format!("unknown payment status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: ProviderKind,
    pub status: PaymentStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_url: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: BigDecimal,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new_pending(order: &Order, provider: ProviderKind, now: DateTime<Utc>) -> Self {
        Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            provider,
            status: PaymentStatus::Pending,
            amount: order.total.clone(),
            currency: order.currency.clone(),
            provider_payment_id: None,
            transaction_id: None,
            payment_url: None,
            failure_reason: None,
            refunded_amount: BigDecimal::zero(),
            refund_reason: None,
            refunded_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn refundable_amount(&self) -> BigDecimal {
        &self.amount - &self.refunded_amount
    }

    /// Validates a refund request and returns the amount to refund; `None`
    /// means everything still refundable.
    pub fn plan_refund(&self, requested: Option<&BigDecimal>) -> Result<BigDecimal, DomainError> {
        if !self.status.is_refundable() {
            return Err(DomainError::Conflict(format!(
                "payment is {} and cannot be refunded",
                self.status.as_str()
            )));
        }
        let remaining = self.refundable_amount();
        let amount = requested.cloned().unwrap_or_else(|| remaining.clone());
        if amount <= BigDecimal::zero() {
            return Err(DomainError::validation("amount", "must be greater than zero"));
        }
        if amount.with_scale(2) != amount {
            return Err(DomainError::validation("amount", "must have at most 2 decimal places"));
        }
        if amount > remaining {
            return Err(DomainError::validation(
                "amount",
                format!("exceeds refundable amount {remaining}"),
            ));
        }
        Ok(amount)
    }
}

/// A normalised status update for one payment, whatever its origin
/// (webhook, status poll, refund).
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Total refunded so far, not the delta.
    pub refunded_amount: Option<BigDecimal>,
    pub refund_reason: Option<String>,
}

impl StatusChange {
    pub fn to(status: PaymentStatus) -> Self {
        StatusChange {
            status,
            transaction_id: None,
            failure_reason: None,
            refunded_amount: None,
            refund_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    Unchanged,
    Rejected {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

impl Transition {
    pub fn completed_payment(&self) -> bool {
        matches!(
            self,
            Transition::Applied {
                to: PaymentStatus::Completed,
                ..
            }
        )
    }

    pub fn fully_refunded(&self) -> bool {
        matches!(
            self,
            Transition::Applied {
                to: PaymentStatus::Refunded,
                ..
            }
        )
    }
}

/// Moves a payment to a new status and mirrors the outcome onto its order.
///
/// Replays of the current status are reported as `Unchanged`; moves the
/// payment state machine forbids are `Rejected` and leave both untouched.
pub fn apply_status_change(
    payment: &mut Payment,
    order: &mut Order,
    change: &StatusChange,
    now: DateTime<Utc>,
) -> Transition {
    let from = payment.status;
    let to = change.status;

    let refund_progress = matches!(
        to,
        PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded
    ) && change
        .refunded_amount
        .as_ref()
        .is_some_and(|amount| *amount != payment.refunded_amount);

    if from == to && !refund_progress {
        return Transition::Unchanged;
    }
    if !from.can_transition_to(to) {
        return Transition::Rejected { from, to };
    }

    payment.status = to;
    if let Some(tx) = &change.transaction_id {
        payment.transaction_id = Some(tx.clone());
    }

    match to {
        PaymentStatus::Completed => {
            payment.completed_at.get_or_insert(now);
            payment.failure_reason = None;
            order.payment_status = OrderPaymentStatus::Paid;
            order.paid_at.get_or_insert(now);
            if order.status == OrderStatus::Pending {
                order.status = OrderStatus::Confirmed;
                order.confirmed_at = Some(now);
            }
        }
        PaymentStatus::Failed | PaymentStatus::Cancelled => {
            if change.failure_reason.is_some() {
                payment.failure_reason = change.failure_reason.clone();
            }
            // Another payment may already have settled the order.
            if !order.payment_status.is_settled() {
                order.payment_status = if to == PaymentStatus::Failed {
                    OrderPaymentStatus::Failed
                } else {
                    OrderPaymentStatus::Cancelled
                };
            }
        }
        PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded => {
            payment.refunded_amount = match &change.refunded_amount {
                Some(amount) => amount.clone(),
                None if to == PaymentStatus::Refunded => payment.amount.clone(),
                None => payment.refunded_amount.clone(),
            };
            payment.refunded_at = Some(now);
            if change.refund_reason.is_some() {
                payment.refund_reason = change.refund_reason.clone();
            }
            if to == PaymentStatus::Refunded {
                order.payment_status = OrderPaymentStatus::Refunded;
                if order.status != OrderStatus::Cancelled {
                    order.status = OrderStatus::Refunded;
                }
            } else {
                order.payment_status = OrderPaymentStatus::PartiallyRefunded;
            }
        }
        PaymentStatus::Pending | PaymentStatus::Processing => {}
    }

    payment.updated_at = now;
    order.updated_at = now;
    Transition::Applied { from, to }
}

/// Books a refund the provider has already executed on top of whatever the
/// payment had refunded so far. Runs against the locked payment row so that
/// concurrent refunds add up instead of overwriting each other.
pub fn apply_refund(
    payment: &mut Payment,
    order: &mut Order,
    amount: &BigDecimal,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Transition, DomainError> {
    let amount = payment.plan_refund(Some(amount))?;
    let total = &payment.refunded_amount + &amount;
    let status = if total >= payment.amount {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::PartiallyRefunded
    };
    let mut change = StatusChange::to(status);
    change.refunded_amount = Some(total);
    change.refund_reason = reason;
    Ok(apply_status_change(payment, order, &change, now))
}

/// What a provider needs to open a payment.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub customer: Option<CustomerInfo>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub notification_url: String,
}

#[derive(Debug, Clone)]
pub struct ProviderPayment {
    pub provider_payment_id: String,
    pub payment_url: Option<String>,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone)]
pub struct ProviderRefund {
    pub refund_id: String,
    pub amount: BigDecimal,
}

/// Provider-side payment state (from a callback or a status poll) reduced
/// to the fields the dispatcher acts on.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub provider_payment_id: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: Option<BigDecimal>,
}

impl PaymentEvent {
    pub fn status_change(&self) -> StatusChange {
        StatusChange {
            status: self.status,
            transaction_id: self.transaction_id.clone(),
            failure_reason: self.failure_reason.clone(),
            refunded_amount: self.refunded_amount.clone(),
            refund_reason: None,
        }
    }
}

/// A callback body and its signature, as the provider would have sent them.
#[derive(Debug, Clone)]
pub struct SimulatedWebhook {
    pub payload: Vec<u8>,
    pub signature: String,
}

/// Cent amount for providers that bill in minor units.
pub fn to_minor_units(amount: &BigDecimal) -> Result<i64, DomainError> {
    use bigdecimal::ToPrimitive;

    (amount.clone() * BigDecimal::from(100))
        .with_scale(0)
        .to_i64()
        .ok_or_else(|| DomainError::Internal(format!("amount {amount} out of range")))
}

pub fn from_minor_units(cents: i64) -> BigDecimal {
    (BigDecimal::from(cents) / BigDecimal::from(100)).with_scale(2)
}
