use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::cart::Cart;
use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Transitions an operator may request. `Refunded` is only reached
    /// through a payment refund.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Shipped)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(DomainError::validation(
                "status",
                format!("unknown order status '{other}'"),
            )),
        }
    }
}

/// Payment state as tracked on the order itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    PartiallyRefunded,
    Refunded,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "pending",
            OrderPaymentStatus::Paid => "paid",
            OrderPaymentStatus::Failed => "failed",
            OrderPaymentStatus::Cancelled => "cancelled",
            OrderPaymentStatus::PartiallyRefunded => "partially_refunded",
            OrderPaymentStatus::Refunded => "refunded",
        }
    }

    /// Money has been captured for the order (possibly partly given back).
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderPaymentStatus::Paid | OrderPaymentStatus::PartiallyRefunded
        )
    }
}

impl FromStr for OrderPaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderPaymentStatus::Pending),
            "paid" => Ok(OrderPaymentStatus::Paid),
            "failed" => Ok(OrderPaymentStatus::Failed),
            "cancelled" => Ok(OrderPaymentStatus::Cancelled),
            "partially_refunded" => Ok(OrderPaymentStatus::PartiallyRefunded),
            "refunded" => Ok(OrderPaymentStatus::Refunded),
            other => Err(DomainError::Internal(format!(
                "unknown order payment status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    NotShipped,
    Preparing,
    Shipped,
    Delivered,
    Returned,
}

impl ShippingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingStatus::NotShipped => "not_shipped",
            ShippingStatus::Preparing => "preparing",
            ShippingStatus::Shipped => "shipped",
            ShippingStatus::Delivered => "delivered",
            ShippingStatus::Returned => "returned",
        }
    }
}

impl FromStr for ShippingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_shipped" => Ok(ShippingStatus::NotShipped),
            "preparing" => Ok(ShippingStatus::Preparing),
            "shipped" => Ok(ShippingStatus::Shipped),
            "delivered" => Ok(ShippingStatus::Delivered),
            "returned" => Ok(ShippingStatus::Returned),
            other => Err(DomainError::validation(
                "shipping_status",
                format!("unknown shipping status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub vat_number: Option<String>,
}

impl CustomerInfo {
    pub fn validate(&self) -> Result<(), DomainError> {
        require("customer_info.first_name", &self.first_name)?;
        require("customer_info.last_name", &self.last_name)?;
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@')
        {
            return Err(DomainError::validation(
                "customer_info.email",
                "must be a valid email address",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    #[serde(default)]
    pub province: Option<String>,
    pub country: String,
}

impl Address {
    pub fn validate(&self, field: &str) -> Result<(), DomainError> {
        require(&format!("{field}.line1"), &self.line1)?;
        require(&format!("{field}.city"), &self.city)?;
        require(&format!("{field}.postal_code"), &self.postal_code)?;
        require(&format!("{field}.country"), &self.country)
    }
}

fn require(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub sku: String,
    pub title: String,
    pub ean13: Option<String>,
    pub unit_price: BigDecimal,
    pub quantity: i32,
    pub line_total: BigDecimal,
    pub delivery_option: Option<Value>,
    pub warranty_option: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub cart_id: Option<Uuid>,
    pub customer_info: Value,
    pub billing_address: Value,
    pub shipping_address: Value,
    pub shipping_method: Option<String>,
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub tax_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub total: BigDecimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub shipping_status: ShippingStatus,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }

    /// Typed view of the customer snapshot. Older rows may not match the
    /// current shape, so callers get `None` rather than an error.
    pub fn customer(&self) -> Option<CustomerInfo> {
        serde_json::from_value(self.customer_info.clone()).ok()
    }

    /// Applies an operator update, stamping the timestamp of every state
    /// reached. Returns whether anything changed.
    pub fn apply_change(&mut self, change: &OrderChange, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let mut changed = false;

        if let Some(next) = change.status {
            if next != self.status {
                if next == OrderStatus::Refunded {
                    return Err(DomainError::InvalidInput(
                        "orders are refunded through their payment".to_string(),
                    ));
                }
                if !self.status.can_transition_to(next) {
                    return Err(DomainError::Conflict(format!(
                        "order cannot move from {} to {}",
                        self.status.as_str(),
                        next.as_str()
                    )));
                }
                self.status = next;
                match next {
                    OrderStatus::Confirmed => self.confirmed_at = Some(now),
                    OrderStatus::Processing => self.shipping_status = ShippingStatus::Preparing,
                    OrderStatus::Shipped => {
                        self.shipping_status = ShippingStatus::Shipped;
                        self.shipped_at.get_or_insert(now);
                    }
                    OrderStatus::Delivered => {
                        self.shipping_status = ShippingStatus::Delivered;
                        self.delivered_at.get_or_insert(now);
                    }
                    OrderStatus::Cancelled => self.cancelled_at = Some(now),
                    OrderStatus::Pending | OrderStatus::Refunded => {}
                }
                changed = true;
            }
        }

        if let Some(shipping) = change.shipping_status {
            if shipping != self.shipping_status {
                if self.status.is_terminal() {
                    return Err(DomainError::Conflict(format!(
                        "order is {}",
                        self.status.as_str()
                    )));
                }
                self.shipping_status = shipping;
                match shipping {
                    ShippingStatus::Shipped => {
                        self.shipped_at.get_or_insert(now);
                    }
                    ShippingStatus::Delivered => {
                        self.delivered_at.get_or_insert(now);
                    }
                    _ => {}
                }
                changed = true;
            }
        }

        if let Some(tracking) = &change.tracking_number {
            if self.tracking_number.as_ref() != Some(tracking) {
                self.tracking_number = Some(tracking.clone());
                changed = true;
            }
        }

        if let Some(notes) = &change.notes {
            if self.notes.as_ref() != Some(notes) {
                self.notes = Some(notes.clone());
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }
}

/// Operator-requested order update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderChange {
    pub status: Option<OrderStatus>,
    pub shipping_status: Option<ShippingStatus>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutDetails {
    pub customer_info: CustomerInfo,
    pub billing_address: Address,
    pub shipping_address: Option<Address>,
    pub shipping_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub tax_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub total: BigDecimal,
}

/// Order totals for a cart. Tax and discount are not computed yet and are
/// always zero.
pub fn compute_totals(
    cart: &Cart,
    shipping_method: Option<&str>,
    flat_shipping_rate: &BigDecimal,
) -> Result<Totals, DomainError> {
    if cart.items.is_empty() {
        return Err(DomainError::InvalidInput("cart is empty".to_string()));
    }

    let mut subtotal = BigDecimal::zero();
    for item in &cart.items {
        subtotal += item.effective_unit_price()? * BigDecimal::from(item.quantity);
    }

    let shipping_cost = match shipping_method.map(str::trim) {
        Some(method) if !method.is_empty() => flat_shipping_rate.clone(),
        _ => BigDecimal::zero(),
    };
    let tax_amount = BigDecimal::zero();
    let discount_amount = BigDecimal::zero();
    let total = &subtotal + &shipping_cost + &tax_amount - &discount_amount;

    Ok(Totals {
        subtotal: subtotal.with_scale(2),
        shipping_cost: shipping_cost.with_scale(2),
        tax_amount: tax_amount.with_scale(2),
        discount_amount: discount_amount.with_scale(2),
        total: total.with_scale(2),
    })
}

pub fn order_number(id: Uuid, now: DateTime<Utc>) -> String {
    let suffix: String = id.simple().to_string().chars().take(8).collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix.to_uppercase())
}

/// Converts a cart into a new pending order snapshotting product, customer
/// and address data. The cart itself is left untouched.
pub fn build_order(
    cart: &Cart,
    details: CheckoutDetails,
    user_id: Option<Uuid>,
    currency: &str,
    flat_shipping_rate: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<Order, DomainError> {
    cart.ensure_usable(now)?;
    details.customer_info.validate()?;
    details.billing_address.validate("billing_address")?;
    if let Some(shipping) = &details.shipping_address {
        shipping.validate("shipping_address")?;
    }

    let shipping_method = details
        .shipping_method
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    let totals = compute_totals(cart, shipping_method.as_deref(), flat_shipping_rate)?;

    let order_id = Uuid::new_v4();
    let items = cart
        .items
        .iter()
        .map(|item| {
            let unit_price = item.effective_unit_price()?;
            Ok(OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: Some(item.product.id),
                sku: item.product.sku.clone(),
                title: item.product.title.clone(),
                ean13: item.product.ean13.clone(),
                line_total: (unit_price * BigDecimal::from(item.quantity)).with_scale(2),
                unit_price: item.unit_price.clone(),
                quantity: item.quantity,
                delivery_option: item.delivery_option.clone(),
                warranty_option: item.warranty_option.clone(),
                created_at: now,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    let shipping_address = details
        .shipping_address
        .unwrap_or_else(|| details.billing_address.clone());

    Ok(Order {
        id: order_id,
        order_number: order_number(order_id, now),
        user_id: user_id.or(cart.user_id),
        session_id: cart.session_id.clone(),
        cart_id: Some(cart.id),
        customer_info: to_json(&details.customer_info)?,
        billing_address: to_json(&details.billing_address)?,
        shipping_address: to_json(&shipping_address)?,
        shipping_method,
        subtotal: totals.subtotal,
        shipping_cost: totals.shipping_cost,
        tax_amount: totals.tax_amount,
        discount_amount: totals.discount_amount,
        total: totals.total,
        currency: currency.to_string(),
        status: OrderStatus::Pending,
        payment_status: OrderPaymentStatus::Pending,
        shipping_status: ShippingStatus::NotShipped,
        tracking_number: None,
        notes: details.notes,
        paid_at: None,
        confirmed_at: None,
        shipped_at: None,
        delivered_at: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
        items,
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::Internal(e.to_string()))
}
