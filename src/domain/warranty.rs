use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::cart::option_price;
use super::errors::DomainError;
use super::order::{Order, OrderItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarrantyStatus {
    Pending,
    Registered,
    Failed,
    Cancelled,
}

impl WarrantyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarrantyStatus::Pending => "pending",
            WarrantyStatus::Registered => "registered",
            WarrantyStatus::Failed => "failed",
            WarrantyStatus::Cancelled => "cancelled",
        }
    }

    /// Whether another registration attempt makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WarrantyStatus::Pending | WarrantyStatus::Failed)
    }
}

impl FromStr for WarrantyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WarrantyStatus::Pending),
            "registered" => Ok(WarrantyStatus::Registered),
            "failed" => Ok(WarrantyStatus::Failed),
            "cancelled" => Ok(WarrantyStatus::Cancelled),
            other => Err(DomainError::Internal(format!("unknown warranty status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarrantyRegistration {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Option<Uuid>,
    pub warranty_code: String,
    pub ean13: Option<String>,
    pub status: WarrantyStatus,
    pub transaction_id: Option<String>,
    pub pin: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub registered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WarrantyRegistration {
    pub fn pending(order: &Order, item: &OrderItem, warranty_code: String, now: DateTime<Utc>) -> Self {
        WarrantyRegistration {
            id: Uuid::new_v4(),
            order_id: order.id,
            order_item_id: item.id,
            product_id: item.product_id,
            warranty_code,
            ean13: item.ean13.clone(),
            status: WarrantyStatus::Pending,
            transaction_id: None,
            pin: None,
            error_code: None,
            error_message: None,
            attempts: 0,
            registered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a new attempt may start. A pending row that was attempted is
    /// in flight until it has been quiet since before `stale_before`.
    pub fn is_claimable(&self, stale_before: DateTime<Utc>) -> bool {
        match self.status {
            WarrantyStatus::Failed => true,
            WarrantyStatus::Pending => self.attempts == 0 || self.updated_at < stale_before,
            WarrantyStatus::Registered | WarrantyStatus::Cancelled => false,
        }
    }

    /// Failed rows, and pending rows whose attempt never reported back.
    pub fn needs_attention(&self, stale_before: DateTime<Utc>) -> bool {
        match self.status {
            WarrantyStatus::Failed => true,
            WarrantyStatus::Pending => self.updated_at < stale_before,
            WarrantyStatus::Registered | WarrantyStatus::Cancelled => false,
        }
    }
}

/// Minutes after which a pending attempt is presumed lost. Well above any
/// HTTP timeout towards the warranty provider.
pub const STALE_ATTEMPT_MINUTES: i64 = 15;

pub fn stale_before(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::minutes(STALE_ATTEMPT_MINUTES)
}

/// Outcome of a registration attempt that did not produce a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarrantyFailure {
    pub code: String,
    pub message: String,
}

impl WarrantyFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        WarrantyFailure {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarrantyConfirmation {
    pub transaction_id: String,
    pub pin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarrantyCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Payload of one registration call to the warranty provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarrantyRequest {
    pub ean13: String,
    pub product_title: String,
    pub warranty_code: String,
    pub order_number: String,
    pub purchase_date: NaiveDate,
    pub product_price: String,
    pub warranty_price: String,
    pub quantity: i32,
    pub customer: WarrantyCustomer,
}

/// Standard EAN-13 check: 13 digits, the last being the weighted checksum.
pub fn is_valid_ean13(code: &str) -> bool {
    let digits: Vec<u32> = code.chars().filter_map(|c| c.to_digit(10)).collect();
    if code.len() != 13 || digits.len() != 13 {
        return false;
    }
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
        .sum();
    (10 - sum % 10) % 10 == digits[12]
}

/// The provider's product code for a warranty option: `code`, else `id`.
pub fn warranty_code(option: &Value) -> Option<String> {
    ["code", "id"].iter().find_map(|key| match option.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Order items that carry a warranty option.
pub fn items_with_warranty(order: &Order) -> impl Iterator<Item = &OrderItem> {
    order.items.iter().filter(|i| {
        i.warranty_option
            .as_ref()
            .is_some_and(|w| w.is_object())
    })
}

/// Assembles the provider request for an item, or the reason it cannot be
/// sent at all.
pub fn build_request(order: &Order, item: &OrderItem) -> Result<WarrantyRequest, WarrantyFailure> {
    let option = item
        .warranty_option
        .as_ref()
        .ok_or_else(|| WarrantyFailure::new("NO_WARRANTY", "order item has no warranty option"))?;
    let code = warranty_code(option)
        .ok_or_else(|| WarrantyFailure::new("MISSING_WARRANTY_CODE", "warranty option has no code"))?;

    let ean13 = item.ean13.clone().unwrap_or_default();
    if !is_valid_ean13(&ean13) {
        return Err(WarrantyFailure::new(
            "INVALID_EAN13",
            format!("product {} has no valid EAN13 ('{ean13}')", item.sku),
        ));
    }

    let customer = order.customer().ok_or_else(|| {
        WarrantyFailure::new("MISSING_CUSTOMER", "order has no usable customer information")
    })?;
    if customer.email.trim().is_empty() {
        return Err(WarrantyFailure::new("MISSING_CUSTOMER_EMAIL", "customer email is empty"));
    }

    let warranty_price = option_price(option, "warranty_option")
        .map_err(|e| WarrantyFailure::new("INVALID_WARRANTY_PRICE", e.to_string()))?;
    let purchased = order.paid_at.unwrap_or(order.created_at);

    Ok(WarrantyRequest {
        ean13,
        product_title: item.title.clone(),
        warranty_code: code,
        order_number: order.order_number.clone(),
        purchase_date: purchased.date_naive(),
        product_price: money(&item.unit_price),
        warranty_price: money(&warranty_price),
        quantity: item.quantity,
        customer: WarrantyCustomer {
            first_name: customer.first_name,
            last_name: customer.last_name,
            email: customer.email,
            phone: customer.phone,
        },
    })
}

fn money(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

/// Warranty option enriched with the contract data returned by the provider.
pub fn enrich_warranty_option(
    option: &Value,
    confirmation: &WarrantyConfirmation,
    registered_at: DateTime<Utc>,
) -> Value {
    let mut enriched = option.clone();
    if let Some(map) = enriched.as_object_mut() {
        map.insert(
            "contract_number".to_string(),
            Value::String(confirmation.transaction_id.clone()),
        );
        map.insert("pin".to_string(), Value::String(confirmation.pin.clone()));
        map.insert(
            "registered_at".to_string(),
            Value::String(registered_at.to_rfc3339()),
        );
    }
    enriched
}
