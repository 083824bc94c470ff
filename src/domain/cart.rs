use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::errors::DomainError;

pub const MAX_ITEM_QUANTITY: i32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartStatus {
    Active,
    Converted,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Converted => "converted",
            CartStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for CartStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CartStatus::Active),
            "converted" => Ok(CartStatus::Converted),
            "abandoned" => Ok(CartStatus::Abandoned),
            other => Err(DomainError::Internal(format!("unknown cart status '{other}'"))),
        }
    }
}

/// Catalog entry as seen by the checkout flow.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub title: String,
    pub price: BigDecimal,
    pub ean13: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub delivery_option: Option<Value>,
    pub warranty_option: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    /// Unit price plus the price of each selected option.
    pub fn effective_unit_price(&self) -> Result<BigDecimal, DomainError> {
        let mut price = self.unit_price.clone();
        if let Some(delivery) = &self.delivery_option {
            price += option_price(delivery, "delivery_option")?;
        }
        if let Some(warranty) = &self.warranty_option {
            price += option_price(warranty, "warranty_option")?;
        }
        Ok(price)
    }

    fn has_same_options(&self, delivery: Option<&Value>, warranty: Option<&Value>) -> bool {
        self.delivery_option.as_ref() == delivery && self.warranty_option.as_ref() == warranty
    }
}

#[derive(Debug, Clone)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub status: CartStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != CartStatus::Active {
            return Err(DomainError::InvalidInput(format!(
                "cart is {}",
                self.status.as_str()
            )));
        }
        if self.expires_at <= now {
            return Err(DomainError::InvalidInput("cart has expired".to_string()));
        }
        Ok(())
    }

    /// An existing line for the same product with identical options, if any.
    pub fn matching_item(
        &self,
        product_id: Uuid,
        delivery: Option<&Value>,
        warranty: Option<&Value>,
    ) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|i| i.product.id == product_id && i.has_same_options(delivery, warranty))
    }
}

#[derive(Debug, Clone)]
pub struct NewCart {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub delivery_option: Option<Value>,
    pub warranty_option: Option<Value>,
}

pub fn validate_quantity(quantity: i32) -> Result<(), DomainError> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(DomainError::validation(
            "quantity",
            format!("must be between 1 and {MAX_ITEM_QUANTITY}"),
        ));
    }
    Ok(())
}

/// Reads the `price` of a delivery or warranty option.
///
/// Prices may be sent as JSON strings or numbers; numbers are parsed from
/// their textual form so no float rounding creeps in.
pub fn option_price(option: &Value, field: &str) -> Result<BigDecimal, DomainError> {
    let raw = match option.get("price") {
        None | Some(Value::Null) => return Ok(BigDecimal::zero()),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(DomainError::validation(
                field,
                "price must be a string or a number",
            ))
        }
    };
    let price = BigDecimal::from_str(&raw)
        .map_err(|_| DomainError::validation(field, format!("invalid price '{raw}'")))?;
    if price < BigDecimal::zero() {
        return Err(DomainError::validation(field, "price must not be negative"));
    }
    Ok(price)
}

pub fn validate_option(option: Option<&Value>, field: &str) -> Result<(), DomainError> {
    let Some(option) = option else {
        return Ok(());
    };
    if !option.is_object() {
        return Err(DomainError::validation(field, "must be a JSON object"));
    }
    option_price(option, field).map(|_| ())
}
