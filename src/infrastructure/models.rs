use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::cart::{Cart, CartItem, CartStatus, Product};
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderItem, OrderPaymentStatus, OrderStatus, ShippingStatus};
use crate::domain::payment::{Payment, PaymentStatus, ProviderKind};
use crate::domain::warranty::{WarrantyRegistration, WarrantyStatus};
use crate::schema::{
    cart_items, carts, commerce_order_outbox, order_items, orders, payments, products,
    warranty_registrations,
};

// ── Catalog & carts ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub sku: String,
    pub title: String,
    pub price: BigDecimal,
    pub ean13: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            sku: row.sku,
            title: row.title,
            price: row.price,
            ean13: row.ean13,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartRow {
    pub fn into_domain(self, items: Vec<CartItem>) -> Result<Cart, DomainError> {
        Ok(Cart {
            id: self.id,
            user_id: self.user_id,
            session_id: self.session_id,
            status: CartStatus::from_str(&self.status)?,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = carts)]
pub struct NewCartRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = cart_items)]
#[diesel(belongs_to(CartRow, foreign_key = cart_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub delivery_option: Option<Value>,
    pub warranty_option: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl CartItemRow {
    pub fn into_domain(self, product: ProductRow) -> CartItem {
        CartItem {
            id: self.id,
            cart_id: self.cart_id,
            product: product.into(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            delivery_option: self.delivery_option,
            warranty_option: self.warranty_option,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cart_items)]
pub struct NewCartItemRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub delivery_option: Option<Value>,
    pub warranty_option: Option<Value>,
}

// ── Orders ───────────────────────────────────────────────────────────────────

/// Full order row, used for inserts and for whole-row updates.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = orders)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
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
    pub status: String,
    pub payment_status: String,
    pub shipping_status: String,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_domain(self, items: Vec<OrderItem>) -> Result<Order, DomainError> {
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            session_id: self.session_id,
            cart_id: self.cart_id,
            customer_info: self.customer_info,
            billing_address: self.billing_address,
            shipping_address: self.shipping_address,
            shipping_method: self.shipping_method,
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            total: self.total,
            currency: self.currency,
            status: OrderStatus::from_str(&self.status)
                .map_err(|_| DomainError::Internal(format!("unknown order status '{}'", self.status)))?,
            payment_status: OrderPaymentStatus::from_str(&self.payment_status)?,
            shipping_status: ShippingStatus::from_str(&self.shipping_status).map_err(|_| {
                DomainError::Internal(format!("unknown shipping status '{}'", self.shipping_status))
            })?,
            tracking_number: self.tracking_number,
            notes: self.notes,
            paid_at: self.paid_at,
            confirmed_at: self.confirmed_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        })
    }
}

impl From<&Order> for OrderRow {
    fn from(o: &Order) -> Self {
        OrderRow {
            id: o.id,
            order_number: o.order_number.clone(),
            user_id: o.user_id,
            session_id: o.session_id.clone(),
            cart_id: o.cart_id,
            customer_info: o.customer_info.clone(),
            billing_address: o.billing_address.clone(),
            shipping_address: o.shipping_address.clone(),
            shipping_method: o.shipping_method.clone(),
            subtotal: o.subtotal.clone(),
            shipping_cost: o.shipping_cost.clone(),
            tax_amount: o.tax_amount.clone(),
            discount_amount: o.discount_amount.clone(),
            total: o.total.clone(),
            currency: o.currency.clone(),
            status: o.status.as_str().to_string(),
            payment_status: o.payment_status.as_str().to_string(),
            shipping_status: o.shipping_status.as_str().to_string(),
            tracking_number: o.tracking_number.clone(),
            notes: o.notes.clone(),
            paid_at: o.paid_at,
            confirmed_at: o.confirmed_at,
            shipped_at: o.shipped_at,
            delivered_at: o.delivered_at,
            cancelled_at: o.cancelled_at,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, Associations)]
#[diesel(table_name = order_items)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
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

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            sku: row.sku,
            title: row.title,
            ean13: row.ean13,
            unit_price: row.unit_price,
            quantity: row.quantity,
            line_total: row.line_total,
            delivery_option: row.delivery_option,
            warranty_option: row.warranty_option,
            created_at: row.created_at,
        }
    }
}

impl From<&OrderItem> for OrderItemRow {
    fn from(i: &OrderItem) -> Self {
        OrderItemRow {
            id: i.id,
            order_id: i.order_id,
            product_id: i.product_id,
            sku: i.sku.clone(),
            title: i.title.clone(),
            ean13: i.ean13.clone(),
            unit_price: i.unit_price.clone(),
            quantity: i.quantity,
            line_total: i.line_total.clone(),
            delivery_option: i.delivery_option.clone(),
            warranty_option: i.warranty_option.clone(),
            created_at: i.created_at,
        }
    }
}

// ── Payments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = payments)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub status: String,
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

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            provider: ProviderKind::from_str(&row.provider)
                .map_err(|_| DomainError::Internal(format!("unknown provider '{}'", row.provider)))?,
            status: PaymentStatus::from_str(&row.status)
                .map_err(|_| DomainError::Internal(format!("unknown payment status '{}'", row.status)))?,
            amount: row.amount,
            currency: row.currency,
            provider_payment_id: row.provider_payment_id,
            transaction_id: row.transaction_id,
            payment_url: row.payment_url,
            failure_reason: row.failure_reason,
            refunded_amount: row.refunded_amount,
            refund_reason: row.refund_reason,
            refunded_at: row.refunded_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Payment> for PaymentRow {
    fn from(p: &Payment) -> Self {
        PaymentRow {
            id: p.id,
            order_id: p.order_id,
            provider: p.provider.as_str().to_string(),
            status: p.status.as_str().to_string(),
            amount: p.amount.clone(),
            currency: p.currency.clone(),
            provider_payment_id: p.provider_payment_id.clone(),
            transaction_id: p.transaction_id.clone(),
            payment_url: p.payment_url.clone(),
            failure_reason: p.failure_reason.clone(),
            refunded_amount: p.refunded_amount.clone(),
            refund_reason: p.refund_reason.clone(),
            refunded_at: p.refunded_at,
            completed_at: p.completed_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

// ── Warranty registrations ───────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = warranty_registrations)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WarrantyRegistrationRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Option<Uuid>,
    pub warranty_code: String,
    pub ean13: Option<String>,
    pub status: String,
    pub transaction_id: Option<String>,
    pub pin: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub registered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WarrantyRegistrationRow> for WarrantyRegistration {
    type Error = DomainError;

    fn try_from(row: WarrantyRegistrationRow) -> Result<Self, Self::Error> {
        Ok(WarrantyRegistration {
            id: row.id,
            order_id: row.order_id,
            order_item_id: row.order_item_id,
            product_id: row.product_id,
            warranty_code: row.warranty_code,
            ean13: row.ean13,
            status: WarrantyStatus::from_str(&row.status)?,
            transaction_id: row.transaction_id,
            pin: row.pin,
            error_code: row.error_code,
            error_message: row.error_message,
            attempts: row.attempts,
            registered_at: row.registered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&WarrantyRegistration> for WarrantyRegistrationRow {
    fn from(w: &WarrantyRegistration) -> Self {
        WarrantyRegistrationRow {
            id: w.id,
            order_id: w.order_id,
            order_item_id: w.order_item_id,
            product_id: w.product_id,
            warranty_code: w.warranty_code.clone(),
            ean13: w.ean13.clone(),
            status: w.status.as_str().to_string(),
            transaction_id: w.transaction_id.clone(),
            pin: w.pin.clone(),
            error_code: w.error_code.clone(),
            error_message: w.error_message.clone(),
            attempts: w.attempts,
            registered_at: w.registered_at,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

// ── Outbox ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = commerce_order_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = commerce_order_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}
