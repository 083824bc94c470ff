use std::str::FromStr;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::payments::PaymentResponse;
use super::warranties::WarrantyResponse;
use super::{default_limit, default_page, money, opt_timestamp, timestamp, PageParams};
use crate::application::Requester;
use crate::auth::{AdminUser, AuthUser, MaybeUser};
use crate::domain::order::{
    Address, CheckoutDetails, CustomerInfo, Order, OrderChange, OrderItem, OrderStatus, ShippingStatus,
};
use crate::domain::Page;
use crate::errors::AppError;
use crate::state::AppState;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub cart_id: Uuid,
    /// `first_name`, `last_name`, `email`, optional `phone`, `company_name`, `vat_number`
    #[schema(value_type = Object)]
    pub customer_info: CustomerInfo,
    /// `line1`, optional `line2`, `city`, `postal_code`, optional `province`, `country`
    #[schema(value_type = Object)]
    pub billing_address: Address,
    /// Defaults to the billing address.
    #[schema(value_type = Option<Object>)]
    pub shipping_address: Option<Address>,
    /// Any non-blank method adds the flat shipping rate.
    pub shipping_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    /// pending, confirmed, processing, shipped, delivered, cancelled
    pub status: Option<String>,
    /// not_shipped, preparing, shipped, delivered, returned
    pub shipping_status: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub sku: String,
    pub title: String,
    pub ean13: Option<String>,
    pub unit_price: String,
    pub quantity: i32,
    pub line_total: String,
    #[schema(value_type = Option<Object>)]
    pub delivery_option: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub warranty_option: Option<Value>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        OrderItemResponse {
            id: item.id,
            product_id: item.product_id,
            sku: item.sku,
            title: item.title,
            ean13: item.ean13,
            unit_price: money(&item.unit_price),
            quantity: item.quantity,
            line_total: money(&item.line_total),
            delivery_option: item.delivery_option,
            warranty_option: item.warranty_option,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub cart_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub customer_info: Value,
    #[schema(value_type = Object)]
    pub billing_address: Value,
    #[schema(value_type = Object)]
    pub shipping_address: Value,
    pub shipping_method: Option<String>,
    pub subtotal: String,
    pub shipping_cost: String,
    pub tax_amount: String,
    pub discount_amount: String,
    pub total: String,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub shipping_status: String,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub paid_at: Option<String>,
    pub confirmed_at: Option<String>,
    pub shipped_at: Option<String>,
    pub delivered_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<OrderItemResponse>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        OrderResponse {
            id: o.id,
            order_number: o.order_number,
            user_id: o.user_id,
            cart_id: o.cart_id,
            customer_info: o.customer_info,
            billing_address: o.billing_address,
            shipping_address: o.shipping_address,
            shipping_method: o.shipping_method,
            subtotal: money(&o.subtotal),
            shipping_cost: money(&o.shipping_cost),
            tax_amount: money(&o.tax_amount),
            discount_amount: money(&o.discount_amount),
            total: money(&o.total),
            currency: o.currency,
            status: o.status.as_str().to_string(),
            payment_status: o.payment_status.as_str().to_string(),
            shipping_status: o.shipping_status.as_str().to_string(),
            tracking_number: o.tracking_number,
            notes: o.notes,
            paid_at: opt_timestamp(&o.paid_at),
            confirmed_at: opt_timestamp(&o.confirmed_at),
            shipped_at: opt_timestamp(&o.shipped_at),
            delivered_at: opt_timestamp(&o.delivered_at),
            cancelled_at: opt_timestamp(&o.cancelled_at),
            created_at: timestamp(&o.created_at),
            updated_at: timestamp(&o.updated_at),
            items: o.items.into_iter().map(OrderItemResponse::from).collect(),
        }
    }
}

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListOrdersParams {
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Only orders in this status.
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

fn list_response(result: Page<Order>, page: i64, limit: i64) -> ListOrdersResponse {
    ListOrdersResponse {
        items: result.items.into_iter().map(OrderResponse::from).collect(),
        total: result.total,
        page,
        limit,
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /api/v1/orders/checkout
///
/// Converts a cart into a pending order. Order, items and an `OrderCreated`
/// outbox event are written in one transaction; the cart is not modified.
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Empty, expired or inactive cart, or invalid customer data"),
        (status = 403, description = "Cart belongs to another user"),
        (status = 404, description = "Cart not found"),
    ),
    tag = "orders"
)]
pub async fn checkout(
    state: web::Data<AppState>,
    caller: MaybeUser,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let details = CheckoutDetails {
        customer_info: body.customer_info,
        billing_address: body.billing_address,
        shipping_address: body.shipping_address,
        shipping_method: body.shipping_method,
        notes: body.notes,
    };
    let order = state
        .orders
        .checkout(body.cart_id, details, caller.user_id())
        .await?;
    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}

/// GET /api/v1/orders
///
/// Paginated list of all orders (without their items), newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListOrdersParams),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 400, description = "Unknown status filter"),
        (status = 401, description = "Missing credentials"),
        (status = 403, description = "Not an admin"),
    ),
    security(("api_key" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    _admin: AdminUser,
    state: web::Data<AppState>,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let (page, limit) = PageParams {
        page: params.page,
        limit: params.limit,
    }
    .normalized();
    let status = params
        .status
        .as_deref()
        .map(OrderStatus::from_str)
        .transpose()?;

    let result = state.orders.list_orders(status, page, limit).await?;
    Ok(HttpResponse::Ok().json(list_response(result, page, limit)))
}

/// GET /api/v1/orders/me
///
/// The calling user's orders, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders/me",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated list of the caller's orders", body = ListOrdersResponse),
        (status = 401, description = "Missing credentials"),
        (status = 403, description = "Caller is not a user account"),
    ),
    security(("bearer" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    user: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<PageParams>,
) -> Result<HttpResponse, AppError> {
    let user_id = user
        .0
        .user_id()
        .ok_or_else(|| AppError::Forbidden("API key callers have no orders".to_string()))?;
    let (page, limit) = query.normalized();
    let result = state.orders.list_user_orders(user_id, page, limit).await?;
    Ok(HttpResponse::Ok().json(list_response(result, page, limit)))
}

/// GET /api/v1/orders/{id}
///
/// Returns the order with its items. Orders placed by a user are visible to
/// that user and to admins only.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 401, description = "Order belongs to a user; credentials required"),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    caller: MaybeUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order = state
        .orders
        .get_order(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    let requester = caller.requester();
    if !requester.may_act_on(order.user_id) {
        return Err(match requester {
            Requester::Anonymous => AppError::Unauthorized("authentication required".to_string()),
            _ => AppError::Forbidden("order belongs to another user".to_string()),
        });
    }
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// PATCH /api/v1/orders/{id}
///
/// Operator update of status, shipping status, tracking number or notes.
/// Cancelling an order also cancels its warranty registrations.
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated", body = OrderResponse),
        (status = 400, description = "Unknown status value"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    security(("api_key" = [])),
    tag = "orders"
)]
pub async fn update_order(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let change = OrderChange {
        status: body.status.as_deref().map(OrderStatus::from_str).transpose()?,
        shipping_status: body
            .shipping_status
            .as_deref()
            .map(ShippingStatus::from_str)
            .transpose()?,
        tracking_number: body.tracking_number,
        notes: body.notes,
    };
    let order = state.orders.update_order(path.into_inner(), change).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// GET /api/v1/orders/{id}/payments
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/payments",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Payments of the order, oldest first", body = [PaymentResponse]),
        (status = 404, description = "Order not found"),
    ),
    security(("api_key" = [])),
    tag = "orders"
)]
pub async fn list_order_payments(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let payments = state.payments.list_for_order(path.into_inner()).await?;
    let body: Vec<PaymentResponse> = payments.into_iter().map(PaymentResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// GET /api/v1/orders/{id}/warranties
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/warranties",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Warranty registrations of the order", body = [WarrantyResponse]),
        (status = 404, description = "Order not found"),
    ),
    security(("api_key" = [])),
    tag = "orders"
)]
pub async fn list_order_warranties(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    if state.orders.get_order(order_id).await?.is_none() {
        return Err(AppError::NotFound("Order not found".to_string()));
    }
    let registrations = state.warranties.list_for_order(order_id).await?;
    let body: Vec<WarrantyResponse> = registrations.into_iter().map(WarrantyResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}
