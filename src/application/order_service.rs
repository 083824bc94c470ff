use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use super::run_blocking;
use super::warranty_service::WarrantyService;
use crate::domain::errors::DomainError;
use crate::domain::order::{build_order, CheckoutDetails, Order, OrderChange, OrderStatus};
use crate::domain::ports::{CartRepository, OrderRepository};
use crate::domain::Page;

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartRepository>,
    warranties: WarrantyService,
    currency: String,
    flat_shipping_rate: BigDecimal,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartRepository>,
        warranties: WarrantyService,
        currency: String,
        flat_shipping_rate: BigDecimal,
    ) -> Self {
        Self {
            orders,
            carts,
            warranties,
            currency,
            flat_shipping_rate,
        }
    }

    /// Turns a cart into a pending order. The cart is left as it is.
    pub async fn checkout(
        &self,
        cart_id: Uuid,
        details: CheckoutDetails,
        user_id: Option<Uuid>,
    ) -> Result<Order, DomainError> {
        let carts = Arc::clone(&self.carts);
        let orders = Arc::clone(&self.orders);
        let currency = self.currency.clone();
        let rate = self.flat_shipping_rate.clone();

        let order = run_blocking(move || {
            let cart = carts
                .find_by_id(cart_id)?
                .ok_or_else(|| DomainError::not_found("Cart"))?;
            if let (Some(caller), Some(owner)) = (user_id, cart.user_id) {
                if caller != owner {
                    return Err(DomainError::Forbidden(
                        "cart belongs to another user".to_string(),
                    ));
                }
            }
            let order = build_order(&cart, details, user_id, &currency, &rate, Utc::now())?;
            orders.create(&order)?;
            Ok(order)
        })
        .await?;

        log::info!(
            "Created order {} ({}) total {} {}",
            order.order_number,
            order.id,
            order.total,
            order.currency
        );
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let repo = Arc::clone(&self.orders);
        run_blocking(move || repo.find_by_id(id)).await
    }

    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: i64,
        limit: i64,
    ) -> Result<Page<Order>, DomainError> {
        let repo = Arc::clone(&self.orders);
        run_blocking(move || repo.list(status, page, limit)).await
    }

    pub async fn list_user_orders(&self, user_id: Uuid, page: i64, limit: i64) -> Result<Page<Order>, DomainError> {
        let repo = Arc::clone(&self.orders);
        run_blocking(move || repo.list_for_user(user_id, page, limit)).await
    }

    /// Operator update. Cancelling an order also cancels its warranties.
    pub async fn update_order(&self, id: Uuid, change: OrderChange) -> Result<Order, DomainError> {
        let repo = Arc::clone(&self.orders);
        let cancelling = change.status == Some(OrderStatus::Cancelled);
        let order = run_blocking(move || repo.update(id, &change, Utc::now())).await?;
        log::info!(
            "Order {} is now {} / shipping {}",
            order.order_number,
            order.status.as_str(),
            order.shipping_status.as_str()
        );

        if cancelling {
            if let Err(e) = self.warranties.cancel_for_order(order.id).await {
                log::error!("Failed to cancel warranties for order {}: {e}", order.id);
            }
        }
        Ok(order)
    }
}
