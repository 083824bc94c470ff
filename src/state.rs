use crate::application::cart_service::CartService;
use crate::application::order_service::OrderService;
use crate::application::payment_service::PaymentService;
use crate::application::warranty_service::WarrantyService;
use crate::auth::AuthSettings;

/// Everything handlers need, shared across actix workers.
#[derive(Clone)]
pub struct AppState {
    pub carts: CartService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub warranties: WarrantyService,
    pub auth: AuthSettings,
}
