//! In-memory port implementations for service and handler tests.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::cart::{Cart, CartItem, CartStatus, NewCart, NewCartItem, Product};
use crate::domain::errors::DomainError;
use crate::domain::order::{
    Order, OrderChange, OrderItem, OrderPaymentStatus, OrderStatus, ShippingStatus,
};
use crate::domain::payment::{
    apply_refund, apply_status_change, Payment, ProviderKind, StatusChange, Transition,
};
use crate::domain::ports::{
    CartRepository, OrderRepository, PaymentRepository, WarrantyApi, WarrantyRepository,
};
use crate::domain::warranty::{
    WarrantyConfirmation, WarrantyFailure, WarrantyRegistration, WarrantyRequest, WarrantyStatus,
};
use crate::domain::Page;

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    warranties: HashMap<Uuid, WarrantyRegistration>,
    outbox: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_product(&self, sku: &str, title: &str, price: &str, ean13: Option<&str>) -> Product {
        let product = Product {
            id: Uuid::new_v4(),
            sku: sku.to_string(),
            title: title.to_string(),
            price: BigDecimal::from_str(price).unwrap(),
            ean13: ean13.map(str::to_string),
            is_active: true,
        };
        self.state.lock().unwrap().products.insert(product.id, product.clone());
        product
    }

    pub fn deactivate_product(&self, id: Uuid) {
        if let Some(p) = self.state.lock().unwrap().products.get_mut(&id) {
            p.is_active = false;
        }
    }

    pub fn add_cart(&self, user_id: Option<Uuid>, lines: &[(Uuid, i32)]) -> Cart {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let cart_id = Uuid::new_v4();
        let items = lines
            .iter()
            .map(|(product_id, quantity)| {
                let product = state.products[product_id].clone();
                CartItem {
                    id: Uuid::new_v4(),
                    cart_id,
                    unit_price: product.price.clone(),
                    product,
                    quantity: *quantity,
                    delivery_option: None,
                    warranty_option: None,
                    created_at: now,
                }
            })
            .collect();
        let cart = Cart {
            id: cart_id,
            user_id,
            session_id: None,
            status: CartStatus::Active,
            expires_at: now + Duration::hours(1),
            created_at: now,
            updated_at: now,
            items,
        };
        state.carts.insert(cart.id, cart.clone());
        cart
    }

    pub fn cart_item_count(&self, cart_id: Uuid) -> usize {
        self.state.lock().unwrap().carts[&cart_id].items.len()
    }

    /// Inserts or replaces an order.
    pub fn insert_order(&self, order: Order) {
        self.state.lock().unwrap().orders.insert(order.id, order);
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.state.lock().unwrap().orders.get(&id).cloned()
    }

    pub fn order_item_warranty(&self, item_id: Uuid) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .orders
            .values()
            .flat_map(|o| o.items.iter())
            .find(|i| i.id == item_id)
            .and_then(|i| i.warranty_option.clone())
    }

    /// Inserts or replaces a warranty registration.
    pub fn insert_warranty(&self, registration: WarrantyRegistration) {
        self.state
            .lock()
            .unwrap()
            .warranties
            .insert(registration.id, registration);
    }

    pub fn outbox_events(&self, event_type: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .outbox
            .iter()
            .filter(|e| e.as_str() == event_type)
            .count()
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: i64, limit: i64) -> Page<T> {
    let total = items.len() as i64;
    let offset = page.saturating_sub(1).saturating_mul(limit).max(0) as usize;
    let items = items.drain(..).skip(offset).take(limit as usize).collect();
    Page { items, total }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    for o in &mut orders {
        o.items.clear();
    }
    orders
}

impl CartRepository for InMemoryStore {
    fn create(&self, cart: NewCart) -> Result<Cart, DomainError> {
        let now = Utc::now();
        let cart = Cart {
            id: cart.id,
            user_id: cart.user_id,
            session_id: cart.session_id,
            status: CartStatus::Active,
            expires_at: cart.expires_at,
            created_at: now,
            updated_at: now,
            items: vec![],
        };
        self.state.lock().unwrap().carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, DomainError> {
        Ok(self.state.lock().unwrap().carts.get(&id).cloned())
    }

    fn find_product(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        Ok(self.state.lock().unwrap().products.get(&id).cloned())
    }

    fn add_item(&self, item: NewCartItem) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let product = state
            .products
            .get(&item.product_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Product"))?;
        let cart = state
            .carts
            .get_mut(&item.cart_id)
            .ok_or_else(|| DomainError::not_found("Cart"))?;
        cart.items.push(CartItem {
            id: item.id,
            cart_id: item.cart_id,
            product,
            quantity: item.quantity,
            unit_price: item.unit_price,
            delivery_option: item.delivery_option,
            warranty_option: item.warranty_option,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn set_item_quantity(&self, cart_id: Uuid, item_id: Uuid, quantity: i32) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let item = state
            .carts
            .get_mut(&cart_id)
            .and_then(|c| c.items.iter_mut().find(|i| i.id == item_id));
        Ok(match item {
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => false,
        })
    }

    fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(cart) = state.carts.get_mut(&cart_id) else {
            return Ok(false);
        };
        let before = cart.items.len();
        cart.items.retain(|i| i.id != item_id);
        Ok(cart.items.len() != before)
    }
}

impl OrderRepository for InMemoryStore {
    fn create(&self, order: &Order) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.orders.insert(order.id, order.clone());
        state.outbox.push("OrderCreated".to_string());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        Ok(self.state.lock().unwrap().orders.get(&id).cloned())
    }

    fn list(&self, status: Option<OrderStatus>, page: i64, limit: i64) -> Result<Page<Order>, DomainError> {
        let state = self.state.lock().unwrap();
        let orders = state
            .orders
            .values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        Ok(paginate(newest_first(orders), page, limit))
    }

    fn list_for_user(&self, user_id: Uuid, page: i64, limit: i64) -> Result<Page<Order>, DomainError> {
        let state = self.state.lock().unwrap();
        let orders = state
            .orders
            .values()
            .filter(|o| o.is_owned_by(user_id))
            .cloned()
            .collect();
        Ok(paginate(newest_first(orders), page, limit))
    }

    fn update(&self, id: Uuid, change: &OrderChange, now: DateTime<Utc>) -> Result<Order, DomainError> {
        let mut state = self.state.lock().unwrap();
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Order"))?;
        let mut updated = order.clone();
        if updated.apply_change(change, now)? {
            *order = updated.clone();
            state.outbox.push("OrderStatusChanged".to_string());
        }
        Ok(updated)
    }
}

impl PaymentRepository for InMemoryStore {
    fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        self.state.lock().unwrap().payments.insert(payment.id, payment.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DomainError> {
        Ok(self.state.lock().unwrap().payments.get(&id).cloned())
    }

    fn find_by_provider_ref(
        &self,
        provider: ProviderKind,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| {
                p.provider == provider && p.provider_payment_id.as_deref() == Some(provider_payment_id)
            })
            .cloned())
    }

    fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, DomainError> {
        let mut payments: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payments)
    }

    fn attach_provider_reference(
        &self,
        id: Uuid,
        provider_payment_id: &str,
        payment_url: Option<&str>,
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Payment"))?;
        payment.provider_payment_id = Some(provider_payment_id.to_string());
        payment.payment_url = payment_url.map(str::to_string);
        Ok(())
    }

    fn apply_status_change(
        &self,
        payment_id: Uuid,
        change: &StatusChange,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Payment, Order), DomainError> {
        self.with_locked(payment_id, |payment, order| {
            Ok(apply_status_change(payment, order, change, now))
        })
    }

    fn record_refund(
        &self,
        payment_id: Uuid,
        amount: &BigDecimal,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Payment, Order), DomainError> {
        self.with_locked(payment_id, |payment, order| {
            apply_refund(payment, order, amount, reason, now)
        })
    }
}

impl InMemoryStore {
    fn with_locked<F>(&self, payment_id: Uuid, step: F) -> Result<(Transition, Payment, Order), DomainError>
    where
        F: FnOnce(&mut Payment, &mut Order) -> Result<Transition, DomainError>,
    {
        let mut state = self.state.lock().unwrap();
        let mut payment = state
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Payment"))?;
        let mut order = state
            .orders
            .get(&payment.order_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Order"))?;

        let transition = step(&mut payment, &mut order)?;
        if let Transition::Applied { .. } = transition {
            state.payments.insert(payment.id, payment.clone());
            state.orders.insert(order.id, order.clone());
            state.outbox.push("PaymentStatusChanged".to_string());
        }
        Ok((transition, payment, order))
    }
}

impl WarrantyRepository for InMemoryStore {
    fn find_by_id(&self, id: Uuid) -> Result<Option<WarrantyRegistration>, DomainError> {
        Ok(self.state.lock().unwrap().warranties.get(&id).cloned())
    }

    fn insert_if_absent(&self, registration: &WarrantyRegistration) -> Result<WarrantyRegistration, DomainError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .warranties
            .values()
            .find(|w| w.order_item_id == registration.order_item_id)
        {
            return Ok(existing.clone());
        }
        state.warranties.insert(registration.id, registration.clone());
        Ok(registration.clone())
    }

    fn claim(
        &self,
        id: Uuid,
        attempts: i32,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<WarrantyRegistration>, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(reg) = state.warranties.get_mut(&id) else {
            return Ok(None);
        };
        if reg.attempts != attempts || !reg.is_claimable(stale_before) {
            return Ok(None);
        }
        reg.status = WarrantyStatus::Pending;
        reg.attempts += 1;
        reg.updated_at = now;
        Ok(Some(reg.clone()))
    }

    fn save_attempt(
        &self,
        registration: &WarrantyRegistration,
        warranty_option: Option<&Value>,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let current = state.warranties.get(&registration.id);
        if current.map_or(true, |w| {
            w.status == WarrantyStatus::Cancelled || w.attempts != registration.attempts
        }) {
            return Ok(false);
        }
        state.warranties.insert(registration.id, registration.clone());
        if let Some(option) = warranty_option {
            if let Some(item) = state
                .orders
                .get_mut(&registration.order_id)
                .and_then(|o| o.items.iter_mut().find(|i| i.id == registration.order_item_id))
            {
                item.warranty_option = Some(option.clone());
            }
        }
        Ok(true)
    }

    fn list_needing_attention(
        &self,
        stale_before: DateTime<Utc>,
        page: i64,
        limit: i64,
    ) -> Result<Page<WarrantyRegistration>, DomainError> {
        let mut regs: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .warranties
            .values()
            .filter(|w| w.needs_attention(stale_before))
            .cloned()
            .collect();
        regs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(regs, page, limit))
    }

    fn list_for_order(&self, order_id: Uuid) -> Result<Vec<WarrantyRegistration>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .warranties
            .values()
            .filter(|w| w.order_id == order_id)
            .cloned()
            .collect())
    }

    fn cancel_for_order(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut state = self.state.lock().unwrap();
        let mut cancelled = 0;
        for w in state.warranties.values_mut() {
            if w.order_id == order_id && w.status != WarrantyStatus::Cancelled {
                w.status = WarrantyStatus::Cancelled;
                w.updated_at = now;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

/// Warranty API double that fails a fixed number of calls before succeeding.
pub struct ScriptedWarrantyApi {
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedWarrantyApi {
    pub fn succeeding() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarrantyApi for ScriptedWarrantyApi {
    async fn register(&self, request: &WarrantyRequest) -> Result<WarrantyConfirmation, WarrantyFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Err(WarrantyFailure::new("HTTP_503", "service unavailable"));
        }
        Ok(WarrantyConfirmation {
            transaction_id: format!("G3-{}-{n}", request.order_number),
            pin: format!("{:06}", n),
        })
    }
}

/// A pending order with one item per `(ean13, warranty_option)` entry.
pub fn pending_order(items: &[(Option<&str>, Option<Value>)]) -> Order {
    let now = Utc::now();
    let id = Uuid::new_v4();
    let items: Vec<OrderItem> = items
        .iter()
        .map(|(ean13, warranty)| OrderItem {
            id: Uuid::new_v4(),
            order_id: id,
            product_id: Some(Uuid::new_v4()),
            sku: "FR-200".to_string(),
            title: "Fridge".to_string(),
            ean13: ean13.map(str::to_string),
            unit_price: BigDecimal::from(250),
            quantity: 1,
            line_total: BigDecimal::from(250),
            delivery_option: None,
            warranty_option: warranty.clone(),
            created_at: now,
        })
        .collect();
    let total = items
        .iter()
        .fold(BigDecimal::zero(), |acc, i| acc + &i.line_total)
        .with_scale(2);
    Order {
        id,
        order_number: format!("ORD-{}-TEST", now.format("%Y%m%d")),
        user_id: None,
        session_id: None,
        cart_id: None,
        customer_info: json!({
            "first_name": "Luca",
            "last_name": "Neri",
            "email": "luca@example.com",
            "phone": "+39 06 1234567"
        }),
        billing_address: json!({"line1": "Via Po 3", "city": "Roma", "postal_code": "00100", "country": "IT"}),
        shipping_address: json!({"line1": "Via Po 3", "city": "Roma", "postal_code": "00100", "country": "IT"}),
        shipping_method: None,
        subtotal: total.clone(),
        shipping_cost: BigDecimal::zero(),
        tax_amount: BigDecimal::zero(),
        discount_amount: BigDecimal::zero(),
        total,
        currency: "EUR".to_string(),
        status: OrderStatus::Pending,
        payment_status: OrderPaymentStatus::Pending,
        shipping_status: ShippingStatus::NotShipped,
        tracking_number: None,
        notes: None,
        paid_at: None,
        confirmed_at: None,
        shipped_at: None,
        delivered_at: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
        items,
    }
}

/// Same as [`pending_order`] but already paid and confirmed.
pub fn paid_order(items: &[(Option<&str>, Option<Value>)]) -> Order {
    let now = Utc::now();
    let mut order = pending_order(items);
    order.status = OrderStatus::Confirmed;
    order.payment_status = OrderPaymentStatus::Paid;
    order.paid_at = Some(now);
    order.confirmed_at = Some(now);
    order
}

pub const TEST_ADMIN_KEY: &str = "test-admin-key";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Application state wired to one in-memory store and the mock provider.
pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub mock: Arc<crate::infrastructure::payment::mock::MockProvider>,
    pub state: crate::state::AppState,
}

pub fn test_app() -> TestApp {
    use crate::application::cart_service::CartService;
    use crate::application::order_service::OrderService;
    use crate::application::payment_service::{PaymentProviders, PaymentService};
    use crate::application::warranty_service::WarrantyService;
    use crate::auth::AuthSettings;
    use crate::infrastructure::payment::mock::MockProvider;

    let store = InMemoryStore::new();
    let mock = Arc::new(MockProvider::new(TEST_WEBHOOK_SECRET));
    let mut providers = PaymentProviders::new();
    providers.register(mock.clone());
    providers.set_simulator(mock.clone());

    let warranties = WarrantyService::new(store.clone(), store.clone(), ScriptedWarrantyApi::succeeding());
    let state = crate::state::AppState {
        carts: CartService::new(store.clone(), 24),
        orders: OrderService::new(
            store.clone(),
            store.clone(),
            warranties.clone(),
            "EUR".to_string(),
            BigDecimal::from_str("9.90").unwrap(),
        ),
        payments: PaymentService::new(
            store.clone(),
            store.clone(),
            Arc::new(providers),
            warranties.clone(),
            "http://localhost:8080".to_string(),
        ),
        warranties,
        auth: AuthSettings {
            admin_api_key: TEST_ADMIN_KEY.to_string(),
            jwt_secret: TEST_JWT_SECRET.to_string(),
        },
    };
    TestApp { store, mock, state }
}

pub fn user_token(user_id: Uuid) -> String {
    crate::auth::issue_token(
        TEST_JWT_SECRET,
        user_id,
        "shopper@example.com",
        crate::auth::RegType::Customer,
        Duration::hours(1),
    )
    .unwrap()
}
