use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::cart::{Cart, NewCart, NewCartItem, Product};
use super::errors::DomainError;
use super::order::{Order, OrderChange, OrderStatus};
use super::payment::{
    CreatePaymentRequest, Payment, PaymentEvent, PaymentStatus, ProviderKind, ProviderPayment,
    ProviderRefund, SimulatedWebhook, StatusChange, Transition,
};
use super::warranty::{
    WarrantyConfirmation, WarrantyFailure, WarrantyRegistration, WarrantyRequest,
};
use super::Page;

pub trait CartRepository: Send + Sync + 'static {
    fn create(&self, cart: NewCart) -> Result<Cart, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Cart>, DomainError>;
    fn find_product(&self, id: Uuid) -> Result<Option<Product>, DomainError>;
    fn add_item(&self, item: NewCartItem) -> Result<(), DomainError>;
    /// Returns `false` when the item does not belong to the cart.
    fn set_item_quantity(&self, cart_id: Uuid, item_id: Uuid, quantity: i32) -> Result<bool, DomainError>;
    fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool, DomainError>;
}

pub trait OrderRepository: Send + Sync + 'static {
    /// Persists the order and its items atomically.
    fn create(&self, order: &Order) -> Result<(), DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    /// Orders without their items, newest first.
    fn list(&self, status: Option<OrderStatus>, page: i64, limit: i64) -> Result<Page<Order>, DomainError>;
    fn list_for_user(&self, user_id: Uuid, page: i64, limit: i64) -> Result<Page<Order>, DomainError>;
    /// Applies an operator update under a row lock and returns the result.
    fn update(&self, id: Uuid, change: &OrderChange, now: DateTime<Utc>) -> Result<Order, DomainError>;
}

pub trait PaymentRepository: Send + Sync + 'static {
    fn create(&self, payment: &Payment) -> Result<(), DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DomainError>;
    fn find_by_provider_ref(
        &self,
        provider: ProviderKind,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError>;
    fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, DomainError>;
    fn attach_provider_reference(
        &self,
        id: Uuid,
        provider_payment_id: &str,
        payment_url: Option<&str>,
    ) -> Result<(), DomainError>;
    /// Locks the payment and its order, runs the payment state machine and
    /// writes both back in one transaction.
    fn apply_status_change(
        &self,
        payment_id: Uuid,
        change: &StatusChange,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Payment, Order), DomainError>;
    /// Adds a refund the provider executed to the locked payment. The
    /// refund is validated again against the stored state.
    fn record_refund(
        &self,
        payment_id: Uuid,
        amount: &BigDecimal,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Payment, Order), DomainError>;
}

pub trait WarrantyRepository: Send + Sync + 'static {
    fn find_by_id(&self, id: Uuid) -> Result<Option<WarrantyRegistration>, DomainError>;
    /// Inserts the registration unless one already exists for the order
    /// item; returns whichever row is stored.
    fn insert_if_absent(&self, registration: &WarrantyRegistration) -> Result<WarrantyRegistration, DomainError>;
    /// Starts attempt number `attempts + 1`: the row is marked pending and
    /// its counter bumped, provided it is still at `attempts` and claimable.
    /// `None` when another attempt got there first or the row is settled.
    fn claim(
        &self,
        id: Uuid,
        attempts: i32,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<WarrantyRegistration>, DomainError>;
    /// Stores the outcome of the claimed attempt; when `warranty_option` is
    /// given the order item's option is replaced in the same transaction.
    /// Returns `false`, writing nothing, when the row was cancelled or
    /// claimed again in the meantime.
    fn save_attempt(
        &self,
        registration: &WarrantyRegistration,
        warranty_option: Option<&Value>,
    ) -> Result<bool, DomainError>;
    /// Failed registrations and pending ones untouched since `stale_before`,
    /// most recently updated first.
    fn list_needing_attention(
        &self,
        stale_before: DateTime<Utc>,
        page: i64,
        limit: i64,
    ) -> Result<Page<WarrantyRegistration>, DomainError>;
    fn list_for_order(&self, order_id: Uuid) -> Result<Vec<WarrantyRegistration>, DomainError>;
    fn cancel_for_order(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<usize, DomainError>;
}

/// Capability interface every payment provider implements.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Header carrying the callback signature, if the provider signs.
    fn signature_header(&self) -> Option<&'static str>;

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<ProviderPayment, DomainError>;

    async fn get_payment_status(&self, provider_payment_id: &str) -> Result<PaymentEvent, DomainError>;

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: &BigDecimal,
    ) -> Result<ProviderRefund, DomainError>;

    /// Authenticates a callback and returns the payment state it vouches
    /// for, taken only from sources the provider controls.
    ///
    /// `InvalidSignature` when the callback cannot be trusted,
    /// `InvalidInput` when it is authentic but carries no payment event.
    async fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<PaymentEvent, DomainError>;
}

/// Produces signed callbacks on demand. Only the mock provider can do this.
#[async_trait]
pub trait PaymentSimulator: Send + Sync {
    async fn simulate(
        &self,
        provider_payment_id: &str,
        status: PaymentStatus,
    ) -> Result<SimulatedWebhook, DomainError>;
}

#[async_trait]
pub trait WarrantyApi: Send + Sync {
    async fn register(&self, request: &WarrantyRequest) -> Result<WarrantyConfirmation, WarrantyFailure>;
}
