use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::run_blocking;
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderItem};
use crate::domain::ports::{OrderRepository, WarrantyApi, WarrantyRepository};
use crate::domain::warranty::{
    build_request, enrich_warranty_option, items_with_warranty, stale_before, warranty_code,
    WarrantyRegistration, WarrantyStatus,
};
use crate::domain::Page;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub registered: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct WarrantyService {
    warranties: Arc<dyn WarrantyRepository>,
    orders: Arc<dyn OrderRepository>,
    api: Arc<dyn WarrantyApi>,
}

impl WarrantyService {
    pub fn new(
        warranties: Arc<dyn WarrantyRepository>,
        orders: Arc<dyn OrderRepository>,
        api: Arc<dyn WarrantyApi>,
    ) -> Self {
        Self {
            warranties,
            orders,
            api,
        }
    }

    /// Registers every warranty-bearing item of a paid order that is not
    /// registered yet. Per-item failures are stored on the registration row,
    /// only storage errors bubble up. Cancelled and refunded orders get no
    /// contracts.
    pub async fn register_for_order(&self, order: &Order) -> Result<RegistrationSummary, DomainError> {
        let mut summary = RegistrationSummary::default();
        if order.status.is_terminal() {
            log::warn!(
                "Not registering warranties for order {}: order is {}",
                order.order_number,
                order.status.as_str()
            );
            return Ok(summary);
        }
        let now = Utc::now();

        for item in items_with_warranty(order) {
            let code = item
                .warranty_option
                .as_ref()
                .and_then(warranty_code)
                .unwrap_or_default();
            let candidate = WarrantyRegistration::pending(order, item, code, now);

            let repo = Arc::clone(&self.warranties);
            let stored = run_blocking(move || repo.insert_if_absent(&candidate)).await?;
            let Some(claimed) = self.claim(&stored).await? else {
                summary.skipped += 1;
                continue;
            };

            match self.attempt(order, item, claimed).await?.status {
                WarrantyStatus::Registered => summary.registered += 1,
                WarrantyStatus::Failed => summary.failed += 1,
                WarrantyStatus::Pending | WarrantyStatus::Cancelled => summary.skipped += 1,
            }
        }

        log::info!(
            "Warranty registration for order {}: {} registered, {} failed, {} skipped",
            order.order_number,
            summary.registered,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Re-runs a failed registration, or a pending one whose attempt never
    /// reported back.
    pub async fn retry(&self, id: Uuid) -> Result<WarrantyRegistration, DomainError> {
        let warranties = Arc::clone(&self.warranties);
        let registration = run_blocking(move || warranties.find_by_id(id))
            .await?
            .ok_or_else(|| DomainError::not_found("Warranty registration"))?;
        if !registration.status.is_retryable() {
            return Err(DomainError::Conflict(format!(
                "warranty registration is {}",
                registration.status.as_str()
            )));
        }

        let orders = Arc::clone(&self.orders);
        let order_id = registration.order_id;
        let order = run_blocking(move || orders.find_by_id(order_id))
            .await?
            .ok_or_else(|| DomainError::not_found("Order"))?;
        if order.status.is_terminal() {
            return Err(DomainError::Conflict(format!("order is {}", order.status.as_str())));
        }
        if !order.payment_status.is_settled() {
            return Err(DomainError::Conflict(format!(
                "order payment is {}",
                order.payment_status.as_str()
            )));
        }
        let item = order
            .items
            .iter()
            .find(|i| i.id == registration.order_item_id)
            .ok_or_else(|| {
                DomainError::Internal(format!(
                    "order item {} missing from order {}",
                    registration.order_item_id, order.id
                ))
            })?;

        let claimed = self.claim(&registration).await?.ok_or_else(|| {
            DomainError::Conflict("a registration attempt is already in progress".to_string())
        })?;
        self.attempt(&order, item, claimed).await
    }

    /// Failed registrations, plus pending ones whose attempt went stale.
    pub async fn list_failed(&self, page: i64, limit: i64) -> Result<Page<WarrantyRegistration>, DomainError> {
        let repo = Arc::clone(&self.warranties);
        run_blocking(move || repo.list_needing_attention(stale_before(Utc::now()), page, limit)).await
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<WarrantyRegistration>, DomainError> {
        let repo = Arc::clone(&self.warranties);
        run_blocking(move || repo.list_for_order(order_id)).await
    }

    pub async fn cancel_for_order(&self, order_id: Uuid) -> Result<usize, DomainError> {
        let repo = Arc::clone(&self.warranties);
        let cancelled = run_blocking(move || repo.cancel_for_order(order_id, Utc::now())).await?;
        if cancelled > 0 {
            log::info!("Cancelled {cancelled} warranty registration(s) for order {order_id}");
        }
        Ok(cancelled)
    }

    async fn claim(&self, registration: &WarrantyRegistration) -> Result<Option<WarrantyRegistration>, DomainError> {
        let repo = Arc::clone(&self.warranties);
        let (id, attempts) = (registration.id, registration.attempts);
        let now = Utc::now();
        run_blocking(move || repo.claim(id, attempts, stale_before(now), now)).await
    }

    /// Calls the provider for a claimed registration and stores the outcome.
    async fn attempt(
        &self,
        order: &Order,
        item: &OrderItem,
        mut registration: WarrantyRegistration,
    ) -> Result<WarrantyRegistration, DomainError> {
        let outcome = match build_request(order, item) {
            Ok(request) => self.api.register(&request).await,
            Err(failure) => Err(failure),
        };

        let now = Utc::now();
        registration.updated_at = now;

        let enriched = match outcome {
            Ok(confirmation) => {
                log::info!(
                    "Registered warranty {} for order {} item {}",
                    confirmation.transaction_id,
                    order.order_number,
                    item.sku
                );
                registration.status = WarrantyStatus::Registered;
                registration.registered_at = Some(now);
                registration.error_code = None;
                registration.error_message = None;
                let enriched = item
                    .warranty_option
                    .as_ref()
                    .map(|option| enrich_warranty_option(option, &confirmation, now));
                registration.transaction_id = Some(confirmation.transaction_id);
                registration.pin = Some(confirmation.pin);
                enriched
            }
            Err(failure) => {
                log::warn!(
                    "Warranty registration failed for order {} item {}: {} {}",
                    order.order_number,
                    item.sku,
                    failure.code,
                    failure.message
                );
                registration.status = WarrantyStatus::Failed;
                registration.error_code = Some(failure.code);
                registration.error_message = Some(failure.message);
                None
            }
        };

        let repo = Arc::clone(&self.warranties);
        let saved = registration.clone();
        if run_blocking(move || repo.save_attempt(&saved, enriched.as_ref())).await? {
            return Ok(registration);
        }

        log::warn!(
            "Warranty registration {} changed during attempt {}; discarding outcome {} (contract {})",
            registration.id,
            registration.attempts,
            registration.status.as_str(),
            registration.transaction_id.as_deref().unwrap_or("none")
        );
        let repo = Arc::clone(&self.warranties);
        let id = registration.id;
        run_blocking(move || repo.find_by_id(id))
            .await?
            .ok_or_else(|| DomainError::not_found("Warranty registration"))
    }
}
