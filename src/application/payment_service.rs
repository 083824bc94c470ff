use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use super::warranty_service::WarrantyService;
use super::{run_blocking, Requester};
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderPaymentStatus};
use crate::domain::payment::{
    CreatePaymentRequest, Payment, PaymentStatus, ProviderKind, StatusChange, Transition,
};
use crate::domain::ports::{OrderRepository, PaymentProvider, PaymentRepository, PaymentSimulator};

/// The payment providers this instance is configured for.
#[derive(Clone, Default)]
pub struct PaymentProviders {
    providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
    simulator: Option<Arc<dyn PaymentSimulator>>,
}

impl PaymentProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn set_simulator(&mut self, simulator: Arc<dyn PaymentSimulator>) {
        self.simulator = Some(simulator);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Resolves a provider by its public name. Known names without a
    /// configured implementation are treated like unknown ones.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentProvider>, DomainError> {
        let kind = ProviderKind::from_str(name)?;
        self.get(kind)
            .ok_or_else(|| DomainError::not_found(format!("Payment provider '{}'", kind.as_str())))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub order_id: Uuid,
    pub provider: String,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// How a verified callback was handled. Every outcome is acknowledged to
/// the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
    UnknownPayment,
    Failed,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::UnknownPayment => "unknown_payment",
            WebhookOutcome::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    orders: Arc<dyn OrderRepository>,
    providers: Arc<PaymentProviders>,
    warranties: WarrantyService,
    public_base_url: String,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        orders: Arc<dyn OrderRepository>,
        providers: Arc<PaymentProviders>,
        warranties: WarrantyService,
        public_base_url: String,
    ) -> Self {
        Self {
            payments,
            orders,
            providers,
            warranties,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn initiate(&self, input: InitiatePayment, requester: Requester) -> Result<Payment, DomainError> {
        let kind = ProviderKind::from_str(&input.provider)
            .map_err(|_| DomainError::validation("provider", format!("unknown provider '{}'", input.provider)))?;
        let provider = self.providers.get(kind).ok_or_else(|| {
            DomainError::validation("provider", format!("provider '{}' is not available", kind.as_str()))
        })?;

        let orders = Arc::clone(&self.orders);
        let order_id = input.order_id;
        let order = run_blocking(move || orders.find_by_id(order_id))
            .await?
            .ok_or_else(|| DomainError::not_found("Order"))?;
        if !requester.may_act_on(order.user_id) {
            return Err(DomainError::Forbidden("order belongs to another user".to_string()));
        }
        if order.status.is_terminal() {
            return Err(DomainError::Conflict(format!("order is {}", order.status.as_str())));
        }
        if order.payment_status.is_settled() || order.payment_status == OrderPaymentStatus::Refunded {
            return Err(DomainError::Conflict("order is already paid".to_string()));
        }

        let payment = Payment::new_pending(&order, kind, Utc::now());
        let repo = Arc::clone(&self.payments);
        let pending = payment.clone();
        run_blocking(move || repo.create(&pending)).await?;

        let request = CreatePaymentRequest {
            payment_id: payment.id,
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            customer: order.customer(),
            return_url: input.return_url,
            cancel_url: input.cancel_url,
            notification_url: format!("{}/webhooks/payment/{}", self.public_base_url, kind.as_str()),
        };

        let created = match provider.create_payment(&request).await {
            Ok(created) => created,
            Err(e) => {
                log::error!(
                    "Provider {} rejected payment {} for order {}: {e}",
                    kind.as_str(),
                    payment.id,
                    order.order_number
                );
                let mut change = StatusChange::to(PaymentStatus::Failed);
                change.failure_reason = Some(e.to_string());
                self.apply(payment.id, change).await?;
                return Err(match e {
                    DomainError::Provider(_) => e,
                    other => DomainError::Provider(other.to_string()),
                });
            }
        };

        let repo = Arc::clone(&self.payments);
        let provider_payment_id = created.provider_payment_id.clone();
        let payment_url = created.payment_url.clone();
        let payment_id = payment.id;
        run_blocking(move || {
            repo.attach_provider_reference(payment_id, &provider_payment_id, payment_url.as_deref())
        })
        .await?;

        let status = if created.status == PaymentStatus::Pending {
            PaymentStatus::Processing
        } else {
            created.status
        };
        let (transition, payment, order) = self.apply(payment_id, StatusChange::to(status)).await?;
        self.after_transition(transition, &order).await;

        log::info!(
            "Initiated {} payment {} for order {} ({} {})",
            kind.as_str(),
            payment.id,
            order.order_number,
            payment.amount,
            payment.currency
        );
        Ok(payment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Payment, DomainError> {
        let repo = Arc::clone(&self.payments);
        run_blocking(move || repo.find_by_id(id))
            .await?
            .ok_or_else(|| DomainError::not_found("Payment"))
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, DomainError> {
        let orders = Arc::clone(&self.orders);
        let payments = Arc::clone(&self.payments);
        run_blocking(move || {
            orders
                .find_by_id(order_id)?
                .ok_or_else(|| DomainError::not_found("Order"))?;
            payments.list_for_order(order_id)
        })
        .await
    }

    /// Polls the provider and applies whatever it reports.
    pub async fn sync_status(&self, id: Uuid) -> Result<Payment, DomainError> {
        let payment = self.get(id).await?;
        let (provider, provider_payment_id) = self.provider_for(&payment)?;

        let event = provider.get_payment_status(&provider_payment_id).await?;
        let (transition, payment, order) = self.apply(payment.id, event.status_change()).await?;
        if let Transition::Rejected { from, to } = transition {
            log::warn!(
                "Provider reports {} for payment {} which is {}; keeping local status",
                to.as_str(),
                payment.id,
                from.as_str()
            );
        }
        self.after_transition(transition, &order).await;
        Ok(payment)
    }

    /// Refunds `amount`, or everything still refundable.
    ///
    /// The amount is checked up front and again when the refund is booked
    /// under the payment's row lock; the local total always grows by exactly
    /// what the provider refunded.
    pub async fn refund(
        &self,
        id: Uuid,
        amount: Option<BigDecimal>,
        reason: Option<String>,
    ) -> Result<Payment, DomainError> {
        let payment = self.get(id).await?;
        let amount = payment.plan_refund(amount.as_ref())?;
        let (provider, provider_payment_id) = self.provider_for(&payment)?;

        let refund = provider.refund_payment(&provider_payment_id, &amount).await?;
        log::info!(
            "Provider {} refunded {} on payment {} (refund {})",
            payment.provider.as_str(),
            refund.amount,
            payment.id,
            refund.refund_id
        );

        let repo = Arc::clone(&self.payments);
        let booked = amount.clone();
        let recorded =
            run_blocking(move || repo.record_refund(id, &booked, reason, Utc::now())).await;
        let (transition, payment, order) = match recorded {
            Ok(result) => result,
            Err(e) => {
                log::error!(
                    "Refund {} of {amount} on payment {id} was executed by the provider but not recorded: {e}",
                    refund.refund_id
                );
                return Err(DomainError::Conflict(format!(
                    "refund {} could not be recorded: {e}",
                    refund.refund_id
                )));
            }
        };
        match transition {
            Transition::Applied { .. } => {}
            Transition::Unchanged | Transition::Rejected { .. } => {
                log::error!(
                    "Refund {} of {amount} on payment {id} left the payment {}",
                    refund.refund_id,
                    payment.status.as_str()
                );
                return Err(DomainError::Conflict(format!(
                    "payment is {} and the refund could not be recorded",
                    payment.status.as_str()
                )));
            }
        }
        self.after_transition(transition, &order).await;
        Ok(payment)
    }

    /// Header a provider's callbacks carry their signature in.
    pub fn signature_header(&self, provider_name: &str) -> Result<Option<&'static str>, DomainError> {
        Ok(self.providers.resolve(provider_name)?.signature_header())
    }

    /// Verifies, normalises and applies a provider callback.
    ///
    /// Only an unknown provider or a bad signature is an error; anything
    /// after verification is acknowledged so the provider stops retrying.
    pub async fn handle_webhook(
        &self,
        provider_name: &str,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, DomainError> {
        let provider = self.providers.resolve(provider_name)?;
        let kind = provider.kind();

        let event = match provider.verify_webhook(payload, signature).await {
            Ok(event) => event,
            Err(DomainError::InvalidSignature) => return Err(DomainError::InvalidSignature),
            Err(DomainError::InvalidInput(reason)) => {
                log::warn!("Ignoring {} webhook: {reason}", kind.as_str());
                return Ok(WebhookOutcome::Ignored);
            }
            Err(e) => {
                log::warn!("Could not verify {} webhook: {e}", kind.as_str());
                return Err(DomainError::InvalidSignature);
            }
        };

        let repo = Arc::clone(&self.payments);
        let provider_payment_id = event.provider_payment_id.clone();
        let found = run_blocking(move || repo.find_by_provider_ref(kind, &provider_payment_id)).await;
        let payment = match found {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                log::warn!(
                    "{} webhook for unknown payment {}",
                    kind.as_str(),
                    event.provider_payment_id
                );
                return Ok(WebhookOutcome::UnknownPayment);
            }
            Err(e) => {
                log::error!("Webhook lookup failed for {}: {e}", event.provider_payment_id);
                return Ok(WebhookOutcome::Failed);
            }
        };

        let (transition, _, order) = match self.apply(payment.id, event.status_change()).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Failed to apply webhook to payment {}: {e}", payment.id);
                return Ok(WebhookOutcome::Failed);
            }
        };

        let outcome = match transition {
            Transition::Applied { from, to } => {
                log::info!(
                    "Payment {} moved {} -> {} via {} webhook",
                    payment.id,
                    from.as_str(),
                    to.as_str(),
                    kind.as_str()
                );
                WebhookOutcome::Processed
            }
            Transition::Unchanged => WebhookOutcome::Duplicate,
            Transition::Rejected { from, to } => {
                log::warn!(
                    "Ignoring {} webhook moving payment {} from {} to {}",
                    kind.as_str(),
                    payment.id,
                    from.as_str(),
                    to.as_str()
                );
                WebhookOutcome::Ignored
            }
        };
        self.after_transition(transition, &order).await;
        Ok(outcome)
    }

    /// Has the mock provider send a signed callback for a payment, then
    /// feeds it through the regular webhook path.
    pub async fn simulate(&self, id: Uuid, status: PaymentStatus) -> Result<WebhookOutcome, DomainError> {
        let payment = self.get(id).await?;
        if payment.provider != ProviderKind::Mock {
            return Err(DomainError::InvalidInput(
                "only mock payments can be simulated".to_string(),
            ));
        }
        let simulator = self
            .providers
            .simulator
            .clone()
            .ok_or_else(|| DomainError::InvalidInput("mock provider is disabled".to_string()))?;
        let provider_payment_id = payment
            .provider_payment_id
            .ok_or_else(|| DomainError::Conflict("payment was never sent to the provider".to_string()))?;

        let webhook = simulator.simulate(&provider_payment_id, status).await?;
        self.handle_webhook(
            ProviderKind::Mock.as_str(),
            &webhook.payload,
            Some(&webhook.signature),
        )
        .await
    }

    fn provider_for(&self, payment: &Payment) -> Result<(Arc<dyn PaymentProvider>, String), DomainError> {
        let provider = self.providers.get(payment.provider).ok_or_else(|| {
            DomainError::InvalidInput(format!(
                "provider '{}' is not configured",
                payment.provider.as_str()
            ))
        })?;
        let provider_payment_id = payment
            .provider_payment_id
            .clone()
            .ok_or_else(|| DomainError::Conflict("payment was never sent to the provider".to_string()))?;
        Ok((provider, provider_payment_id))
    }

    async fn apply(
        &self,
        payment_id: Uuid,
        change: StatusChange,
    ) -> Result<(Transition, Payment, Order), DomainError> {
        let repo = Arc::clone(&self.payments);
        run_blocking(move || repo.apply_status_change(payment_id, &change, Utc::now())).await
    }

    /// Side effects of a payment transition. They never fail the caller.
    async fn after_transition(&self, transition: Transition, order: &Order) {
        if transition.completed_payment() {
            if let Err(e) = self.warranties.register_for_order(order).await {
                log::error!(
                    "Warranty registration for order {} aborted: {e}",
                    order.order_number
                );
            }
        }
        if transition.fully_refunded() {
            if let Err(e) = self.warranties.cancel_for_order(order.id).await {
                log::error!("Failed to cancel warranties for order {}: {e}", order.id);
            }
        }
    }
}
