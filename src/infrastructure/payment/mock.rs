use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::payment::{
    CreatePaymentRequest, PaymentEvent, PaymentStatus, ProviderKind, ProviderPayment, ProviderRefund,
    SimulatedWebhook,
};
use crate::domain::ports::{PaymentProvider, PaymentSimulator};

pub const SIGNATURE_HEADER: &str = "X-Mock-Signature";

const CHECKOUT_BASE_URL: &str = "https://mock-payments.local/checkout";

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, payload: &[u8]) -> Result<HmacSha256, DomainError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| DomainError::Internal(e.to_string()))?;
    mac.update(payload);
    Ok(mac)
}

/// Hex HMAC-SHA256 of a callback body.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, DomainError> {
    Ok(hex::encode(mac(secret, payload)?.finalize().into_bytes()))
}

/// Callback body the mock sends, and accepts on its webhook route.
#[derive(Debug, Serialize, Deserialize)]
struct MockWebhook {
    id: String,
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refunded_amount: Option<BigDecimal>,
}

#[derive(Debug, Clone)]
struct BookEntry {
    amount: BigDecimal,
    status: PaymentStatus,
    refunded: BigDecimal,
    transaction_id: Option<String>,
    notification_url: String,
}

impl BookEntry {
    fn event(&self, provider_payment_id: &str) -> PaymentEvent {
        PaymentEvent {
            provider_payment_id: provider_payment_id.to_string(),
            status: self.status,
            transaction_id: self.transaction_id.clone(),
            failure_reason: None,
            refunded_amount: (!self.refunded.is_zero()).then(|| self.refunded.clone()),
        }
    }

    fn move_to(&mut self, status: PaymentStatus) {
        match status {
            PaymentStatus::Completed => {
                self.transaction_id
                    .get_or_insert_with(|| format!("mock_tx_{}", Uuid::new_v4().simple()));
            }
            PaymentStatus::Refunded => self.refunded = self.amount.clone(),
            _ => {}
        }
        self.status = status;
    }
}

/// In-process payment provider for development and tests. Payments live in
/// memory and callbacks are signed with a shared secret.
pub struct MockProvider {
    secret: String,
    book: Mutex<HashMap<String, BookEntry>>,
    fail_next: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            book: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(None),
        }
    }

    fn book(&self) -> Result<MutexGuard<'_, HashMap<String, BookEntry>>, DomainError> {
        self.book
            .lock()
            .map_err(|_| DomainError::Internal("mock payment book is poisoned".to_string()))
    }

    /// Where callbacks for a payment would be delivered.
    pub fn notification_url(&self, provider_payment_id: &str) -> Option<String> {
        self.book()
            .ok()?
            .get(provider_payment_id)
            .map(|entry| entry.notification_url.clone())
    }

    /// Makes the next `create_payment` call fail with `message`.
    pub fn fail_next_create(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(message.into());
        }
    }

    /// Moves a payment on the provider side without sending a callback.
    pub fn set_status(&self, provider_payment_id: &str, status: PaymentStatus) -> Result<(), DomainError> {
        let mut book = self.book()?;
        let entry = book
            .get_mut(provider_payment_id)
            .ok_or_else(|| DomainError::not_found(format!("Mock payment '{provider_payment_id}'")))?;
        entry.move_to(status);
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn signature_header(&self) -> Option<&'static str> {
        Some(SIGNATURE_HEADER)
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<ProviderPayment, DomainError> {
        let failure = self.fail_next.lock().ok().and_then(|mut slot| slot.take());
        if let Some(message) = failure {
            return Err(DomainError::Provider(message));
        }

        let provider_payment_id = format!("mock_{}", Uuid::new_v4().simple());
        self.book()?.insert(
            provider_payment_id.clone(),
            BookEntry {
                amount: request.amount.clone(),
                status: PaymentStatus::Pending,
                refunded: BigDecimal::zero(),
                transaction_id: None,
                notification_url: request.notification_url.clone(),
            },
        );
        log::debug!(
            "Mock payment {provider_payment_id} opened for order {} ({} {})",
            request.order_number,
            request.amount,
            request.currency
        );

        Ok(ProviderPayment {
            payment_url: Some(format!("{CHECKOUT_BASE_URL}/{provider_payment_id}")),
            provider_payment_id,
            status: PaymentStatus::Pending,
        })
    }

    async fn get_payment_status(&self, provider_payment_id: &str) -> Result<PaymentEvent, DomainError> {
        self.book()?
            .get(provider_payment_id)
            .map(|entry| entry.event(provider_payment_id))
            .ok_or_else(|| DomainError::Provider(format!("mock payment {provider_payment_id} does not exist")))
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: &BigDecimal,
    ) -> Result<ProviderRefund, DomainError> {
        let mut book = self.book()?;
        let entry = book
            .get_mut(provider_payment_id)
            .ok_or_else(|| DomainError::Provider(format!("mock payment {provider_payment_id} does not exist")))?;
        if !entry.status.is_refundable() {
            return Err(DomainError::Provider(format!(
                "mock payment {provider_payment_id} is {}",
                entry.status.as_str()
            )));
        }
        if &entry.refunded + amount > entry.amount {
            return Err(DomainError::Provider("refund exceeds captured amount".to_string()));
        }

        entry.refunded = &entry.refunded + amount;
        entry.status = if entry.refunded >= entry.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        Ok(ProviderRefund {
            refund_id: format!("mock_re_{}", Uuid::new_v4().simple()),
            amount: amount.clone(),
        })
    }

    async fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<PaymentEvent, DomainError> {
        let signature = signature.ok_or(DomainError::InvalidSignature)?;
        let expected = hex::decode(signature.trim()).map_err(|_| DomainError::InvalidSignature)?;
        mac(&self.secret, payload)?
            .verify_slice(&expected)
            .map_err(|_| DomainError::InvalidSignature)?;
        parse_callback(payload)
    }
}

/// Reads a callback body. Only meaningful once its signature has checked out.
fn parse_callback(payload: &[u8]) -> Result<PaymentEvent, DomainError> {
    let body: MockWebhook = serde_json::from_slice(payload)
        .map_err(|e| DomainError::InvalidInput(format!("malformed mock webhook: {e}")))?;
    let status = PaymentStatus::from_str(&body.status)
        .map_err(|e| DomainError::InvalidInput(format!("malformed mock webhook: {e}")))?;
    Ok(PaymentEvent {
        status,
        provider_payment_id: body.id,
        transaction_id: body.transaction_id,
        failure_reason: body.failure_reason,
        refunded_amount: body.refunded_amount,
    })
}

#[async_trait]
impl PaymentSimulator for MockProvider {
    async fn simulate(
        &self,
        provider_payment_id: &str,
        status: PaymentStatus,
    ) -> Result<SimulatedWebhook, DomainError> {
        let entry = {
            let mut book = self.book()?;
            let entry = book
                .get_mut(provider_payment_id)
                .ok_or_else(|| DomainError::not_found(format!("Mock payment '{provider_payment_id}'")))?;
            entry.move_to(status);
            entry.clone()
        };

        let body = MockWebhook {
            id: provider_payment_id.to_string(),
            status: status.as_str().to_string(),
            transaction_id: entry.transaction_id,
            failure_reason: matches!(status, PaymentStatus::Failed)
                .then(|| "simulated failure".to_string()),
            refunded_amount: (!entry.refunded.is_zero()).then_some(entry.refunded),
        };
        let payload = serde_json::to_vec(&body).map_err(|e| DomainError::Internal(e.to_string()))?;
        let signature = sign(&self.secret, &payload)?;
        Ok(SimulatedWebhook { payload, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(amount: &str) -> CreatePaymentRequest {
        CreatePaymentRequest {
            payment_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            order_number: "ORD-20261016-0000ABCD".to_string(),
            amount: BigDecimal::from_str(amount).unwrap(),
            currency: "EUR".to_string(),
            customer: None,
            return_url: None,
            cancel_url: None,
            notification_url: "http://localhost:8080/webhooks/payment/mock".to_string(),
        }
    }

    #[tokio::test]
    async fn signatures_are_checked_against_the_secret() {
        let provider = MockProvider::new("s3cret");
        let payload = br#"{"id":"mock_1","status":"completed"}"#;

        let event = provider
            .verify_webhook(payload, Some(&sign("s3cret", payload).unwrap()))
            .await
            .unwrap();
        assert_eq!(event.provider_payment_id, "mock_1");
        assert_eq!(event.status, PaymentStatus::Completed);
        assert!(matches!(
            provider.verify_webhook(payload, Some(&sign("other", payload).unwrap())).await,
            Err(DomainError::InvalidSignature)
        ));
        assert!(matches!(
            provider.verify_webhook(payload, Some("zz-not-hex")).await,
            Err(DomainError::InvalidSignature)
        ));
        assert!(matches!(
            provider.verify_webhook(payload, None).await,
            Err(DomainError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn signed_garbage_is_authentic_but_unreadable() {
        let provider = MockProvider::new("s");
        let payload = b"not json";
        assert!(matches!(
            provider.verify_webhook(payload, Some(&sign("s", payload).unwrap())).await,
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn parses_callbacks() {
        let payload = serde_json::to_vec(&json!({
            "id": "mock_1",
            "status": "partially_refunded",
            "refunded_amount": "12.50"
        }))
        .unwrap();
        let event = parse_callback(&payload).unwrap();
        assert_eq!(event.provider_payment_id, "mock_1");
        assert_eq!(event.status, PaymentStatus::PartiallyRefunded);
        assert_eq!(event.refunded_amount, Some(BigDecimal::from_str("12.50").unwrap()));

        assert!(parse_callback(b"{}").is_err());
        assert!(matches!(
            parse_callback(br#"{"id":"mock_1","status":"teleported"}"#),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn book_tracks_payments_and_refunds() {
        let provider = MockProvider::new("s");
        let created = provider.create_payment(&request("100.00")).await.unwrap();
        assert_eq!(created.status, PaymentStatus::Pending);
        let pid = created.provider_payment_id;
        assert!(created.payment_url.unwrap().ends_with(&pid));

        let err = provider
            .refund_payment(&pid, &BigDecimal::from(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Provider(_)));

        provider.set_status(&pid, PaymentStatus::Completed).unwrap();
        let event = provider.get_payment_status(&pid).await.unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        assert!(event.transaction_id.is_some());

        provider.refund_payment(&pid, &BigDecimal::from(40)).await.unwrap();
        assert_eq!(
            provider.get_payment_status(&pid).await.unwrap().status,
            PaymentStatus::PartiallyRefunded
        );
        assert!(provider.refund_payment(&pid, &BigDecimal::from(61)).await.is_err());
        provider.refund_payment(&pid, &BigDecimal::from(60)).await.unwrap();
        let event = provider.get_payment_status(&pid).await.unwrap();
        assert_eq!(event.status, PaymentStatus::Refunded);
        assert_eq!(event.refunded_amount, Some(BigDecimal::from(100)));
    }

    #[tokio::test]
    async fn simulated_callbacks_verify_and_parse() {
        let provider = MockProvider::new("s");
        let pid = provider.create_payment(&request("5.00")).await.unwrap().provider_payment_id;

        let hook = provider.simulate(&pid, PaymentStatus::Completed).await.unwrap();
        let event = provider.verify_webhook(&hook.payload, Some(&hook.signature)).await.unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        assert!(event.transaction_id.unwrap().starts_with("mock_tx_"));

        assert!(matches!(
            provider.simulate("mock_missing", PaymentStatus::Completed).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn scripted_create_failure_is_one_shot() {
        let provider = MockProvider::new("s");
        provider.fail_next_create("gateway unavailable");
        assert!(matches!(
            provider.create_payment(&request("1.00")).await,
            Err(DomainError::Provider(m)) if m == "gateway unavailable"
        ));
        assert!(provider.create_payment(&request("1.00")).await.is_ok());
    }
}
