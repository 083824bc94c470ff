use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::errors::DomainError;
use crate::domain::payment::{
    from_minor_units, to_minor_units, CreatePaymentRequest, PaymentEvent, PaymentStatus, ProviderKind,
    ProviderPayment, ProviderRefund,
};
use crate::domain::ports::PaymentProvider;

const API_VERSION: &str = "2019-08-06";

#[derive(Debug, Clone, Deserialize)]
struct HostedPayment {
    #[serde(default)]
    payment_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Failure {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// The subset of a Payplug payment resource we act on.
#[derive(Debug, Clone, Deserialize)]
struct PayplugPayment {
    id: String,
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    is_paid: bool,
    #[serde(default)]
    is_refunded: bool,
    #[serde(default)]
    amount_refunded: i64,
    #[serde(default)]
    hosted_payment: Option<HostedPayment>,
    #[serde(default)]
    failure: Option<Failure>,
}

#[derive(Debug, Deserialize)]
struct PayplugRefund {
    id: String,
    amount: i64,
}

fn payment_event(payment: &PayplugPayment) -> PaymentEvent {
    let refunded = (payment.amount_refunded > 0).then(|| from_minor_units(payment.amount_refunded));
    let status = if payment.is_refunded {
        PaymentStatus::Refunded
    } else if payment.amount_refunded > 0 {
        PaymentStatus::PartiallyRefunded
    } else if payment.is_paid {
        PaymentStatus::Completed
    } else if payment.failure.is_some() {
        PaymentStatus::Failed
    } else {
        PaymentStatus::Processing
    };
    let failure_reason = payment.failure.as_ref().map(|f| {
        match (&f.code, &f.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => "payment failed".to_string(),
        }
    });

    PaymentEvent {
        provider_payment_id: payment.id.clone(),
        status,
        transaction_id: payment.is_paid.then(|| payment.id.clone()),
        failure_reason,
        refunded_amount: refunded,
    }
}

fn payment_body(request: &CreatePaymentRequest) -> Result<Value, DomainError> {
    let mut body = json!({
        "amount": to_minor_units(&request.amount)?,
        "currency": request.currency,
        "notification_url": request.notification_url,
        "metadata": {
            "order_id": request.order_id,
            "order_number": request.order_number,
            "payment_id": request.payment_id,
        },
    });

    let mut hosted = serde_json::Map::new();
    if let Some(url) = &request.return_url {
        hosted.insert("return_url".to_string(), json!(url));
    }
    if let Some(url) = &request.cancel_url {
        hosted.insert("cancel_url".to_string(), json!(url));
    }
    body["hosted_payment"] = Value::Object(hosted);

    if let Some(customer) = &request.customer {
        let person = json!({
            "first_name": customer.first_name,
            "last_name": customer.last_name,
            "email": customer.email,
        });
        body["billing"] = person.clone();
        body["shipping"] = person;
    }
    Ok(body)
}

/// Payplug REST client. Notifications are unsigned, so a callback is only
/// trusted once the payment it names has been read back from the API.
pub struct PayplugProvider {
    client: Client,
    secret_key: String,
    api_url: String,
}

impl PayplugProvider {
    pub fn new(secret_key: String, api_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            secret_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.secret_key)
            .header("PayPlug-Version", API_VERSION)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, DomainError> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|e| DomainError::Provider(format!("payplug request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Provider(format!("payplug returned {status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| DomainError::Provider(format!("unexpected payplug response: {e}")))
    }

    async fn fetch(&self, provider_payment_id: &str) -> Result<PayplugPayment, DomainError> {
        let url = format!("{}/v1/payments/{provider_payment_id}", self.api_url);
        self.send(self.client.get(url)).await
    }
}

/// A notification that cannot be read names no payment to check against the
/// API, so it is treated as unauthenticated.
fn notified_payment(payload: &[u8]) -> Result<PayplugPayment, DomainError> {
    let payment: PayplugPayment = serde_json::from_slice(payload).map_err(|e| {
        log::warn!("Unreadable payplug notification: {e}");
        DomainError::InvalidSignature
    })?;
    // Refund notifications carry a refund resource; their effect is already
    // applied by the refund call that caused them.
    match payment.object.as_deref() {
        None | Some("payment") => Ok(payment),
        Some(other) => Err(DomainError::InvalidInput(format!("unsupported payplug object '{other}'"))),
    }
}

/// Only the id of a notification is used; the event describes the payment
/// as the API returned it.
fn verified_event(notified: &PayplugPayment, fetched: &PayplugPayment) -> Result<PaymentEvent, DomainError> {
    if notified.id != fetched.id {
        log::warn!("Payplug returned {} when asked for {}", fetched.id, notified.id);
        return Err(DomainError::InvalidSignature);
    }
    Ok(payment_event(fetched))
}

#[async_trait]
impl PaymentProvider for PayplugProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Payplug
    }

    fn signature_header(&self) -> Option<&'static str> {
        None
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<ProviderPayment, DomainError> {
        let url = format!("{}/v1/payments", self.api_url);
        let created: PayplugPayment = self
            .send(self.client.post(url).json(&payment_body(request)?))
            .await?;
        let event = payment_event(&created);
        Ok(ProviderPayment {
            payment_url: created.hosted_payment.and_then(|h| h.payment_url),
            provider_payment_id: created.id,
            status: event.status,
        })
    }

    async fn get_payment_status(&self, provider_payment_id: &str) -> Result<PaymentEvent, DomainError> {
        Ok(payment_event(&self.fetch(provider_payment_id).await?))
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        amount: &BigDecimal,
    ) -> Result<ProviderRefund, DomainError> {
        let url = format!("{}/v1/payments/{provider_payment_id}/refunds", self.api_url);
        let body = json!({ "amount": to_minor_units(amount)? });
        let refund: PayplugRefund = self.send(self.client.post(url).json(&body)).await?;
        Ok(ProviderRefund {
            refund_id: refund.id,
            amount: from_minor_units(refund.amount),
        })
    }

    async fn verify_webhook(&self, payload: &[u8], _signature: Option<&str>) -> Result<PaymentEvent, DomainError> {
        let notified = notified_payment(payload)?;
        let fetched = self.fetch(&notified.id).await.map_err(|e| {
            log::warn!("Payplug payment {} could not be read back: {e}", notified.id);
            DomainError::InvalidSignature
        })?;
        verified_event(&notified, &fetched)
    }
}
