use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::{Garanzia3Config, Garanzia3Mode};
use crate::domain::ports::WarrantyApi;
use crate::domain::warranty::{WarrantyConfirmation, WarrantyFailure, WarrantyRequest};

#[derive(Debug, Default, Deserialize)]
struct RegistrationResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    pin: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

fn registration_body(dealer_code: &str, request: &WarrantyRequest) -> Value {
    json!({
        "dealer_code": dealer_code,
        "ean13": request.ean13,
        "product_description": request.product_title,
        "warranty_code": request.warranty_code,
        "order_reference": request.order_number,
        "purchase_date": request.purchase_date.format("%Y-%m-%d").to_string(),
        "product_price": request.product_price,
        "warranty_price": request.warranty_price,
        "quantity": request.quantity,
        "customer": {
            "first_name": request.customer.first_name,
            "last_name": request.customer.last_name,
            "email": request.customer.email,
            "phone": request.customer.phone,
        },
    })
}

fn confirmation(response: RegistrationResponse) -> Result<WarrantyConfirmation, WarrantyFailure> {
    if !response.success {
        return Err(WarrantyFailure::new(
            response.error_code.unwrap_or_else(|| "REJECTED".to_string()),
            response
                .error_message
                .unwrap_or_else(|| "registration rejected".to_string()),
        ));
    }
    match (response.transaction_id, response.pin) {
        (Some(transaction_id), Some(pin)) => Ok(WarrantyConfirmation { transaction_id, pin }),
        _ => Err(WarrantyFailure::new(
            "INVALID_RESPONSE",
            "response is missing transaction id or PIN",
        )),
    }
}

pub struct Garanzia3Client {
    client: Client,
    base_url: String,
    api_key: String,
    dealer_code: String,
}

impl Garanzia3Client {
    pub fn new(base_url: &str, api_key: String, dealer_code: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            dealer_code,
        })
    }
}

#[async_trait]
impl WarrantyApi for Garanzia3Client {
    async fn register(&self, request: &WarrantyRequest) -> Result<WarrantyConfirmation, WarrantyFailure> {
        let response = self
            .client
            .post(format!("{}/registrations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&registration_body(&self.dealer_code, request))
            .send()
            .await
            .map_err(|e| {
                let code = if e.is_timeout() { "TIMEOUT" } else { "NETWORK_ERROR" };
                WarrantyFailure::new(code, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Validation rejections still come back with a structured body.
            if let Ok(parsed) = serde_json::from_str::<RegistrationResponse>(&body) {
                if parsed.error_code.is_some() {
                    return confirmation(parsed);
                }
            }
            return Err(WarrantyFailure::new(
                format!("HTTP_{}", status.as_u16()),
                format!("Garanzia3 returned {status}: {body}"),
            ));
        }

        let parsed = response
            .json::<RegistrationResponse>()
            .await
            .map_err(|e| WarrantyFailure::new("INVALID_RESPONSE", e.to_string()))?;
        confirmation(parsed)
    }
}

/// Offline stand-in: derives a stable transaction id and PIN from the
/// request so repeated runs produce the same contract data.
pub struct MockGaranzia3;

#[async_trait]
impl WarrantyApi for MockGaranzia3 {
    async fn register(&self, request: &WarrantyRequest) -> Result<WarrantyConfirmation, WarrantyFailure> {
        let digest = Sha256::digest(
            format!(
                "{}|{}|{}",
                request.order_number, request.ean13, request.warranty_code
            )
            .as_bytes(),
        );
        let pin = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 1_000_000;
        Ok(WarrantyConfirmation {
            transaction_id: format!("G3M-{}", hex::encode_upper(&digest[..6])),
            pin: format!("{pin:06}"),
        })
    }
}

pub fn build_warranty_api(config: &Garanzia3Config, timeout: Duration) -> Result<Arc<dyn WarrantyApi>, reqwest::Error> {
    match (config.mode, &config.base_url, &config.api_key) {
        (Garanzia3Mode::Live, Some(base_url), Some(api_key)) => {
            log::info!("Garanzia3 registrations go to {base_url}");
            Ok(Arc::new(Garanzia3Client::new(
                base_url,
                api_key.clone(),
                config.dealer_code.clone(),
                timeout,
            )?))
        }
        (Garanzia3Mode::Live, _, _) => {
            log::warn!("Garanzia3 live mode without base URL or API key, using the mock");
            Ok(Arc::new(MockGaranzia3))
        }
        (Garanzia3Mode::Mock, _, _) => {
            log::info!("Garanzia3 running in mock mode");
            Ok(Arc::new(MockGaranzia3))
        }
    }
}
