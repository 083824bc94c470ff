use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// processed, duplicate, ignored, unknown_payment or failed
    pub status: String,
}

/// POST /webhooks/payment/{provider}
///
/// Provider callback. Once the signature checks out the callback is always
/// acknowledged with 200, whatever happened to it afterwards, so providers
/// stop redelivering.
#[utoipa::path(
    post,
    path = "/webhooks/payment/{provider}",
    params(("provider" = String, Path, description = "Provider name, e.g. mock or payplug")),
    request_body(content = String, description = "Raw provider payload"),
    responses(
        (status = 200, description = "Callback acknowledged", body = WebhookAck),
        (status = 401, description = "Signature verification failed"),
        (status = 404, description = "Unknown or unconfigured provider"),
    ),
    tag = "webhooks"
)]
pub async fn payment_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let provider = path.into_inner();
    let signature = state
        .payments
        .signature_header(&provider)?
        .and_then(|name| req.headers().get(name))
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .payments
        .handle_webhook(&provider, &body, signature)
        .await?;
    log::debug!("{provider} webhook handled: {}", outcome.as_str());
    Ok(HttpResponse::Ok().json(WebhookAck {
        status: outcome.as_str().to_string(),
    }))
}
