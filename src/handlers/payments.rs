use std::str::FromStr;

use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{money, opt_timestamp, timestamp};
use crate::application::payment_service::InitiatePayment;
use crate::auth::{AdminUser, MaybeUser};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::errors::AppError;
use crate::state::AppState;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    /// `mock` or `payplug`
    pub provider: String,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Decimal amount, e.g. "49.90". Refunds everything left when omitted.
    pub amount: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SimulateRequest {
    /// Target status, e.g. `completed` or `failed`.
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub status: String,
    pub amount: String,
    pub currency: String,
    pub provider_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Where the customer completes the payment.
    pub payment_url: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: String,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        PaymentResponse {
            id: p.id,
            order_id: p.order_id,
            provider: p.provider.as_str().to_string(),
            status: p.status.as_str().to_string(),
            amount: money(&p.amount),
            currency: p.currency,
            provider_payment_id: p.provider_payment_id,
            transaction_id: p.transaction_id,
            payment_url: p.payment_url,
            failure_reason: p.failure_reason,
            refunded_amount: money(&p.refunded_amount),
            refund_reason: p.refund_reason,
            refunded_at: opt_timestamp(&p.refunded_at),
            completed_at: opt_timestamp(&p.completed_at),
            created_at: timestamp(&p.created_at),
            updated_at: timestamp(&p.updated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SimulateResponse {
    /// How the generated callback was handled.
    pub outcome: String,
    pub payment: PaymentResponse,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /api/v1/payments
///
/// Starts a payment for an order with the chosen provider and returns the
/// URL the customer should be sent to.
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = PaymentResponse),
        (status = 400, description = "Unknown or unavailable provider"),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already paid or closed"),
        (status = 502, description = "Provider rejected the request"),
    ),
    tag = "payments"
)]
pub async fn initiate_payment(
    state: web::Data<AppState>,
    caller: MaybeUser,
    body: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let input = InitiatePayment {
        order_id: body.order_id,
        provider: body.provider,
        return_url: body.return_url,
        cancel_url: body.cancel_url,
    };
    let payment = state.payments.initiate(input, caller.requester()).await?;
    Ok(HttpResponse::Created().json(PaymentResponse::from(payment)))
}

/// GET /api/v1/payments/{id}
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment UUID")),
    responses(
        (status = 200, description = "Payment found", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
    ),
    security(("api_key" = [])),
    tag = "payments"
)]
pub async fn get_payment(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let payment = state.payments.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

/// POST /api/v1/payments/{id}/sync
///
/// Asks the provider for the current status and applies it.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/sync",
    params(("id" = Uuid, Path, description = "Payment UUID")),
    responses(
        (status = 200, description = "Payment after synchronisation", body = PaymentResponse),
        (status = 404, description = "Payment not found"),
        (status = 502, description = "Provider unreachable"),
    ),
    security(("api_key" = [])),
    tag = "payments"
)]
pub async fn sync_payment(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let payment = state.payments.sync_status(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

/// POST /api/v1/payments/{id}/refund
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refund",
    params(("id" = Uuid, Path, description = "Payment UUID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund applied", body = PaymentResponse),
        (status = 400, description = "Invalid amount"),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment is not refundable"),
        (status = 502, description = "Provider refused the refund"),
    ),
    security(("api_key" = [])),
    tag = "payments"
)]
pub async fn refund_payment(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<RefundRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let amount = body
        .amount
        .as_deref()
        .map(|raw| {
            BigDecimal::from_str(raw.trim()).map_err(|_| AppError::BadRequest {
                message: format!("'{raw}' is not a decimal amount"),
                field: Some("amount".to_string()),
            })
        })
        .transpose()?;

    let payment = state
        .payments
        .refund(path.into_inner(), amount, body.reason)
        .await?;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

/// POST /api/v1/payments/{id}/simulate
///
/// Makes the mock provider send a signed callback moving the payment to the
/// requested status.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/simulate",
    params(("id" = Uuid, Path, description = "Payment UUID")),
    request_body = SimulateRequest,
    responses(
        (status = 200, description = "Callback delivered", body = SimulateResponse),
        (status = 400, description = "Not a mock payment or unknown status"),
        (status = 404, description = "Payment not found"),
    ),
    security(("api_key" = [])),
    tag = "payments"
)]
pub async fn simulate_payment(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<SimulateRequest>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let status = PaymentStatus::from_str(&body.status)?;
    let outcome = state.payments.simulate(id, status).await?;
    let payment = state.payments.get(id).await?;
    Ok(HttpResponse::Ok().json(SimulateResponse {
        outcome: outcome.as_str().to_string(),
        payment: PaymentResponse::from(payment),
    }))
}
