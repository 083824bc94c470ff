use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{opt_timestamp, timestamp, PageParams};
use crate::auth::AdminUser;
use crate::domain::warranty::WarrantyRegistration;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WarrantyResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Option<Uuid>,
    pub warranty_code: String,
    pub ean13: Option<String>,
    /// pending, registered, failed or cancelled
    pub status: String,
    pub transaction_id: Option<String>,
    pub pin: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub registered_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<WarrantyRegistration> for WarrantyResponse {
    fn from(w: WarrantyRegistration) -> Self {
        WarrantyResponse {
            id: w.id,
            order_id: w.order_id,
            order_item_id: w.order_item_id,
            product_id: w.product_id,
            warranty_code: w.warranty_code,
            ean13: w.ean13,
            status: w.status.as_str().to_string(),
            transaction_id: w.transaction_id,
            pin: w.pin,
            error_code: w.error_code,
            error_message: w.error_message,
            attempts: w.attempts,
            registered_at: opt_timestamp(&w.registered_at),
            created_at: timestamp(&w.created_at),
            updated_at: timestamp(&w.updated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListWarrantiesResponse {
    pub items: Vec<WarrantyResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// GET /api/v1/warranties/failed
///
/// Failed registrations and attempts stuck in pending, most recently
/// attempted first.
#[utoipa::path(
    get,
    path = "/api/v1/warranties/failed",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated failed registrations", body = ListWarrantiesResponse),
        (status = 401, description = "Missing credentials"),
        (status = 403, description = "Not an admin"),
    ),
    security(("api_key" = [])),
    tag = "warranties"
)]
pub async fn list_failed(
    _admin: AdminUser,
    state: web::Data<AppState>,
    query: web::Query<PageParams>,
) -> Result<HttpResponse, AppError> {
    let (page, limit) = query.normalized();
    let result = state.warranties.list_failed(page, limit).await?;
    Ok(HttpResponse::Ok().json(ListWarrantiesResponse {
        items: result.items.into_iter().map(WarrantyResponse::from).collect(),
        total: result.total,
        page,
        limit,
    }))
}

/// POST /api/v1/warranties/{id}/retry
#[utoipa::path(
    post,
    path = "/api/v1/warranties/{id}/retry",
    params(("id" = Uuid, Path, description = "Warranty registration UUID")),
    responses(
        (status = 200, description = "Registration after the new attempt", body = WarrantyResponse),
        (status = 404, description = "Registration not found"),
        (status = 409, description = "Already registered or cancelled, or order not paid"),
    ),
    security(("api_key" = [])),
    tag = "warranties"
)]
pub async fn retry_warranty(
    _admin: AdminUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let registration = state.warranties.retry(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(WarrantyResponse::from(registration)))
}
