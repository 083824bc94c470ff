pub mod carts;
pub mod orders;
pub mod payments;
pub mod warranties;
pub mod webhooks;

use actix_web::HttpResponse;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
pub struct PageParams {
    /// Page number (1-based). Defaults to 1, maximum 1000000.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub(crate) fn default_page() -> i64 {
    1
}

pub(crate) fn default_limit() -> i64 {
    20
}

pub(crate) const MAX_PAGE: i64 = 1_000_000;

impl PageParams {
    /// `(page, limit)` clamped to the supported range.
    pub fn normalized(&self) -> (i64, i64) {
        (self.page.clamp(1, MAX_PAGE), self.limit.clamp(1, 100))
    }
}

// ── Formatting ───────────────────────────────────────────────────────────────

/// Money goes over the wire as a decimal string, e.g. "9.90".
pub(crate) fn money(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub(crate) fn opt_timestamp(at: &Option<DateTime<Utc>>) -> Option<String> {
    at.as_ref().map(timestamp)
}

// ── Health ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "health"
)]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    })
}
