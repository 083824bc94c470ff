use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    BadRequest {
        message: String,
        field: Option<String>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
            field: None,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound(_) => AppError::NotFound(e.to_string()),
            DomainError::Validation { ref field, .. } => AppError::BadRequest {
                field: Some(field.clone()),
                message: e.to_string(),
            },
            DomainError::InvalidInput(msg) => AppError::bad_request(msg),
            DomainError::Conflict(msg) => AppError::Conflict(msg),
            DomainError::Forbidden(msg) => AppError::Forbidden(msg),
            DomainError::InvalidSignature => AppError::Unauthorized(e.to_string()),
            DomainError::Provider(_) => AppError::BadGateway(e.to_string()),
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::BadRequest {
                message,
                field: Some(field),
            } => HttpResponse::BadRequest().json(serde_json::json!({
                "error": message,
                "field": field
            })),
            AppError::Internal(msg) => {
                log::error!("Internal error: {msg}");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error"
                }))
            }
            _ => HttpResponse::build(self.status_code()).json(serde_json::json!({
                "error": self.to_string()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::ResponseError;

    async fn body_json(err: AppError) -> serde_json::Value {
        let bytes = to_bytes(err.error_response().into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (DomainError::not_found("Order"), StatusCode::NOT_FOUND),
            (DomainError::validation("quantity", "too big"), StatusCode::BAD_REQUEST),
            (DomainError::InvalidInput("cart is empty".to_string()), StatusCode::BAD_REQUEST),
            (DomainError::Conflict("already paid".to_string()), StatusCode::CONFLICT),
            (DomainError::Forbidden("not yours".to_string()), StatusCode::FORBIDDEN),
            (DomainError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (DomainError::Provider("timeout".to_string()), StatusCode::BAD_GATEWAY),
            (DomainError::Internal("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (domain, status) in cases {
            let app: AppError = domain.into();
            assert_eq!(app.error_response().status(), status, "{app:?}");
        }
    }

    #[test]
    fn not_found_display() {
        let app: AppError = DomainError::not_found("Payment").into();
        assert_eq!(app.to_string(), "Payment not found");
    }

    #[actix_web::test]
    async fn validation_error_names_the_field() {
        let body = body_json(DomainError::validation("customer_info.email", "must be a valid email address").into()).await;
        assert_eq!(body["field"], "customer_info.email");
        assert_eq!(
            body["error"],
            "Invalid customer_info.email: must be a valid email address"
        );
    }

    #[actix_web::test]
    async fn internal_error_hides_details() {
        let body = body_json(AppError::Internal("password=hunter2".to_string())).await;
        assert_eq!(body["error"], "Internal server error");
    }
}
