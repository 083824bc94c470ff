use std::future::{ready, Ready};
use std::str::FromStr;

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::application::Requester;
use crate::errors::AppError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub admin_api_key: String,
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegType {
    Customer,
    Company,
    Admin,
}

impl FromStr for RegType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(RegType::Customer),
            "company" => Ok(RegType::Company),
            "admin" => Ok(RegType::Admin),
            other => Err(AppError::Unauthorized(format!("unknown reg_type '{other}'"))),
        }
    }
}

impl RegType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegType::Customer => "customer",
            RegType::Company => "company",
            RegType::Admin => "admin",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub reg_type: String,
    pub exp: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Service caller holding the admin API key.
    Admin,
    User {
        id: Uuid,
        email: String,
        reg_type: RegType,
    },
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Principal::Admin
                | Principal::User {
                    reg_type: RegType::Admin,
                    ..
                }
        )
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Principal::User { id, .. } => Some(*id),
            Principal::Admin => None,
        }
    }

    pub fn requester(&self) -> Requester {
        match self {
            p if p.is_admin() => Requester::Admin,
            Principal::User { id, .. } => Requester::User(*id),
            Principal::Admin => Requester::Admin,
        }
    }
}

/// Tokens are minted by the account service; this one exists for tests.
#[cfg(test)]
pub(crate) fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    reg_type: RegType,
    ttl: chrono::Duration,
) -> Result<String, AppError> {
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        reg_type: reg_type.as_str().to_string(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token generation failed: {e}")))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Principal, AppError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("invalid token: {e}")))?;

    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("token subject is not a user id".to_string()))?;
    Ok(Principal::User {
        id,
        email: claims.email,
        reg_type: claims.reg_type.parse()?,
    })
}

/// Compares API keys in constant time by checking MACs of both.
fn api_key_matches(presented: &str, expected: &str) -> bool {
    let mac = |key: &str| {
        let mut mac = Hmac::<Sha256>::new_from_slice(API_KEY_HEADER.as_bytes()).ok()?;
        mac.update(key.as_bytes());
        Some(mac)
    };
    match (mac(presented), mac(expected)) {
        (Some(presented), Some(expected)) => presented.verify_slice(&expected.finalize().into_bytes()).is_ok(),
        _ => false,
    }
}

/// Resolves the caller from the request headers. The API key wins over a
/// bearer token; presenting a wrong key is refused outright.
pub fn authenticate(settings: &AuthSettings, req: &HttpRequest) -> Result<Option<Principal>, AppError> {
    if let Some(key) = req.headers().get(API_KEY_HEADER) {
        let key = key
            .to_str()
            .map_err(|_| AppError::Forbidden("invalid API key".to_string()))?;
        if !api_key_matches(key, &settings.admin_api_key) {
            return Err(AppError::Forbidden("invalid API key".to_string()));
        }
        return Ok(Some(Principal::Admin));
    }

    let Some(header) = req.headers().get(actix_web::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("expected a Bearer token".to_string()))?;
    verify_token(&settings.jwt_secret, token).map(Some)
}

fn principal_from(req: &HttpRequest) -> Result<Option<Principal>, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("application state is not configured".to_string()))?;
    authenticate(&state.auth, req)
}

/// Requires the admin API key or an admin user token.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Principal);

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(match principal_from(req) {
            Ok(Some(p)) if p.is_admin() => Ok(AdminUser(p)),
            Ok(Some(_)) => Err(AppError::Forbidden("admin access required".to_string())),
            Ok(None) => Err(AppError::Unauthorized("authentication required".to_string())),
            Err(e) => Err(e),
        })
    }
}

/// Requires any authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(principal_from(req).and_then(|p| {
            p.map(AuthUser)
                .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
        }))
    }
}

/// The caller if credentials were sent. Bad credentials are still refused.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

impl MaybeUser {
    pub fn requester(&self) -> Requester {
        self.0.as_ref().map_or(Requester::Anonymous, Principal::requester)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().and_then(Principal::user_id)
    }
}

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(principal_from(req).map(MaybeUser))
    }
}
