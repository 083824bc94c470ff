use actix_web::{web, HttpResponse};
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{money, timestamp};
use crate::application::cart_service::AddItem;
use crate::auth::MaybeUser;
use crate::domain::cart::Cart;
use crate::errors::AppError;
use crate::state::AppState;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateCartRequest {
    /// Anonymous shopper session, used when no user token is sent.
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Selected delivery service, e.g. `{"code": "FLOOR", "price": "29.00"}`
    #[schema(value_type = Option<Object>)]
    pub delivery_option: Option<Value>,
    /// Selected extended warranty, e.g. `{"code": "G3-5Y", "price": "79.00"}`
    #[schema(value_type = Option<Object>)]
    pub warranty_option: Option<Value>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    /// New quantity; 0 removes the line.
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub title: String,
    pub quantity: i32,
    pub unit_price: String,
    #[schema(value_type = Option<Object>)]
    pub delivery_option: Option<Value>,
    #[schema(value_type = Option<Object>)]
    pub warranty_option: Option<Value>,
    /// Unit price plus options, times quantity.
    pub line_total: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub status: String,
    pub expires_at: String,
    pub items: Vec<CartItemResponse>,
    pub item_count: i32,
    pub subtotal: String,
}

impl TryFrom<Cart> for CartResponse {
    type Error = AppError;

    fn try_from(cart: Cart) -> Result<Self, Self::Error> {
        let mut subtotal = BigDecimal::zero();
        let mut items = Vec::with_capacity(cart.items.len());
        for item in cart.items {
            let line_total = item.effective_unit_price()? * BigDecimal::from(item.quantity);
            subtotal += &line_total;
            items.push(CartItemResponse {
                id: item.id,
                product_id: item.product.id,
                sku: item.product.sku,
                title: item.product.title,
                quantity: item.quantity,
                unit_price: money(&item.unit_price),
                delivery_option: item.delivery_option,
                warranty_option: item.warranty_option,
                line_total: money(&line_total),
            });
        }

        Ok(CartResponse {
            id: cart.id,
            user_id: cart.user_id,
            session_id: cart.session_id,
            status: cart.status.as_str().to_string(),
            expires_at: timestamp(&cart.expires_at),
            item_count: items.iter().map(|i| i.quantity).sum(),
            items,
            subtotal: money(&subtotal),
        })
    }
}

fn cart_json(cart: Cart) -> Result<CartResponse, AppError> {
    CartResponse::try_from(cart)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /api/v1/carts
///
/// Opens an empty cart, owned by the caller when a user token is sent.
#[utoipa::path(
    post,
    path = "/api/v1/carts",
    request_body = CreateCartRequest,
    responses(
        (status = 201, description = "Cart created", body = CartResponse),
        (status = 401, description = "Invalid token"),
    ),
    tag = "carts"
)]
pub async fn create_cart(
    state: web::Data<AppState>,
    caller: MaybeUser,
    body: web::Json<CreateCartRequest>,
) -> Result<HttpResponse, AppError> {
    let cart = state
        .carts
        .create_cart(caller.user_id(), body.into_inner().session_id)
        .await?;
    Ok(HttpResponse::Created().json(cart_json(cart)?))
}

/// GET /api/v1/carts/{id}
#[utoipa::path(
    get,
    path = "/api/v1/carts/{id}",
    params(("id" = Uuid, Path, description = "Cart UUID")),
    responses(
        (status = 200, description = "Cart found", body = CartResponse),
        (status = 404, description = "Cart not found"),
    ),
    tag = "carts"
)]
pub async fn get_cart(state: web::Data<AppState>, path: web::Path<Uuid>) -> Result<HttpResponse, AppError> {
    let cart = state.carts.get_cart(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(cart_json(cart)?))
}

/// POST /api/v1/carts/{id}/items
///
/// Adds a product. A line for the same product with identical options is
/// merged instead of duplicated.
#[utoipa::path(
    post,
    path = "/api/v1/carts/{id}/items",
    params(("id" = Uuid, Path, description = "Cart UUID")),
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 400, description = "Invalid quantity or option, inactive product, expired cart"),
        (status = 404, description = "Cart or product not found"),
    ),
    tag = "carts"
)]
pub async fn add_item(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<AddCartItemRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let cart = state
        .carts
        .add_item(
            path.into_inner(),
            AddItem {
                product_id: body.product_id,
                quantity: body.quantity,
                delivery_option: body.delivery_option,
                warranty_option: body.warranty_option,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(cart_json(cart)?))
}

/// PATCH /api/v1/carts/{id}/items/{item_id}
#[utoipa::path(
    patch,
    path = "/api/v1/carts/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Cart UUID"),
        ("item_id" = Uuid, Path, description = "Cart item UUID"),
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Cart or item not found"),
    ),
    tag = "carts"
)]
pub async fn update_item(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<UpdateCartItemRequest>,
) -> Result<HttpResponse, AppError> {
    let (cart_id, item_id) = path.into_inner();
    let cart = state
        .carts
        .update_item(cart_id, item_id, body.quantity)
        .await?;
    Ok(HttpResponse::Ok().json(cart_json(cart)?))
}

/// DELETE /api/v1/carts/{id}/items/{item_id}
#[utoipa::path(
    delete,
    path = "/api/v1/carts/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Cart UUID"),
        ("item_id" = Uuid, Path, description = "Cart item UUID"),
    ),
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 404, description = "Cart or item not found"),
    ),
    tag = "carts"
)]
pub async fn remove_item(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (cart_id, item_id) = path.into_inner();
    let cart = state.carts.remove_item(cart_id, item_id).await?;
    Ok(HttpResponse::Ok().json(cart_json(cart)?))
}

#[cfg(test)]
mod tests {
    use actix_web::{test, web, App};
    use serde_json::{json, Value};

    use crate::testing::{test_app, user_token};

    #[actix_web::test]
    async fn cart_lifecycle_over_http() {
        let t = test_app();
        let product = t.store.add_product("WM-8", "Washer 8kg", "399.00", Some("4006381333931"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(t.state.clone()))
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/carts")
            .set_json(json!({"session_id": "sess-1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let cart: Value = test::read_body_json(resp).await;
        let cart_id = cart["id"].as_str().unwrap().to_string();
        assert_eq!(cart["session_id"], "sess-1");
        assert!(cart["user_id"].is_null());

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/carts/{cart_id}/items"))
            .set_json(json!({
                "product_id": product.id,
                "quantity": 2,
                "warranty_option": {"code": "G3-5Y", "price": "50.00"}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let cart: Value = test::read_body_json(resp).await;
        assert_eq!(cart["subtotal"], "898.00");
        assert_eq!(cart["item_count"], 2);
        let item_id = cart["items"][0]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::patch()
            .uri(&format!("/api/v1/carts/{cart_id}/items/{item_id}"))
            .set_json(json!({"quantity": 0}))
            .to_request();
        let cart: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(cart["items"].as_array().unwrap().len(), 0);
        assert_eq!(cart["subtotal"], "0.00");

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/carts/{cart_id}/items/{item_id}"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn cart_errors_map_to_status_codes() {
        let t = test_app();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(t.state.clone()))
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/carts/{}", uuid::Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get().uri("/api/v1/carts/not-a-uuid").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let cart = t.store.add_cart(None, &[]);
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/carts/{}/items", cart.id))
            .set_json(json!({"product_id": uuid::Uuid::new_v4(), "quantity": 0}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["field"], "quantity");

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/carts/{}/items", cart.id))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn user_token_owns_new_cart() {
        let t = test_app();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(t.state.clone()))
                .configure(crate::configure),
        )
        .await;
        let user = uuid::Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/v1/carts")
            .insert_header(("Authorization", format!("Bearer {}", user_token(user))))
            .set_json(json!({}))
            .to_request();
        let cart: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(cart["user_id"], user.to_string());

        let req = test::TestRequest::post()
            .uri("/api/v1/carts")
            .insert_header(("Authorization", "Bearer garbage"))
            .set_json(json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }
}
