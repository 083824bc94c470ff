pub mod application;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

pub use db::{create_pool, DbPool};
pub use state::AppState;

use application::cart_service::CartService;
use application::order_service::OrderService;
use application::payment_service::PaymentService;
use application::warranty_service::WarrantyService;
use auth::AuthSettings;
use config::AppConfig;
use errors::AppError;
use infrastructure::cart_repo::DieselCartRepository;
use infrastructure::garanzia3::build_warranty_api;
use infrastructure::order_repo::DieselOrderRepository;
use infrastructure::payment::build_providers;
use infrastructure::payment_repo::DieselPaymentRepository;
use infrastructure::warranty_repo::DieselWarrantyRepository;
use handlers::{carts, orders, payments, warranties, webhooks};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    if !applied.is_empty() {
        log::info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Checkout service", description = "Carts, checkout, payments and warranty registration"),
    paths(
        handlers::health,
        carts::create_cart,
        carts::get_cart,
        carts::add_item,
        carts::update_item,
        carts::remove_item,
        orders::checkout,
        orders::list_orders,
        orders::list_my_orders,
        orders::get_order,
        orders::update_order,
        orders::list_order_payments,
        orders::list_order_warranties,
        payments::initiate_payment,
        payments::get_payment,
        payments::sync_payment,
        payments::refund_payment,
        payments::simulate_payment,
        webhooks::payment_webhook,
        warranties::list_failed,
        warranties::retry_warranty,
    ),
    components(schemas(
        handlers::HealthResponse,
        carts::CreateCartRequest,
        carts::AddCartItemRequest,
        carts::UpdateCartItemRequest,
        carts::CartItemResponse,
        carts::CartResponse,
        orders::CheckoutRequest,
        orders::UpdateOrderRequest,
        orders::OrderItemResponse,
        orders::OrderResponse,
        orders::ListOrdersResponse,
        payments::InitiatePaymentRequest,
        payments::RefundRequest,
        payments::SimulateRequest,
        payments::PaymentResponse,
        payments::SimulateResponse,
        webhooks::WebhookAck,
        warranties::WarrantyResponse,
        warranties::ListWarrantiesResponse,
    )),
    modifiers(&SecuritySchemes),
    tags(
        (name = "carts"),
        (name = "orders"),
        (name = "payments"),
        (name = "webhooks"),
        (name = "warranties"),
    )
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(auth::API_KEY_HEADER))),
            );
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Registers every route. Extractor failures are answered with the same
/// JSON error body as handler errors.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        AppError::bad_request(format!("Invalid JSON body: {err}")).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _| {
        AppError::bad_request(format!("Invalid path parameter: {err}")).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        AppError::bad_request(format!("Invalid query string: {err}")).into()
    }))
    .route("/health", web::get().to(handlers::health))
    .service(
        web::scope("/api/v1")
            .service(
                web::scope("/carts")
                    .route("", web::post().to(carts::create_cart))
                    .route("/{id}", web::get().to(carts::get_cart))
                    .route("/{id}/items", web::post().to(carts::add_item))
                    .route("/{id}/items/{item_id}", web::patch().to(carts::update_item))
                    .route("/{id}/items/{item_id}", web::delete().to(carts::remove_item)),
            )
            .service(
                web::scope("/orders")
                    .route("/checkout", web::post().to(orders::checkout))
                    .route("", web::get().to(orders::list_orders))
                    .route("/me", web::get().to(orders::list_my_orders))
                    .route("/{id}", web::get().to(orders::get_order))
                    .route("/{id}", web::patch().to(orders::update_order))
                    .route("/{id}/payments", web::get().to(orders::list_order_payments))
                    .route("/{id}/warranties", web::get().to(orders::list_order_warranties)),
            )
            .service(
                web::scope("/payments")
                    .route("", web::post().to(payments::initiate_payment))
                    .route("/{id}", web::get().to(payments::get_payment))
                    .route("/{id}/sync", web::post().to(payments::sync_payment))
                    .route("/{id}/refund", web::post().to(payments::refund_payment))
                    .route("/{id}/simulate", web::post().to(payments::simulate_payment)),
            )
            .service(
                web::scope("/warranties")
                    .route("/failed", web::get().to(warranties::list_failed))
                    .route("/{id}/retry", web::post().to(warranties::retry_warranty)),
            ),
    )
    .route(
        "/webhooks/payment/{provider}",
        web::post().to(webhooks::payment_webhook),
    )
    .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()));
}

/// Wires the Diesel repositories, payment providers and warranty client
/// into the services the handlers use.
pub fn build_state(config: &AppConfig, pool: DbPool) -> Result<AppState, reqwest::Error> {
    let carts = Arc::new(DieselCartRepository::new(pool.clone()));
    let orders = Arc::new(DieselOrderRepository::new(pool.clone()));
    let payments = Arc::new(DieselPaymentRepository::new(pool.clone()));
    let warranty_repo = Arc::new(DieselWarrantyRepository::new(pool));

    let providers = build_providers(&config.payment, config.http_timeout)?;
    let warranty_api = build_warranty_api(&config.garanzia3, config.http_timeout)?;

    let warranties = WarrantyService::new(warranty_repo, orders.clone(), warranty_api);
    Ok(AppState {
        carts: CartService::new(carts.clone(), config.cart_ttl_hours),
        orders: OrderService::new(
            orders.clone(),
            carts,
            warranties.clone(),
            config.currency.clone(),
            config.shipping_flat_rate.clone(),
        ),
        payments: PaymentService::new(
            payments,
            orders,
            Arc::new(providers),
            warranties.clone(),
            config.public_base_url.clone(),
        ),
        warranties,
        auth: AuthSettings {
            admin_api_key: config.admin_api_key.clone(),
            jwt_secret: config.jwt_secret.clone(),
        },
    })
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(state: AppState, host: &str, port: u16) -> std::io::Result<actix_web::dev::Server> {
    let state = web::Data::new(state);
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind((host.to_string(), port))?
    .run())
}

#[cfg(test)]
mod tests {
    use actix_web::{test, web, App};
    use serde_json::Value;

    use crate::testing::test_app;

    #[actix_web::test]
    async fn health_and_openapi_are_served() {
        let t = test_app();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(t.state.clone()))
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");

        let req = test::TestRequest::get().uri("/api-docs/openapi.json").to_request();
        let doc: Value = test::call_and_read_body_json(&app, req).await;
        assert!(doc["paths"]["/api/v1/orders/checkout"]["post"].is_object());
        assert!(doc["components"]["securitySchemes"]["api_key"].is_object());
    }

    #[actix_web::test]
    async fn extractor_errors_use_the_json_error_body() {
        let t = test_app();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(t.state.clone()))
                .configure(crate::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/orders?page=first")
            .insert_header(("X-API-KEY", crate::testing::TEST_ADMIN_KEY))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"));
    }
}
