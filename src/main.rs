use std::io;

use checkout_service::config::AppConfig;
use checkout_service::{build_server, build_state, create_pool, run_migrations};
use dotenvy::dotenv;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let pool = create_pool(&config.database_url, config.db_max_connections).map_err(io::Error::other)?;
    run_migrations(&pool).map_err(io::Error::other)?;

    let state = build_state(&config, pool).map_err(io::Error::other)?;

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    build_server(state, &config.host, config.port)?.await
}
