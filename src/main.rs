use axum::Router;
use gatepass::api::{AppState, handlers::api_routes, openapi::ApiDoc};
use gatepass::bot::{BotHandler, BotSettings};
use gatepass::config::{CONFIG, Config};
use gatepass::core::services::{GateService, ServiceSettings};
use gatepass::infrastructure::scraper::webdriver::WebDriverScraper;
use gatepass::infrastructure::storage::{Storage, in_memory::InMemoryStorage, sqlite::SqliteStorage};
use gatepass::infrastructure::telegram::client::BotClient;
use http::header;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("gatepass={0},tower_http={0}", CONFIG.log_level))),
        )
        .init();

    CONFIG.validate()?;
    info!(config = ?*CONFIG, "Configuration loaded");

    if CONFIG.uses_in_memory_store() {
        warn!("DB_PATH is :memory:, invoices are lost on restart");
        serve(InMemoryStorage::new(), &CONFIG).await
    } else {
        serve(SqliteStorage::open(Path::new(&CONFIG.db_path))?, &CONFIG).await
    }
}

async fn serve<S: Storage + 'static>(storage: S, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let telegram = Arc::new(BotClient::new(&config.telegram_api_url, &config.bot_token)?);

    if config.saweria_username.is_none() {
        warn!("SAWERIA_USERNAME is not set, QR generation is disabled");
    }
    let scraper = WebDriverScraper::new(
        &config.webdriver_url,
        config.saweria_username.clone(),
        &config.payment_method,
        config.scraper_retries,
    )
    .with_qr_selectors(config.qr_selectors.clone());

    let service = GateService::new(storage, telegram.clone(), scraper, ServiceSettings::from_config(config));
    let bot = BotHandler::new(telegram, BotSettings::from_config(config));
    if let Err(e) = bot.register_webhook(config.webhook_secret.as_deref()).await {
        warn!(error = %e, "setWebhook failed");
    }
    let state = Arc::new(AppState::new(service, bot, config));

    let app = Router::new()
        .merge(api_routes(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/webapp", ServeDir::new(&config.webapp_dir))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(90)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET, http::Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
