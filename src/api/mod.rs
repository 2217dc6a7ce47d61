pub mod handlers;
pub mod models;
pub mod openapi;

use std::sync::Arc;

use crate::bot::BotHandler;
use crate::config::Config;
use crate::core::services::GateService;
use crate::infrastructure::scraper::QrSource;
use crate::infrastructure::storage::Storage;
use crate::infrastructure::telegram::TelegramApi;

/// Shared state behind every route.
pub struct AppState<S: Storage, T: TelegramApi, Q: QrSource> {
    pub service: Arc<GateService<S, T, Q>>,
    pub bot: BotHandler<T>,
    pub telegram_secret: Option<String>,
    pub groups_raw: String,
    pub qr_prewarm: bool,
    pub debug_routes: bool,
}

impl<S: Storage, T: TelegramApi, Q: QrSource> AppState<S, T, Q> {
    pub fn new(service: GateService<S, T, Q>, bot: BotHandler<T>, config: &Config) -> Self {
        AppState {
            service: Arc::new(service),
            bot,
            telegram_secret: config.webhook_secret.clone(),
            groups_raw: config.groups_raw.clone(),
            qr_prewarm: config.qr_prewarm,
            debug_routes: !config.is_production(),
        }
    }
}
