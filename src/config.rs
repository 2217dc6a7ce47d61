use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

use crate::core::errors::GateError;
use crate::core::gate::{GateConfig, GateMode};
use crate::core::models::Catalog;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub env: String,
    pub bot_token: String,
    pub telegram_api_url: String,
    pub base_url: String,
    pub webapp_url: Option<String>,
    pub webapp_dir: String,
    pub webhook_secret: Option<String>,
    pub db_path: String,
    pub groups_raw: String,
    pub catalog: Catalog,
    pub price_idr: i64,
    pub min_price_idr: i64,
    pub saweria_username: Option<String>,
    pub saweria_webhook_secret: Option<String>,
    pub payment_method: String,
    pub webdriver_url: String,
    pub scraper_retries: u32,
    pub qr_selectors: Vec<String>,
    pub qr_prewarm: bool,
    pub invite_ttl_secs: u64,
    pub gate: GateConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("env", &self.env)
            .field("bot_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("webapp_url", &self.webapp_url)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("db_path", &self.db_path)
            .field("catalog", &self.catalog.groups().len())
            .field("price_idr", &self.price_idr)
            .field("min_price_idr", &self.min_price_idr)
            .field("saweria_username", &self.saweria_username)
            .field(
                "saweria_webhook_secret",
                &self.saweria_webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("webdriver_url", &self.webdriver_url)
            .field("qr_selectors", &self.qr_selectors)
            .field("gate", &self.gate)
            .finish()
    }
}

impl Config {
    fn from_env() -> Self {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let list = |key: &str| split_list(&lookup(key).unwrap_or_default());

        let groups_raw = lookup("GROUP_IDS_JSON").unwrap_or_else(|| "[]".to_string());
        let catalog = Catalog::from_json_str(&groups_raw);

        let gate = GateConfig {
            group_ids: list("REQUIRED_GROUP_IDS"),
            channel_ids: list("REQUIRED_CHANNEL_IDS"),
            group_invites: list("REQUIRED_GROUP_INVITES"),
            channel_invites: list("REQUIRED_CHANNEL_INVITES"),
            group_usernames: list("REQUIRED_GROUP_USERNAMES"),
            channel_usernames: list("REQUIRED_CHANNEL_USERNAMES"),
            // Any value other than ALL relaxes the gate to ANY.
            mode: var("REQUIRED_MODE")
                .map(|v| GateMode::from_str(&v).unwrap_or(GateMode::Any))
                .unwrap_or(GateMode::All),
            min_count: parse_or(var("REQUIRED_MIN_COUNT"), 1),
        };

        Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(var("PORT"), 8000),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            env: var("ENV").unwrap_or_else(|| "dev".to_string()),
            bot_token: var("BOT_TOKEN").unwrap_or_default(),
            telegram_api_url: var("TELEGRAM_API_URL").unwrap_or_else(|| "https://api.telegram.org".to_string()),
            base_url: var("BASE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            webapp_url: var("WEBAPP_URL"),
            webapp_dir: var("WEBAPP_DIR").unwrap_or_else(|| "webapp".to_string()),
            webhook_secret: var("WEBHOOK_SECRET"),
            db_path: var("DB_PATH").unwrap_or_else(|| ":memory:".to_string()),
            groups_raw,
            catalog,
            price_idr: parse_or(var("PRICE_IDR"), 25_000),
            min_price_idr: parse_or(var("MIN_PRICE_IDR"), 1),
            saweria_username: var("SAWERIA_USERNAME"),
            saweria_webhook_secret: var("SAWERIA_WEBHOOK_SECRET"),
            payment_method: var("PAYMENT_METHOD").unwrap_or_else(|| "gopay".to_string()),
            webdriver_url: var("WEBDRIVER_URL").unwrap_or_else(|| "http://localhost:4444".to_string()),
            scraper_retries: parse_or(var("SCRAPER_RETRIES"), 2),
            qr_selectors: split_selectors(&lookup("QR_SELECTORS").unwrap_or_default()),
            qr_prewarm: var("QR_PREWARM")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(true),
            invite_ttl_secs: parse_or(var("INVITE_TTL_SECS"), 15 * 60),
            gate,
        }
    }

    pub fn validate(&self) -> Result<(), GateError> {
        if self.bot_token.is_empty() {
            return Err(GateError::Config("BOT_TOKEN is not set".to_string()));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        matches!(self.env.to_ascii_lowercase().as_str(), "prod" | "production")
    }

    pub fn uses_in_memory_store(&self) -> bool {
        self.db_path == ":memory:"
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Splits a comma separated env value, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Splits `QR_SELECTORS`. Entries are separated by `;` since CSS selector lists use commas.
pub fn split_selectors(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
