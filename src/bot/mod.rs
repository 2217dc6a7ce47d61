//! Telegram update handling: `/start`, the membership gate and the Mini App button.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::errors::GateError;
use crate::core::gate::{GateConfig, GateMode, GateReport, check_membership};
use crate::infrastructure::telegram::TelegramApi;
use crate::infrastructure::telegram::types::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, Message, ReplyKeyboardMarkup,
    ReplyMarkup, Update, WebAppInfo,
};

pub const RECHECK_CALLBACK: &str = "recheck_membership";
pub const NOOP_CALLBACK: &str = "noop";
pub const WEBHOOK_PATH: &str = "/telegram/webhook";

const CATALOG_PROMPT: &str =
    "Pick the groups you want to join, pay with QRIS, and the bot will send you the invite links.";
const PASSED_TEXT: &str = "✅ Thanks! You passed verification.";

#[derive(Clone, Debug)]
pub struct BotSettings {
    pub gate: GateConfig,
    pub webapp_url: Option<String>,
    pub base_url: String,
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Self {
        BotSettings {
            gate: config.gate.clone(),
            webapp_url: config.webapp_url.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// Mini App URL for a user; `WEBAPP_URL` gets a cache-busting timestamp.
    pub fn webapp_url_at(&self, user_id: i64, unix_ts: i64) -> String {
        match self.webapp_url.as_deref() {
            Some(url) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!("{}{}uid={}&t={}", url, sep, user_id, unix_ts)
            }
            None => format!("{}/webapp/index.html?uid={}", self.base_url, user_id),
        }
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.base_url
            .starts_with("https://")
            .then(|| format!("{}{}", self.base_url, WEBHOOK_PATH))
    }

    pub fn webapp_keyboard(&self, user_id: i64) -> ReplyMarkup {
        ReplyMarkup::Keyboard(ReplyKeyboardMarkup {
            keyboard: vec![vec![KeyboardButton {
                text: "🛍️ Open Catalog".to_string(),
                web_app: Some(WebAppInfo {
                    url: self.webapp_url_at(user_id, Utc::now().timestamp()),
                }),
            }]],
            resize_keyboard: true,
        })
    }

    /// One join button per required chat, then the re-check button.
    pub fn gate_keyboard(&self) -> InlineKeyboardMarkup {
        let gate = &self.gate;
        let mut rows = Vec::with_capacity(gate.total_required() + 1);
        for i in 0..gate.group_ids.len() {
            rows.push(vec![join_button(
                "Join Group",
                gate.group_invites.get(i),
                gate.group_usernames.get(i),
            )]);
        }
        for i in 0..gate.channel_ids.len() {
            rows.push(vec![join_button(
                "Subscribe Channel",
                gate.channel_invites.get(i),
                gate.channel_usernames.get(i),
            )]);
        }
        rows.push(vec![InlineKeyboardButton::callback(
            "✅ I've joined (Re-check)",
            RECHECK_CALLBACK,
        )]);
        InlineKeyboardMarkup { inline_keyboard: rows }
    }

    fn access_tips(&self, report: &GateReport) -> String {
        if report.unverified.is_empty() {
            return String::new();
        }
        let mut tips = Vec::new();
        if !self.gate.group_ids.is_empty() {
            tips.push("• Add the bot to every required GROUP (member is enough).");
        }
        if !self.gate.channel_ids.is_empty() {
            tips.push("• Make the bot an ADMIN of every required CHANNEL.");
        }
        format!(
            "\n\nThe bot could not check one or more chats:\n{}",
            tips.join("\n")
        )
    }

    pub fn requirement_text(&self, report: &GateReport) -> String {
        let rule = match self.gate.mode {
            GateMode::All => format!(
                "You need to join all ({}) required groups/channels.",
                report.total_required
            ),
            GateMode::Any => format!(
                "You need to join at least {} of {} required groups/channels.",
                report.needed, report.total_required
            ),
        };
        format!(
            "{}\nDetected: {}/{} joined.{}\n\nAfter joining, tap Re-check below.",
            rule,
            report.joined,
            report.total_required,
            self.access_tips(report)
        )
    }

    pub fn recheck_text(&self, report: &GateReport) -> String {
        let minimum = match self.gate.mode {
            GateMode::Any => format!(" (at least {})", report.needed),
            GateMode::All => String::new(),
        };
        format!(
            "Requirement not met{}: {}/{} joined.{}\n\nJoin the missing chats and tap Re-check again.",
            minimum,
            report.joined,
            report.total_required,
            self.access_tips(report)
        )
    }
}

fn join_button(label: &str, invite: Option<&String>, username: Option<&String>) -> InlineKeyboardButton {
    if let Some(invite) = invite.filter(|s| !s.is_empty()) {
        return InlineKeyboardButton::url(label, invite.as_str());
    }
    if let Some(username) = username.filter(|s| !s.is_empty()) {
        return InlineKeyboardButton::url(label, format!("https://t.me/{}", username.trim_start_matches('@')));
    }
    InlineKeyboardButton::callback(format!("{} (ask an admin to set a link)", label), NOOP_CALLBACK)
}

pub struct BotHandler<T: TelegramApi> {
    telegram: Arc<T>,
    settings: BotSettings,
}

impl<T: TelegramApi> BotHandler<T> {
    pub fn new(telegram: Arc<T>, settings: BotSettings) -> Self {
        BotHandler { telegram, settings }
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Calls `setWebhook` when the public base URL is HTTPS. Returns whether it did.
    pub async fn register_webhook(&self, secret_token: Option<&str>) -> Result<bool, GateError> {
        let Some(url) = self.settings.webhook_url() else {
            info!(base_url = %self.settings.base_url, "BASE_URL is not https, webhook not registered");
            return Ok(false);
        };
        self.telegram.set_webhook(&url, secret_token).await?;
        info!(url = %url, "Telegram webhook registered");
        Ok(true)
    }

    pub async fn handle_update(&self, update: Update) -> Result<(), GateError> {
        if let Some(callback) = update.callback_query {
            return self.on_callback(callback).await;
        }
        if let Some(message) = update.message {
            return self.on_message(message).await;
        }
        debug!(update_id = update.update_id, "Ignoring update");
        Ok(())
    }

    async fn on_message(&self, message: Message) -> Result<(), GateError> {
        let chat_id = message.chat.id;
        let user_id = message.from.as_ref().map(|u| u.id).unwrap_or(chat_id);
        match message.command() {
            Some("start") => self.on_start(chat_id, user_id).await,
            Some("gate_debug") => self.on_gate_debug(chat_id).await,
            _ => Ok(()),
        }
    }

    async fn send_webapp_button(&self, chat_id: i64, user_id: i64) -> Result<(), GateError> {
        self.telegram
            .send_message(chat_id, CATALOG_PROMPT, Some(self.settings.webapp_keyboard(user_id)))
            .await?;
        Ok(())
    }

    async fn on_start(&self, chat_id: i64, user_id: i64) -> Result<(), GateError> {
        if self.settings.gate.is_empty() {
            return self.send_webapp_button(chat_id, user_id).await;
        }

        let report = check_membership(self.telegram.as_ref(), &self.settings.gate, user_id).await;
        info!(user_id, joined = report.joined, passed = report.passed, "Gate checked");
        if report.admits() {
            return self.send_webapp_button(chat_id, user_id).await;
        }

        let text = self.settings.requirement_text(&report);
        self.telegram
            .send_message(chat_id, &text, Some(ReplyMarkup::Inline(self.settings.gate_keyboard())))
            .await?;
        Ok(())
    }

    async fn on_gate_debug(&self, chat_id: i64) -> Result<(), GateError> {
        let dump = serde_json::to_string_pretty(&self.settings.gate)?;
        self.telegram
            .send_message(chat_id, &format!("Gate config:\n{}", dump), None)
            .await?;
        Ok(())
    }

    async fn on_callback(&self, callback: CallbackQuery) -> Result<(), GateError> {
        if let Err(e) = self.telegram.answer_callback_query(&callback.id, None).await {
            warn!(error = %e, "answerCallbackQuery failed");
        }
        match callback.data.as_deref() {
            Some(RECHECK_CALLBACK) => self.on_recheck(&callback).await,
            _ => Ok(()),
        }
    }

    async fn on_recheck(&self, callback: &CallbackQuery) -> Result<(), GateError> {
        let user_id = callback.from.id;
        let chat_id = callback.message.as_ref().map(|m| m.chat.id).unwrap_or(user_id);
        let message_id = callback.message.as_ref().map(|m| m.message_id);

        let report = check_membership(self.telegram.as_ref(), &self.settings.gate, user_id).await;
        info!(user_id, joined = report.joined, passed = report.passed, "Gate rechecked");

        if report.admits() {
            self.replace_text(chat_id, message_id, PASSED_TEXT, None).await?;
            return self.send_webapp_button(chat_id, user_id).await;
        }

        let text = self.settings.recheck_text(&report);
        self.replace_text(chat_id, message_id, &text, Some(self.settings.gate_keyboard()))
            .await
    }

    async fn replace_text(
        &self,
        chat_id: i64,
        message_id: Option<i64>,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), GateError> {
        match message_id {
            Some(message_id) => {
                self.telegram
                    .edit_message_text(chat_id, message_id, text, keyboard)
                    .await?
            }
            None => {
                self.telegram
                    .send_message(chat_id, text, keyboard.map(ReplyMarkup::Inline))
                    .await?
            }
        }
        Ok(())
    }
}
