pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::errors::GateError;
use types::{ChatInviteLink, ChatMemberStatus, ChatRef, InlineKeyboardMarkup, InviteLinkRequest, ReplyMarkup};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    #[error("Flood control exceeded, retry after {0}s")]
    RetryAfter(u64),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl TelegramError {
    pub fn from_api(code: i64, description: String, retry_after: Option<u64>) -> Self {
        match (code, retry_after) {
            (429, Some(secs)) => TelegramError::RetryAfter(secs),
            (429, None) => TelegramError::RetryAfter(1),
            (403, _) => TelegramError::Forbidden(description),
            (400, _) => TelegramError::BadRequest(description),
            _ => TelegramError::Api { code, description },
        }
    }

    /// Whether Telegram refused the call itself, so repeating it cannot succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, TelegramError::Forbidden(_) | TelegramError::BadRequest(_))
    }
}

impl From<TelegramError> for GateError {
    fn from(err: TelegramError) -> Self {
        GateError::Telegram(err.to_string())
    }
}

/// The Bot API calls the service depends on.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn get_chat_member_status(&self, chat: &ChatRef, user_id: i64) -> Result<ChatMemberStatus, TelegramError>;
    async fn create_chat_invite_link(
        &self,
        chat: &ChatRef,
        request: &InviteLinkRequest,
    ) -> Result<ChatInviteLink, TelegramError>;
    async fn export_chat_invite_link(&self, chat: &ChatRef) -> Result<String, TelegramError>;
    async fn send_message(&self, chat_id: i64, text: &str, reply_markup: Option<ReplyMarkup>)
    -> Result<(), TelegramError>;
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError>;
    async fn answer_callback_query(&self, callback_query_id: &str, text: Option<&str>) -> Result<(), TelegramError>;
    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<(), TelegramError>;
}
