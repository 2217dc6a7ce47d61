//! Subset of the Telegram Bot API wire types used by the bot.

use serde::{Deserialize, Serialize};

/// Chat identifier as accepted by the Bot API: numeric id or `@username`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

impl ChatRef {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => ChatRef::Id(id),
            Err(_) => ChatRef::Username(raw.to_string()),
        }
    }
}

impl std::fmt::Display for ChatRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{}", id),
            ChatRef::Username(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

impl Message {
    /// Bot command without the leading slash and any `@botname` suffix.
    pub fn command(&self) -> Option<&str> {
        let text = self.text.as_deref()?.trim();
        let first = text.split_whitespace().next()?;
        let command = first.strip_prefix('/')?;
        Some(command.split('@').next().unwrap_or(command))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    #[serde(other)]
    Unknown,
}

impl ChatMemberStatus {
    /// Statuses that count as having joined the chat.
    pub fn is_joined(self) -> bool {
        matches!(
            self,
            ChatMemberStatus::Creator | ChatMemberStatus::Administrator | ChatMemberStatus::Member
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatMember {
    pub status: ChatMemberStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatInviteLink {
    pub invite_link: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expire_date: Option<i64>,
    #[serde(default)]
    pub member_limit: Option<u32>,
}

/// Parameters of `createChatInviteLink`.
#[derive(Clone, Debug, Serialize)]
pub struct InviteLinkRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_limit: Option<u32>,
    pub creates_join_request: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct WebAppInfo {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct KeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    pub resize_keyboard: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineKeyboardButton {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        InlineKeyboardButton {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        InlineKeyboardButton {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Inline(InlineKeyboardMarkup),
    Keyboard(ReplyKeyboardMarkup),
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
    #[serde(default)]
    pub migrate_to_chat_id: Option<i64>,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ref_serializes_as_number_or_string() {
        assert_eq!(serde_json::to_string(&ChatRef::parse("-1001234")).unwrap(), "-1001234");
        assert_eq!(serde_json::to_string(&ChatRef::parse("@vip")).unwrap(), "\"@vip\"");
    }

    #[test]
    fn parses_command_updates() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 7,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "is_bot": false, "first_name": "Ana"},
                "chat": {"id": 42, "type": "private"},
                "text": "/start@gatepass_bot payload"
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.command(), Some("start"));
        assert_eq!(message.from.unwrap().id, 42);
    }

    #[test]
    fn unknown_member_status_is_tolerated() {
        let member: ChatMember = serde_json::from_str(r#"{"status": "owner_of_everything"}"#).unwrap();
        assert_eq!(member.status, ChatMemberStatus::Unknown);
        assert!(!member.status.is_joined());
        let member: ChatMember = serde_json::from_str(r#"{"status": "administrator"}"#).unwrap();
        assert!(member.status.is_joined());
    }
}
