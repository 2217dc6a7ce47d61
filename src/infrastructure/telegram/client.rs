use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::types::{
    ApiResponse, ChatInviteLink, ChatMember, ChatMemberStatus, ChatRef, InlineKeyboardMarkup, InviteLinkRequest,
    ReplyMarkup,
};
use super::{TelegramApi, TelegramError};

/// Bot API client over HTTPS.
pub struct BotClient {
    http: reqwest::Client,
    endpoint: String,
}

impl BotClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| TelegramError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(BotClient {
            http,
            endpoint: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(method, "Calling Bot API");
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(params)
            .send()
            .await
            .map_err(|e| TelegramError::Network(e.without_url().to_string()))?;
        let status = response.status();
        let body: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| TelegramError::Decode(format!("{} (HTTP {})", e.without_url(), status)))?;
        into_result(body)
    }
}

fn into_result<R>(body: ApiResponse<R>) -> Result<R, TelegramError> {
    if body.ok {
        return body
            .result
            .ok_or_else(|| TelegramError::Decode("Response has no result".to_string()));
    }
    let retry_after = body.parameters.as_ref().and_then(|p| p.retry_after);
    Err(TelegramError::from_api(
        body.error_code.unwrap_or_default(),
        body.description.unwrap_or_else(|| "no description".to_string()),
        retry_after,
    ))
}

#[async_trait]
impl TelegramApi for BotClient {
    async fn get_chat_member_status(&self, chat: &ChatRef, user_id: i64) -> Result<ChatMemberStatus, TelegramError> {
        let member: ChatMember = self
            .call("getChatMember", &json!({ "chat_id": chat, "user_id": user_id }))
            .await?;
        Ok(member.status)
    }

    async fn create_chat_invite_link(
        &self,
        chat: &ChatRef,
        request: &InviteLinkRequest,
    ) -> Result<ChatInviteLink, TelegramError> {
        let mut params = serde_json::to_value(request).map_err(|e| TelegramError::Decode(e.to_string()))?;
        if let Value::Object(map) = &mut params {
            map.insert("chat_id".to_string(), json!(chat));
        }
        self.call("createChatInviteLink", &params).await
    }

    async fn export_chat_invite_link(&self, chat: &ChatRef) -> Result<String, TelegramError> {
        self.call("exportChatInviteLink", &json!({ "chat_id": chat })).await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<(), TelegramError> {
        let mut params = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            params["reply_markup"] = json!(markup);
        }
        let _: Value = self.call("sendMessage", &params).await?;
        Ok(())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let mut params = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if let Some(markup) = reply_markup {
            params["reply_markup"] = json!(markup);
        }
        let _: Value = self.call("editMessageText", &params).await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str, text: Option<&str>) -> Result<(), TelegramError> {
        let mut params = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            params["text"] = json!(text);
        }
        let _: Value = self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<(), TelegramError> {
        let mut params = json!({ "url": url, "allowed_updates": ["message", "callback_query"] });
        if let Some(secret) = secret_token {
            params["secret_token"] = json!(secret);
        }
        let _: Value = self.call("setWebhook", &params).await?;
        Ok(())
    }
}
