//! One-time invite links for paid groups.

use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::core::errors::GateError;
use crate::infrastructure::telegram::types::{ChatRef, InviteLinkRequest};
use crate::infrastructure::telegram::{TelegramApi, TelegramError};

pub const INVITE_LINK_NAME: &str = "Paid join";

#[derive(Clone, Debug)]
pub struct InvitePolicy {
    pub ttl_secs: u64,
    /// Delay before each creation attempt; its length is the attempt count.
    pub retry_delays: Vec<Duration>,
}

impl InvitePolicy {
    pub fn new(ttl_secs: u64) -> Self {
        InvitePolicy {
            ttl_secs,
            retry_delays: vec![Duration::ZERO, Duration::from_millis(700), Duration::from_millis(1200)],
        }
    }

    pub fn request(&self) -> InviteLinkRequest {
        InviteLinkRequest {
            name: Some(INVITE_LINK_NAME.to_string()),
            expire_date: Some(Utc::now().timestamp() + self.ttl_secs as i64),
            member_limit: Some(1),
            creates_join_request: false,
        }
    }
}

/// Mints and delivers invite links through the Bot API.
pub struct InviteIssuer<'a, T: TelegramApi + ?Sized> {
    telegram: &'a T,
    policy: &'a InvitePolicy,
}

impl<'a, T: TelegramApi + ?Sized> InviteIssuer<'a, T> {
    pub fn new(telegram: &'a T, policy: &'a InvitePolicy) -> Self {
        InviteIssuer { telegram, policy }
    }

    /// Creates a single-use link, falling back to the chat's primary link.
    pub async fn mint(&self, group_id: &str) -> Option<String> {
        let chat = ChatRef::parse(group_id);
        if let Some(link) = self.create_with_retry(&chat).await {
            return Some(link);
        }
        match self.telegram.export_chat_invite_link(&chat).await {
            Ok(link) if !link.is_empty() => {
                info!(group_id, "Using exported primary invite link");
                Some(link)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(group_id, error = %e, "exportChatInviteLink failed");
                None
            }
        }
    }

    async fn create_with_retry(&self, chat: &ChatRef) -> Option<String> {
        let request = self.policy.request();
        for (attempt, delay) in self.policy.retry_delays.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }
            match self.telegram.create_chat_invite_link(chat, &request).await {
                Ok(link) if !link.invite_link.is_empty() => return Some(link.invite_link),
                Ok(_) => warn!(chat = %chat, attempt, "Empty invite link returned"),
                Err(TelegramError::RetryAfter(secs)) => {
                    warn!(chat = %chat, attempt, retry_after = secs, "Invite creation rate limited");
                    sleep(Duration::from_secs(secs)).await;
                }
                Err(e) if e.is_rejection() => {
                    warn!(chat = %chat, attempt, error = %e, "Invite creation rejected");
                    break;
                }
                Err(e) => {
                    warn!(chat = %chat, attempt, error = %e, "Invite creation failed, retrying");
                }
            }
        }
        None
    }

    /// Mints a link for `group_id` and sends it to the user by DM.
    pub async fn issue(&self, user_id: i64, group_id: &str, group_name: &str) -> Result<String, GateError> {
        let Some(link) = self.mint(group_id).await else {
            let notice = format!(
                "⚠️ Could not create an invite for {}.\nThe bot must be an admin allowed to create invite links there.",
                group_name
            );
            if let Err(e) = self.telegram.send_message(user_id, &notice, None).await {
                warn!(user_id, group_id, error = %e, "Failure notice not delivered");
            }
            return Err(GateError::InviteUnavailable(group_id.to_string()));
        };

        let text = format!("✅ Payment received.\nInvite for {}:\n{}", group_name, link);
        match self.telegram.send_message(user_id, &text, None).await {
            Ok(()) => {
                info!(user_id, group_id, "Invite delivered");
                Ok(link)
            }
            Err(e) => Err(GateError::DeliveryFailed {
                group_id: group_id.to_string(),
                invite_link: link,
                reason: e.to_string(),
            }),
        }
    }
}
