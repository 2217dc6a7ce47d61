mod api_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::errors::GateError;
use crate::core::invites::InvitePolicy;
use crate::core::models::{Catalog, CatalogGroup};
use crate::core::services::{GateService, ServiceSettings};
use crate::infrastructure::scraper::{QrImage, QrSource};
use crate::infrastructure::storage::in_memory::InMemoryStorage;
use crate::infrastructure::telegram::types::{
    ChatInviteLink, ChatMemberStatus, ChatRef, InlineKeyboardMarkup, InviteLinkRequest, ReplyMarkup,
};
use crate::infrastructure::telegram::{TelegramApi, TelegramError};

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub reply_markup: Option<ReplyMarkup>,
}

#[derive(Clone, Debug)]
pub struct EditedMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// Scripted Bot API. Chats without a scripted answer behave like a healthy chat
/// where the bot is an admin.
#[derive(Default)]
pub struct FakeTelegram {
    pub members: Mutex<HashMap<String, Result<ChatMemberStatus, TelegramError>>>,
    pub create_plan: Mutex<HashMap<String, VecDeque<Result<ChatInviteLink, TelegramError>>>>,
    pub export_plan: Mutex<HashMap<String, Result<String, TelegramError>>>,
    pub fail_messages: AtomicBool,
    pub create_calls: AtomicUsize,
    pub export_calls: AtomicUsize,
    pub link_requests: Mutex<Vec<(String, InviteLinkRequest)>>,
    pub sent: Mutex<Vec<SentMessage>>,
    pub edited: Mutex<Vec<EditedMessage>>,
    pub answered: Mutex<Vec<String>>,
    pub webhooks: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeTelegram {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeTelegram::default())
    }

    pub fn set_member(&self, chat: &str, status: Result<ChatMemberStatus, TelegramError>) {
        self.members.lock().unwrap().insert(chat.to_string(), status);
    }

    pub fn plan_create(&self, chat: &str, results: Vec<Result<ChatInviteLink, TelegramError>>) {
        self.create_plan
            .lock()
            .unwrap()
            .insert(chat.to_string(), results.into_iter().collect());
    }

    pub fn plan_export(&self, chat: &str, result: Result<String, TelegramError>) {
        self.export_plan.lock().unwrap().insert(chat.to_string(), result);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edited(&self) -> Vec<EditedMessage> {
        self.edited.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn exports(&self) -> usize {
        self.export_calls.load(Ordering::SeqCst)
    }
}

pub fn link(url: &str) -> ChatInviteLink {
    ChatInviteLink {
        invite_link: url.to_string(),
        name: None,
        expire_date: None,
        member_limit: Some(1),
    }
}

#[async_trait]
impl TelegramApi for FakeTelegram {
    async fn get_chat_member_status(&self, chat: &ChatRef, _user_id: i64) -> Result<ChatMemberStatus, TelegramError> {
        self.members
            .lock()
            .unwrap()
            .get(&chat.to_string())
            .cloned()
            .unwrap_or(Ok(ChatMemberStatus::Left))
    }

    async fn create_chat_invite_link(
        &self,
        chat: &ChatRef,
        request: &InviteLinkRequest,
    ) -> Result<ChatInviteLink, TelegramError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.link_requests
            .lock()
            .unwrap()
            .push((chat.to_string(), request.clone()));
        let scripted = self
            .create_plan
            .lock()
            .unwrap()
            .get_mut(&chat.to_string())
            .and_then(|plan| plan.pop_front());
        scripted.unwrap_or_else(|| Ok(link(&format!("https://t.me/+{}-{}", chat, n))))
    }

    async fn export_chat_invite_link(&self, chat: &ChatRef) -> Result<String, TelegramError> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        self.export_plan
            .lock()
            .unwrap()
            .get(&chat.to_string())
            .cloned()
            .unwrap_or_else(|| Err(TelegramError::BadRequest("not enough rights".to_string())))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<ReplyMarkup>,
    ) -> Result<(), TelegramError> {
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(TelegramError::Forbidden("bot was blocked by the user".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.to_string(),
            reply_markup,
        });
        Ok(())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        self.edited.lock().unwrap().push(EditedMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            reply_markup,
        });
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str, _text: Option<&str>) -> Result<(), TelegramError> {
        self.answered.lock().unwrap().push(callback_query_id.to_string());
        Ok(())
    }

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<(), TelegramError> {
        self.webhooks
            .lock()
            .unwrap()
            .push((url.to_string(), secret_token.map(String::from)));
        Ok(())
    }
}

/// QR source returning a fixed image, or failing when `image` is `None`.
pub struct FakeQr {
    pub image: Option<QrImage>,
    pub calls: Mutex<Vec<(i64, String)>>,
}

impl FakeQr {
    pub fn new() -> Self {
        FakeQr {
            image: Some(QrImage::png(PNG.to_vec())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        FakeQr {
            image: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(i64, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QrSource for FakeQr {
    async fn fetch_qr(&self, amount: i64, message: &str) -> Result<QrImage, GateError> {
        self.calls.lock().unwrap().push((amount, message.to_string()));
        self.image
            .clone()
            .ok_or_else(|| GateError::Scraper("checkout page did not load".to_string()))
    }

    async fn profile_snapshot(&self) -> Result<QrImage, GateError> {
        self.image
            .clone()
            .ok_or_else(|| GateError::Scraper("profile page did not load".to_string()))
    }

    async fn checkout_snapshot(&self, amount: i64, message: &str) -> Result<QrImage, GateError> {
        self.fetch_qr(amount, message).await
    }

    async fn fill_snapshot(&self, amount: i64, message: &str, method: Option<&str>) -> Result<QrImage, GateError> {
        let label = format!("{} via {}", message, method.unwrap_or("default"));
        self.calls.lock().unwrap().push((amount, label));
        self.image
            .clone()
            .ok_or_else(|| GateError::Scraper("donation form did not load".to_string()))
    }
}

pub type TestService = GateService<InMemoryStorage, FakeTelegram, FakeQr>;

pub fn test_catalog() -> Catalog {
    Catalog::new(vec![
        CatalogGroup {
            id: "-1001".to_string(),
            name: "VIP Lounge".to_string(),
            initial: Some("V".to_string()),
        },
        CatalogGroup {
            id: "-1002".to_string(),
            name: "Model Gallery".to_string(),
            initial: None,
        },
        CatalogGroup {
            id: "@paid_channel".to_string(),
            name: "Paid Channel".to_string(),
            initial: None,
        },
    ])
}

pub fn test_settings() -> ServiceSettings {
    ServiceSettings {
        catalog: test_catalog(),
        price_idr: 25_000,
        min_price_idr: 1_000,
        payment_secret: None,
        admin_secret: None,
        invite_policy: InvitePolicy {
            ttl_secs: 900,
            retry_delays: vec![std::time::Duration::ZERO; 3],
        },
    }
}

pub fn create_test_service_with(settings: ServiceSettings, qr: FakeQr) -> (TestService, Arc<FakeTelegram>) {
    let telegram = FakeTelegram::new();
    let service = GateService::new(InMemoryStorage::new(), telegram.clone(), qr, settings);
    (service, telegram)
}

pub fn create_test_service() -> (TestService, Arc<FakeTelegram>) {
    create_test_service_with(test_settings(), FakeQr::new())
}
