//! Membership gate: a user must have joined the configured chats before the
//! Mini App is offered.
//!
//! Every required chat is queried independently. A failed query is recorded
//! as [`MembershipCheck::Unknown`] and reported back instead of failing the
//! whole check.

use futures::future::join_all;
use serde::Serialize;
use std::str::FromStr;
use tracing::warn;

use crate::core::errors::GateError;
use crate::infrastructure::telegram::TelegramApi;
use crate::infrastructure::telegram::types::ChatRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateMode {
    All,
    Any,
}

impl std::fmt::Display for GateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateMode::All => "ALL",
            GateMode::Any => "ANY",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for GateMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(GateMode::All),
            "ANY" => Ok(GateMode::Any),
            other => Err(GateError::Config(format!("Unknown REQUIRED_MODE {}", other))),
        }
    }
}

/// Static gate configuration. Invites and usernames line up with the ids by index.
#[derive(Clone, Debug, Serialize)]
pub struct GateConfig {
    pub group_ids: Vec<String>,
    pub channel_ids: Vec<String>,
    pub group_invites: Vec<String>,
    pub channel_invites: Vec<String>,
    pub group_usernames: Vec<String>,
    pub channel_usernames: Vec<String>,
    pub mode: GateMode,
    pub min_count: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            group_ids: Vec::new(),
            channel_ids: Vec::new(),
            group_invites: Vec::new(),
            channel_invites: Vec::new(),
            group_usernames: Vec::new(),
            channel_usernames: Vec::new(),
            mode: GateMode::All,
            min_count: 1,
        }
    }
}

impl GateConfig {
    pub fn is_empty(&self) -> bool {
        self.group_ids.is_empty() && self.channel_ids.is_empty()
    }

    /// Groups first, then channels.
    pub fn required_chats(&self) -> impl Iterator<Item = &String> {
        self.group_ids.iter().chain(self.channel_ids.iter())
    }

    pub fn total_required(&self) -> usize {
        self.group_ids.len() + self.channel_ids.len()
    }

    /// Number of joined chats needed to pass.
    pub fn needed(&self) -> usize {
        let total = self.total_required();
        match self.mode {
            GateMode::All => total,
            GateMode::Any => self.min_count.max(1).min(total),
        }
    }

    pub fn evaluate(&self, checks: &[(String, MembershipCheck)]) -> GateReport {
        let joined = checks.iter().filter(|(_, c)| *c == MembershipCheck::Joined).count();
        let unverified = checks
            .iter()
            .filter(|(_, c)| *c == MembershipCheck::Unknown)
            .map(|(chat, _)| chat.clone())
            .collect();
        let total_required = self.total_required();
        let needed = self.needed();
        GateReport {
            passed: total_required == 0 || joined >= needed,
            joined,
            total_required,
            needed,
            unverified,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MembershipCheck {
    Joined,
    NotJoined,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub passed: bool,
    pub joined: usize,
    pub total_required: usize,
    pub needed: usize,
    /// Chats whose membership could not be queried.
    pub unverified: Vec<String>,
}

impl GateReport {
    /// The bot only lets a user through when every chat could be checked.
    pub fn admits(&self) -> bool {
        self.passed && self.unverified.is_empty()
    }
}

pub async fn check_chat<T: TelegramApi + ?Sized>(telegram: &T, chat_id: &str, user_id: i64) -> MembershipCheck {
    if chat_id.trim().is_empty() {
        return MembershipCheck::Joined;
    }
    match telegram.get_chat_member_status(&ChatRef::parse(chat_id), user_id).await {
        Ok(status) if status.is_joined() => MembershipCheck::Joined,
        Ok(_) => MembershipCheck::NotJoined,
        Err(e) => {
            warn!(chat_id, user_id, error = %e, "Membership could not be checked");
            MembershipCheck::Unknown
        }
    }
}

pub async fn check_membership<T: TelegramApi + ?Sized>(telegram: &T, config: &GateConfig, user_id: i64) -> GateReport {
    let checks = join_all(config.required_chats().map(|chat_id| async move {
        (chat_id.clone(), check_chat(telegram, chat_id, user_id).await)
    }))
    .await;
    config.evaluate(&checks)
}
