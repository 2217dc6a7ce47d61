use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One invite-send attempt. Entries are only ever appended.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct InviteLog {
    pub invoice_id: String,
    pub group_id: String,
    pub invite_link: Option<String>,
    pub error: Option<String>,
    #[schema(value_type = String, example = "2025-09-01T12:34:56Z")]
    pub created_at: DateTime<Utc>,
}

impl InviteLog {
    pub fn sent(invoice_id: &str, group_id: &str, invite_link: &str) -> Self {
        InviteLog {
            invoice_id: invoice_id.to_string(),
            group_id: group_id.to_string(),
            invite_link: Some(invite_link.to_string()),
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(invoice_id: &str, group_id: &str, invite_link: Option<&str>, error: &str) -> Self {
        InviteLog {
            invoice_id: invoice_id.to_string(),
            group_id: group_id.to_string(),
            invite_link: invite_link.map(String::from),
            error: Some(error.to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
