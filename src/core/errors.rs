use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub title: String,
    pub description: String,
}

impl FieldError {
    pub fn new(field: &str, title: &str, description: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            title: title.to_string(),
            description: description.into(),
        }
    }
}

#[derive(Error, Debug, Serialize)]
pub enum GateError {
    #[error("Invoice {0} not found")]
    InvoiceNotFound(String),
    #[error("Invoice {0} already exists")]
    InvoiceAlreadyExists(String),
    #[error("Invoice {0} is not paid")]
    InvoiceNotPaid(String),
    #[error("Invalid amount. Min {0}")]
    InvalidAmount(i64),
    #[error("Invalid group {0}")]
    UnknownGroup(String),
    #[error("Invalid input for field `{0}`: {1:?}")]
    InvalidInput(String, FieldError),
    #[error("Forbidden: {0}")]
    Unauthorized(String),
    #[error("No invite link could be created for group {0}")]
    InviteUnavailable(String),
    #[error("Invite for group {group_id} could not be delivered: {reason}")]
    DeliveryFailed {
        group_id: String,
        invite_link: String,
        reason: String,
    },
    #[error("Telegram error: {0}")]
    Telegram(String),
    #[error("Scraper is not configured: {0}")]
    ScraperNotConfigured(String),
    #[error("Scraper error: {0}")]
    Scraper(String),
    #[error("Invalid QR payload: {0}")]
    InvalidQrPayload(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<rusqlite::Error> for GateError {
    fn from(err: rusqlite::Error) -> Self {
        GateError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::StorageError(format!("Serialization failed: {}", err))
    }
}
