use crate::core::errors::GateError;
use crate::core::models::{Invoice, InviteLog, PaymentTransition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_invoice(&self, invoice: Invoice) -> Result<(), GateError>;
    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, GateError>;
    /// Newest first.
    async fn list_invoices(&self, limit: usize) -> Result<Vec<Invoice>, GateError>;
    /// PENDING -> PAID as one guarded step. `None` when the invoice does not exist.
    async fn mark_paid(&self, invoice_id: &str, paid_at: DateTime<Utc>) -> Result<Option<PaymentTransition>, GateError>;
    async fn save_qr_payload(&self, invoice_id: &str, data_url: &str) -> Result<(), GateError>;
    async fn append_invite_log(&self, log: InviteLog) -> Result<(), GateError>;
    /// In insertion order.
    async fn list_invite_logs(&self, invoice_id: &str) -> Result<Vec<InviteLog>, GateError>;
}

pub mod in_memory;
pub mod sqlite;
