use crate::core::errors::GateError;
use crate::core::models::{Invoice, InviteLog, PaymentTransition};
use crate::infrastructure::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    invoices: Arc<RwLock<HashMap<String, Invoice>>>,
    invite_logs: Arc<RwLock<Vec<InviteLog>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_invoice(&self, invoice: Invoice) -> Result<(), GateError> {
        let mut invoices = self.invoices.write().await;
        if invoices.contains_key(&invoice.invoice_id) {
            return Err(GateError::InvoiceAlreadyExists(invoice.invoice_id));
        }
        invoices.insert(invoice.invoice_id.clone(), invoice);
        Ok(())
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, GateError> {
        Ok(self.invoices.read().await.get(invoice_id).cloned())
    }

    async fn list_invoices(&self, limit: usize) -> Result<Vec<Invoice>, GateError> {
        let mut invoices: Vec<Invoice> = self.invoices.read().await.values().cloned().collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        invoices.truncate(limit);
        Ok(invoices)
    }

    async fn mark_paid(&self, invoice_id: &str, paid_at: DateTime<Utc>) -> Result<Option<PaymentTransition>, GateError> {
        let mut invoices = self.invoices.write().await;
        let Some(invoice) = invoices.get_mut(invoice_id) else {
            return Ok(None);
        };
        let transition = if invoice.mark_paid(paid_at) {
            PaymentTransition::Transitioned(invoice.clone())
        } else {
            PaymentTransition::AlreadyPaid(invoice.clone())
        };
        Ok(Some(transition))
    }

    async fn save_qr_payload(&self, invoice_id: &str, data_url: &str) -> Result<(), GateError> {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .get_mut(invoice_id)
            .ok_or_else(|| GateError::InvoiceNotFound(invoice_id.to_string()))?;
        invoice.qr_payload = Some(data_url.to_string());
        Ok(())
    }

    async fn append_invite_log(&self, log: InviteLog) -> Result<(), GateError> {
        self.invite_logs.write().await.push(log);
        Ok(())
    }

    async fn list_invite_logs(&self, invoice_id: &str) -> Result<Vec<InviteLog>, GateError> {
        Ok(self
            .invite_logs
            .read()
            .await
            .iter()
            .filter(|log| log.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}
