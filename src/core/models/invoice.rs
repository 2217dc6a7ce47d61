use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::core::errors::GateError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for InvoiceStatus {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(InvoiceStatus::Pending),
            "PAID" => Ok(InvoiceStatus::Paid),
            other => Err(GateError::StorageError(format!("Unknown invoice status {}", other))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Invoice {
    pub invoice_id: String,
    pub user_id: i64,
    pub groups: Vec<String>,
    pub amount: i64,
    pub status: InvoiceStatus,
    /// Cached QR image as a `data:` URL.
    #[serde(skip_serializing)]
    pub qr_payload: Option<String>,
    #[schema(value_type = String, example = "2025-09-01T12:34:56Z")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn new(invoice_id: String, user_id: i64, groups: Vec<String>, amount: i64) -> Self {
        Invoice {
            invoice_id,
            user_id,
            groups,
            amount,
            status: InvoiceStatus::Pending,
            qr_payload: None,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// Message the payer must leave on the donation so the webhook can be matched back.
    pub fn payment_message(&self) -> String {
        payment_message(&self.invoice_id)
    }

    /// Applies PENDING -> PAID. Returns false when already paid; `paid_at` is left untouched.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_paid() {
            return false;
        }
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(at);
        true
    }
}

pub fn payment_message(invoice_id: &str) -> String {
    format!("INV:{}", invoice_id)
}

/// Result of asking the store to mark an invoice paid.
#[derive(Clone, Debug)]
pub enum PaymentTransition {
    Transitioned(Invoice),
    AlreadyPaid(Invoice),
}

impl PaymentTransition {
    pub fn invoice(&self) -> &Invoice {
        match self {
            PaymentTransition::Transitioned(inv) | PaymentTransition::AlreadyPaid(inv) => inv,
        }
    }
}
