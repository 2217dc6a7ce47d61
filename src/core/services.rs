use crate::config::Config;
use crate::core::errors::{FieldError, GateError};
use crate::core::invites::{InviteIssuer, InvitePolicy};
use crate::core::models::{Catalog, InviteLog, Invoice, PaymentTransition};
use crate::core::webhook::{self, FailedInvite, PaymentNotice, WebhookOutcome};
use crate::infrastructure::scraper::{QrImage, QrSource};
use crate::infrastructure::storage::Storage;
use crate::infrastructure::telegram::TelegramApi;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cache lifetime for QR images tied to an invoice.
pub const QR_MAX_AGE_SECS: u32 = 300;
/// Cache lifetime for on-demand QR images.
pub const LEGACY_QR_MAX_AGE_SECS: u32 = 120;

#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub catalog: Catalog,
    pub price_idr: i64,
    pub min_price_idr: i64,
    pub payment_secret: Option<String>,
    pub admin_secret: Option<String>,
    pub invite_policy: InvitePolicy,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        ServiceSettings {
            catalog: config.catalog.clone(),
            price_idr: config.price_idr,
            min_price_idr: config.min_price_idr,
            payment_secret: config.saweria_webhook_secret.clone(),
            admin_secret: config.webhook_secret.clone(),
            invite_policy: InvitePolicy::new(config.invite_ttl_secs),
        }
    }
}

/// A QR image plus how long clients may cache it.
#[derive(Debug)]
pub struct QrResponse {
    pub image: QrImage,
    pub max_age_secs: u32,
}

pub struct GateService<S: Storage, T: TelegramApi, Q: QrSource> {
    storage: S,
    telegram: Arc<T>,
    qr_source: Q,
    settings: ServiceSettings,
}

impl<S: Storage, T: TelegramApi, Q: QrSource> GateService<S, T, Q> {
    pub fn new(storage: S, telegram: Arc<T>, qr_source: Q, settings: ServiceSettings) -> Self {
        GateService {
            storage,
            telegram,
            qr_source,
            settings,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.settings.catalog
    }

    pub fn price_idr(&self) -> i64 {
        self.settings.price_idr
    }

    pub fn qr_source(&self) -> &Q {
        &self.qr_source
    }

    pub async fn create_invoice(&self, user_id: i64, groups: Vec<String>, amount: i64) -> Result<Invoice, GateError> {
        info!(user_id, ?groups, amount, "Creating invoice");

        if amount < self.settings.min_price_idr {
            return Err(GateError::InvalidAmount(self.settings.min_price_idr));
        }
        if groups.is_empty() {
            return Err(GateError::InvalidInput(
                "groups".to_string(),
                FieldError::new("groups", "Invalid groups", "Select at least one group"),
            ));
        }

        let mut selected: Vec<String> = Vec::with_capacity(groups.len());
        for group_id in groups {
            let group_id = group_id.trim().to_string();
            if !self.settings.catalog.contains(&group_id) {
                return Err(GateError::UnknownGroup(group_id));
            }
            if !selected.contains(&group_id) {
                selected.push(group_id);
            }
        }

        let invoice = Invoice::new(Uuid::new_v4().to_string(), user_id, selected, amount);
        self.storage.create_invoice(invoice.clone()).await?;
        info!(invoice_id = %invoice.invoice_id, "Invoice created");
        Ok(invoice)
    }

    pub async fn get_invoice(&self, invoice_id: &str) -> Result<Invoice, GateError> {
        self.storage
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| GateError::InvoiceNotFound(invoice_id.to_string()))
    }

    pub async fn list_invoices(&self, limit: usize) -> Result<Vec<Invoice>, GateError> {
        self.storage.list_invoices(limit).await
    }

    pub async fn mark_paid(&self, invoice_id: &str) -> Result<PaymentTransition, GateError> {
        self.storage
            .mark_paid(invoice_id, Utc::now())
            .await?
            .ok_or_else(|| GateError::InvoiceNotFound(invoice_id.to_string()))
    }

    pub async fn invite_logs(&self, invoice_id: &str) -> Result<Vec<InviteLog>, GateError> {
        self.get_invoice(invoice_id).await?;
        self.storage.list_invite_logs(invoice_id).await
    }

    /// Checks the provider signature. Without a configured secret every body passes.
    pub fn verify_payment_signature(&self, body: &[u8], signature: Option<&str>) -> bool {
        match self.settings.payment_secret.as_deref() {
            None => true,
            Some(secret) => signature.is_some_and(|sig| webhook::verify_signature(secret, body, sig)),
        }
    }

    /// Processes a verified payment notification body.
    pub async fn handle_payment_notice(&self, body: &[u8]) -> WebhookOutcome {
        let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            match serde_json::from_slice(body) {
                Ok(value) => value,
                Err(e) => return WebhookOutcome::rejected(format!("bad json: {}", e), None),
            }
        };

        let notice = PaymentNotice::from_value(&value);
        let Some(invoice_id) = notice.invoice_id.clone() else {
            return WebhookOutcome::rejected("no invoice id", None);
        };
        if !notice.is_paid() {
            info!(invoice_id = %invoice_id, status = %notice.status, "Ignoring non-paid notification");
            return WebhookOutcome::ignored(&invoice_id);
        }

        let transition = match self.storage.mark_paid(&invoice_id, Utc::now()).await {
            Ok(Some(transition)) => transition,
            Ok(None) => return WebhookOutcome::rejected("invoice not found", Some(&invoice_id)),
            Err(e) => return WebhookOutcome::rejected(format!("mark_paid error: {}", e), Some(&invoice_id)),
        };

        match transition {
            PaymentTransition::AlreadyPaid(_) => {
                info!(invoice_id = %invoice_id, "Duplicate payment notification");
                WebhookOutcome::already_paid(&invoice_id)
            }
            PaymentTransition::Transitioned(invoice) => {
                info!(invoice_id = %invoice_id, user_id = invoice.user_id, "Invoice paid");
                let (sent, failed) = self.deliver_invites(&invoice).await;
                WebhookOutcome::delivered(&invoice_id, sent, failed)
            }
        }
    }

    /// Manual re-send for an invoice that is already paid.
    pub async fn resend_invites(&self, invoice_id: &str, secret: Option<&str>) -> Result<WebhookOutcome, GateError> {
        self.check_admin_secret(secret)?;
        let invoice = self.get_invoice(invoice_id).await?;
        if !invoice.is_paid() {
            return Err(GateError::InvoiceNotPaid(invoice_id.to_string()));
        }
        let (sent, failed) = self.deliver_invites(&invoice).await;
        Ok(WebhookOutcome::delivered(invoice_id, sent, failed))
    }

    pub fn check_admin_secret(&self, secret: Option<&str>) -> Result<(), GateError> {
        match self.settings.admin_secret.as_deref() {
            Some(expected) if secret != Some(expected) => Err(GateError::Unauthorized("invalid secret".to_string())),
            _ => Ok(()),
        }
    }

    async fn deliver_invites(&self, invoice: &Invoice) -> (Vec<String>, Vec<FailedInvite>) {
        let issuer = InviteIssuer::new(self.telegram.as_ref(), &self.settings.invite_policy);
        let mut sent = Vec::new();
        let mut failed = Vec::new();

        for group_id in &invoice.groups {
            let name = self.settings.catalog.display_name(group_id);
            let log = match issuer.issue(invoice.user_id, group_id, name).await {
                Ok(link) => {
                    sent.push(group_id.clone());
                    InviteLog::sent(&invoice.invoice_id, group_id, &link)
                }
                Err(GateError::DeliveryFailed {
                    invite_link, reason, ..
                }) => {
                    warn!(invoice_id = %invoice.invoice_id, group_id, error = %reason, "Invite DM failed");
                    failed.push(FailedInvite {
                        group_id: group_id.clone(),
                        error: reason.clone(),
                    });
                    InviteLog::failed(&invoice.invoice_id, group_id, Some(&invite_link), &reason)
                }
                Err(e) => {
                    warn!(invoice_id = %invoice.invoice_id, group_id, error = %e, "Invite not issued");
                    failed.push(FailedInvite {
                        group_id: group_id.clone(),
                        error: e.to_string(),
                    });
                    InviteLog::failed(&invoice.invoice_id, group_id, None, &e.to_string())
                }
            };
            if let Err(e) = self.storage.append_invite_log(log).await {
                warn!(invoice_id = %invoice.invoice_id, group_id, error = %e, "Invite log not written");
            }
        }
        (sent, failed)
    }

    /// QR for `/api/qr/{id}`. `legacy` carries `(amount, msg)` for ids that
    /// have no invoice behind them.
    pub async fn qr_image(&self, raw_id: &str, legacy: Option<(i64, String)>) -> Result<QrResponse, GateError> {
        let invoice_id = strip_image_suffix(raw_id);

        let Some(invoice) = self.storage.get_invoice(invoice_id).await? else {
            return match legacy {
                Some((amount, message)) if amount > 0 && !message.is_empty() => {
                    let image = self.qr_source.fetch_qr(amount, &message).await?;
                    Ok(QrResponse {
                        image,
                        max_age_secs: LEGACY_QR_MAX_AGE_SECS,
                    })
                }
                _ => Err(GateError::InvoiceNotFound(invoice_id.to_string())),
            };
        };

        if let Some(payload) = invoice.qr_payload.as_deref() {
            match QrImage::from_data_url(payload) {
                Ok(image) => {
                    return Ok(QrResponse {
                        image,
                        max_age_secs: QR_MAX_AGE_SECS,
                    });
                }
                Err(e) => warn!(invoice_id, error = %e, "Cached QR unreadable, regenerating"),
            }
        }

        let image = self.generate_and_cache(&invoice).await?;
        Ok(QrResponse {
            image,
            max_age_secs: QR_MAX_AGE_SECS,
        })
    }

    async fn generate_and_cache(&self, invoice: &Invoice) -> Result<QrImage, GateError> {
        let image = self
            .qr_source
            .fetch_qr(invoice.amount, &invoice.payment_message())
            .await?;
        if let Err(e) = self
            .storage
            .save_qr_payload(&invoice.invoice_id, &image.to_data_url())
            .await
        {
            warn!(invoice_id = %invoice.invoice_id, error = %e, "QR not cached");
        }
        Ok(image)
    }

    /// Warms the QR cache for a fresh invoice. Failures are only logged.
    pub async fn prewarm_qr(&self, invoice_id: &str) {
        let invoice = match self.storage.get_invoice(invoice_id).await {
            Ok(Some(invoice)) => invoice,
            Ok(None) => return,
            Err(e) => {
                warn!(invoice_id, error = %e, "QR prewarm lookup failed");
                return;
            }
        };
        if invoice.qr_payload.is_some() {
            return;
        }
        match self.generate_and_cache(&invoice).await {
            Ok(image) => info!(invoice_id, bytes = image.bytes.len(), "QR prewarmed"),
            Err(e) => warn!(invoice_id, error = %e, "QR prewarm failed"),
        }
    }
}

/// Drops a trailing `.png`, `.jpg` or `.jpeg` (any case).
pub fn strip_image_suffix(raw_id: &str) -> &str {
    let lower = raw_id.to_ascii_lowercase();
    for suffix in [".png", ".jpeg", ".jpg"] {
        if lower.ends_with(suffix) {
            return &raw_id[..raw_id.len() - suffix.len()];
        }
    }
    raw_id
}
