//! Donation-provider webhook: signature check and payload extraction.

use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-saweria-signature";

static INVOICE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bINV:([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\b")
        .expect("invoice token pattern is valid")
});

/// Lowercase hex HMAC-SHA256 of `body`.
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Pulls the invoice id out of a free-text donation message (`INV:<uuid>`).
pub fn extract_invoice_id(message: &str) -> Option<String> {
    INVOICE_TOKEN
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentNotice {
    pub status: String,
    pub message: String,
    pub invoice_id: Option<String>,
}

impl PaymentNotice {
    pub fn from_value(body: &Value) -> Self {
        let status = first_text(body, &["status", "event"]).to_ascii_lowercase();
        let message = first_text(body, &["message", "note", "payload"]);
        let invoice_id = Some(first_text(body, &["invoice_id", "external_id"]))
            .filter(|id| !id.is_empty())
            .or_else(|| extract_invoice_id(&message));
        PaymentNotice {
            status,
            message,
            invoice_id,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status.contains("paid") && !self.status.contains("unpaid")
    }
}

fn first_text(body: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct FailedInvite {
    pub group_id: String,
    pub error: String,
}

/// JSON body returned to the payment provider.
#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<FailedInvite>>,
}

impl WebhookOutcome {
    pub fn rejected(reason: impl Into<String>, invoice_id: Option<&str>) -> Self {
        WebhookOutcome {
            ok: false,
            reason: Some(reason.into()),
            invoice_id: invoice_id.map(String::from),
            ..Default::default()
        }
    }

    pub fn ignored(invoice_id: &str) -> Self {
        WebhookOutcome {
            ok: true,
            invoice_id: Some(invoice_id.to_string()),
            ignored: Some(true),
            ..Default::default()
        }
    }

    pub fn already_paid(invoice_id: &str) -> Self {
        WebhookOutcome {
            ok: true,
            invoice_id: Some(invoice_id.to_string()),
            already_paid: Some(true),
            sent: Some(Vec::new()),
            failed: Some(Vec::new()),
            ..Default::default()
        }
    }

    pub fn delivered(invoice_id: &str, sent: Vec<String>, failed: Vec<FailedInvite>) -> Self {
        WebhookOutcome {
            ok: true,
            invoice_id: Some(invoice_id.to_string()),
            sent: Some(sent),
            failed: Some(failed),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "0b6f3c2e-8d3a-4f51-9a7e-2c1d5e6f7a8b";

    #[test]
    fn signature_round_trip_and_tamper() {
        let body = br#"{"status":"paid"}"#;
        let sig = sign("s3cret", body);
        assert_eq!(sig.len(), 64);
        assert!(verify_signature("s3cret", body, &sig));
        assert!(verify_signature("s3cret", body, &sig.to_uppercase()));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("s3cret", b"{}", &sig));
        assert!(!verify_signature("s3cret", body, "not-hex"));
    }

    #[test]
    fn invoice_id_from_explicit_field_wins() {
        let notice = PaymentNotice::from_value(&json!({
            "status": "PAID",
            "invoice_id": format!("  {}  ", ID),
            "message": "INV:11111111-1111-1111-1111-111111111111"
        }));
        assert_eq!(notice.invoice_id.as_deref(), Some(ID));
        assert!(notice.is_paid());
    }

    #[test]
    fn invoice_id_from_message_token() {
        let upper = ID.to_uppercase();
        let notice = PaymentNotice::from_value(&json!({
            "event": "donation.paid",
            "note": format!("thanks! inv:{} see you", upper)
        }));
        assert_eq!(notice.invoice_id.as_deref(), Some(ID));
        assert_eq!(notice.status, "donation.paid");
    }

    #[test]
    fn missing_or_malformed_token_yields_none() {
        let notice = PaymentNotice::from_value(&json!({ "status": "paid", "message": "INV:not-a-uuid" }));
        assert!(notice.invoice_id.is_none());
        assert!(PaymentNotice::from_value(&json!({})).invoice_id.is_none());
    }

    #[test]
    fn non_paid_statuses() {
        assert!(!PaymentNotice::from_value(&json!({ "status": "pending" })).is_paid());
        assert!(!PaymentNotice::from_value(&json!({ "status": "UNPAID" })).is_paid());
        assert!(!PaymentNotice::from_value(&json!({ "status": "", "event": "" })).is_paid());
    }

    #[test]
    fn outcome_serializes_only_present_fields() {
        let value = serde_json::to_value(WebhookOutcome::ignored(ID)).unwrap();
        assert_eq!(value, json!({ "ok": true, "invoice_id": ID, "ignored": true }));
    }
}
