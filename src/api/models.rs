use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::core::errors::GateError;
use crate::core::models::{CatalogGroup, Invoice, InvoiceStatus};

#[derive(Deserialize, ToSchema)]
pub struct CreateInvoiceRequest {
    /// Telegram user id of the payer. Optional so the Mini App can be tried from a browser.
    #[serde(default)]
    pub user_id: i64,
    pub groups: Vec<String>,
    pub amount: i64,
}

#[derive(Serialize, ToSchema)]
pub struct InvoiceStatusResponse {
    pub invoice_id: String,
    pub status: InvoiceStatus,
    pub amount: i64,
    pub groups: Vec<String>,
    #[schema(value_type = Option<String>)]
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Invoice> for InvoiceStatusResponse {
    fn from(invoice: Invoice) -> Self {
        InvoiceStatusResponse {
            invoice_id: invoice.invoice_id,
            status: invoice.status,
            amount: invoice.amount,
            groups: invoice.groups,
            paid_at: invoice.paid_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ConfigResponse {
    pub price_idr: i64,
    pub groups: Vec<CatalogGroup>,
}

#[derive(Serialize, ToSchema)]
pub struct RawConfigResponse {
    pub env_groups: String,
}

#[derive(Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QrQuery {
    /// Amount for on-demand generation when no invoice exists.
    pub amount: Option<i64>,
    /// Donation message for on-demand generation.
    pub msg: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListInvoicesQuery {
    pub secret: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CheckoutSnapshotQuery {
    pub amount: Option<i64>,
    pub msg: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FillSnapshotQuery {
    pub amount: Option<i64>,
    pub msg: Option<String>,
    /// Payment method button to pick, e.g. `gopay`.
    pub method: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(pub GateError);

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self.0 {
            GateError::InvoiceNotFound(_) => (StatusCode::NOT_FOUND, "Invoice not found".to_string()),
            GateError::InvoiceAlreadyExists(id) => (StatusCode::CONFLICT, format!("Invoice {} already exists", id)),
            GateError::InvoiceNotPaid(id) => (StatusCode::CONFLICT, format!("Invoice {} is not paid", id)),
            e @ (GateError::InvalidAmount(_) | GateError::UnknownGroup(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            GateError::InvalidInput(_, field_error) => (StatusCode::BAD_REQUEST, field_error.description),
            GateError::Unauthorized(_) => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            e @ (GateError::InviteUnavailable(_)
            | GateError::DeliveryFailed { .. }
            | GateError::Telegram(_)
            | GateError::Scraper(_)
            | GateError::InvalidQrPayload(_)) => (StatusCode::BAD_GATEWAY, e.to_string()),
            e @ GateError::ScraperNotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            GateError::Config(msg)
            | GateError::StorageError(msg)
            | GateError::DatabaseError(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}
