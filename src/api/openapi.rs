use utoipa::OpenApi;

use crate::{
    api::models::{
        ConfigResponse, CreateInvoiceRequest, ErrorResponse, InvoiceStatusResponse, OkResponse, RawConfigResponse,
    },
    core::{
        models::{CatalogGroup, InviteLog, Invoice, InvoiceStatus},
        webhook::{FailedInvite, WebhookOutcome},
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::health,
        super::handlers::get_config,
        super::handlers::get_raw_config,
        super::handlers::create_invoice,
        super::handlers::list_invoices,
        super::handlers::invoice_status,
        super::handlers::invoice_invites,
        super::handlers::send_invites,
        super::handlers::qr_image,
        super::handlers::payment_webhook,
        super::handlers::telegram_webhook,
        super::handlers::debug_profile_snapshot,
        super::handlers::debug_fill_snapshot,
        super::handlers::debug_checkout_snapshot
    ),
    components(schemas(
        CreateInvoiceRequest,
        InvoiceStatusResponse,
        ConfigResponse,
        RawConfigResponse,
        OkResponse,
        ErrorResponse,
        Invoice,
        InvoiceStatus,
        InviteLog,
        CatalogGroup,
        WebhookOutcome,
        FailedInvite
    )),
    tags(
        (name = "gatepass", description = "Paid group access: invoices, QR payments and invite delivery")
    )
)]
pub struct ApiDoc;
