use crate::{
    api::{AppState, models::*},
    core::{
        errors::GateError,
        models::{InviteLog, Invoice},
        webhook::{SIGNATURE_HEADER, WebhookOutcome},
    },
    infrastructure::{
        scraper::{QrImage, QrSource},
        storage::Storage,
        telegram::{TelegramApi, types::Update},
    },
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use http::header;
use std::sync::Arc;
use tracing::{info, warn};

const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

type SharedState<S, T, Q> = State<Arc<AppState<S, T, Q>>>;

// Define API routes
pub fn api_routes<S, T, Q>(state: Arc<AppState<S, T, Q>>) -> Router
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/config", get(get_config::<S, T, Q>))
        .route("/api/config/raw", get(get_raw_config::<S, T, Q>))
        .route("/api/invoice", post(create_invoice::<S, T, Q>))
        .route("/api/invoices", get(list_invoices::<S, T, Q>))
        .route("/api/invoice/{invoice_id}/status", get(invoice_status::<S, T, Q>))
        .route("/api/invoice/{invoice_id}/invites", get(invoice_invites::<S, T, Q>))
        .route("/api/invoice/{invoice_id}/send-invites", get(send_invites::<S, T, Q>))
        .route("/api/qr/{invoice_id}", get(qr_image::<S, T, Q>))
        .route("/api/saweria/webhook", post(payment_webhook::<S, T, Q>))
        .route("/telegram/webhook", post(telegram_webhook::<S, T, Q>));

    if state.debug_routes {
        router = router
            .route("/debug/saweria-snap", get(debug_profile_snapshot::<S, T, Q>))
            .route("/debug/saweria-fill", get(debug_fill_snapshot::<S, T, Q>))
            .route("/debug/saweria-pay", get(debug_checkout_snapshot::<S, T, Q>));
    }

    router.with_state(state)
}

fn image_response(image: QrImage, max_age_secs: Option<u32>) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(mime) = image.mime.parse() {
        headers.insert(header::CONTENT_TYPE, mime);
    }
    if let Some(max_age) = max_age_secs {
        if let Ok(value) = format!("public, max-age={}", max_age).parse() {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }
    (headers, image.bytes).into_response()
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = OkResponse))
)]
async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

#[utoipa::path(
    get,
    path = "/api/config",
    responses((status = 200, description = "Price and purchasable groups", body = ConfigResponse))
)]
async fn get_config<S, T, Q>(State(state): SharedState<S, T, Q>) -> Json<ConfigResponse>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    Json(ConfigResponse {
        price_idr: state.service.price_idr(),
        groups: state.service.catalog().groups().to_vec(),
    })
}

#[utoipa::path(
    get,
    path = "/api/config/raw",
    responses((status = 200, description = "Unparsed GROUP_IDS_JSON", body = RawConfigResponse))
)]
async fn get_raw_config<S, T, Q>(State(state): SharedState<S, T, Q>) -> Json<RawConfigResponse>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    Json(RawConfigResponse {
        env_groups: state.groups_raw.clone(),
    })
}

#[utoipa::path(
    post,
    path = "/api/invoice",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice created", body = Invoice),
        (status = 400, description = "Invalid amount or group", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
async fn create_invoice<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<Json<Invoice>, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let invoice = state
        .service
        .create_invoice(req.user_id, req.groups, req.amount)
        .await?;

    if state.qr_prewarm {
        let service = state.service.clone();
        let invoice_id = invoice.invoice_id.clone();
        tokio::spawn(async move {
            service.prewarm_qr(&invoice_id).await;
        });
    }

    Ok(Json(invoice))
}

#[utoipa::path(
    get,
    path = "/api/invoices",
    params(ListInvoicesQuery),
    responses(
        (status = 200, description = "Most recent invoices", body = Vec<Invoice>),
        (status = 403, description = "Invalid secret", body = ErrorResponse)
    )
)]
async fn list_invoices<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    state.service.check_admin_secret(query.secret.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(Json(state.service.list_invoices(limit).await?))
}

#[utoipa::path(
    get,
    path = "/api/invoice/{invoice_id}/status",
    params(("invoice_id" = String, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice status", body = InvoiceStatusResponse),
        (status = 404, description = "Invoice not found", body = ErrorResponse)
    )
)]
async fn invoice_status<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Path(invoice_id): Path<String>,
) -> Result<Json<InvoiceStatusResponse>, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let invoice = state.service.get_invoice(&invoice_id).await?;
    Ok(Json(invoice.into()))
}

#[utoipa::path(
    get,
    path = "/api/invoice/{invoice_id}/invites",
    params(("invoice_id" = String, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invite attempts in order", body = Vec<InviteLog>),
        (status = 404, description = "Invoice not found", body = ErrorResponse)
    )
)]
async fn invoice_invites<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Path(invoice_id): Path<String>,
) -> Result<Json<Vec<InviteLog>>, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    Ok(Json(state.service.invite_logs(&invoice_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/invoice/{invoice_id}/send-invites",
    params(("invoice_id" = String, Path, description = "Invoice id"), SecretQuery),
    responses(
        (status = 200, description = "Invites re-sent", body = WebhookOutcome),
        (status = 403, description = "Invalid secret", body = ErrorResponse),
        (status = 404, description = "Invoice not found", body = ErrorResponse),
        (status = 409, description = "Invoice is not paid", body = ErrorResponse)
    )
)]
async fn send_invites<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Path(invoice_id): Path<String>,
    Query(query): Query<SecretQuery>,
) -> Result<Json<WebhookOutcome>, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let outcome = state
        .service
        .resend_invites(&invoice_id, query.secret.as_deref())
        .await?;
    info!(invoice_id = %invoice_id, "Invites re-sent manually");
    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/api/qr/{invoice_id}",
    params(("invoice_id" = String, Path, description = "Invoice id, optionally with .png/.jpg"), QrQuery),
    responses(
        (status = 200, description = "QR image", content_type = "image/png"),
        (status = 404, description = "Invoice not found", body = ErrorResponse),
        (status = 502, description = "QR not found")
    )
)]
async fn qr_image<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Path(raw_id): Path<String>,
    Query(query): Query<QrQuery>,
) -> Response
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let legacy = match (query.amount, query.msg) {
        (Some(amount), Some(msg)) => Some((amount, msg)),
        _ => None,
    };
    match state.service.qr_image(&raw_id, legacy).await {
        Ok(qr) => image_response(qr.image, Some(qr.max_age_secs)),
        Err(e @ GateError::InvoiceNotFound(_)) => ApiError(e).into_response(),
        Err(e) => {
            warn!(invoice_id = %raw_id, error = %e, "QR generation failed");
            (StatusCode::BAD_GATEWAY, "QR not found").into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/saweria/webhook",
    request_body(content = String, description = "Raw JSON donation notification"),
    responses(
        (status = 200, description = "Notification processed", body = WebhookOutcome),
        (status = 403, description = "Bad signature", body = WebhookOutcome)
    )
)]
async fn payment_webhook<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookOutcome>)
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !state.service.verify_payment_signature(&body, signature) {
        warn!("Payment webhook rejected: bad signature");
        return (
            StatusCode::FORBIDDEN,
            Json(WebhookOutcome::rejected("bad signature", None)),
        );
    }
    let outcome = state.service.handle_payment_notice(&body).await;
    info!(
        ok = outcome.ok,
        invoice_id = outcome.invoice_id.as_deref().unwrap_or("-"),
        reason = outcome.reason.as_deref().unwrap_or("-"),
        "Payment webhook handled"
    );
    (StatusCode::OK, Json(outcome))
}

#[utoipa::path(
    post,
    path = "/telegram/webhook",
    request_body(content = String, description = "Telegram Update object"),
    responses(
        (status = 200, description = "Update accepted", body = OkResponse),
        (status = 403, description = "Invalid secret", body = ErrorResponse)
    )
)]
async fn telegram_webhook<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OkResponse>, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    if let Some(expected) = state.telegram_secret.as_deref() {
        let provided = headers.get(TELEGRAM_SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            return Err(GateError::Unauthorized("invalid secret".to_string()).into());
        }
    }

    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            if let Err(e) = state.bot.handle_update(update).await {
                warn!(error = %e, "Update handling failed");
            }
        }
        Err(e) => warn!(error = %e, "Unreadable Telegram update"),
    }
    Ok(Json(OkResponse { ok: true }))
}

#[utoipa::path(
    get,
    path = "/debug/saweria-snap",
    responses(
        (status = 200, description = "Profile page screenshot", content_type = "image/png"),
        (status = 502, description = "Snapshot failed", body = ErrorResponse)
    )
)]
async fn debug_profile_snapshot<S, T, Q>(State(state): SharedState<S, T, Q>) -> Result<Response, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let image = state.service.qr_source().profile_snapshot().await?;
    Ok(image_response(image, None))
}

#[utoipa::path(
    get,
    path = "/debug/saweria-fill",
    params(FillSnapshotQuery),
    responses(
        (status = 200, description = "Filled donation form screenshot", content_type = "image/png"),
        (status = 502, description = "Snapshot failed", body = ErrorResponse)
    )
)]
async fn debug_fill_snapshot<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Query(query): Query<FillSnapshotQuery>,
) -> Result<Response, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let amount = query.amount.unwrap_or_else(|| state.service.price_idr());
    let message = query.msg.unwrap_or_else(|| "INV:debug".to_string());
    let image = state
        .service
        .qr_source()
        .fill_snapshot(amount, &message, query.method.as_deref())
        .await?;
    Ok(image_response(image, None))
}

#[utoipa::path(
    get,
    path = "/debug/saweria-pay",
    params(CheckoutSnapshotQuery),
    responses(
        (status = 200, description = "Checkout panel screenshot", content_type = "image/png"),
        (status = 502, description = "Snapshot failed", body = ErrorResponse)
    )
)]
async fn debug_checkout_snapshot<S, T, Q>(
    State(state): SharedState<S, T, Q>,
    Query(query): Query<CheckoutSnapshotQuery>,
) -> Result<Response, ApiError>
where
    S: Storage + 'static,
    T: TelegramApi + 'static,
    Q: QrSource + 'static,
{
    let amount = query.amount.unwrap_or_else(|| state.service.price_idr());
    let message = query.msg.unwrap_or_else(|| "INV:debug".to_string());
    let image = state
        .service
        .qr_source()
        .checkout_snapshot(amount, &message)
        .await?;
    Ok(image_response(image, None))
}
