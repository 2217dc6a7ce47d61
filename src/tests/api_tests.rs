use super::*;
use crate::api::AppState;
use crate::api::handlers::api_routes;
use crate::bot::{BotHandler, BotSettings};
use crate::core::gate::GateConfig;
use crate::core::webhook::{SIGNATURE_HEADER, sign};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    telegram: Arc<FakeTelegram>,
}

fn test_app(settings: ServiceSettings, telegram_secret: Option<&str>, debug_routes: bool) -> TestApp {
    let (service, telegram) = create_test_service_with(settings, FakeQr::new());
    let bot = BotHandler::new(
        telegram.clone(),
        BotSettings {
            gate: GateConfig::default(),
            webapp_url: None,
            base_url: "http://127.0.0.1:8000".to_string(),
        },
    );
    let state = Arc::new(AppState {
        service: Arc::new(service),
        bot,
        telegram_secret: telegram_secret.map(String::from),
        groups_raw: r#"{"-1001": "VIP Lounge"}"#.to_string(),
        qr_prewarm: false,
        debug_routes,
    });
    TestApp {
        router: api_routes(state),
        telegram,
    }
}

fn default_app() -> TestApp {
    test_app(test_settings(), None, false)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec(), headers)
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body, _) = send(router, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn create_invoice(router: &Router) -> String {
    let (status, body) = send_json(
        router,
        post_json("/api/invoice", &json!({ "user_id": 99, "groups": ["-1001"], "amount": 25000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["invoice_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_config() {
    let app = default_app();

    let (status, body) = send_json(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (_, config) = send_json(&app.router, get("/api/config")).await;
    assert_eq!(config["price_idr"], 25000);
    assert_eq!(config["groups"].as_array().unwrap().len(), 3);
    assert_eq!(config["groups"][0]["name"], "VIP Lounge");

    let (_, raw) = send_json(&app.router, get("/api/config/raw")).await;
    assert_eq!(raw["env_groups"], r#"{"-1001": "VIP Lounge"}"#);
}

#[tokio::test]
async fn test_create_invoice_and_read_status() {
    let app = default_app();
    let invoice_id = create_invoice(&app.router).await;

    let (status, body) = send_json(&app.router, get(&format!("/api/invoice/{}/status", invoice_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["amount"], 25000);
    assert_eq!(body["paid_at"], Value::Null);
}

#[tokio::test]
async fn test_create_invoice_validation_errors() {
    let app = default_app();

    let (status, body) = send_json(
        &app.router,
        post_json("/api/invoice", &json!({ "groups": ["-1001"], "amount": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid amount. Min 1000");

    let (status, body) = send_json(
        &app.router,
        post_json("/api/invoice", &json!({ "groups": ["-42"], "amount": 25000 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid group -42");
}

#[tokio::test]
async fn test_unknown_invoice_is_not_found() {
    let app = default_app();
    let (status, body) = send_json(&app.router, get("/api/invoice/missing/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invoice not found");

    let (status, _) = send_json(&app.router, get("/api/invoice/missing/invites")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_qr_endpoint_serves_cached_image() {
    let app = default_app();
    let invoice_id = create_invoice(&app.router).await;

    let (status, body, headers) = send(&app.router, get(&format!("/api/qr/{}.png", invoice_id))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=300");
}

#[tokio::test]
async fn test_qr_endpoint_legacy_and_missing() {
    let app = default_app();

    let (status, _, headers) = send(&app.router, get("/api/qr/unknown?amount=5000&msg=INV%3Aadhoc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=120");

    let (status, _, _) = send(&app.router, get("/api/qr/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_webhook_signature_and_delivery() {
    let settings = ServiceSettings {
        payment_secret: Some("pay-secret".to_string()),
        ..test_settings()
    };
    let app = test_app(settings, None, false);
    let invoice_id = create_invoice(&app.router).await;
    let payload = serde_json::to_vec(&json!({ "status": "paid", "message": format!("INV:{}", invoice_id) })).unwrap();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/api/saweria/webhook")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, body) = send_json(&app.router, unsigned).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "ok": false, "reason": "bad signature" }));

    let signed = Request::builder()
        .method("POST")
        .uri("/api/saweria/webhook")
        .header(SIGNATURE_HEADER, sign("pay-secret", &payload))
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, body) = send_json(&app.router, signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["sent"], json!(["-1001"]));
    assert_eq!(app.telegram.creates(), 1);

    let (_, logs) = send_json(&app.router, get(&format!("/api/invoice/{}/invites", invoice_id))).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);

    let (_, status_body) = send_json(&app.router, get(&format!("/api/invoice/{}/status", invoice_id))).await;
    assert_eq!(status_body["status"], "PAID");
}

#[tokio::test]
async fn test_payment_webhook_bad_json_is_ok_false() {
    let app = default_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/saweria/webhook")
        .body(Body::from("{oops"))
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert!(body["reason"].as_str().unwrap().starts_with("bad json"));
}

#[tokio::test]
async fn test_telegram_webhook_checks_secret() {
    let app = test_app(test_settings(), Some("tg-secret"), false);
    let update = json!({
        "update_id": 1,
        "message": {
            "message_id": 1,
            "from": { "id": 99, "first_name": "Ayu" },
            "chat": { "id": 99, "type": "private" },
            "text": "/start"
        }
    });

    let (status, _) = send_json(&app.router, post_json("/telegram/webhook", &update)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.telegram.sent().is_empty());

    let request = Request::builder()
        .method("POST")
        .uri("/telegram/webhook")
        .header("X-Telegram-Bot-Api-Secret-Token", "tg-secret")
        .body(Body::from(serde_json::to_vec(&update).unwrap()))
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
    assert_eq!(app.telegram.sent().len(), 1);
}

#[tokio::test]
async fn test_send_invites_requires_secret_and_payment() {
    let settings = ServiceSettings {
        admin_secret: Some("admin".to_string()),
        ..test_settings()
    };
    let app = test_app(settings, None, false);
    let invoice_id = create_invoice(&app.router).await;

    let (status, _) = send_json(&app.router, get(&format!("/api/invoice/{}/send-invites", invoice_id))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(
        &app.router,
        get(&format!("/api/invoice/{}/send-invites?secret=admin", invoice_id)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_debug_routes_follow_environment() {
    let hidden = default_app();
    let (status, _, _) = send(&hidden.router, get("/debug/saweria-snap")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let visible = test_app(test_settings(), None, true);
    let (status, body, headers) = send(&visible.router, get("/debug/saweria-pay?amount=1000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn test_fill_snapshot_passes_method_through() {
    let hidden = default_app();
    let (status, _, _) = send(&hidden.router, get("/debug/saweria-fill")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (service, _) = create_test_service_with(test_settings(), FakeQr::new());
    let service = Arc::new(service);
    let state = Arc::new(AppState {
        service: service.clone(),
        bot: BotHandler::new(
            FakeTelegram::new(),
            BotSettings {
                gate: GateConfig::default(),
                webapp_url: None,
                base_url: "http://127.0.0.1:8000".to_string(),
            },
        ),
        telegram_secret: None,
        groups_raw: "[]".to_string(),
        qr_prewarm: false,
        debug_routes: true,
    });
    let router = api_routes(state);

    let (status, body, headers) = send(&router, get("/debug/saweria-fill?amount=5000&msg=INV%3Atest&method=ovo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");

    let (status, _, _) = send(&router, get("/debug/saweria-fill")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        service.qr_source().calls(),
        vec![
            (5000, "INV:test via ovo".to_string()),
            (25_000, "INV:debug via default".to_string()),
        ]
    );
}
