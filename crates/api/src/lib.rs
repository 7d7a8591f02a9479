mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Json, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vista_bot::IntakeBot;
use vista_core::BusinessInfo;
use vista_export::{format_lead_summary, lead_stats, leads_to_csv, HttpLeadExporter, LeadSink};
use vista_observability::{BotMetrics, MetricsSnapshot};
use vista_storage::{LeadRepository, MemoryStore};
use vista_wa::{Channel, DisabledChannel, WebhookEnvelope, WhatsAppClient};

use crate::rate_limit::IpRateLimiter;

const EXPIRY_SWEEP_SECONDS: u64 = 60 * 60;

pub type BotHandle = IntakeBot<MemoryStore, Channel>;

#[derive(Clone)]
pub struct ApiState {
    bot: BotHandle,
    store: Arc<MemoryStore>,
    metrics: Arc<BotMetrics>,
    business: BusinessInfo,
    admin_key: String,
    verify_token: String,
    app_secret: Option<String>,
    limiter: IpRateLimiter,
    allowed_origins: Arc<Vec<String>>,
    whatsapp_enabled: bool,
    export_enabled: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    timestamp_utc: String,
    business: BusinessInfo,
    metrics: MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    whatsapp_send: bool,
    signature_check: bool,
    lead_export: bool,
}

pub async fn build_app() -> Result<Router> {
    let metrics = BotMetrics::shared();
    let store = Arc::new(MemoryStore::new());

    let graph_base = env::var("VISTA_GRAPH_BASE")
        .unwrap_or_else(|_| "https://graph.facebook.com/v20.0".to_string());
    let access_token = trimmed_env("VISTA_WA_ACCESS_TOKEN");
    let phone_number_id = trimmed_env("VISTA_WA_PHONE_NUMBER_ID");
    let channel = match (access_token, phone_number_id) {
        (Some(token), Some(phone_id)) => {
            Channel::Cloud(WhatsAppClient::new(graph_base, phone_id, token)?)
        }
        _ => {
            warn!(
                "VISTA_WA_ACCESS_TOKEN or VISTA_WA_PHONE_NUMBER_ID not set, \
                 outbound messages will be dropped"
            );
            Channel::Disabled(DisabledChannel)
        }
    };
    let whatsapp_enabled = matches!(channel, Channel::Cloud(_));

    let sink = match trimmed_env("VISTA_SHEETS_URL") {
        Some(url) => LeadSink::Http(HttpLeadExporter::new(url)?),
        None => LeadSink::Disabled,
    };
    let export_enabled = sink.is_configured();

    let defaults = BusinessInfo::default();
    let business = BusinessInfo {
        name: env::var("VISTA_BUSINESS_NAME").unwrap_or(defaults.name),
        phone: env::var("VISTA_BUSINESS_PHONE").unwrap_or(defaults.phone),
        website: env::var("VISTA_BUSINESS_WEBSITE").unwrap_or(defaults.website),
    };

    let bot = IntakeBot::new(
        store.clone(),
        Arc::new(channel),
        sink,
        business.clone(),
        metrics.clone(),
    );

    let admin_key = env::var("VISTA_ADMIN_KEY").unwrap_or_else(|_| "dev-vista-key".to_string());
    let verify_token =
        env::var("VISTA_VERIFY_TOKEN").unwrap_or_else(|_| "dev-verify-token".to_string());
    let app_secret = trimmed_env("VISTA_APP_SECRET");
    let rate_limit_window = Duration::from_secs(
        env::var("VISTA_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60),
    );
    let rate_limit_max = env::var("VISTA_RATE_LIMIT_MAX")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(60);

    let state = ApiState {
        bot: bot.clone(),
        store,
        metrics,
        business,
        admin_key,
        verify_token,
        app_secret,
        limiter: IpRateLimiter::new(rate_limit_window, rate_limit_max),
        allowed_origins: Arc::new(parse_allowed_origins()),
        whatsapp_enabled,
        export_enabled,
    };

    spawn_lead_expiry(bot);

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(webhook_verify).post(webhook_receive))
        .route("/admin/leads", get(admin_leads))
        .route("/admin/leads/export/csv", get(admin_leads_csv))
        .route(
            "/admin/leads/:phone",
            get(admin_lead_detail).delete(admin_lead_delete),
        )
        .route("/admin/leads/:phone/confirm", post(admin_lead_confirm))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

fn spawn_lead_expiry(bot: BotHandle) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(EXPIRY_SWEEP_SECONDS));
        loop {
            ticker.tick().await;
            match bot.purge_expired_leads().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "dropped conversations idle past the ttl"),
                Err(err) => warn!(error = %err, "lead expiry sweep failed"),
            }
        }
    });
}

fn trimmed_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_allowed_origins() -> Vec<String> {
    let default_origins = [
        "http://localhost:5500",
        "http://127.0.0.1:5500",
        "https://vista360.cl",
        "https://www.vista360.cl",
    ];

    env::var("VISTA_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| {
            default_origins
                .iter()
                .map(|value| value.to_string())
                .collect()
        })
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5500")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

// Meta has to reach /webhook without credentials, and /health feeds probes.
fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health" | "/webhook")
}

async fn admin_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if request.method() == Method::OPTIONS || is_public_endpoint(path.as_str()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if constant_time_eq(header_key.as_bytes(), state.admin_key.as_bytes()) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": "missing or invalid x-api-key"
        })),
    )
        .into_response()
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    if is_public_endpoint(path.as_str()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        service: "vista-api",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        business: state.business.clone(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            whatsapp_send: state.whatsapp_enabled,
            signature_check: state.app_secret.is_some(),
            lead_export: state.export_enabled,
        },
    };
    (StatusCode::OK, Json(payload))
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

// Meta calls this once when the webhook URL is registered and expects the
// challenge echoed back verbatim.
async fn webhook_verify(
    State(state): State<ApiState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let mode_ok = params.mode.as_deref() == Some("subscribe");
    let token_ok = params
        .verify_token
        .as_deref()
        .map(|token| constant_time_eq(token.as_bytes(), state.verify_token.as_bytes()))
        .unwrap_or(false);

    if mode_ok && token_ok {
        info!("webhook subscription handshake accepted");
        (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
    } else {
        warn!("webhook subscription handshake rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

async fn webhook_receive(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(secret) = state.app_secret.as_ref() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !verify_webhook_signature(signature, body.as_bytes(), secret.as_str()) {
            warn!("webhook delivery failed signature check");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    // Meta retries every non-2xx delivery. A body that does not decode will
    // not decode on the retry either, so it is acknowledged and dropped.
    let envelope: WebhookEnvelope = match serde_json::from_str(body.as_str()) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "undecodable webhook body acknowledged");
            return (StatusCode::OK, "OK").into_response();
        }
    };

    state.bot.handle_webhook(&envelope).await;
    (StatusCode::OK, "OK").into_response()
}

async fn admin_leads(State(state): State<ApiState>) -> Response {
    let leads = match state.store.list().await {
        Ok(leads) => leads,
        Err(err) => return storage_error(err),
    };
    let stats = lead_stats(&leads);
    (
        StatusCode::OK,
        Json(serde_json::json!({ "stats": stats, "leads": leads })),
    )
        .into_response()
}

async fn admin_lead_detail(State(state): State<ApiState>, Path(phone): Path<String>) -> Response {
    match state.store.load(phone.as_str()).await {
        Ok(Some(lead)) => {
            let summary = format_lead_summary(&lead);
            (
                StatusCode::OK,
                Json(serde_json::json!({ "lead": lead, "summary": summary })),
            )
                .into_response()
        }
        Ok(None) => lead_not_found(phone.as_str()),
        Err(err) => storage_error(err),
    }
}

async fn admin_lead_delete(State(state): State<ApiState>, Path(phone): Path<String>) -> Response {
    match state.store.remove(phone.as_str()).await {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({ "deleted": true, "phone": phone })),
        )
            .into_response(),
        Ok(false) => lead_not_found(phone.as_str()),
        Err(err) => storage_error(err),
    }
}

async fn admin_lead_confirm(State(state): State<ApiState>, Path(phone): Path<String>) -> Response {
    match state.bot.confirm_lead(phone.as_str()).await {
        Ok(Some(lead)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "confirmed": true, "lead": lead })),
        )
            .into_response(),
        Ok(None) => lead_not_found(phone.as_str()),
        Err(err) => storage_error(err),
    }
}

async fn admin_leads_csv(State(state): State<ApiState>) -> Response {
    let leads = match state.store.list().await {
        Ok(leads) => leads,
        Err(err) => return storage_error(err),
    };
    let csv = leads_to_csv(&leads);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"vista360-leads.csv\"",
            ),
        ],
        csv,
    )
        .into_response()
}

fn lead_not_found(phone: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "lead_not_found",
            "message": format!("no active conversation for {phone}")
        })),
    )
        .into_response()
}

fn storage_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "storage_unavailable",
            "message": err.to_string()
        })),
    )
        .into_response()
}

fn verify_webhook_signature(signature: &str, payload: &[u8], secret: &str) -> bool {
    let Some(expected) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(value) => value,
        Err(_) => return false,
    };
    mac.update(payload);
    let computed = hex_encode(mac.finalize().into_bytes().as_slice());
    constant_time_eq(computed.as_bytes(), expected.as_bytes())
}

#[cfg(test)]
fn build_test_signature(
    payload: &[u8],
    secret: &str,
) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(format!(
        "sha256={}",
        hex_encode(mac.finalize().into_bytes().as_slice())
    ))
}

fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut diff = 0_u8;
    for (a, b) in lhs.iter().zip(rhs.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(format!("{:02x}", byte).as_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        build_test_signature, constant_time_eq, hex_encode, is_public_endpoint,
        verify_webhook_signature,
    };

    #[test]
    fn signature_check_accepts_the_signed_payload() {
        let payload = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let signature = build_test_signature(payload, "app-secret").unwrap();
        assert!(verify_webhook_signature(&signature, payload, "app-secret"));
    }

    #[test]
    fn signature_check_rejects_tampered_payloads() {
        let payload = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let signature = build_test_signature(payload, "app-secret").unwrap();
        assert!(!verify_webhook_signature(&signature, b"{}", "app-secret"));
        assert!(!verify_webhook_signature(&signature, payload, "other-secret"));
        assert!(!verify_webhook_signature("sha256=zz", payload, "app-secret"));
        assert!(!verify_webhook_signature("", payload, "app-secret"));
    }

    #[test]
    fn hex_encoding_is_lowercase_and_padded() {
        assert_eq!(hex_encode(&[0x00, 0x0f, 0xab]), "000fab");
    }

    #[test]
    fn constant_time_compare_requires_equal_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn webhook_and_health_stay_public() {
        assert!(is_public_endpoint("/health"));
        assert!(is_public_endpoint("/webhook"));
        assert!(!is_public_endpoint("/admin/leads"));
    }
}
