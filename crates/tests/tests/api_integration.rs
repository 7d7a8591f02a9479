use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;
use vista_api::build_app;

const ADMIN_KEY: &str = "dev-vista-key";

fn text_delivery(phone: &str, message_id: &str, body: &str) -> String {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "entry-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "+56955550360",
                        "phone_number_id": "1042"
                    },
                    "messages": [{
                        "from": phone,
                        "id": message_id,
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    })
    .to_string()
}

async fn post_webhook(app: &Router, payload: String) -> StatusCode {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

async fn admin_get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, parsed)
}

#[tokio::test]
async fn health_is_public_and_reports_capabilities() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["service"], "vista-api");
    assert!(parsed["capabilities"]["whatsapp_send"].is_boolean());
    assert!(parsed["metrics"]["messages_total"].is_number());
}

#[tokio::test]
async fn handshake_echoes_the_challenge_for_the_right_token() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(
            Request::builder()
                .uri(
                    "/webhook?hub.mode=subscribe&hub.verify_token=dev-verify-token\
                     &hub.challenge=1158201444",
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"1158201444");
}

#[tokio::test]
async fn handshake_rejects_a_bad_token() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn text_delivery_is_acked_and_creates_a_lead() {
    let app = build_app().await.expect("app should build");

    let status = post_webhook(
        &app,
        text_delivery("+56977770001", "wamid.t1", "hola, quiero un tour virtual"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, parsed) = admin_get(&app, "/admin/leads").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed["stats"]["total"], 1);
    assert_eq!(parsed["leads"][0]["phone"], "+56977770001");
}

#[tokio::test]
async fn malformed_bodies_are_acked_without_side_effects() {
    let app = build_app().await.expect("app should build");

    let status = post_webhook(&app, "this is not json".to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let (_, parsed) = admin_get(&app, "/admin/leads").await;
    assert_eq!(parsed["stats"]["total"], 0);
}

#[tokio::test]
async fn admin_surface_requires_the_api_key() {
    let app = build_app().await.expect("app should build");

    let bare = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/leads")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bare.status(), StatusCode::UNAUTHORIZED);

    let wrong_key = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/leads")
                .header("x-api-key", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong_key.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = admin_get(&app, "/admin/leads").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn csv_export_is_served_as_an_attachment() {
    let app = build_app().await.expect("app should build");
    post_webhook(&app, text_delivery("+56977770002", "wamid.t2", "hola")).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/leads/export/csv")
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    assert!(csv.contains("+56977770002"));
}

#[tokio::test]
async fn confirm_then_delete_round_trip() {
    let app = build_app().await.expect("app should build");
    post_webhook(&app, text_delivery("+56977770003", "wamid.t3", "hola")).await;

    let confirm = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/leads/+56977770003/confirm")
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(confirm.status(), StatusCode::OK);
    let body = to_bytes(confirm.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["confirmed"], true);
    assert_eq!(parsed["lead"]["confirmed"], true);

    let delete = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/leads/+56977770003")
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::OK);

    let (status, _) = admin_get(&app, "/admin/leads/+56977770003").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_leads_are_a_404() {
    let app = build_app().await.expect("app should build");

    let (status, parsed) = admin_get(&app, "/admin/leads/+56900000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parsed["error"], "lead_not_found");
}
