//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (one exercise session per connection)
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/chat", post(http::http_post_chat))
        .route("/api/v1/exercise", post(http::http_post_exercise))
        .route("/api/v1/session", post(http::http_post_session))
        .route(
            "/api/v1/session/:id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/session/:id/intent", post(http::http_post_intent))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(Arc::new(AppState::from_parts(None, None)))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    fn key_for(view: &Value, word: &str) -> String {
        view["available"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["word"] == word)
            .unwrap()["key"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = call(&app(), Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn exercise_session_round_trip() {
        let app = app();
        let payload = json!({
            "exercise": {
                "title": "Nomen",
                "instructions": "Fill each gap.",
                "items": [
                    { "id": "s1", "sentence": "Der ___ ist groß.", "answer": "Hund" },
                    { "id": "s2", "sentence": "Die ___ ist klein.", "answer": "Katze" },
                    { "id": "s3", "sentence": "___ Haus ist alt.", "answer": "Das" }
                ]
            }
        });
        let (status, body) = call(&app, Method::POST, "/api/v1/session", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        let sid = body["sessionId"].as_str().unwrap().to_string();
        let view = &body["view"];
        assert_eq!(view["phase"], "loaded");
        assert_eq!(view["available"].as_array().unwrap().len(), 3);

        let hund = key_for(view, "Hund");
        let das = key_for(view, "Das");
        let intent_uri = format!("/api/v1/session/{sid}/intent");
        call(&app, Method::POST, &intent_uri, Some(json!({ "type": "place", "itemId": "s1", "bankKey": hund }))).await;
        call(&app, Method::POST, &intent_uri, Some(json!({ "type": "place", "itemId": "s3", "bankKey": das }))).await;
        let (status, view) = call(&app, Method::POST, &intent_uri, Some(json!({ "type": "toggle_result" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["showResult"], true);
        let grades: Vec<&Value> = view["items"].as_array().unwrap().iter().map(|i| &i["correct"]).collect();
        assert_eq!(grades, [&json!(true), &json!(false), &json!(true)]);

        // An unknown bank key is ignored, not an error.
        let (status, after) = call(
            &app,
            Method::POST,
            &intent_uri,
            Some(json!({ "type": "place", "itemId": "s2", "bankKey": "Maus#0" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after, view);

        let (_, view) = call(&app, Method::POST, &intent_uri, Some(json!({ "type": "reset" }))).await;
        assert_eq!(view["phase"], "loaded");
        assert_eq!(view["showResult"], false);

        let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/session/{sid}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &format!("/api/v1/session/{sid}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_payload_is_unprocessable() {
        let payload = json!({ "exercise": { "title": "x", "instructions": "y", "items": [] } });
        let (status, body) = call(&app(), Method::POST, "/api/v1/session", Some(payload)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_exercise");
    }

    #[tokio::test]
    async fn offline_exercise_can_open_a_session() {
        let app = app();
        let (status, ex) = call(&app, Method::POST, "/api/v1/exercise", Some(json!({ "topic": "Artikel" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ex["source"], "seed");

        let (status, body) =
            call(&app, Method::POST, "/api/v1/session", Some(json!({ "exerciseId": ex["id"] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["title"], ex["title"]);
        assert_eq!(body["exerciseId"], ex["id"]);
    }

    #[tokio::test]
    async fn chat_without_model_replies_with_stub() {
        let (status, body) = call(
            &app(),
            Method::POST,
            "/api/v1/chat",
            Some(json!({ "messages": [{ "role": "user", "content": "Hallo" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["text"].as_str().unwrap().contains("Hallo"));
        assert!(body.get("exercise").is_none());
    }
}
