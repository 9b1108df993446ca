pub mod chat;
pub mod context;
pub mod conversations;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod relay;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tutor_db::Database;
use tutor_llm::CompletionClient;

use crate::rate_limit::RateLimiter;
use crate::relay::ChatRelay;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub limiter: RateLimiter,
    pub relay: ChatRelay,
    /// Cancelled on server shutdown; every turn runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        llm: Arc<dyn CompletionClient>,
        daily_limit: u32,
        shutdown: CancellationToken,
    ) -> AppState {
        let limiter = RateLimiter::new(db.clone(), daily_limit);
        let relay = ChatRelay::new(db.clone(), llm, limiter.clone());
        Arc::new(Self { db, limiter, relay, shutdown })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::send_message))
        .route("/chat/stream", post(chat::stream_message))
        .route("/rate-limit", get(rate_limit::missing_user_id))
        .route("/rate-limit/", get(rate_limit::missing_user_id))
        .route("/rate-limit/{user_id}", get(rate_limit::get_rate_limit))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/{conversation_id}/messages", get(conversations::get_messages))
        .route("/health", get(health))
        .layer(axum_middleware::from_fn(middleware::answer_preflight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run a blocking query off the async runtime.
pub(crate) async fn run_db<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::testing::{StubClient, set_usage, test_db, test_state};

    fn app_with(db: Arc<Database>) -> Router {
        router(test_state(db, StubClient::new("ok", 1)))
    }

    async fn read_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rate_limit_endpoint_reports_quota() {
        let db = test_db();
        set_usage(&db, "student-1", 12);
        let app = app_with(db);

        let response = app
            .oneshot(Request::builder().uri("/rate-limit/student-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&read_text(response).await).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"rateLimit": {"allowed": true, "limit": 50, "current": 12, "remaining": 38}})
        );
    }

    #[tokio::test]
    async fn rate_limit_without_user_is_bad_request() {
        let app = app_with(test_db());
        for uri in ["/rate-limit", "/rate-limit/", "/rate-limit/%20"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn bare_options_answers_ok() {
        let response = app_with(test_db())
            .oneshot(Request::builder().method(Method::OPTIONS).uri("/chat").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_text(response).await, "ok");
    }

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/chat")
            .header(header::ORIGIN, "http://localhost:8081")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,authorization")
            .body(Body::empty())
            .unwrap();

        let response = app_with(test_db()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app_with(test_db())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_text(response).await, "ok");
    }
}
