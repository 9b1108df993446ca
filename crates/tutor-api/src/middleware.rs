use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Answer bare `OPTIONS` with 200 "ok". CORS pre-flights are handled by the
/// CORS layer before they reach this point.
pub async fn answer_preflight(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return (StatusCode::OK, "ok").into_response();
    }
    next.run(req).await
}
