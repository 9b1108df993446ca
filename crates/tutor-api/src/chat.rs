use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::sse::{Event, Sse},
};
use futures_util::Stream;

use tutor_types::api::{ChatRequest, ChatResponse, StreamChunk};

use crate::AppState;
use crate::error::ApiError;

fn parse_request(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<ChatRequest, ApiError> {
    payload
        .map(|Json(req)| req)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e.body_text())))
}

/// POST /chat — run one turn and return both messages.
pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let req = parse_request(payload)?;
    let response = state.relay.send_turn(req, state.shutdown.child_token()).await?;
    Ok(Json(response))
}

/// POST /chat/stream — same turn, delivered as one terminal SSE chunk.
///
/// Errors surface before the stream opens, as the usual JSON responses.
pub async fn stream_message(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let req = parse_request(payload)?;
    let response = state.relay.send_turn(req, state.shutdown.child_token()).await?;

    let chunk = StreamChunk {
        content: response.ai_message.content,
        done: true,
        conversation_id: response.conversation_id,
        rate_limit: response.rate_limit,
    };

    let stream = async_stream::stream! {
        yield Event::default().event("chunk").json_data(&chunk);
    };

    Ok(Sse::new(stream))
}
