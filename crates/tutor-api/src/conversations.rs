//! Read-only thread history for the client's conversation list and reload.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use tutor_db::models::{ConversationRow, MessageRow};
use tutor_types::api::{ConversationList, MessageList};
use tutor_types::models::{ChatMessage, Conversation, Role};

use crate::error::ApiError;
use crate::{AppState, run_db};

const MAX_LIST_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

fn parse_query(query: Result<Query<HistoryQuery>, QueryRejection>) -> Result<HistoryQuery, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| ApiError::Validation(format!("Invalid query string: {}", e.body_text())))
}

fn require_user(query: &HistoryQuery) -> Result<String, ApiError> {
    query
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(ApiError::missing_user_id)
}

/// GET /conversations?userId=…
pub async fn list_conversations(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<ConversationList>, ApiError> {
    let query = parse_query(query)?;
    let user_id = require_user(&query)?;
    let limit = query.limit.clamp(1, MAX_LIST_LIMIT);

    let rows = run_db(&state.db, move |db| db.list_conversations(&user_id, limit))
        .await
        .map_err(|e| ApiError::internal("Failed to load conversations", e))?;

    Ok(Json(ConversationList {
        conversations: rows.into_iter().map(conversation_from_row).collect(),
    }))
}

/// GET /conversations/{id}/messages?userId=…
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<MessageList>, ApiError> {
    let query = parse_query(query)?;
    let user_id = require_user(&query)?;

    let (rows, owner) = run_db(&state.db, move |db| {
        let owner = db.get_conversation(&conversation_id)?.map(|c| c.user_id);
        let rows = match owner {
            Some(_) => db.get_messages(&conversation_id)?,
            None => Vec::new(),
        };
        Ok((rows, owner))
    })
    .await
    .map_err(|e| ApiError::internal("Failed to load messages", e))?;

    if owner.as_deref() != Some(user_id.as_str()) {
        return Err(ApiError::ConversationNotFound);
    }

    Ok(Json(MessageList {
        messages: rows.into_iter().filter_map(message_from_row).collect(),
    }))
}

fn parse_timestamp(value: &str, row_id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite defaults store "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on row '{}': {}", value, row_id, e);
            DateTime::default()
        })
}

pub(crate) fn conversation_from_row(row: ConversationRow) -> Conversation {
    let context = serde_json::from_str(&row.context).unwrap_or_else(|e| {
        warn!("Corrupt context on conversation '{}': {}", row.id, e);
        serde_json::Value::Object(Default::default())
    });

    Conversation {
        created_at: parse_timestamp(&row.created_at, &row.id),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        context,
    }
}

pub(crate) fn message_from_row(row: MessageRow) -> Option<ChatMessage> {
    let Some(role) = Role::parse(&row.role) else {
        warn!("Skipping message '{}' with unknown role '{}'", row.id, row.role);
        return None;
    };

    Some(ChatMessage {
        created_at: parse_timestamp(&row.created_at, &row.id),
        id: row.id,
        conversation_id: row.conversation_id,
        role,
        content: row.content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use tutor_types::api::ChatRequest;

    use crate::router;
    use crate::testing::{StubClient, test_db, test_state};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn seeded_state() -> (AppState, String) {
        let state = test_state(test_db(), StubClient::new("Answer", 2));
        let req = ChatRequest {
            user_id: "student-1".into(),
            content: "First question".into(),
            ..Default::default()
        };
        let response = state.relay.send_turn(req, CancellationToken::new()).await.unwrap();
        (state, response.conversation_id)
    }

    #[tokio::test]
    async fn lists_own_conversations() {
        let (state, conversation_id) = seeded_state().await;
        let app = router(state);

        let response = app.clone().oneshot(get("/conversations?userId=student-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["conversations"][0]["id"], conversation_id.as_str());
        assert_eq!(body["conversations"][0]["title"], "First question");

        let response = app.oneshot(get("/conversations?userId=student-2")).await.unwrap();
        let body = read_json(response).await;
        assert_eq!(body["conversations"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn list_requires_user() {
        let (state, _) = seeded_state().await;
        let response = router(state).oneshot(get("/conversations")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_query_is_json_bad_request() {
        let (state, conversation_id) = seeded_state().await;
        let app = router(state);

        let response = app.clone().oneshot(get("/conversations?userId=student-1&limit=-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"));

        let uri = format!("/conversations/{conversation_id}/messages?userId=student-1&limit=x");
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn messages_in_order_for_owner_only() {
        let (state, conversation_id) = seeded_state().await;
        let app = router(state);

        let uri = format!("/conversations/{conversation_id}/messages?userId=student-1");
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant"]);

        let uri = format!("/conversations/{conversation_id}/messages?userId=student-2");
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/conversations/nope/messages?userId=student-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn corrupt_rows_degrade_gracefully() {
        let conversation = conversation_from_row(ConversationRow {
            id: "c1".into(),
            user_id: "u1".into(),
            title: "T".into(),
            context: "not json".into(),
            created_at: "2026-10-17 09:30:00".into(),
            updated_at: "garbage".into(),
        });
        assert_eq!(conversation.context, serde_json::json!({}));
        assert_eq!(conversation.created_at.to_rfc3339(), "2026-10-17T09:30:00+00:00");
        assert_eq!(conversation.updated_at, DateTime::<Utc>::default());

        let message = message_from_row(MessageRow {
            id: "m1".into(),
            conversation_id: "c1".into(),
            role: "system".into(),
            content: "x".into(),
            created_at: "2026-10-17T09:30:00.000Z".into(),
        });
        assert!(message.is_none());
    }
}
