//! One chat turn: validate, gate on quota, persist the question, ask the model,
//! persist the answer, count usage.
//!
//! The user message is written before the model is called, so a failed or
//! cancelled model call leaves the question saved with no answer and no usage
//! charged. Usage accounting itself never fails a turn.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use tutor_db::Database;
use tutor_llm::{Completion, CompletionClient};
use tutor_types::api::{ChatRequest, ChatResponse, TurnContext};
use tutor_types::models::{ChatMessage, Role};

use crate::context::{ContextAssembler, assemble_prompt};
use crate::error::ApiError;
use crate::rate_limit::{RateLimiter, today};
use crate::run_db;

pub const TITLE_MAX_CHARS: usize = 50;
pub const TITLE_ELLIPSIS: &str = "...";

/// First 50 characters of the opening message, with "..." when cut.
pub fn conversation_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}{TITLE_ELLIPSIS}")
    } else {
        head
    }
}

/// Millisecond precision, matching what is stored.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Clone)]
pub struct ChatRelay {
    db: Arc<Database>,
    llm: Arc<dyn CompletionClient>,
    limiter: RateLimiter,
    context: ContextAssembler,
}

impl ChatRelay {
    pub fn new(db: Arc<Database>, llm: Arc<dyn CompletionClient>, limiter: RateLimiter) -> Self {
        let context = ContextAssembler::new(db.clone());
        Self { db, llm, limiter, context }
    }

    pub async fn send_turn(
        &self,
        req: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, ApiError> {
        if req.user_id.trim().is_empty() || req.content.trim().is_empty() {
            return Err(ApiError::missing_fields());
        }

        let status = self.limiter.status(&req.user_id).await?;
        if !status.allowed {
            info!("Rate limit reached for {} ({}/{})", req.user_id, status.current, status.limit);
            return Err(ApiError::RateLimited(status));
        }

        let conversation_id = self
            .resolve_conversation(&req.user_id, req.conversation_id.as_deref(), &req.content, req.context.as_ref())
            .await?;

        let user_message = self
            .persist(&conversation_id, Role::User, &req.content)
            .await
            .map_err(|e| ApiError::internal("Failed to save message", e))?;

        let system_prompt = self.context.system_prompt(&req.user_id, req.context.as_ref()).await;
        let prompt = assemble_prompt(&system_prompt, &req.content);

        let completion = self.complete(&prompt, &cancel).await?;

        let ai_message = self
            .persist(&conversation_id, Role::Assistant, &completion.text)
            .await
            .map_err(|e| ApiError::internal("Failed to save AI response", e))?;

        let uid = req.user_id.clone();
        let date = today();
        let tokens = i64::from(completion.total_tokens);
        if let Err(e) = run_db(&self.db, move |db| db.increment_usage(&uid, &date, tokens)).await {
            warn!("Usage accounting failed for {}: {}", req.user_id, e);
        }

        let rate_limit = match self.limiter.status(&req.user_id).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("Post-turn quota read failed for {}: {}", req.user_id, e);
                status.advanced()
            }
        };

        info!(
            "Chat turn for {} in conversation {}: {} tokens, {} remaining",
            req.user_id, conversation_id, completion.total_tokens, rate_limit.remaining
        );

        Ok(ChatResponse {
            success: true,
            conversation_id,
            user_message,
            ai_message,
            rate_limit,
        })
    }

    /// Reuse a supplied thread owned by the user, or open a new one.
    async fn resolve_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        content: &str,
        context: Option<&TurnContext>,
    ) -> Result<String, ApiError> {
        if let Some(id) = conversation_id.filter(|id| !id.is_empty()) {
            let lookup = id.to_string();
            let existing = run_db(&self.db, move |db| db.get_conversation(&lookup))
                .await
                .map_err(|e| ApiError::internal("Failed to load conversation", e))?;

            return match existing {
                Some(row) if row.user_id == user_id => Ok(row.id),
                _ => Err(ApiError::ConversationNotFound),
            };
        }

        let id = Uuid::new_v4().to_string();
        let title = conversation_title(content);
        let context_json = serde_json::to_string(&context.cloned().unwrap_or_default())
            .map_err(|e| ApiError::internal("Failed to create conversation", e))?;
        let created_at = timestamp(&now());

        let (cid, uid) = (id.clone(), user_id.to_string());
        run_db(&self.db, move |db| db.create_conversation(&cid, &uid, &title, &context_json, &created_at))
            .await
            .map_err(|e| ApiError::internal("Failed to create conversation", e))?;

        info!("Conversation {} created for {}", id, user_id);
        Ok(id)
    }

    async fn persist(&self, conversation_id: &str, role: Role, content: &str) -> anyhow::Result<ChatMessage> {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now(),
        };

        let (id, cid, text) = (message.id.clone(), message.conversation_id.clone(), message.content.clone());
        let created_at = timestamp(&message.created_at);
        run_db(&self.db, move |db| db.insert_message(&id, &cid, role.as_str(), &text, &created_at)).await?;

        Ok(message)
    }

    async fn complete(&self, prompt: &str, cancel: &CancellationToken) -> Result<Completion, ApiError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Chat turn cancelled before the model replied");
                Err(ApiError::Cancelled)
            }
            result = self.llm.complete(prompt) => {
                result.map_err(|e| ApiError::internal("Failed to get AI response", e))
            }
        }
    }
}
