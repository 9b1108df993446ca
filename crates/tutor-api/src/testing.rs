//! Fixtures and completion stubs shared by the unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tutor_db::Database;
use tutor_llm::{Completion, CompletionClient, LlmError};

use crate::rate_limit::{DEFAULT_DAILY_LIMIT, today};
use crate::{AppState, AppStateInner};

pub fn test_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().unwrap())
}

pub fn test_state(db: Arc<Database>, llm: Arc<dyn CompletionClient>) -> AppState {
    AppStateInner::new(db, llm, DEFAULT_DAILY_LIMIT, CancellationToken::new())
}

/// Set today's message count for `user_id` directly.
pub fn set_usage(db: &Database, user_id: &str, count: i64) {
    let date = today();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO daily_usage (user_id, usage_date, message_count, token_count)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT (user_id, usage_date) DO UPDATE SET message_count = excluded.message_count",
            (user_id, date.as_str(), count),
        )?;
        Ok(())
    })
    .unwrap();
}

pub fn usage_of(db: &Database, user_id: &str) -> Option<(i64, i64)> {
    db.get_usage(user_id, &today())
        .unwrap()
        .map(|u| (u.message_count, u.token_count))
}

pub fn seed_curriculum(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "
            INSERT INTO modules (id, title) VALUES ('module-1', 'Adult Nursing');
            INSERT INTO topics (id, module_id, title) VALUES ('topic-1', 'module-1', 'Medicines Management');
            INSERT INTO lessons (id, topic_id, title) VALUES ('lesson-1', 'topic-1', 'Drug Calculations');
            ",
        )?;
        Ok(())
    })
    .unwrap();
}

pub fn seed_progress(db: &Database, user_id: &str) {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO exam_results (id, user_id, score, created_at) VALUES ('exam-1', ?1, 70.0, '2026-10-01 09:00:00')",
            [user_id],
        )?;
        conn.execute(
            "INSERT INTO exam_results (id, user_id, score, created_at) VALUES ('exam-2', ?1, 80.0, '2026-10-02 09:00:00')",
            [user_id],
        )?;
        conn.execute(
            "INSERT INTO learning_analytics (id, user_id, lessons_completed, average_score, current_streak, created_at)
             VALUES ('snap-1', ?1, 12, 78.6, 4, '2026-10-02 10:00:00')",
            [user_id],
        )?;
        conn.execute(
            "INSERT INTO ai_recommendations (id, user_id, reason, created_at)
             VALUES ('rec-1', ?1, 'Practise drug calculations', '2026-10-01 09:00:00')",
            [user_id],
        )?;
        conn.execute(
            "INSERT INTO ai_recommendations (id, user_id, reason, created_at)
             VALUES ('rec-2', ?1, 'Revise fluid balance', '2026-10-02 09:00:00')",
            [user_id],
        )?;
        Ok(())
    })
    .unwrap();
}

/// Replies with fixed text and records every prompt it receives.
pub struct StubClient {
    pub reply: String,
    pub tokens: u32,
    pub prompts: Mutex<Vec<String>>,
}

impl StubClient {
    pub fn new(reply: &str, tokens: u32) -> Arc<Self> {
        Arc::new(Self { reply: reply.into(), tokens, prompts: Mutex::new(Vec::new()) })
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionClient for StubClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(Completion { text: self.reply.clone(), total_tokens: self.tokens })
    }
}

/// Always answers with an upstream error status.
pub struct FailingClient;

#[async_trait]
impl CompletionClient for FailingClient {
    async fn complete(&self, _prompt: &str) -> Result<Completion, LlmError> {
        Err(LlmError::Status { status: 503, body: "model overloaded".into() })
    }
}

/// Never answers.
pub struct HangingClient;

#[async_trait]
impl CompletionClient for HangingClient {
    async fn complete(&self, _prompt: &str) -> Result<Completion, LlmError> {
        std::future::pending().await
    }
}

/// Runs a hook against the database before replying, to break things mid-turn.
pub struct HookClient {
    pub db: Arc<Database>,
    pub hook: fn(&Database),
}

#[async_trait]
impl CompletionClient for HookClient {
    async fn complete(&self, _prompt: &str) -> Result<Completion, LlmError> {
        (self.hook)(&self.db);
        Ok(Completion { text: "Answer".into(), total_tokens: 5 })
    }
}
