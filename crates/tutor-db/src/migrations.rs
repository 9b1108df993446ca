use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (chat and usage)");
        conn.execute_batch(
            "
            CREATE TABLE conversations (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                context     TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_conversations_user
                ON conversations(user_id, created_at);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role            TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            -- One row per user per calendar day; the date in the key is the rollover
            CREATE TABLE daily_usage (
                user_id         TEXT NOT NULL,
                usage_date      TEXT NOT NULL,
                message_count   INTEGER NOT NULL DEFAULT 0,
                token_count     INTEGER NOT NULL DEFAULT 0,
                updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, usage_date)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (curriculum and progress)");
        conn.execute_batch(
            "
            CREATE TABLE modules (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL
            );

            CREATE TABLE topics (
                id          TEXT PRIMARY KEY,
                module_id   TEXT,
                title       TEXT NOT NULL
            );

            CREATE TABLE lessons (
                id          TEXT PRIMARY KEY,
                topic_id    TEXT,
                title       TEXT NOT NULL
            );

            CREATE TABLE exam_results (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                score       REAL NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_exam_results_user
                ON exam_results(user_id, created_at);

            CREATE TABLE learning_analytics (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                lessons_completed   INTEGER,
                average_score       REAL,
                current_streak      INTEGER,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_learning_analytics_user
                ON learning_analytics(user_id, created_at);

            CREATE TABLE ai_recommendations (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                reason      TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_ai_recommendations_user
                ON ai_recommendations(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
