use crate::models::{AnalyticsRow, ConversationRow, LessonTrail, MessageRow, UsageRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

impl Database {
    // -- Conversations --

    pub fn create_conversation(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
        context: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, context, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id, user_id, title, context, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Newest threads first.
    pub fn list_conversations(&self, user_id: &str, limit: u32) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, context, created_at, updated_at
                 FROM conversations
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        role: &str,
        content: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, conversation_id, role, content, created_at],
            )?;
            Ok(())
        })
    }

    /// Messages of one conversation in the order they were written.
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Usage --

    /// `None` when the user has not sent anything on `date` yet.
    pub fn get_usage(&self, user_id: &str, date: &str) -> Result<Option<UsageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT message_count, token_count FROM daily_usage
                 WHERE user_id = ?1 AND usage_date = ?2",
                [user_id, date],
                |row| {
                    Ok(UsageRow {
                        message_count: row.get(0)?,
                        token_count: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Count one message and `tokens` against (user, date) in a single statement.
    pub fn increment_usage(&self, user_id: &str, date: &str, tokens: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_usage (user_id, usage_date, message_count, token_count)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (user_id, usage_date) DO UPDATE SET
                     message_count = message_count + 1,
                     token_count   = token_count + excluded.token_count,
                     updated_at    = datetime('now')",
                rusqlite::params![user_id, date, tokens],
            )?;
            Ok(())
        })
    }

    // -- Enrichment sources --

    /// Walk lesson -> topic -> module. `None` only when the lesson itself is unknown.
    pub fn get_lesson_trail(&self, lesson_id: &str) -> Result<Option<LessonTrail>> {
        self.with_conn(|conn| {
            let lesson: Option<(String, Option<String>)> = conn
                .query_row(
                    "SELECT title, topic_id FROM lessons WHERE id = ?1",
                    [lesson_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((lesson_title, topic_id)) = lesson else {
                return Ok(None);
            };

            // Parent levels are best-effort: a failed lookup drops only that level
            let topic: Option<(String, Option<String>)> = topic_id.and_then(|topic_id| {
                conn.query_row(
                    "SELECT title, module_id FROM topics WHERE id = ?1",
                    [&topic_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .unwrap_or_else(|e| {
                    warn!("Topic lookup failed for lesson {}: {}", lesson_id, e);
                    None
                })
            });

            let module_title: Option<String> = topic
                .as_ref()
                .and_then(|(_, module_id)| module_id.as_ref())
                .and_then(|module_id| {
                    conn.query_row("SELECT title FROM modules WHERE id = ?1", [module_id], |row| {
                        row.get(0)
                    })
                    .optional()
                    .unwrap_or_else(|e| {
                        warn!("Module lookup failed for lesson {}: {}", lesson_id, e);
                        None
                    })
                });

            Ok(Some(LessonTrail {
                lesson_title,
                topic_title: topic.map(|(title, _)| title),
                module_title,
            }))
        })
    }

    pub fn recent_exam_scores(&self, user_id: &str, limit: u32) -> Result<Vec<f64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT score FROM exam_results
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let scores = stmt
                .query_map(rusqlite::params![user_id, limit], |row| row.get::<_, f64>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(scores)
        })
    }

    pub fn latest_analytics(&self, user_id: &str) -> Result<Option<AnalyticsRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT lessons_completed, average_score, current_streak
                 FROM learning_analytics
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
                [user_id],
                |row| {
                    Ok(AnalyticsRow {
                        lessons_completed: row.get(0)?,
                        average_score: row.get(1)?,
                        current_streak: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn recent_recommendations(&self, user_id: &str, limit: u32) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT reason FROM ai_recommendations
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let reasons = stmt
                .query_map(rusqlite::params![user_id, limit], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(reasons)
        })
    }
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, context, created_at, updated_at FROM conversations WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], map_conversation).optional()?;

    Ok(row)
}

fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        context: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
