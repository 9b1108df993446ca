/// Database row types — these map directly to SQLite rows.
/// Distinct from tutor-types API models to keep the DB layer independent.

pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub context: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub struct UsageRow {
    pub message_count: i64,
    pub token_count: i64,
}

/// Lesson with its parent topic and module titles, each resolved independently.
pub struct LessonTrail {
    pub lesson_title: String,
    pub topic_title: Option<String>,
    pub module_title: Option<String>,
}

pub struct AnalyticsRow {
    pub lessons_completed: Option<i64>,
    pub average_score: Option<f64>,
    pub current_streak: Option<i64>,
}
