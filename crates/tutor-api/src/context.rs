//! Prompt assembly for a chat turn.
//!
//! The system block is a fixed tutor persona followed by whichever enrichment
//! sections could be resolved for the student. Every enrichment read is its own
//! error boundary: a failed or empty lookup drops that section and nothing else.

use std::sync::Arc;

use tracing::warn;

use tutor_db::Database;
use tutor_db::models::{AnalyticsRow, LessonTrail};
use tutor_types::api::TurnContext;

use crate::run_db;

pub const EXAM_HISTORY_LIMIT: u32 = 5;
pub const RECOMMENDATION_LIMIT: u32 = 3;

const PERSONA: &str = "You are an expert nursing tutor helping a student prepare for the NMC \
registration exam. You have deep knowledge of the NMC Code, clinical skills, pharmacology, \
anatomy and physiology, and evidence-based nursing practice.

Guidelines:
- Explain concepts clearly and accurately, using UK nursing terminology
- Relate answers to the NMC Code and patient safety where relevant
- Use short clinical examples to illustrate key points
- Encourage the student and point out what to revise next
- If a question is outside nursing practice, gently steer back to exam preparation
- Never give personal medical advice; refer real clinical concerns to a qualified professional";

/// Full prompt sent to the completion endpoint.
pub fn assemble_prompt(system_prompt: &str, content: &str) -> String {
    format!("{system_prompt}\n\nUser: {content}\n\nAssistant:")
}

#[derive(Clone)]
pub struct ContextAssembler {
    db: Arc<Database>,
}

impl ContextAssembler {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persona plus enrichment. Never fails.
    pub async fn system_prompt(&self, user_id: &str, context: Option<&TurnContext>) -> String {
        let lesson_id = context.and_then(|c| c.lesson_id.clone()).filter(|id| !id.is_empty());

        let (lesson, performance, recommendations) = tokio::join!(
            self.lesson_section(lesson_id),
            self.performance_section(user_id),
            self.recommendation_section(user_id),
        );

        let mut prompt = PERSONA.to_string();
        for section in [lesson, performance, recommendations].into_iter().flatten() {
            prompt.push_str("\n\n");
            prompt.push_str(&section);
        }
        prompt
    }

    async fn lesson_section(&self, lesson_id: Option<String>) -> Option<String> {
        let lesson_id = lesson_id?;
        let lookup_id = lesson_id.clone();
        match run_db(&self.db, move |db| db.get_lesson_trail(&lookup_id)).await {
            Ok(trail) => trail.map(|t| format_lesson(&t)),
            Err(e) => {
                warn!("Lesson context lookup failed for {}: {}", lesson_id, e);
                None
            }
        }
    }

    async fn performance_section(&self, user_id: &str) -> Option<String> {
        let uid = user_id.to_string();
        let scores = match run_db(&self.db, move |db| db.recent_exam_scores(&uid, EXAM_HISTORY_LIMIT)).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!("Exam history lookup failed for {}: {}", user_id, e);
                Vec::new()
            }
        };

        let uid = user_id.to_string();
        let analytics = match run_db(&self.db, move |db| db.latest_analytics(&uid)).await {
            Ok(analytics) => analytics,
            Err(e) => {
                warn!("Analytics lookup failed for {}: {}", user_id, e);
                None
            }
        };

        format_performance(&scores, analytics.as_ref())
    }

    async fn recommendation_section(&self, user_id: &str) -> Option<String> {
        let uid = user_id.to_string();
        match run_db(&self.db, move |db| db.recent_recommendations(&uid, RECOMMENDATION_LIMIT)).await {
            Ok(reasons) => format_recommendations(&reasons),
            Err(e) => {
                warn!("Recommendation lookup failed for {}: {}", user_id, e);
                None
            }
        }
    }
}

fn format_lesson(trail: &LessonTrail) -> String {
    let mut lines = vec![format!("- Current Lesson: {}", trail.lesson_title)];
    if let Some(topic) = &trail.topic_title {
        lines.push(format!("- Topic: {}", topic));
    }
    if let Some(module) = &trail.module_title {
        lines.push(format!("- Module: {}", module));
    }
    format!("Current Lesson Context:\n{}", lines.join("\n"))
}

fn format_performance(scores: &[f64], analytics: Option<&AnalyticsRow>) -> Option<String> {
    let mut lines = Vec::new();

    if !scores.is_empty() {
        let average = scores.iter().sum::<f64>() / scores.len() as f64;
        lines.push(format!("- Recent exam average: {}%", average.round() as i64));
    }

    if let Some(a) = analytics {
        if let Some(completed) = a.lessons_completed {
            lines.push(format!("- Lessons completed: {}", completed));
        }
        if let Some(average) = a.average_score {
            lines.push(format!("- Overall average: {}%", average.round() as i64));
        }
        if let Some(streak) = a.current_streak {
            lines.push(format!("- Current study streak: {} days", streak));
        }
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!("Student Performance:\n{}", lines.join("\n")))
}

fn format_recommendations(reasons: &[String]) -> Option<String> {
    if reasons.is_empty() {
        return None;
    }
    let items: Vec<String> = reasons
        .iter()
        .enumerate()
        .map(|(i, reason)| format!("{}. {}", i + 1, reason))
        .collect();
    Some(format!("Recommended Focus Areas:\n{}", items.join("\n")))
}
