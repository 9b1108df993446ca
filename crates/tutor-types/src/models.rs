use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A titled thread of messages owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived daily quota snapshot. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    pub current: u32,
    pub remaining: u32,
}

impl RateLimitStatus {
    pub fn new(limit: u32, current: u32) -> Self {
        Self {
            allowed: current < limit,
            limit,
            current,
            remaining: limit.saturating_sub(current),
        }
    }

    /// Status after one more message has been counted.
    pub fn advanced(&self) -> Self {
        Self::new(self.limit, self.current.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_user_has_full_quota() {
        let status = RateLimitStatus::new(50, 0);
        assert!(status.allowed);
        assert_eq!(status.remaining, 50);
    }

    #[test]
    fn quota_exhausted_at_limit() {
        let status = RateLimitStatus::new(50, 50);
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);

        // Counter overrun from a boundary race never underflows
        let over = RateLimitStatus::new(50, 52);
        assert!(!over.allowed);
        assert_eq!(over.remaining, 0);
    }

    #[test]
    fn advanced_crosses_boundary() {
        let status = RateLimitStatus::new(50, 49).advanced();
        assert_eq!(status, RateLimitStatus { allowed: false, limit: 50, current: 50, remaining: 0 });
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("system"), None);
    }
}
