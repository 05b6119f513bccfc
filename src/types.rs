use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single notification delivered over the stream.
///
/// `id` is the deduplication key for consumers: the stream guarantees
/// at-least-once delivery while connected, so the same notification may be
/// observed twice across a reconnect boundary.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct Notification {
    /// Unique identifier for this notification
    pub id: String,
    /// Short human-readable title
    pub title: String,
    /// Full message body
    pub message: String,
    /// Optional grouping category (e.g. `course`, `system`)
    #[serde(default)]
    pub category: Option<String>,
    /// Optional action kind the UI should offer for this notification
    #[serde(default)]
    pub action_type: Option<String>,
    /// Action-specific data object
    #[serde(default)]
    pub action_data: Option<Value>,
    /// When the notification was created, as reported by the server
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_payload() {
        let json = r#"{"id":"abc","title":"Hi","message":"there","created_at":"2024-01-01T00:00:00Z"}"#;
        let n: Notification = serde_json::from_str(json).expect("payload should parse");

        assert_eq!(n.id, "abc");
        assert_eq!(n.title, "Hi");
        assert_eq!(n.message, "there");
        assert!(n.category.is_none());
        assert!(n.action_type.is_none());
        assert!(n.action_data.is_none());
        assert_eq!(n.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn deserializes_action_fields() {
        let json = r#"{
            "id": "n-1",
            "title": "Exercise graded",
            "message": "Your submission was reviewed",
            "category": "course",
            "action_type": "open_exercise",
            "action_data": {"exercise_id": 42},
            "created_at": "2024-06-15T10:30:00Z"
        }"#;
        let n: Notification = serde_json::from_str(json).expect("payload should parse");

        assert_eq!(n.category.as_deref(), Some("course"));
        assert_eq!(n.action_type.as_deref(), Some("open_exercise"));
        assert_eq!(
            n.action_data,
            Some(serde_json::json!({"exercise_id": 42}))
        );
    }
}
