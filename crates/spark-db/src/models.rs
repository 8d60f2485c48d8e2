//! Database row types, mapping directly to SQLite rows.
//! Timestamps are RFC 3339 strings with microsecond precision, so they sort
//! lexicographically in creation order.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeRow {
    pub id: String,
    pub liker_id: String,
    pub liked_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub created_at: String,
}

/// Current time in the storage timestamp format.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
