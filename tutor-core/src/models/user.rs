use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub total_interactions: i64,
    pub avg_sentiment: f64,
    /// Append-only `{timestamp, sentiment}` summaries, one per saved interaction.
    pub sessions: serde_json::Value,
}
