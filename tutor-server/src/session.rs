//! Per-session interaction state
//!
//! Each login creates one `SessionState` keyed by an opaque token; logout
//! tears it down. State is process-local and never persisted or reloaded —
//! the running mean restarts at 0.5 with every new session. All mutation
//! goes through the registry, never through module-level globals.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tutor_core::sentiment::{Sentiment, SentimentLabel, NEUTRAL_SCORE};
use tutor_core::models::Role;
use uuid::Uuid;

/// One transcript entry held in memory for immediate re-render. Duplicates
/// what the transcript store persists.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub sentiment: Option<Sentiment>,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub username: String,
    pub started_at: DateTime<Utc>,
    pub total_interactions: u64,
    pub avg_sentiment: f64,
    pub transcript: Vec<TranscriptEntry>,
}

impl SessionState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            started_at: Utc::now(),
            total_interactions: 0,
            avg_sentiment: NEUTRAL_SCORE,
            transcript: Vec::new(),
        }
    }

    /// Fold one interaction into the aggregates using the incremental rule
    /// `new_avg = (old_avg * (n-1) + score) / n`. Only the user message's
    /// score is folded in; reply sentiment is display-only.
    pub fn record_interaction(&mut self, score: f64) {
        self.total_interactions += 1;
        let n = self.total_interactions as f64;
        self.avg_sentiment = (self.avg_sentiment * (n - 1.0) + score) / n;
    }

    pub fn push_entry(&mut self, role: Role, text: impl Into<String>, sentiment: Option<Sentiment>) {
        self.transcript.push(TranscriptEntry {
            role,
            text: text.into(),
            sentiment,
        });
    }

    pub fn duration_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_minutes()
    }

    /// Per-interaction sentiment scores of user messages, in order.
    pub fn trend(&self) -> Vec<f64> {
        self.transcript
            .iter()
            .filter(|e| e.role == Role::User)
            .filter_map(|e| e.sentiment.map(|s| s.score))
            .collect()
    }

    /// Label counts over classified user messages.
    pub fn distribution(&self) -> SentimentDistribution {
        let mut dist = SentimentDistribution::default();
        for entry in self.transcript.iter().filter(|e| e.role == Role::User) {
            match entry.sentiment.map(|s| s.label) {
                Some(SentimentLabel::Positive) => dist.positive += 1,
                Some(SentimentLabel::Negative) => dist.negative += 1,
                Some(SentimentLabel::Neutral) => dist.neutral += 1,
                None => {}
            }
        }
        dist
    }

    pub fn metrics(&self, now: DateTime<Utc>) -> SessionMetrics {
        SessionMetrics {
            username: self.username.clone(),
            session_duration_minutes: self.duration_minutes(now),
            total_interactions: self.total_interactions,
            avg_sentiment: self.avg_sentiment,
            trend: self.trend(),
            distribution: self.distribution(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SentimentDistribution {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

/// Read-only metrics panel payload: duration, count, running mean gauge,
/// trend points and label distribution.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    pub username: String,
    pub session_duration_minutes: i64,
    pub total_interactions: u64,
    pub avg_sentiment: f64,
    pub trend: Vec<f64>,
    pub distribution: SentimentDistribution,
}

/// Token-keyed map of live sessions, owned by the process entry point and
/// shared with the HTTP handlers.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, username: impl Into<String>) -> Uuid {
        let token = Uuid::new_v4();
        self.sessions
            .write()
            .await
            .insert(token, SessionState::new(username));
        token
    }

    pub async fn remove(&self, token: &Uuid) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn username_for(&self, token: &Uuid) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(token)
            .map(|s| s.username.clone())
    }

    /// Run a closure against one session's mutable state. `None` when the
    /// token is unknown (logged out or never issued).
    pub async fn apply<F, R>(&self, token: &Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        self.sessions.write().await.get_mut(token).map(f)
    }
}
