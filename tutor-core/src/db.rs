use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pool(config: &DatabaseConfig, url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the two tables on startup if they are missing. Schema changes are
/// additive only; there is no migration history to replay.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            username            TEXT PRIMARY KEY,
            email               TEXT NOT NULL,
            password_hash       TEXT NOT NULL,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
            total_interactions  BIGINT NOT NULL DEFAULT 0,
            avg_sentiment       DOUBLE PRECISION NOT NULL DEFAULT 0.5,
            sessions            JSONB NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id              UUID PRIMARY KEY,
            username        TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            sentiment_label TEXT,
            sentiment_score DOUBLE PRECISION,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS messages_owner_time_idx ON messages (username, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
