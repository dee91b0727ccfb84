//! Transcript store — append-only messages in the `messages` table.
//!
//! `append` performs up to two writes: the message insert, and (for user
//! messages) the owner's analytics update. They are deliberately separate
//! statements, not one transaction: an interaction may be partially saved
//! if the process dies between them, and readers tolerate that.

use sqlx::PgPool;
use tutor_core::models::{Message, Role};
use tutor_core::sentiment::Sentiment;
use tutor_core::TutorError;
use uuid::Uuid;

/// Insert one immutable message. For user-role messages, also bump the
/// owner's interaction counter and push a `{timestamp, sentiment}` session
/// summary onto the user record.
pub async fn append(
    pool: &PgPool,
    owner: &str,
    role: Role,
    text: &str,
    sentiment: Option<Sentiment>,
) -> Result<(), TutorError> {
    sqlx::query(
        r#"
        INSERT INTO messages (id, username, role, content, sentiment_label, sentiment_score, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, now())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner)
    .bind(role.as_str())
    .bind(text)
    .bind(sentiment.map(|s| s.label.as_str()))
    .bind(sentiment.map(|s| s.score))
    .execute(pool)
    .await?;

    if role == Role::User {
        sqlx::query(
            r#"
            UPDATE users
            SET total_interactions = total_interactions + 1,
                sessions = sessions || jsonb_build_object('timestamp', now(), 'sentiment', $2::double precision)
            WHERE username = $1
            "#,
        )
        .bind(owner)
        .bind(sentiment.map(|s| s.score))
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// All messages for an owner in ascending timestamp order. Unpaginated;
/// result size grows with the full chat history.
pub async fn load(pool: &PgPool, owner: &str) -> Result<Vec<Message>, TutorError> {
    let messages: Vec<Message> = sqlx::query_as(
        r#"
        SELECT id, username, role, content, sentiment_label, sentiment_score, created_at
        FROM messages
        WHERE username = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}
