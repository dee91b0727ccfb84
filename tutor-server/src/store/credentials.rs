//! Credential store — user records in the `users` table.
//!
//! Create-and-read only: the system never updates credentials or deletes
//! users. Analytics columns start zeroed (mean seeded at 0.5).

use sqlx::PgPool;
use tutor_core::auth;
use tutor_core::models::User;
use tutor_core::TutorError;

const USER_COLUMNS: &str =
    "username, email, password_hash, created_at, total_interactions, avg_sentiment, sessions";

/// Insert a new user. Fails with `AlreadyExists` when the username is taken.
pub async fn register(
    pool: &PgPool,
    username: &str,
    email: &str,
    password: &str,
) -> Result<(), TutorError> {
    let taken: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if taken.is_some() {
        return Err(TutorError::AlreadyExists(username.to_string()));
    }

    let password_hash = auth::hash_password(password)?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, created_at, total_interactions, avg_sentiment, sessions)
        VALUES ($1, $2, $3, now(), 0, 0.5, '[]'::jsonb)
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(&password_hash)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => Ok(()),
        // Lost the race between the existence check and the insert.
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
            Err(TutorError::AlreadyExists(username.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Look up a user and verify the password. Absent user and failed
/// verification collapse into the same `InvalidCredentials` error.
pub async fn authenticate(
    pool: &PgPool,
    username: &str,
    password: &str,
) -> Result<User, TutorError> {
    let user: Option<User> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(pool)
            .await?;

    match user {
        Some(user) if auth::verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(TutorError::InvalidCredentials),
    }
}
