use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("Username already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Classification failed: {0}")]
    Classification(#[from] crate::sentiment::ClassificationError),

    #[error("Generation failed: {0}")]
    Generation(#[from] crate::generate::GenerationError),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Password hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
