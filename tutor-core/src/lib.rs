pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod generate;
pub mod models;
pub mod sentiment;

pub use config::TutorConfig;
pub use error::TutorError;
pub use generate::{
    fallback_response, GenerationConfig, GenerationError, RemoteGenerationClient,
    ResponseGenerator,
};
pub use sentiment::{
    ClassificationError, FallbackSentimentClient, LexiconClassifier, RemoteSentimentClient,
    Sentiment, SentimentBackend, SentimentConfig, SentimentLabel,
};
