//! Sentiment classification — remote and local backends
//!
//! Provides a `SentimentBackend` trait with implementations for:
//! - **Remote** — hosted text-classification endpoint (bearer token)
//! - **Lexicon** — pure keyword matcher, no I/O
//! - **Remote-fallback-lexicon** — remote with graceful degradation to the lexicon

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Label boundary used system-wide when a continuous score is mapped back
/// to a label: above this is Positive.
pub const POSITIVE_THRESHOLD: f64 = 0.6;

/// Below this is Negative; between the two is Neutral.
pub const NEGATIVE_THRESHOLD: f64 = 0.4;

/// Score assigned to a neutral / unclassifiable message.
pub const NEUTRAL_SCORE: f64 = 0.5;

// ============================================================================
// Labels and scores
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// System-wide thresholding rule: > 0.6 Positive, < 0.4 Negative, else Neutral.
    pub fn from_score(score: f64) -> Self {
        if score > POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if score < NEGATIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// A classified message: coarse label plus a score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

impl Sentiment {
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: NEUTRAL_SCORE,
        }
    }
}

// ============================================================================
// SentimentBackend trait
// ============================================================================

/// Abstraction over sentiment providers.
#[async_trait]
pub trait SentimentBackend: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Sentiment, ClassificationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing API token")]
    MissingApiToken,
}

// ============================================================================
// Remote client
// ============================================================================

/// Remote classification client configuration.
#[derive(Debug, Clone)]
pub struct SentimentConfig {
    pub api_token: String,
    pub model: String,
    pub timeout_seconds: u64,
}

/// Request body for the hosted inference endpoints: `{"inputs": <string>}`.
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

/// One class probability as returned by the classification endpoint.
#[derive(Debug, Deserialize)]
struct ClassScore {
    label: String,
    score: f64,
}

/// The endpoint answers either with class probabilities (flat for some
/// models, nested one level for others) or with an error object. All
/// shape-guessing lives in this one type.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<ClassScore>>),
    Flat(Vec<ClassScore>),
    Failure { error: String },
}

fn is_positive_label(label: &str) -> bool {
    label.eq_ignore_ascii_case("positive") || label.eq_ignore_ascii_case("LABEL_2")
}

fn is_negative_label(label: &str) -> bool {
    label.eq_ignore_ascii_case("negative") || label.eq_ignore_ascii_case("LABEL_0")
}

/// Collapse class probabilities into a single `[0, 1]` score:
/// `(p_positive - p_negative + 1) / 2`.
fn score_from_classes(classes: &[ClassScore]) -> f64 {
    let mut signed = 0.0;
    for class in classes {
        if is_positive_label(&class.label) {
            signed += class.score;
        } else if is_negative_label(&class.label) {
            signed -= class.score;
        }
    }
    ((signed + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Remote sentiment client — calls the hosted text-classification endpoint.
#[derive(Debug, Clone)]
pub struct RemoteSentimentClient {
    client: Client,
    config: SentimentConfig,
    base_url: String,
}

impl RemoteSentimentClient {
    pub fn new(config: SentimentConfig, base_url: String) -> Result<Self, ClassificationError> {
        if config.api_token.is_empty() {
            return Err(ClassificationError::MissingApiToken);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    async fn classify_once(&self, text: &str) -> Result<Sentiment, ClassificationError> {
        let url = format!("{}/models/{}", self.base_url, self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&InferenceRequest { inputs: text })
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Classification API error");
            return Err(ClassificationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ClassifyResponse = response.json().await?;

        let classes = match parsed {
            ClassifyResponse::Nested(mut batches) if !batches.is_empty() => batches.remove(0),
            ClassifyResponse::Flat(classes) => classes,
            ClassifyResponse::Nested(_) => {
                return Err(ClassificationError::MalformedResponse(
                    "empty classification batch".to_string(),
                ))
            }
            ClassifyResponse::Failure { error } => {
                return Err(ClassificationError::MalformedResponse(error))
            }
        };

        if classes.is_empty() {
            return Err(ClassificationError::MalformedResponse(
                "no classes in response".to_string(),
            ));
        }

        let score = score_from_classes(&classes);

        Ok(Sentiment {
            label: SentimentLabel::from_score(score),
            score,
        })
    }
}

#[async_trait]
impl SentimentBackend for RemoteSentimentClient {
    async fn classify(&self, text: &str) -> Result<Sentiment, ClassificationError> {
        self.classify_once(text).await
    }

    fn name(&self) -> &str {
        "remote"
    }
}

// ============================================================================
// Lexicon classifier
// ============================================================================

const POSITIVE_WORDS: &[&str] = &[
    "love", "great", "amazing", "good", "excellent", "wonderful", "awesome", "fantastic",
    "thank", "happy", "enjoy", "helpful", "clear", "nice", "interesting",
];

const NEGATIVE_WORDS: &[&str] = &[
    "hate", "terrible", "awful", "bad", "worst", "boring", "confus", "frustrat", "stuck",
    "difficult", "annoying", "angry", "wrong", "useless",
];

/// Fixed score for a positive-dominant lexicon match.
pub const LEXICON_POSITIVE_SCORE: f64 = 0.7;

/// Fixed score for a negative-dominant lexicon match.
pub const LEXICON_NEGATIVE_SCORE: f64 = 0.3;

/// Deterministic keyword matcher. Counts case-insensitive substring hits from
/// fixed positive and negative word lists; whichever list dominates wins.
#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    /// Pure classification, usable without async dispatch.
    pub fn classify_text(&self, text: &str) -> Sentiment {
        let lowered = text.to_lowercase();

        let positives = POSITIVE_WORDS
            .iter()
            .filter(|w| lowered.contains(*w))
            .count();
        let negatives = NEGATIVE_WORDS
            .iter()
            .filter(|w| lowered.contains(*w))
            .count();

        if positives > negatives {
            Sentiment {
                label: SentimentLabel::Positive,
                score: LEXICON_POSITIVE_SCORE,
            }
        } else if negatives > positives {
            Sentiment {
                label: SentimentLabel::Negative,
                score: LEXICON_NEGATIVE_SCORE,
            }
        } else {
            Sentiment::neutral()
        }
    }
}

#[async_trait]
impl SentimentBackend for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<Sentiment, ClassificationError> {
        Ok(self.classify_text(text))
    }

    fn name(&self) -> &str {
        "lexicon"
    }
}

// ============================================================================
// FallbackSentimentClient
// ============================================================================

/// Wraps `RemoteSentimentClient`. On any remote error (or when no token is
/// configured at all), logs a warning and answers from the lexicon so that an
/// interaction is never blocked on classification.
pub struct FallbackSentimentClient {
    remote: Option<RemoteSentimentClient>,
    local: LexiconClassifier,
}

impl FallbackSentimentClient {
    pub fn new(remote: Option<RemoteSentimentClient>) -> Self {
        if remote.is_none() {
            tracing::warn!("No classification token configured — using lexicon sentiment only");
        }
        Self {
            remote,
            local: LexiconClassifier,
        }
    }
}

#[async_trait]
impl SentimentBackend for FallbackSentimentClient {
    async fn classify(&self, text: &str) -> Result<Sentiment, ClassificationError> {
        if let Some(remote) = &self.remote {
            match remote.classify_once(text).await {
                Ok(sentiment) => return Ok(sentiment),
                Err(e) => {
                    tracing::warn!(error = %e, "Remote classification failed — falling back to lexicon");
                }
            }
        }
        Ok(self.local.classify_text(text))
    }

    fn name(&self) -> &str {
        "remote-fallback-lexicon"
    }
}

// ============================================================================
// TESTS
// ============================================================================
