//! Reply generation — hosted text-generation endpoint with canned fallback
//!
//! `ResponseGenerator` wraps the remote client and a fixed set of encouraging
//! fallback lines. A failed or unconfigured remote call degrades to a canned
//! reply; generation never fails an interaction. There are no retries: one
//! failed call goes straight to the fallback path.

use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing API token")]
    MissingApiToken,
}

/// Remote generation client configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_token: String,
    pub model: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

// ============================================================================
// Wire shapes (private) — all response shape-guessing lives here
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Debug, Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    temperature: f32,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// The endpoint answers with a list containing one generated continuation,
/// or with an error object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Generated(Vec<GeneratedText>),
    Failure { error: String },
}

// ============================================================================
// Prompt template
// ============================================================================

/// Build the fixed tutoring prompt around a student question and a short
/// context line (prior interaction count).
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an intelligent educational tutor AI assistant. Your role is to help \
students learn effectively by providing clear, engaging, and personalized responses.\n\
\n\
Context: {context}\n\
Student Question: {question}\n\
\n\
Please provide a helpful, educational response that:\n\
1. Addresses the student's question directly\n\
2. Uses simple, clear language appropriate for learning\n\
3. Provides examples when helpful\n\
4. Encourages further learning\n\
5. Is supportive and motivating\n\
\n\
Response:"
    )
}

// ============================================================================
// Remote client
// ============================================================================

/// Remote generation client — calls the hosted text-generation endpoint and
/// returns only the generated continuation (no prompt echo).
#[derive(Debug, Clone)]
pub struct RemoteGenerationClient {
    client: Client,
    config: GenerationConfig,
    base_url: String,
}

impl RemoteGenerationClient {
    pub fn new(config: GenerationConfig, base_url: String) -> Result<Self, GenerationError> {
        if config.api_token.is_empty() {
            return Err(GenerationError::MissingApiToken);
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

    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}", self.base_url, self.config.model);

        let request = GenerateRequest {
            inputs: prompt,
            parameters: GenerateParameters {
                max_new_tokens: self.config.max_new_tokens,
                temperature: self.config.temperature,
                do_sample: true,
                return_full_text: false,
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Generation API error");
            return Err(GenerationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await?;

        match parsed {
            GenerateResponse::Generated(mut entries) if !entries.is_empty() => {
                Ok(entries.remove(0).generated_text)
            }
            GenerateResponse::Generated(_) => Err(GenerationError::MalformedResponse(
                "empty generation list".to_string(),
            )),
            GenerateResponse::Failure { error } => Err(GenerationError::MalformedResponse(error)),
        }
    }
}

// ============================================================================
// Fallback responses
// ============================================================================

const FALLBACK_QUESTION: &str = "That's a great question! Let's break it down together — \
try restating it in your own words, and we can work through it step by step.";

const FALLBACK_SUPPORT: &str = "It's completely normal to feel stuck sometimes. Take a \
breath, look at what you already know about the problem, and start from there — you're \
closer than you think.";

const FALLBACK_GENERIC: &[&str] = &[
    "Keep going — every question you ask is a step forward in your learning.",
    "Interesting thought! Try exploring it from a different angle and see what you find.",
    "Learning takes practice. Write down what you know so far and build from there.",
    "You're doing well by engaging with the material. What part would you like to dig into next?",
];

/// Pick a canned reply for the given input. Deterministic for inputs that hit
/// a heuristic, uniformly random otherwise.
pub fn fallback_response(input: &str) -> String {
    let lowered = input.to_lowercase();

    if input.contains('?') {
        return FALLBACK_QUESTION.to_string();
    }
    if ["help", "stuck", "confused"].iter().any(|w| lowered.contains(w)) {
        return FALLBACK_SUPPORT.to_string();
    }

    FALLBACK_GENERIC
        .choose(&mut rand::thread_rng())
        .unwrap_or(&FALLBACK_GENERIC[0])
        .to_string()
}

// ============================================================================
// ResponseGenerator
// ============================================================================

/// Generation facade used by the orchestrator. Remote when configured,
/// canned fallback otherwise — the returned reply is always non-empty.
pub struct ResponseGenerator {
    remote: Option<RemoteGenerationClient>,
}

impl ResponseGenerator {
    pub fn new(remote: Option<RemoteGenerationClient>) -> Self {
        if remote.is_none() {
            tracing::warn!("No generation token configured — using canned replies only");
        }
        Self { remote }
    }

    /// Generate a tutoring reply. `context` is a short summary line, e.g. the
    /// prior interaction count. Never fails; the fallback reply is used when
    /// the remote call cannot complete.
    pub async fn generate(&self, question: &str, context: &str) -> String {
        if let Some(remote) = &self.remote {
            let prompt = build_prompt(question, context);
            match remote.generate(&prompt).await {
                Ok(reply) if !reply.trim().is_empty() => return reply,
                Ok(_) => {
                    tracing::warn!("Remote generation returned empty text — using fallback reply");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Remote generation failed — using fallback reply");
                }
            }
        }
        fallback_response(question)
    }

    /// True when a remote model is configured (surfaced by /health).
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> GenerationConfig {
        GenerationConfig {
            api_token: "test-token".to_string(),
            model: "ibm-granite/granite-3.3-2b-instruct".to_string(),
            max_new_tokens: 500,
            temperature: 0.7,
            timeout_seconds: 5,
        }
    }

    fn remote(server: &MockServer) -> RemoteGenerationClient {
        RemoteGenerationClient::new(test_config(), server.uri()).expect("Failed to create client")
    }

    #[test]
    fn test_build_prompt_embeds_question_and_context() {
        let prompt = build_prompt("What is recursion?", "Previous interactions: 4");
        assert!(prompt.contains("Student Question: What is recursion?"));
        assert!(prompt.contains("Context: Previous interactions: 4"));
        assert!(prompt.ends_with("Response:"));
    }

    #[test]
    fn test_fallback_question_heuristic() {
        let reply = fallback_response("What is a closure?");
        assert_eq!(reply, FALLBACK_QUESTION);
    }

    #[test]
    fn test_fallback_support_heuristic() {
        for input in ["I am stuck", "please HELP me", "so confused right now"] {
            assert_eq!(fallback_response(input), FALLBACK_SUPPORT, "input: {}", input);
        }
    }

    #[test]
    fn test_fallback_always_non_empty() {
        for input in ["", "tell me about rust", "   ", "no keywords here"] {
            assert!(!fallback_response(input).is_empty());
        }
    }

    #[test]
    fn test_generic_fallback_comes_from_fixed_set() {
        let reply = fallback_response("tell me about ownership");
        assert!(FALLBACK_GENERIC.contains(&reply.as_str()));
    }

    #[tokio::test]
    async fn test_remote_generate_returns_continuation_only() {
        let mock_server = MockServer::start().await;
        let client = remote(&mock_server);

        Mock::given(method("POST"))
            .and(path("/models/ibm-granite/granite-3.3-2b-instruct"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "generated_text": "A closure captures its environment." }
            ])))
            .mount(&mock_server)
            .await;

        let reply = client.generate("prompt").await.unwrap();
        assert_eq!(reply, "A closure captures its environment.");
    }

    #[tokio::test]
    async fn test_remote_generate_errors_on_500() {
        let mock_server = MockServer::start().await;
        let client = remote(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        match client.generate("prompt").await {
            Err(GenerationError::Api { code, .. }) => assert_eq!(code, 500),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_generate_errors_on_error_object() {
        let mock_server = MockServer::start().await;
        let client = remote(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "Model is currently loading"
            })))
            .mount(&mock_server)
            .await;

        let result = client.generate("prompt").await;
        assert!(matches!(result, Err(GenerationError::MalformedResponse(_))));
    }

    #[test]
    fn test_remote_client_requires_token() {
        let mut config = test_config();
        config.api_token = String::new();
        let result = RemoteGenerationClient::new(config, "http://localhost".to_string());
        assert!(matches!(result, Err(GenerationError::MissingApiToken)));
    }

    #[tokio::test]
    async fn test_generator_falls_back_on_remote_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock_server)
            .await;

        let generator = ResponseGenerator::new(Some(remote(&mock_server)));
        let reply = generator.generate("What is borrowing?", "Previous interactions: 0").await;
        assert_eq!(reply, FALLBACK_QUESTION);
    }

    #[tokio::test]
    async fn test_generator_without_remote_uses_canned_reply() {
        let generator = ResponseGenerator::new(None);
        assert!(!generator.is_remote());
        let reply = generator.generate("I'm stuck on lifetimes", "Previous interactions: 2").await;
        assert!(!reply.is_empty());
    }

    #[tokio::test]
    async fn test_generator_uses_remote_when_it_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "generated_text": "Borrowing lets you reference data without taking ownership." }
            ])))
            .mount(&mock_server)
            .await;

        let generator = ResponseGenerator::new(Some(remote(&mock_server)));
        let reply = generator.generate("What is borrowing?", "Previous interactions: 0").await;
        assert!(reply.starts_with("Borrowing lets you"));
    }
}
