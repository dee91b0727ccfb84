use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct TutorConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
    /// Strict variant: refuse to start without a reachable database.
    /// Defensive variant (default): degrade to demo mode instead.
    #[serde(default)]
    pub strict_startup: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty string means "read DATABASE_URL from the environment".
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Resolve the connection string, falling back to the environment.
    /// `None` means the store is unconfigured and the service runs in demo mode.
    pub fn resolved_url(&self) -> Option<String> {
        if !self.url.is_empty() {
            return Some(self.url.clone());
        }
        std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    /// Empty string means "read HF_API_TOKEN from the environment".
    #[serde(default)]
    pub api_token: String,
    pub classification_model: String,
    pub generation_model: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl InferenceConfig {
    pub fn resolved_token(&self) -> Option<String> {
        if !self.api_token.is_empty() {
            return Some(self.api_token.clone());
        }
        std::env::var("HF_API_TOKEN").ok().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

impl TutorConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
