use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use tutor_core::generate::{GenerationConfig, RemoteGenerationClient, ResponseGenerator};
use tutor_core::sentiment::{FallbackSentimentClient, RemoteSentimentClient, SentimentConfig};
use tutor_core::TutorConfig;
use tutor_server::http;
use tutor_server::session::SessionRegistry;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "tutor.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match TutorConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to the store. Strict startup fails hard; the defensive default
    // degrades to demo mode with persistence disabled.
    let pool = match config.database.resolved_url() {
        Some(url) => match tutor_core::db::create_pool(&config.database, &url).await {
            Ok(p) => {
                tutor_core::db::ensure_schema(&p).await?;
                Some(p)
            }
            Err(e) => {
                if config.service.strict_startup {
                    eprintln!("Failed to connect to database: {}", e);
                    std::process::exit(1);
                }
                tracing::warn!(error = %e, "Database unreachable — running in demo mode");
                None
            }
        },
        None => {
            if config.service.strict_startup {
                eprintln!("DATABASE_URL is not configured and strict_startup is set");
                std::process::exit(1);
            }
            tracing::warn!("No database configured — running in demo mode");
            None
        }
    };

    if args.health {
        match &pool {
            Some(p) => match tutor_core::db::health_check(p).await {
                Ok(v) => println!("PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            },
            None => println!("Demo mode: no database configured"),
        }
        println!("Tutor health check passed");
        return Ok(());
    }

    // Inference clients: both degrade to local fallbacks when the token is
    // absent. Lifecycle is owned here and injected into the handlers.
    let token = config.inference.resolved_token();

    let remote_classifier = token.as_ref().and_then(|t| {
        RemoteSentimentClient::new(
            SentimentConfig {
                api_token: t.clone(),
                model: config.inference.classification_model.clone(),
                timeout_seconds: config.inference.timeout_seconds,
            },
            config.inference.base_url.clone(),
        )
        .ok()
    });
    let classifier = Arc::new(FallbackSentimentClient::new(remote_classifier));

    let remote_generator = token.as_ref().and_then(|t| {
        RemoteGenerationClient::new(
            GenerationConfig {
                api_token: t.clone(),
                model: config.inference.generation_model.clone(),
                max_new_tokens: config.inference.max_new_tokens,
                temperature: config.inference.temperature,
                timeout_seconds: config.inference.timeout_seconds,
            },
            config.inference.base_url.clone(),
        )
        .ok()
    });
    let generator = Arc::new(ResponseGenerator::new(remote_generator));

    let state = Arc::new(http::AppState {
        pool,
        classifier,
        generator,
        sessions: SessionRegistry::new(),
    });

    // Shutdown on Ctrl+C
    let (tx, rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(state, config, rx).await?;

    Ok(())
}
