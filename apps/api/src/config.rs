use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Fails startup early if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub anthropic_api_key: String,
    pub retriever_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Evaluator retry budget per pipeline stage.
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    /// Consumers pulling from the primary queue.
    pub queue_workers: usize,
    /// Concurrency bound of the local fallback executor.
    pub local_worker_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let retry_max_attempts: u32 = parse_env("RETRY_MAX_ATTEMPTS", 5)?;
        if retry_max_attempts == 0 {
            bail!("'RETRY_MAX_ATTEMPTS' must be at least 1");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            retriever_url: require_env("RETRIEVER_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            retry_max_attempts,
            retry_base_delay: Duration::from_millis(parse_env("RETRY_BASE_DELAY_MS", 1000u64)?),
            queue_workers: parse_env("QUEUE_WORKERS", 4)?,
            local_worker_limit: parse_env("LOCAL_WORKER_LIMIT", 8)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("'{key}' must be a valid value")),
        Err(_) => Ok(default),
    }
}
