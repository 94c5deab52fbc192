use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use uuid::Uuid;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub concurrency: usize,

    /// Owner all commands act on
    pub owner_id: Uuid,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://quotes.db?mode=rwc".to_string()),
            concurrency: env::var("QUOTE_CONCURRENCY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("QUOTE_CONCURRENCY must be a positive number")?,
            owner_id: match env::var("QUOTE_OWNER_ID") {
                Ok(raw) => raw.parse().context("QUOTE_OWNER_ID must be a UUID")?,
                Err(_) => Uuid::nil(),
            },
        })
    }
}
