use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Inbound grant-modification event queue.
    pub grants_event_queue_url: String,
    /// Outbound queue for the downstream archive assembler.
    pub archive_queue_url: String,
    pub audit_report_bucket: String,
    pub archive_bucket: String,
    /// Optional endpoint override for MinIO / LocalStack; production uses the
    /// default AWS endpoints and credential chain.
    pub aws_endpoint: Option<String>,
    pub notifications_from_email: String,
    /// Base URL retrieval links are built from.
    pub website_url: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            grants_event_queue_url: require_env("GRANTS_EVENT_QUEUE_URL")?,
            archive_queue_url: require_env("ARCHIVE_QUEUE_URL")?,
            audit_report_bucket: require_env("AUDIT_REPORT_BUCKET")?,
            archive_bucket: require_env("ARCHIVE_BUCKET")?,
            aws_endpoint: std::env::var("AWS_ENDPOINT_URL").ok(),
            notifications_from_email: require_env("NOTIFICATIONS_FROM_EMAIL")?,
            website_url: require_env("WEBSITE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
