use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// NATS JetStream stream name for incoming price documents
    #[serde(default = "default_price_documents_stream")]
    pub price_documents_stream: String,

    /// NATS subject pattern for the consumer filter
    #[serde(default = "default_price_documents_subject")]
    pub price_documents_subject: String,

    /// NATS JetStream stream name for dead-letter envelopes
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,

    /// Durable consumer name
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Batch size for the consumer
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Max connections in the PostgreSQL pool
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // Ingestion configuration
    /// Upper bound on each persist or dead-letter call, in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Messages processed concurrently within one batch
    #[serde(default = "default_max_concurrent_messages")]
    pub max_concurrent_messages: usize,

    /// Attempts per persist call before giving up on a transient failure
    #[serde(default = "default_persist_max_attempts")]
    pub persist_max_attempts: u32,

    /// Base backoff between persist attempts, in milliseconds
    #[serde(default = "default_persist_base_backoff_ms")]
    pub persist_base_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds
    #[serde(default = "default_persist_max_backoff_ms")]
    pub persist_max_backoff_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_price_documents_stream() -> String {
    "price_documents".to_string()
}

fn default_price_documents_subject() -> String {
    "price_documents.>".to_string()
}

fn default_dead_letter_stream() -> String {
    "price_dead_letters".to_string()
}

fn default_consumer_name() -> String {
    "pricefeed-ingest".to_string()
}

fn default_nats_batch_size() -> usize {
    30
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "pricefeed".to_string()
}

fn default_postgres_username() -> String {
    "pricefeed".to_string()
}

fn default_postgres_password() -> String {
    "pricefeed".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    5
}

fn default_postgres_migrations_dir() -> String {
    "crates/pricefeed-postgres/migrations".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

// Ingestion defaults
fn default_call_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_messages() -> usize {
    4
}

fn default_persist_max_attempts() -> u32 {
    3
}

fn default_persist_base_backoff_ms() -> u64 {
    200
}

fn default_persist_max_backoff_ms() -> u64 {
    5000
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("PRICEFEED"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::remove_var("PRICEFEED_LOG_LEVEL");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.price_documents_stream, "price_documents");
        assert_eq!(config.dead_letter_stream, "price_dead_letters");
        assert_eq!(config.persist_max_attempts, 3);
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        std::env::set_var("PRICEFEED_LOG_LEVEL", "debug");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");

        std::env::remove_var("PRICEFEED_LOG_LEVEL");
    }
}
