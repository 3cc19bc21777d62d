use billing_core::error::AppError;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ledger_sync: LedgerSyncConfig,
    pub log_level: String,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LedgerSyncConfig {
    pub enabled: bool,
    pub base_url: String,
    pub source_system: String,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let db_url = env::var("BILLING_DATABASE_URL")
            .map_err(|_| AppError::Config(anyhow::anyhow!("BILLING_DATABASE_URL must be set")))?;
        let max_connections = env::var("BILLING_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|e| {
                AppError::Config(anyhow::anyhow!("Invalid BILLING_DATABASE_MAX_CONNECTIONS: {}", e))
            })?;
        let min_connections = env::var("BILLING_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|e| {
                AppError::Config(anyhow::anyhow!("Invalid BILLING_DATABASE_MIN_CONNECTIONS: {}", e))
            })?;

        let sync_enabled = env::var("BILLING_LEDGER_SYNC_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let sync_base_url = env::var("BILLING_LEDGER_SYNC_URL")
            .unwrap_or_else(|_| "http://localhost:3002".to_string());
        let source_system =
            env::var("BILLING_SOURCE_SYSTEM").unwrap_or_else(|_| "billing-engine".to_string());
        let timeout_seconds = env::var("BILLING_LEDGER_SYNC_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let log_level = env::var("BILLING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            ledger_sync: LedgerSyncConfig {
                enabled: sync_enabled,
                base_url: sync_base_url,
                source_system,
                timeout_seconds,
            },
            log_level,
            service_name: "billing-engine".to_string(),
        })
    }
}
