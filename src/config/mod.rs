use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

// Top-level configuration, one sub-struct per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub chain: ChainConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    /// Fresh database, migrations only.
    Init,
    /// Restore the database from the stored snapshot. A missing snapshot is fatal.
    Resume,
}

impl FromStr for StartupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(StartupMode::Init),
            "resume" => Ok(StartupMode::Resume),
            other => Err(format!("unknown startup mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub log_format: String,
    pub startup_mode: StartupMode,
    pub payment_link_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

// Redis holds the database snapshot between process runs
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub snapshot_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub gas_limit: u64,
    /// Hex-encoded 32 byte master secret all wallets are derived from.
    pub master_key: String,
    /// Principal of this service; its derivation path owns the payee wallet.
    pub service_principal: String,
    pub owner_principal: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub delay_seconds: u64,
    pub poll_interval_seconds: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

fn var_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(name, default);
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parsed("PORT", "8000")?,
                rust_log: var_or("RUST_LOG", "event_payout=debug,tower_http=debug"),
                log_format: var_or("LOG_FORMAT", "pretty"),
                startup_mode: parsed("STARTUP_MODE", "init")?,
                payment_link_base: var_or("PAYMENT_LINK_BASE", "http://localhost:8000/payment"),
            },
            database: DatabaseConfig {
                url: var_or("DATABASE_URL", "sqlite::memory:"),
            },
            redis: RedisConfig {
                url: var_or("REDIS_URL", "redis://127.0.0.1:6379"),
                snapshot_key: var_or("SNAPSHOT_KEY", "DATABASE"),
            },
            chain: ChainConfig {
                rpc_url: var_or("CHAIN_RPC_URL", "https://sepolia.base.org"),
                chain_id: parsed("CHAIN_ID", "84532")?,
                gas_limit: parsed("GAS_LIMIT", "21000")?,
                master_key: required("WALLET_MASTER_KEY")?,
                service_principal: required("SERVICE_PRINCIPAL")?,
                owner_principal: env::var("OWNER_PRINCIPAL").ok(),
                request_timeout_seconds: parsed("RPC_TIMEOUT_SECONDS", "30")?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parsed("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "5")?,
                timeout_seconds: parsed("CIRCUIT_BREAKER_TIMEOUT_SECONDS", "60")?,
            },
            notification: NotificationConfig {
                delay_seconds: parsed("NOTIFICATION_DELAY_SECONDS", "10")?,
                poll_interval_seconds: parsed("NOTIFICATION_POLL_SECONDS", "30")?,
                max_attempts: parsed("NOTIFICATION_MAX_ATTEMPTS", "5")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_mode_parses_case_insensitively() {
        assert_eq!("Resume".parse::<StartupMode>(), Ok(StartupMode::Resume));
        assert_eq!("init".parse::<StartupMode>(), Ok(StartupMode::Init));
        assert!("upgrade".parse::<StartupMode>().is_err());
    }
}
