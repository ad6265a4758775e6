use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub reservations: ReservationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    /// Lifetime of a cart and of the seat locks it holds.
    pub cart_ttl_seconds: u64,
}

impl ReservationConfig {
    pub fn cart_ttl(&self) -> Duration {
        Duration::from_secs(self.cart_ttl_seconds)
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .parse()
        .with_context(|| format!("{} must be a valid number", name))
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} must be set", name))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let log_format = match var_or("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let cart_ttl_seconds: u64 = parsed_or("CART_TTL_SECONDS", "900")?;
        if cart_ttl_seconds == 0 {
            anyhow::bail!("CART_TTL_SECONDS must be greater than zero");
        }

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parsed_or("PORT", "8000")?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "cinema_booking=debug,tower_http=debug"),
                log_format,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parsed_or("DB_POOL_SIZE", "20")?,
            },
            redis: RedisConfig {
                url: required("REDIS_URL")?,
                retry_attempts: parsed_or("REDIS_RETRY_ATTEMPTS", "3")?,
                retry_delay_ms: parsed_or("REDIS_RETRY_DELAY_MS", "50")?,
            },
            reservations: ReservationConfig { cart_ttl_seconds },
        })
    }
}
