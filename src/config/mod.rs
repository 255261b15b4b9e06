use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub admin_token: Option<String>,
    pub fcm_endpoint: String,
    pub fcm_server_key: String,
    pub gateway_timeout_seconds: u64,
    pub gateway_batch_concurrency: usize,
    pub failure_threshold: i32,
    pub sweep_interval_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        // The deactivation threshold is a policy decision, not a constant.
        let failure_threshold: i32 = env_or_parse("FAILURE_THRESHOLD", "3")?;
        if failure_threshold < 1 {
            return Err(anyhow!("FAILURE_THRESHOLD must be at least 1"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            fcm_endpoint: env_or("FCM_ENDPOINT", "https://fcm.googleapis.com/fcm/send"),
            fcm_server_key: env_or_err("FCM_SERVER_KEY")?,
            gateway_timeout_seconds: env_or_parse("GATEWAY_TIMEOUT_SECONDS", "10")?,
            gateway_batch_concurrency: env_or_parse("GATEWAY_BATCH_CONCURRENCY", "4")?,
            failure_threshold,
            sweep_interval_seconds: env_or_parse("SWEEP_INTERVAL_SECONDS", "3600")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
