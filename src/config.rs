use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::db::PoolOptions;
use crate::models::{parse_time, parse_window_bound};
use crate::services::calendar::{
    CalendarPolicy, OperatingWindow, DEFAULT_DURATION_MINUTES, DEFAULT_SLOT_GRANULARITY_MINUTES,
};
use crate::services::retry::RetryPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub system_token: String,
    pub open_time: String,
    pub close_time: String,
    pub slot_granularity_minutes: u32,
    pub default_duration_minutes: u32,
    pub max_create_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub db_busy_timeout_ms: u64,
    pub db_pool_size: u32,
    pub db_checkout_timeout_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sawmill.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            system_token: env::var("SYSTEM_TOKEN").unwrap_or_default(),
            open_time: env::var("OPEN_TIME").unwrap_or_else(|_| "09:00".to_string()),
            close_time: env::var("CLOSE_TIME").unwrap_or_else(|_| "17:00".to_string()),
            slot_granularity_minutes: env_or("SLOT_GRANULARITY_MINUTES", DEFAULT_SLOT_GRANULARITY_MINUTES),
            default_duration_minutes: env_or("DEFAULT_DURATION_MINUTES", DEFAULT_DURATION_MINUTES),
            max_create_attempts: env_or("MAX_CREATE_ATTEMPTS", 3),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 20),
            db_busy_timeout_ms: env_or("DB_BUSY_TIMEOUT_MS", 250),
            db_pool_size: env_or("DB_POOL_SIZE", 8),
            db_checkout_timeout_ms: env_or("DB_CHECKOUT_TIMEOUT_MS", 2000),
        }
    }

    pub fn calendar_policy(&self) -> anyhow::Result<CalendarPolicy> {
        let open = parse_time(&self.open_time).context("invalid OPEN_TIME")?;
        let close = parse_window_bound(&self.close_time).context("invalid CLOSE_TIME")?;
        let window = OperatingWindow::new(open, close).context("invalid operating window")?;
        CalendarPolicy::new(window, self.slot_granularity_minutes, self.default_duration_minutes)
            .context("invalid calendar policy")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base = self.retry_base_delay_ms;
        RetryPolicy::new(self.max_create_attempts, base, base.saturating_mul(10))
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.db_pool_size,
            busy_timeout: Duration::from_millis(self.db_busy_timeout_ms),
            checkout_timeout: Duration::from_millis(self.db_checkout_timeout_ms),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: ":memory:".to_string(),
            admin_token: "changeme".to_string(),
            system_token: String::new(),
            open_time: "09:00".to_string(),
            close_time: "17:00".to_string(),
            slot_granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            max_create_attempts: 3,
            retry_base_delay_ms: 20,
            db_busy_timeout_ms: 250,
            db_pool_size: 8,
            db_checkout_timeout_ms: 2000,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
