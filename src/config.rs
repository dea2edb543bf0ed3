use std::time::Duration;

use axum::http::HeaderValue;
use clap::Parser;

use crate::error::ConfigError;
use crate::middleware::ApiKeys;
use crate::rate_limit::RateLimitConfig;

// CLI argument structure, every flag also readable from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "waterlog-api")]
#[command(about = "Water-logging incident API with rate limiting and live notifications")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    // Allowed cross-origin caller, "*" for any
    #[arg(long, env = "FRONTEND_URL", default_value = "*")]
    pub frontend_url: String,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 100)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    pub rate_window: u64,

    // Evict rate limit entries after this many idle windows
    #[arg(long, env = "RATE_LIMIT_IDLE_WINDOWS", default_value_t = 10)]
    pub idle_windows: u32,

    // Issued API keys, comma separated; each gets its own rate limit bucket
    #[arg(long, env = "API_KEYS", value_delimiter = ',')]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigin {
    Any,
    Exact(HeaderValue),
}

// Validated settings the server is built from
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub allowed_origin: AllowedOrigin,
    pub rate_limit: RateLimitConfig,
    pub api_keys: ApiKeys,
}

impl Args {
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let rate_limit = RateLimitConfig {
            window: Duration::from_secs(self.rate_window),
            max_requests: self.rate_limit,
            idle_windows: self.idle_windows,
        };
        rate_limit.validate()?;

        Ok(Settings {
            port: self.port,
            allowed_origin: parse_origin(&self.frontend_url)?,
            rate_limit,
            api_keys: ApiKeys::new(&self.api_keys),
        })
    }
}

impl Settings {
    // Defaults with a custom limiter, for tests and embedding
    pub fn with_rate_limit(rate_limit: RateLimitConfig) -> Self {
        Self {
            port: 5000,
            allowed_origin: AllowedOrigin::Any,
            rate_limit,
            api_keys: ApiKeys::default(),
        }
    }

    pub fn with_api_keys(mut self, api_keys: ApiKeys) -> Self {
        self.api_keys = api_keys;
        self
    }
}

fn parse_origin(origin: &str) -> Result<AllowedOrigin, ConfigError> {
    let origin = origin.trim();
    if origin == "*" {
        return Ok(AllowedOrigin::Any);
    }

    let origin = origin.trim_end_matches('/');
    let has_scheme = origin.starts_with("http://") || origin.starts_with("https://");
    let has_host = origin.split_once("://").is_some_and(|(_, host)| !host.is_empty());
    if !has_scheme || !has_host {
        return Err(ConfigError::InvalidOrigin(origin.to_string()));
    }

    HeaderValue::from_str(origin)
        .map(AllowedOrigin::Exact)
        .map_err(|_| ConfigError::InvalidOrigin(origin.to_string()))
}
