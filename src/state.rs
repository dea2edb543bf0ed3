use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::Settings;
use crate::dispatch::RouteTable;
use crate::error::ConfigError;
use crate::handlers::{Handler, route_table};
use crate::notify::Notifier;
use crate::rate_limit::RateLimiter;
use crate::store::DataStore;

// app's shared state
pub struct AppState {
    pub settings: Settings,
    pub limiter: RateLimiter,        // per-client admission
    pub routes: RouteTable<Handler>, // read-only after startup
    pub store: Arc<dyn DataStore>,
    pub notifier: Notifier,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    // Fails on invalid limiter settings or a route collision
    pub fn new(
        settings: Settings,
        store: Arc<dyn DataStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let limiter = RateLimiter::new(settings.rate_limit.clone(), clock)?;
        let routes = route_table()?;

        Ok(Self {
            settings,
            limiter,
            routes,
            store,
            notifier: Notifier::new(),
            started_at: Utc::now(),
        })
    }
}
