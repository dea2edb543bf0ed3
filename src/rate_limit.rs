use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::clock::Clock;
use crate::error::ConfigError;

/// Number of `check` calls between opportunistic eviction sweeps.
pub const SWEEP_EVERY: u64 = 1024;

// Longest accepted window (30 days)
pub const MAX_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// Longest an idle entry may be kept (365 days)
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Identity a request is accounted against (API key digest or peer address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    // Length of one counting window
    pub window: Duration,
    // Requests admitted per key per window
    pub max_requests: u32,
    // Entries idle for this many windows get evicted
    pub idle_windows: u32,
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::InvalidLimiter(
                "window duration must be positive".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(ConfigError::InvalidLimiter(format!(
                "window duration must be at most {}s",
                MAX_WINDOW.as_secs()
            )));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::InvalidLimiter(
                "max requests per window must be positive".to_string(),
            ));
        }
        if self.idle_windows == 0 {
            return Err(ConfigError::InvalidLimiter(
                "idle eviction must be at least one window".to_string(),
            ));
        }
        let idle = self.window.checked_mul(self.idle_windows);
        if idle.is_none_or(|idle| idle > MAX_IDLE_TIMEOUT) {
            return Err(ConfigError::InvalidLimiter(format!(
                "idle eviction must be at most {}s",
                MAX_IDLE_TIMEOUT.as_secs()
            )));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        self.window
            .saturating_mul(self.idle_windows)
            .min(MAX_IDLE_TIMEOUT)
    }
}

// Rate limit entry - tracks requests per client key
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
    pub last_seen: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }

    // Idle long enough and not inside an open window
    fn is_evictable(&self, now: Instant, window: Duration, idle_timeout: Duration) -> bool {
        let Some(idle) = now.checked_duration_since(self.last_seen) else {
            return false;
        };
        let window_closed = now
            .checked_duration_since(self.window_start)
            .is_some_and(|elapsed| elapsed >= window);
        idle >= idle_timeout && window_closed
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Zero when allowed; time until the current window closes when denied.
    pub retry_after: Duration,
    pub limit: u32,
    pub remaining: u32,
}

/// Per-key fixed-window rate limiter.
///
/// State lives in a sharded [`DashMap`]. The read-modify-write for one key
/// happens while holding that key's shard guard, so two concurrent requests
/// from the same client can never both see a stale count. Different keys
/// on different shards proceed in parallel.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: DashMap<ClientKey, RateLimitEntry>,
    calls: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            windows: DashMap::new(),
            calls: AtomicU64::new(0),
        })
    }

    /// Decide whether a request from `key` at time `now` is admitted.
    pub fn check(&self, key: &ClientKey, now: Instant) -> Decision {
        let decision = {
            let mut entry = self
                .windows
                .entry(key.clone())
                .or_insert_with(|| RateLimitEntry::new(now));
            self.apply(entry.value_mut(), now)
        };
        self.maybe_sweep(now);
        decision
    }

    /// Like [`check`](Self::check), but reads the clock while holding the
    /// key's guard so concurrent requests from one client observe
    /// non-decreasing time.
    pub fn admit(&self, key: &ClientKey) -> Decision {
        let (decision, now) = {
            let mut entry = self
                .windows
                .entry(key.clone())
                .or_insert_with(|| RateLimitEntry::new(self.clock.now()));
            let now = self.clock.now();
            (self.apply(entry.value_mut(), now), now)
        };
        self.maybe_sweep(now);
        decision
    }

    fn apply(&self, entry: &mut RateLimitEntry, now: Instant) -> Decision {
        let window = self.config.window;

        // a clock reading before window_start opens a new window as well
        let expired = now
            .checked_duration_since(entry.window_start)
            .is_none_or(|elapsed| elapsed >= window);
        if expired {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count = entry.count.saturating_add(1);
        entry.last_seen = entry.last_seen.max(now);

        let limit = self.config.max_requests;
        if entry.count > limit {
            // time left in the window, without building an Instant that could overflow
            let elapsed = now.saturating_duration_since(entry.window_start);
            Decision {
                allowed: false,
                retry_after: window.saturating_sub(elapsed),
                limit,
                remaining: 0,
            }
        } else {
            Decision {
                allowed: true,
                retry_after: Duration::ZERO,
                limit,
                remaining: limit - entry.count,
            }
        }
    }

    fn maybe_sweep(&self, now: Instant) {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % SWEEP_EVERY == 0 {
            let evicted = self.sweep(now);
            if evicted > 0 {
                debug!(evicted, remaining = self.windows.len(), "rate limit sweep");
            }
        }
    }

    /// Drop entries that have been idle for `idle_windows` windows.
    ///
    /// Candidates are collected first and removed one by one; the idle
    /// predicate is re-checked under each removal, so an entry that saw
    /// traffic in between stays.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.config.window;
        let idle_timeout = self.config.idle_timeout();

        let stale: Vec<ClientKey> = self
            .windows
            .iter()
            .filter(|e| e.value().is_evictable(now, window, idle_timeout))
            .map(|e| e.key().clone())
            .collect();

        stale
            .into_iter()
            .filter(|key| {
                self.windows
                    .remove_if(key, |_, entry| entry.is_evictable(now, window, idle_timeout))
                    .is_some()
            })
            .count()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    pub fn entry(&self, key: &ClientKey) -> Option<RateLimitEntry> {
        self.windows.get(key).map(|e| *e.value())
    }
}
