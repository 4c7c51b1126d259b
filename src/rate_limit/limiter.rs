//! Per-caller, per-route fixed window rate limiting.
//!
//! Counters live in a sharded concurrent map. The check-and-increment for a
//! key runs under that key's shard lock, so two requests for the same key
//! can never both take the last slot, and keys on other shards proceed in
//! parallel. Expired windows are reset lazily on the next request and
//! removed in bulk by an optional background sweep.

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::clock::Clock;

/// Request budget for one route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

impl WindowEntry {
    fn start(now: DateTime<Utc>, window: Duration) -> Self {
        let millis = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let window = chrono::Duration::milliseconds(millis);
        Self {
            count: 1,
            reset_at: now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

fn retry_after_secs(now: DateTime<Utc>, reset_at: DateTime<Utc>) -> u64 {
    let remaining_ms = u64::try_from((reset_at - now).num_milliseconds()).unwrap_or(0);
    remaining_ms.div_ceil(1000).max(1)
}

/// Fixed window rate limiter keyed by `identifier:route`
///
/// Each instance owns its counters; nothing is process-global.
pub struct RateLimiter {
    entries: DashMap<String, WindowEntry>,
    rules: HashMap<String, RateLimitRule>,
    clock: Arc<dyn Clock>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a limiter without a background sweep
    ///
    /// # Arguments
    ///
    /// * `clock` - Time source for window arithmetic
    /// * `rules` - Budgets by route key, used by [`RateLimiter::check`]
    pub fn new(clock: Arc<dyn Clock>, rules: HashMap<String, RateLimitRule>) -> Self {
        Self {
            entries: DashMap::new(),
            rules,
            clock,
            sweeper: Mutex::new(None),
        }
    }

    /// Create a limiter and start its sweep task on the current tokio runtime
    pub fn spawn(
        clock: Arc<dyn Clock>,
        rules: HashMap<String, RateLimitRule>,
        sweep_interval: Duration,
    ) -> Arc<Self> {
        let limiter = Arc::new(Self::new(clock, rules));
        limiter.start_sweeper(sweep_interval);
        limiter
    }

    /// Configured budget for a route, if any
    pub fn rule_for(&self, route_key: &str) -> Option<RateLimitRule> {
        self.rules.get(route_key).copied()
    }

    /// Count a request against the configured budget of its route
    ///
    /// Routes without a configured rule are not limited.
    pub fn check(&self, identifier: &str, route_key: &str) -> RateDecision {
        match self.rule_for(route_key) {
            Some(rule) => self.allow(identifier, route_key, rule.max_requests, rule.window),
            None => RateDecision::Allowed,
        }
    }

    /// Count a request and decide whether it may proceed
    pub fn allow(
        &self,
        identifier: &str,
        route_key: &str,
        max_requests: u32,
        window: Duration,
    ) -> RateDecision {
        let now = self.clock.now();

        if max_requests == 0 {
            return RateDecision::Denied {
                retry_after_secs: window.as_secs().max(1),
            };
        }

        let key = format!("{}:{}", identifier, route_key);
        match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(WindowEntry::start(now, window));
                RateDecision::Allowed
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now >= entry.reset_at {
                    *entry = WindowEntry::start(now, window);
                    RateDecision::Allowed
                } else if entry.count < max_requests {
                    entry.count += 1;
                    RateDecision::Allowed
                } else {
                    let retry_after_secs = retry_after_secs(now, entry.reset_at);
                    warn!(
                        "Rate limit exceeded for {} on {}, retry after {}s",
                        identifier, route_key, retry_after_secs
                    );
                    RateDecision::Denied { retry_after_secs }
                }
            }
        }
    }

    /// Remove every entry whose window has ended
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Rate limit sweep removed {} expired entries", removed);
        }
        removed
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Start the periodic sweep, replacing any sweep already running
    ///
    /// The task holds only a weak reference and ends on its own once the
    /// limiter is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        if interval.is_zero() {
            warn!("Rate limit sweep interval is zero, sweeper not started");
            return;
        }

        let limiter: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => {
                        limiter.sweep();
                    }
                    None => break,
                }
            }
        });

        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the periodic sweep if one is running
    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
            debug!("Rate limit sweeper stopped");
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}
