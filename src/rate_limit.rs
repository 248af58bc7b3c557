//! Sliding-window throttling for credential guessing.
//!
//! Failures are counted per key (email or source address) inside a window;
//! hitting the cap locks the key out, and each repeat lockout doubles the
//! penalty. Successful authentication clears the slate.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::AuthConfig;

// Upper bound on lockout doubling so repeat offenders plateau instead of
// overflowing.
const MAX_LOCKOUT_SHIFT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    Login,
    Mfa,
}

impl RateLimitAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Mfa => "mfa",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    #[must_use]
    pub const fn allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Seam for throttling checks so service tests can swap in a double.
pub trait RateLimiter: Send + Sync {
    fn check(&self, action: RateLimitAction, key: &str) -> RateLimitDecision;
    fn record_failure(&self, action: RateLimitAction, key: &str);
    fn record_success(&self, action: RateLimitAction, key: &str);
}

/// Limiter that never limits. For tests and trusted internal callers.
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _action: RateLimitAction, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
    fn record_failure(&self, _action: RateLimitAction, _key: &str) {}
    fn record_success(&self, _action: RateLimitAction, _key: &str) {}
}

struct Entry {
    failures: VecDeque<Instant>,
    locked_until: Option<Instant>,
    strikes: u32,
}

/// In-process sliding window limiter.
pub struct WindowRateLimiter {
    max_failures: u32,
    window: Duration,
    base_lockout: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(max_failures: u32, window: Duration, base_lockout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            window,
            base_lockout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.rate_limit_max_failures(),
            Duration::from_secs(config.rate_limit_window_seconds()),
            Duration::from_secs(config.rate_limit_lockout_seconds()),
        )
    }

    fn compound_key(action: RateLimitAction, key: &str) -> String {
        format!("{}:{key}", action.as_str())
    }

    fn lockout_for(&self, strikes: u32) -> Duration {
        self.base_lockout * 2u32.pow(strikes.min(MAX_LOCKOUT_SHIFT))
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check(&self, action: RateLimitAction, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get_mut(&Self::compound_key(action, key)) else {
            return RateLimitDecision::Allowed;
        };
        match entry.locked_until {
            Some(until) if until > now => RateLimitDecision::Limited {
                retry_after: until - now,
            },
            _ => {
                entry.locked_until = None;
                RateLimitDecision::Allowed
            }
        }
    }

    fn record_failure(&self, action: RateLimitAction, key: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(Self::compound_key(action, key))
            .or_insert_with(|| Entry {
                failures: VecDeque::new(),
                locked_until: None,
                strikes: 0,
            });
        while let Some(front) = entry.failures.front() {
            if now.duration_since(*front) > self.window {
                entry.failures.pop_front();
            } else {
                break;
            }
        }
        entry.failures.push_back(now);
        if entry.failures.len() >= self.max_failures as usize {
            let lockout = self.lockout_for(entry.strikes);
            entry.locked_until = Some(now + lockout);
            entry.strikes = entry.strikes.saturating_add(1);
            entry.failures.clear();
        }
    }

    fn record_success(&self, action: RateLimitAction, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&Self::compound_key(action, key));
    }
}
