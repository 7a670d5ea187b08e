use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::models::Id;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut hits = self.store.entry(key.to_string()).or_default();
        while hits.front().is_some_and(|t| now.duration_since(*t) >= window) {
            hits.pop_front();
        }
        if hits.len() >= limit {
            return false;
        }
        hits.push_back(now);
        true
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Verification code requests (email verification, deletion, password reset).
    pub code_limit: usize,
    pub code_window: Duration,
    pub upload_limit: usize,
    pub upload_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            code_limit: 3,
            code_window: Duration::from_secs(600),
            upload_limit: 30,
            upload_window: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: Duration) -> Duration {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default)
        }
        let d = Self::default();
        Self {
            enabled: std::env::var("RL_ENABLED").map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(d.enabled),
            code_limit: usize_env("RL_CODE_LIMIT", d.code_limit),
            code_window: dur_env("RL_CODE_WINDOW", d.code_window),
            upload_limit: usize_env("RL_UPLOAD_LIMIT", d.upload_limit),
            upload_window: dur_env("RL_UPLOAD_WINDOW", d.upload_window),
        }
    }
}

/// Per-action guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self { limiter: InMemoryRateLimiter::new(cfg.enabled), cfg }
    }
    /// `subject` is a user id or, for anonymous password resets, an email.
    pub fn allow_code(&self, subject: &str) -> bool {
        self.limiter.check(&format!("code:{subject}"), self.cfg.code_limit, self.cfg.code_window)
    }
    pub fn allow_upload(&self, user_id: Id) -> bool {
        self.limiter.check(&format!("upload:{user_id}"), self.cfg.upload_limit, self.cfg.upload_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 { assert!(rl.check("k", 3, window)); }
        assert!(!rl.check("k", 3, window));
        std::thread::sleep(Duration::from_millis(60));
        assert!(rl.check("k", 3, window));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let rl = InMemoryRateLimiter::new(false);
        for _ in 0..10 { assert!(rl.check("k", 1, Duration::from_secs(60))); }
    }

    #[test]
    fn code_and_upload_buckets_are_independent() {
        let facade = RateLimiterFacade::new(RateLimitConfig {
            enabled: true,
            code_limit: 1,
            code_window: Duration::from_secs(60),
            upload_limit: 1,
            upload_window: Duration::from_secs(60),
        });
        assert!(facade.allow_code("7"));
        assert!(!facade.allow_code("7"));
        assert!(facade.allow_code("8"));
        assert!(facade.allow_upload(7));
        assert!(!facade.allow_upload(7));
    }
}
