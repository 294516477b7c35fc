//! Counter-based request throttling on top of the TTL cache

use std::time::Duration;

use log::warn;

use crate::core::cache::TtlCache;
use crate::core::error::{AppError, AppResult};

/// Fixed-window attempt limit
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Attempts allowed inside one window
    pub max_attempts: i64,
    /// Window length, starting at the first attempt
    pub window: Duration,
}

/// Login and reset-code requests per email
pub const AUTH_LIMIT: RateLimit = RateLimit {
    max_attempts: 5,
    window: Duration::from_secs(30 * 60),
};

/// Reset-code resends per email
pub const RESEND_LIMIT: RateLimit = RateLimit {
    max_attempts: 5,
    window: Duration::from_secs(10 * 60),
};

/// Minimum gap between two reset codes for the same email
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

pub fn auth_key(email: &str) -> String {
    format!("auth:{}", email)
}

pub fn resend_key(email: &str) -> String {
    format!("resendOtp:{}", email)
}

pub fn cooldown_key(email: &str) -> String {
    format!("coolDown:{}", email)
}

/// Count one attempt against `key`
pub fn hit(cache: &TtlCache, key: &str, limit: RateLimit) -> AppResult<i64> {
    let count = cache.incr(key);
    if count == 1 {
        cache.expire(key, limit.window);
    }

    if count > limit.max_attempts {
        warn!("Rate limit exceeded for {}", key);
        return Err(AppError::TooManyRequests("too many request".to_string()));
    }
    Ok(count)
}

/// Forget all attempts counted against `key`
pub fn reset(cache: &TtlCache, key: &str) {
    cache.del(key);
}

/// Fail while a cooldown on `key` is still running
pub fn check_cooldown(cache: &TtlCache, key: &str) -> AppResult<()> {
    match cache.ttl(key) {
        Some(remaining) => {
            // Round up so the client never sees "0s"
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            Err(AppError::TooManyRequests(format!(
                "please wait {}s before resending OTP",
                secs
            )))
        }
        None => Ok(()),
    }
}

pub fn start_cooldown(cache: &TtlCache, key: &str, duration: Duration) {
    cache.set(key, "1", Some(duration));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixth_attempt_is_rejected() {
        let cache = TtlCache::new();
        let key = auth_key("a@b.c");

        for attempt in 1..=5 {
            assert_eq!(hit(&cache, &key, AUTH_LIMIT).unwrap(), attempt);
        }
        let err = hit(&cache, &key, AUTH_LIMIT).unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_)));

        let remaining = cache.ttl(&key).unwrap();
        assert!(remaining <= AUTH_LIMIT.window);
    }

    #[test]
    fn test_reset_clears_attempts() {
        let cache = TtlCache::new();
        let key = auth_key("a@b.c");
        for _ in 0..5 {
            hit(&cache, &key, AUTH_LIMIT).unwrap();
        }
        reset(&cache, &key);
        assert_eq!(hit(&cache, &key, AUTH_LIMIT).unwrap(), 1);
    }

    #[test]
    fn test_cooldown() {
        let cache = TtlCache::new();
        let key = cooldown_key("a@b.c");
        assert!(check_cooldown(&cache, &key).is_ok());

        start_cooldown(&cache, &key, RESEND_COOLDOWN);
        match check_cooldown(&cache, &key) {
            Err(AppError::TooManyRequests(msg)) => {
                assert_eq!(msg, "please wait 60s before resending OTP")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
