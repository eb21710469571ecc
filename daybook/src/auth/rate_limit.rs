//! Per-client-IP token buckets for the auth endpoints.

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::{Error, Result};

pub struct KeyedLimiter {
    name: &'static str,
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl KeyedLimiter {
    /// `per_minute == 0` disables the limiter.
    pub fn per_minute(name: &'static str, per_minute: u32) -> Self {
        let limiter = NonZeroU32::new(per_minute).map(|n| RateLimiter::keyed(Quota::per_minute(n)));
        Self { name, limiter }
    }

    pub fn check(&self, key: &str) -> Result<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        limiter.check_key(&key.to_string()).map_err(|_| {
            metrics::counter!("daybook_rate_limited_total", "endpoint" => self.name).increment(1);
            Error::RateLimited(format!("too many {} attempts, try again later", self.name))
        })
    }
}
