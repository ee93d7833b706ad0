// Redis fixed-window rate limiting
// INCR + EXPIRE on the first increment of each window. Redis being down
// fails open so an infra outage never locks users out.

use crate::app_config::config;
use crate::db::RedisPool;

#[derive(Clone)]
pub struct RateLimitService {
    redis: RedisPool,
}

impl RateLimitService {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    /// Whether the caller identified by `key` is within `limit` actions in
    /// the current window.
    pub async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> bool {
        if !config().enable_rate_limiting {
            return true;
        }

        match self.redis.incr_with_window(key, window_seconds).await {
            Ok(count) => count <= limit as u64,
            Err(e) => {
                tracing::warn!("Rate limit check failed for {}, allowing: {}", key, e);
                true
            },
        }
    }

    /// Per-IP login attempt limiting
    pub async fn check_login(&self, ip: &str) -> bool {
        let sec = &config().security;
        self.check(
            &format!("rl:login:{}", ip),
            sec.login_rate_limit_per_ip,
            sec.login_rate_window_seconds,
        )
        .await
    }

    /// Per-IP+visitor limiting on the public click tracking endpoint
    pub async fn check_track_click(&self, ip: &str, visitor: &str) -> bool {
        let sec = &config().security;
        self.check(
            &format!("rl:track:{}:{}", ip, visitor),
            sec.track_click_rate_limit,
            sec.track_click_rate_window_seconds,
        )
        .await
    }
}
