//! Good-citizen request hygiene: realistic user agents, browser-like headers,
//! and one token-bucket pacer per external dependency.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Collection of realistic user agents for rotation
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
];

pub fn get_random_user_agent() -> &'static str {
    let index = rand::random::<u32>() as usize % USER_AGENTS.len();
    USER_AGENTS[index]
}

/// Headers sent alongside the user agent on every page fetch.
pub fn get_browser_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("DNT", "1"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
    ]
}

/// Slowest pace a configured rate can ask for.
const MAX_PACER_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Token-bucket pacer for one external dependency.
///
/// Cloning shares the bucket, so every worker that holds a clone draws from
/// the same budget.
#[derive(Clone)]
pub struct Pacer {
    name: &'static str,
    period: Duration,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer").field("name", &self.name).finish()
    }
}

impl Pacer {
    /// `requests_per_second` may be fractional (0.5 = one request every 2s).
    /// Non-positive rates fall back to one request per second; the interval
    /// between requests is clamped to at most an hour.
    pub fn per_second(name: &'static str, requests_per_second: f64, burst: u32) -> Self {
        let period = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .unwrap_or(MAX_PACER_PERIOD)
                .clamp(Duration::from_nanos(1), MAX_PACER_PERIOD)
        } else {
            Duration::from_secs(1)
        };
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            name,
            period,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Interval at which the bucket refills one token.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait until the bucket has a token for one request.
    pub async fn ready(&self) {
        if self.limiter.check().is_err() {
            debug!(pacer = self.name, "waiting for rate-limit token");
            self.limiter.until_ready().await;
        }
    }
}

/// One pacer per external dependency.
#[derive(Clone, Debug)]
pub struct RateLimiters {
    pub search: Pacer,
    pub website: Pacer,
    pub social: Pacer,
}

impl RateLimiters {
    pub fn new(search_rps: f64, website_rps: f64, social_rps: f64) -> Self {
        Self {
            search: Pacer::per_second("search", search_rps, 2),
            website: Pacer::per_second("website", website_rps, 4),
            social: Pacer::per_second("social", social_rps, 1),
        }
    }

    /// Limits high enough that nothing ever waits; for tests and dry runs.
    pub fn unlimited() -> Self {
        Self {
            search: Pacer::per_second("search", 10_000.0, 10_000),
            website: Pacer::per_second("website", 10_000.0, 10_000),
            social: Pacer::per_second("social", 10_000.0, 10_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agents() {
        assert!(!USER_AGENTS.is_empty());
        assert!(get_random_user_agent().contains("Mozilla"));
    }

    #[test]
    fn test_browser_headers_have_accept() {
        assert!(get_browser_headers().iter().any(|(k, _)| *k == "Accept"));
    }

    #[tokio::test]
    async fn test_pacer_allows_burst_without_waiting() {
        let pacer = Pacer::per_second("test", 1.0, 3);
        let start = std::time::Instant::now();
        for _ in 0..3 {
            pacer.ready().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_pacer_waits_once_burst_is_spent() {
        let pacer = Pacer::per_second("test", 20.0, 1);
        pacer.ready().await;
        let start = std::time::Instant::now();
        pacer.ready().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_invalid_rate_falls_back() {
        let pacer = Pacer::per_second("bad", -3.0, 0);
        assert_eq!(pacer.name(), "bad");
        assert_eq!(pacer.period(), Duration::from_secs(1));
    }

    #[test]
    fn test_extreme_rates_are_clamped() {
        assert_eq!(Pacer::per_second("slow", 1e-300, 1).period(), MAX_PACER_PERIOD);
        assert_eq!(Pacer::per_second("fast", 1e300, 1).period(), Duration::from_nanos(1));
        assert_eq!(Pacer::per_second("half", 0.5, 1).period(), Duration::from_secs(2));
    }
}
