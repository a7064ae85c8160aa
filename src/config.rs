use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Which completion wins when several requests for one view overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessPolicy {
    /// Whatever arrives last replaces the view, even an older request.
    LastArrival,
    /// Completions older than the last applied request are dropped.
    NewestIssued,
}

/// What a poll tick does with a view's request that is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    FireAndForget,
    CancelPrevious,
}

impl FreshnessPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "last_arrival" => Some(FreshnessPolicy::LastArrival),
            "newest_issued" => Some(FreshnessPolicy::NewestIssued),
            _ => None,
        }
    }
}

impl OverlapPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fire_and_forget" => Some(OverlapPolicy::FireAndForget),
            "cancel_previous" => Some(OverlapPolicy::CancelPrevious),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: Option<u64>,
    pub freshness: FreshnessPolicy,
    pub overlap: OverlapPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval_ms: 1000,
            request_timeout_ms: None,
            freshness: FreshnessPolicy::LastArrival,
            overlap: OverlapPolicy::FireAndForget,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("EXECDASH_URL").unwrap_or(defaults.api_url),
            poll_interval_ms: std::env::var("EXECDASH_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.poll_interval_ms),
            request_timeout_ms: std::env::var("EXECDASH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            freshness: std::env::var("EXECDASH_FRESHNESS")
                .ok()
                .and_then(|v| FreshnessPolicy::parse(&v))
                .unwrap_or(defaults.freshness),
            overlap: std::env::var("EXECDASH_OVERLAP")
                .ok()
                .and_then(|v| OverlapPolicy::parse(&v))
                .unwrap_or(defaults.overlap),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_source_behavior() {
        let cfg = Config::default();
        assert_eq!(cfg.api_url, "http://localhost:8080/api");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert!(cfg.request_timeout().is_none());
        assert_eq!(cfg.freshness, FreshnessPolicy::LastArrival);
        assert_eq!(cfg.overlap, OverlapPolicy::FireAndForget);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(FreshnessPolicy::parse("newest_issued"), Some(FreshnessPolicy::NewestIssued));
        assert_eq!(OverlapPolicy::parse("cancel_previous"), Some(OverlapPolicy::CancelPrevious));
        assert_eq!(OverlapPolicy::parse("bogus"), None);
    }
}
