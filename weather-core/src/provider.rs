use async_trait::async_trait;
use std::time::Duration;

use crate::{error::WidgetError, model::Unit, model::WeatherSnapshot, vault::Credential};

pub mod openweather;

pub use openweather::OpenWeatherFetcher;

/// Upstream request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a fetched snapshot stays authoritative.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Source of weather snapshots for the render path and the refresh controller.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(
        &self,
        city: &str,
        credential: &Credential,
        unit: Unit,
    ) -> Result<WeatherSnapshot, WidgetError>;
}

/// The outgoing upstream call, as seen by [`FetchHooks::request`].
#[derive(Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

impl std::fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `appid` holds the credential.
        let query: Vec<_> = self
            .query
            .iter()
            .map(|(k, v)| if k == "appid" { (k.as_str(), "<redacted>") } else { (k.as_str(), v.as_str()) })
            .collect();
        f.debug_struct("UpstreamRequest")
            .field("url", &self.url)
            .field("query", &query)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Optional behaviour injected at construction. Every method defaults to a
/// pass-through, so [`NoHooks`] leaves the fetcher's behaviour untouched.
pub trait FetchHooks: Send + Sync {
    /// Adjust URL, query or timeout before the upstream call.
    fn request(&self, request: UpstreamRequest, _city: &str, _unit: Unit) -> UpstreamRequest {
        request
    }

    /// Transform a decoded snapshot before it is cached and returned.
    fn snapshot(&self, snapshot: WeatherSnapshot, _city: &str, _unit: Unit) -> WeatherSnapshot {
        snapshot
    }

    /// Override how long the snapshot stays cached.
    fn cache_ttl(&self, ttl: Duration, _city: &str, _unit: Unit) -> Duration {
        ttl
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl FetchHooks for NoHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_hooks_pass_everything_through() {
        let request = UpstreamRequest {
            url: "https://example.test/data/2.5/weather".into(),
            query: vec![("q".into(), "Oslo".into())],
            timeout: REQUEST_TIMEOUT,
        };
        let passed = NoHooks.request(request.clone(), "Oslo", Unit::Metric);

        assert_eq!(passed.url, request.url);
        assert_eq!(passed.query, request.query);
        assert_eq!(NoHooks.cache_ttl(CACHE_TTL, "Oslo", Unit::Metric), CACHE_TTL);
    }

    #[test]
    fn request_debug_hides_appid() {
        let request = UpstreamRequest {
            url: "https://example.test".into(),
            query: vec![("appid".into(), "secret-key".into())],
            timeout: REQUEST_TIMEOUT,
        };
        let out = format!("{request:?}");
        assert!(!out.contains("secret-key"));
        assert!(out.contains("<redacted>"));
    }
}
