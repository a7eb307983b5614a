use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    error::{UNKNOWN_API_ERROR, WidgetError},
    fingerprint::cache_key,
    model::{Condition, Unit, WeatherSnapshot},
    store::CacheStore,
    vault::Credential,
};

use super::{CACHE_TTL, FetchHooks, NoHooks, REQUEST_TIMEOUT, UpstreamRequest, WeatherProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const CURRENT_WEATHER_PATH: &str = "/data/2.5/weather";

/// Current-weather client with a one-hour cache in front of it.
pub struct OpenWeatherFetcher {
    http: Client,
    base_url: String,
    cache: Arc<dyn CacheStore>,
    hooks: Arc<dyn FetchHooks>,
}

impl OpenWeatherFetcher {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self::with_base_url(cache, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(cache: Arc<dyn CacheStore>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn FetchHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    fn upstream_request(&self, city: &str, credential: &Credential, unit: Unit) -> UpstreamRequest {
        UpstreamRequest {
            url: format!("{}{}", self.base_url, CURRENT_WEATHER_PATH),
            query: vec![
                ("q".to_string(), city.to_string()),
                ("appid".to_string(), credential.expose().to_string()),
                ("units".to_string(), unit.as_str().to_string()),
            ],
            timeout: REQUEST_TIMEOUT,
        }
    }

    fn cached(&self, key: &str) -> Result<Option<WeatherSnapshot>, WidgetError> {
        let Some(raw) = self.cache.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(error = %e, "cached weather payload no longer decodes; refetching");
                Ok(None)
            }
        }
    }

    async fn fetch_current(&self, request: &UpstreamRequest) -> Result<WeatherSnapshot, WidgetError> {
        // The URL carries the credential, so it is stripped from transport errors.
        let res = self
            .http
            .get(&request.url)
            .query(&request.query)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| WidgetError::Network(e.without_url()))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| WidgetError::Network(e.without_url()))?;

        if status != StatusCode::OK {
            return Err(WidgetError::UpstreamApi {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        parse_current(&body)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherFetcher {
    #[instrument(skip(self, credential))]
    async fn fetch(
        &self,
        city: &str,
        credential: &Credential,
        unit: Unit,
    ) -> Result<WeatherSnapshot, WidgetError> {
        let key = cache_key(city, unit);

        if let Some(snapshot) = self.cached(&key)? {
            debug!("weather cache hit");
            return Ok(snapshot);
        }
        debug!("weather cache miss; calling OpenWeather");

        let request = self.hooks.request(self.upstream_request(city, credential, unit), city, unit);
        let snapshot = self.fetch_current(&request).await?;
        let snapshot = self.hooks.snapshot(snapshot, city, unit);

        let ttl = self.hooks.cache_ttl(CACHE_TTL, city, unit);
        match serde_json::to_string(&snapshot) {
            Ok(payload) => {
                if let Err(e) = self.cache.set(&key, payload, ttl) {
                    warn!(error = %e, "failed to cache weather snapshot");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode weather snapshot for caching"),
        }

        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
struct OwErrorBody {
    message: Option<String>,
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<OwErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| UNKNOWN_API_ERROR.to_string())
}

fn parse_current(body: &str) -> Result<WeatherSnapshot, WidgetError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| WidgetError::Parse(e.to_string()))?;

    match value.as_object() {
        Some(map) if !map.is_empty() => {}
        _ => return Err(WidgetError::Parse("expected a non-empty JSON object".to_string())),
    }

    let parsed: OwCurrentResponse =
        serde_json::from_value(value).map_err(|e| WidgetError::Parse(e.to_string()))?;

    Ok(parsed.into())
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: u8,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    #[serde(default)]
    icon: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: OwWind,
    visibility: Option<u32>,
}

impl From<OwCurrentResponse> for WeatherSnapshot {
    fn from(parsed: OwCurrentResponse) -> Self {
        let condition = parsed
            .weather
            .into_iter()
            .next()
            .map(|w| Condition { icon: w.icon, description: w.description })
            .unwrap_or_default();

        WeatherSnapshot {
            location_name: parsed.name,
            temperature: parsed.main.temp,
            feels_like: parsed.main.feels_like,
            temp_min: parsed.main.temp_min,
            temp_max: parsed.main.temp_max,
            humidity_pct: parsed.main.humidity,
            pressure_hpa: parsed.main.pressure,
            wind_speed: parsed.wind.speed,
            visibility_m: parsed.visibility,
            condition,
        }
    }
}
