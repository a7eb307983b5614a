//! Single global background refresh that keeps the weather cache warm.
//!
//! There is one refresh target for the whole system. Widget instances with
//! different cities share it, and the last saved city wins.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    error::WidgetError,
    model::Unit,
    provider::WeatherProvider,
    store::OptionStore,
    vault::Vault,
};

/// Name of the recurring job registered with the [`Scheduler`].
pub const REFRESH_JOB: &str = "wiw_hourly_update";

/// Option holding the city the recurring job refreshes.
pub const CRON_CITY_OPTION: &str = "wiw_cron_city";

/// Hosting scheduler that runs registered jobs hourly on wall-clock time.
pub trait Scheduler: Send + Sync {
    fn is_scheduled(&self, job: &str) -> Result<bool, WidgetError>;

    /// Register `job` to run at `first_run` and every hour after it.
    fn schedule_hourly(&self, job: &str, first_run: DateTime<Utc>) -> Result<(), WidgetError>;

    /// Cancel `job`; a job that is not registered is not an error.
    fn unschedule(&self, job: &str) -> Result<(), WidgetError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    Unscheduled,
    Scheduled(String),
}

/// What one tick did. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NoTarget,
    NoCredential,
    Refreshed,
    Failed,
}

pub struct RefreshController {
    options: Arc<dyn OptionStore>,
    scheduler: Arc<dyn Scheduler>,
    vault: Arc<Vault>,
    provider: Arc<dyn WeatherProvider>,
}

impl RefreshController {
    pub fn new(
        options: Arc<dyn OptionStore>,
        scheduler: Arc<dyn Scheduler>,
        vault: Arc<Vault>,
        provider: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self { options, scheduler, vault, provider }
    }

    /// Point the refresh at `city`, registering the hourly job if needed.
    pub fn schedule(&self, city: &str) -> Result<(), WidgetError> {
        let city = city.trim();
        if city.is_empty() {
            return self.unschedule();
        }

        if !self.scheduler.is_scheduled(REFRESH_JOB)? {
            self.scheduler.schedule_hourly(REFRESH_JOB, Utc::now())?;
            info!(city, "registered hourly weather refresh");
        }
        self.options.set(CRON_CITY_OPTION, city)?;
        Ok(())
    }

    pub fn unschedule(&self) -> Result<(), WidgetError> {
        if self.scheduler.is_scheduled(REFRESH_JOB)? {
            self.scheduler.unschedule(REFRESH_JOB)?;
            info!("cancelled hourly weather refresh");
        }
        self.options.delete(CRON_CITY_OPTION)
    }

    pub fn target_city(&self) -> Result<Option<String>, WidgetError> {
        Ok(self
            .options
            .get(CRON_CITY_OPTION)?
            .map(|city| city.trim().to_string())
            .filter(|city| !city.is_empty()))
    }

    pub fn state(&self) -> Result<RefreshState, WidgetError> {
        if !self.scheduler.is_scheduled(REFRESH_JOB)? {
            return Ok(RefreshState::Unscheduled);
        }
        Ok(match self.target_city()? {
            Some(city) => RefreshState::Scheduled(city),
            None => RefreshState::Unscheduled,
        })
    }

    /// One run of the recurring job. Never fails: every error is logged and
    /// swallowed so the scheduler keeps going.
    pub async fn on_tick(&self) -> TickOutcome {
        let city = match self.target_city() {
            Ok(Some(city)) => city,
            Ok(None) => return TickOutcome::NoTarget,
            Err(e) => {
                warn!(error = %e, "could not read refresh target");
                return TickOutcome::NoTarget;
            }
        };

        let credential = match self.vault.retrieve() {
            Ok(credential) => credential,
            Err(e) if e.is_credential_error() => {
                debug!(error = %e, "skipping weather refresh without a usable API key");
                return TickOutcome::NoCredential;
            }
            Err(e) => {
                warn!(error = %e, "could not read API key for weather refresh");
                return TickOutcome::NoCredential;
            }
        };

        match self.provider.fetch(&city, &credential, Unit::default()).await {
            Ok(_) => {
                debug!(city, "weather cache refreshed");
                TickOutcome::Refreshed
            }
            Err(e) => {
                warn!(city, error = %e, "background weather refresh failed");
                TickOutcome::Failed
            }
        }
    }

    /// Re-establish the schedule when a target city survived reinstallation.
    pub fn activate(&self) -> Result<(), WidgetError> {
        match self.target_city()? {
            Some(city) => self.schedule(&city),
            None => Ok(()),
        }
    }

    pub fn deactivate(&self) -> Result<(), WidgetError> {
        self.unschedule()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        fingerprint::cache_key,
        provider::OpenWeatherFetcher,
        store::{CacheStore, MemoryCache, MemoryOptions},
        vault::{API_KEY_OPTION, VaultSecrets},
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scheduler double that counts registrations.
    #[derive(Default)]
    pub(crate) struct CountingScheduler {
        jobs: Mutex<HashMap<String, DateTime<Utc>>>,
        pub(crate) registrations: Mutex<usize>,
    }

    impl Scheduler for CountingScheduler {
        fn is_scheduled(&self, job: &str) -> Result<bool, WidgetError> {
            Ok(self.jobs.lock().contains_key(job))
        }

        fn schedule_hourly(&self, job: &str, first_run: DateTime<Utc>) -> Result<(), WidgetError> {
            *self.registrations.lock() += 1;
            self.jobs.lock().insert(job.to_string(), first_run);
            Ok(())
        }

        fn unschedule(&self, job: &str) -> Result<(), WidgetError> {
            self.jobs.lock().remove(job);
            Ok(())
        }
    }

    impl CountingScheduler {
        pub(crate) fn active_jobs(&self) -> usize {
            self.jobs.lock().len()
        }
    }

    struct Fixture {
        options: Arc<MemoryOptions>,
        cache: Arc<MemoryCache>,
        scheduler: Arc<CountingScheduler>,
        vault: Arc<Vault>,
        controller: RefreshController,
    }

    fn fixture(base_url: &str) -> Fixture {
        let options = Arc::new(MemoryOptions::new());
        let cache = Arc::new(MemoryCache::new());
        let scheduler = Arc::new(CountingScheduler::default());
        let vault = Arc::new(Vault::new(VaultSecrets::new("auth-secret", "nonce-secret"), options.clone()));
        let provider = Arc::new(OpenWeatherFetcher::with_base_url(cache.clone(), base_url));
        let controller = RefreshController::new(options.clone(), scheduler.clone(), vault.clone(), provider);
        Fixture { options, cache, scheduler, vault, controller }
    }

    fn tokyo_body() -> serde_json::Value {
        serde_json::json!({
            "name": "Tokyo",
            "weather": [{"description": "clear sky", "icon": "01n"}],
            "main": {"temp": 18.0, "feels_like": 17.5, "temp_min": 16.0, "temp_max": 19.0, "humidity": 60, "pressure": 1018},
            "wind": {"speed": 2.1},
            "visibility": 10000
        })
    }

    #[test]
    fn schedule_twice_registers_one_job() {
        let f = fixture("http://127.0.0.1:9");

        f.controller.schedule("Tokyo").unwrap();
        f.controller.schedule("Tokyo").unwrap();

        assert_eq!(*f.scheduler.registrations.lock(), 1);
        assert_eq!(f.scheduler.active_jobs(), 1);
        assert_eq!(f.controller.state().unwrap(), RefreshState::Scheduled("Tokyo".into()));
    }

    #[test]
    fn rescheduling_updates_target_city_only() {
        let f = fixture("http://127.0.0.1:9");

        f.controller.schedule("Tokyo").unwrap();
        f.controller.schedule("Osaka").unwrap();

        assert_eq!(*f.scheduler.registrations.lock(), 1);
        assert_eq!(f.options.get(CRON_CITY_OPTION).unwrap().as_deref(), Some("Osaka"));
    }

    #[test]
    fn unschedule_is_idempotent() {
        let f = fixture("http://127.0.0.1:9");

        f.controller.unschedule().unwrap();
        f.controller.schedule("Tokyo").unwrap();
        f.controller.unschedule().unwrap();
        f.controller.unschedule().unwrap();

        assert_eq!(f.scheduler.active_jobs(), 0);
        assert_eq!(f.controller.target_city().unwrap(), None);
        assert_eq!(f.controller.state().unwrap(), RefreshState::Unscheduled);
    }

    #[test]
    fn scheduling_blank_city_unschedules() {
        let f = fixture("http://127.0.0.1:9");

        f.controller.schedule("Tokyo").unwrap();
        f.controller.schedule("   ").unwrap();

        assert_eq!(f.controller.state().unwrap(), RefreshState::Unscheduled);
    }

    #[test]
    fn activate_restores_lost_registration() {
        let f = fixture("http://127.0.0.1:9");
        f.options.set(CRON_CITY_OPTION, "Tokyo").unwrap();

        f.controller.activate().unwrap();

        assert_eq!(f.scheduler.active_jobs(), 1);
        assert_eq!(f.controller.state().unwrap(), RefreshState::Scheduled("Tokyo".into()));
    }

    #[test]
    fn activate_without_city_does_nothing() {
        let f = fixture("http://127.0.0.1:9");
        f.controller.activate().unwrap();
        assert_eq!(*f.scheduler.registrations.lock(), 0);
    }

    #[test]
    fn deactivate_clears_job_and_city() {
        let f = fixture("http://127.0.0.1:9");
        f.controller.schedule("Tokyo").unwrap();

        f.controller.deactivate().unwrap();

        assert_eq!(f.scheduler.active_jobs(), 0);
        assert_eq!(f.options.get(CRON_CITY_OPTION).unwrap(), None);
    }

    #[tokio::test]
    async fn tick_without_city_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokyo_body()))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server.uri());
        f.vault.store("key").unwrap();

        assert_eq!(f.controller.on_tick().await, TickOutcome::NoTarget);
    }

    #[tokio::test]
    async fn tick_without_credential_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokyo_body()))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server.uri());
        f.controller.schedule("Tokyo").unwrap();

        assert_eq!(f.controller.on_tick().await, TickOutcome::NoCredential);
    }

    #[tokio::test]
    async fn tick_warms_metric_cache_for_target_city() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "Tokyo"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokyo_body()))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri());
        f.vault.store("key").unwrap();
        f.controller.schedule("Tokyo").unwrap();

        assert_eq!(f.controller.on_tick().await, TickOutcome::Refreshed);
        assert!(f.cache.get(&cache_key("tokyo", Unit::Metric)).unwrap().is_some());
    }

    #[tokio::test]
    async fn tick_swallows_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "Invalid API key"})))
            .mount(&server)
            .await;

        let f = fixture(&server.uri());
        f.vault.store("key").unwrap();
        f.controller.schedule("Tokyo").unwrap();

        assert_eq!(f.controller.on_tick().await, TickOutcome::Failed);
        assert!(f.cache.is_empty());
    }

    /// Options that hold a refresh city but cannot read the stored key.
    struct UnreadableKeyOptions(MemoryOptions);

    impl OptionStore for UnreadableKeyOptions {
        fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
            if key == API_KEY_OPTION {
                return Err(WidgetError::Store("permission denied".into()));
            }
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), WidgetError> {
            self.0.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), WidgetError> {
            self.0.delete(key)
        }
    }

    #[tokio::test]
    async fn tick_with_unreadable_key_skips_the_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tokyo_body()))
            .expect(0)
            .mount(&server)
            .await;

        let options = Arc::new(UnreadableKeyOptions(MemoryOptions::new()));
        options.set(CRON_CITY_OPTION, "Tokyo").unwrap();
        let vault = Arc::new(Vault::new(VaultSecrets::new("auth-secret", "nonce-secret"), options.clone()));
        let provider = Arc::new(OpenWeatherFetcher::with_base_url(Arc::new(MemoryCache::new()), server.uri()));
        let controller =
            RefreshController::new(options, Arc::new(CountingScheduler::default()), vault, provider);

        assert_eq!(controller.on_tick().await, TickOutcome::NoCredential);
    }
}
