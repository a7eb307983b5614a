use anyhow::{Context, Result};
use std::sync::Arc;

use weather_core::{
    CacheStore, Config, FileCache, FileOptions, InvalidationPolicy, OpenWeatherFetcher,
    OptionScheduler, OptionStore, RefreshController, Vault, VaultSecrets, WeatherProvider, Widget,
};

pub const AUTH_KEY_ENV: &str = "WIW_SECURE_AUTH_KEY";
pub const NONCE_KEY_ENV: &str = "WIW_NONCE_KEY";
pub const BASE_URL_ENV: &str = "WIW_API_BASE_URL";

/// Everything the commands need, wired against the on-disk stores.
pub struct App {
    pub widget: Widget,
    pub refresh: Arc<RefreshController>,
    pub scheduler: Arc<OptionScheduler>,
}

impl App {
    pub fn build() -> Result<Self> {
        let secrets = secrets_from_env()?;

        let options: Arc<dyn OptionStore> = Arc::new(FileOptions::new(Config::options_file_path()?));
        let cache: Arc<dyn CacheStore> = Arc::new(FileCache::new(Config::cache_file_path()?));

        let provider: Arc<dyn WeatherProvider> = match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => {
                Arc::new(OpenWeatherFetcher::with_base_url(cache.clone(), url.trim()))
            }
            _ => Arc::new(OpenWeatherFetcher::new(cache.clone())),
        };

        let vault = Arc::new(Vault::new(secrets, options.clone()));
        let scheduler = Arc::new(OptionScheduler::new(options.clone()));
        let refresh = Arc::new(RefreshController::new(
            options,
            scheduler.clone(),
            vault.clone(),
            provider.clone(),
        ));
        let widget = Widget::new(vault, provider, InvalidationPolicy::new(cache), refresh.clone());

        Ok(Self { widget, refresh, scheduler })
    }
}

fn secrets_from_env() -> Result<VaultSecrets> {
    let auth = std::env::var(AUTH_KEY_ENV).with_context(|| {
        format!("{AUTH_KEY_ENV} is not set.\nHint: export {AUTH_KEY_ENV} and {NONCE_KEY_ENV} before running.")
    })?;
    let nonce = std::env::var(NONCE_KEY_ENV).with_context(|| {
        format!("{NONCE_KEY_ENV} is not set.\nHint: export {AUTH_KEY_ENV} and {NONCE_KEY_ENV} before running.")
    })?;

    Ok(VaultSecrets::new(auth, nonce))
}
