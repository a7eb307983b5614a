//! Core library for the weather widget.
//!
//! This crate defines:
//! - The credential vault (API key encrypted at rest)
//! - The cached OpenWeather fetcher and its cache invalidation rules
//! - The single global hourly refresh and its lifecycle
//! - The save/render entry points a hosting environment calls
//!
//! It is used by `weather-widget`, but any host that can supply a cache, an
//! option store and a scheduler can drive it.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod invalidation;
pub mod model;
pub mod provider;
pub mod refresh;
pub mod schedule;
pub mod store;
pub mod vault;
pub mod widget;

pub use config::Config;
pub use error::WidgetError;
pub use fingerprint::cache_key;
pub use invalidation::InvalidationPolicy;
pub use model::{DisplayLayout, DisplayStyle, Unit, WeatherSnapshot, WidgetConfig};
pub use provider::{FetchHooks, NoHooks, OpenWeatherFetcher, WeatherProvider};
pub use refresh::{RefreshController, RefreshState, Scheduler, TickOutcome};
pub use schedule::{OptionScheduler, run_hourly};
pub use store::{CacheStore, FileCache, FileOptions, MemoryCache, MemoryOptions, OptionStore};
pub use vault::{Credential, Vault, VaultSecrets};
pub use widget::{RenderBody, Rendered, SaveKeyOutcome, WeatherView, Widget};
