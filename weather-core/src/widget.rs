//! Entry points the hosting environment calls: settings saves, the render
//! path and activation hooks.

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::WidgetError,
    invalidation::InvalidationPolicy,
    model::{DisplayLayout, DisplayStyle, Unit, WeatherSnapshot, WidgetConfig},
    provider::WeatherProvider,
    refresh::RefreshController,
    vault::Vault,
};

pub const MISSING_CITY_MESSAGE: &str = "Please set a city in widget settings.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKeyOutcome {
    /// Blank submission; the stored key was kept.
    Unchanged,
    /// New key encrypted and stored; cached weather purged.
    Replaced,
}

/// Everything a presenter needs to draw one widget.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherView {
    pub style: DisplayStyle,
    pub layout: DisplayLayout,
    pub unit: Unit,
    pub snapshot: WeatherSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderBody {
    Message(String),
    Weather(WeatherView),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// Absent when rendering stopped before the title would be shown.
    pub title: Option<String>,
    pub body: RenderBody,
}

impl Rendered {
    fn message(title: Option<String>, text: impl Into<String>) -> Self {
        Self { title, body: RenderBody::Message(text.into()) }
    }
}

pub struct Widget {
    vault: Arc<Vault>,
    provider: Arc<dyn WeatherProvider>,
    invalidation: InvalidationPolicy,
    refresh: Arc<RefreshController>,
}

impl Widget {
    pub fn new(
        vault: Arc<Vault>,
        provider: Arc<dyn WeatherProvider>,
        invalidation: InvalidationPolicy,
        refresh: Arc<RefreshController>,
    ) -> Self {
        Self { vault, provider, invalidation, refresh }
    }

    pub fn refresh(&self) -> &RefreshController {
        &self.refresh
    }

    /// Settings-page save. A blank value keeps the current key.
    pub fn save_api_key(&self, raw: &str) -> Result<SaveKeyOutcome, WidgetError> {
        match self.vault.store(raw) {
            Ok(()) => {}
            Err(WidgetError::EmptyInput) => return Ok(SaveKeyOutcome::Unchanged),
            Err(e) => return Err(e),
        }
        self.invalidation.on_credential_replaced()?;
        info!("API key replaced");
        Ok(SaveKeyOutcome::Replaced)
    }

    /// Whether a key is stored, for showing a masked placeholder. Never decrypts.
    pub fn has_api_key(&self) -> Result<bool, WidgetError> {
        self.vault.is_configured()
    }

    /// Widget form save. Returns the sanitized settings to persist.
    pub fn update(&self, new: WidgetConfig, old: &WidgetConfig) -> Result<WidgetConfig, WidgetError> {
        let new = new.sanitize();

        self.invalidation
            .on_config_change(old.city.trim(), old.unit, &new.city, new.unit)?;

        if new.has_city() {
            self.refresh.schedule(&new.city)?;
        } else {
            self.refresh.unschedule()?;
        }

        Ok(new)
    }

    /// Front-end render. Errors become short messages; nothing here can leak
    /// the key.
    pub async fn render(&self, config: &WidgetConfig) -> Rendered {
        let credential = match self.vault.retrieve() {
            Ok(credential) => credential,
            Err(e) => return Rendered::message(None, e.user_message()),
        };

        if !config.has_city() {
            return Rendered::message(None, MISSING_CITY_MESSAGE);
        }

        let title = Some(config.display_title().to_string());
        match self.provider.fetch(config.city.trim(), &credential, config.unit).await {
            Ok(snapshot) => Rendered {
                title,
                body: RenderBody::Weather(WeatherView {
                    style: config.display_style,
                    layout: config.display_layout,
                    unit: config.unit,
                    snapshot,
                }),
            },
            Err(e) => {
                warn!(error = %e, "weather fetch failed during render");
                Rendered::message(title, e.user_message())
            }
        }
    }

    pub fn activate(&self) -> Result<(), WidgetError> {
        self.refresh.activate()
    }

    pub fn deactivate(&self) -> Result<(), WidgetError> {
        self.refresh.deactivate()
    }
}
