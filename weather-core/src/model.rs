use serde::{Deserialize, Deserializer, Serialize, de::IgnoredAny};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Title shown when a widget instance has none configured.
pub const DEFAULT_TITLE: &str = "Weather";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'. Supported values: {supported}.")]
pub struct ParseSettingError {
    kind: &'static str,
    value: String,
    supported: &'static str,
}

/// Measurement system passed to the upstream as `units=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Metric,
    Imperial,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Metric => "metric",
            Unit::Imperial => "imperial",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Unit::Metric => "°C",
            Unit::Imperial => "°F",
        }
    }

    pub fn wind_symbol(&self) -> &'static str {
        match self {
            Unit::Metric => "m/s",
            Unit::Imperial => "mph",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ParseSettingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "metric" => Ok(Unit::Metric),
            "imperial" => Ok(Unit::Imperial),
            _ => Err(ParseSettingError {
                kind: "unit",
                value: value.to_string(),
                supported: "metric, imperial",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStyle {
    #[default]
    Minimal,
    Standard,
    Advanced,
}

impl DisplayStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStyle::Minimal => "minimal",
            DisplayStyle::Standard => "standard",
            DisplayStyle::Advanced => "advanced",
        }
    }
}

impl fmt::Display for DisplayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayStyle {
    type Err = ParseSettingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "minimal" => Ok(DisplayStyle::Minimal),
            "standard" => Ok(DisplayStyle::Standard),
            "advanced" => Ok(DisplayStyle::Advanced),
            _ => Err(ParseSettingError {
                kind: "display style",
                value: value.to_string(),
                supported: "minimal, standard, advanced",
            }),
        }
    }
}

/// Card layout. Only meaningful with [`DisplayStyle::Advanced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayLayout {
    #[default]
    Vertical,
    Horizontal,
}

impl DisplayLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayLayout::Vertical => "vertical",
            DisplayLayout::Horizontal => "horizontal",
        }
    }
}

impl fmt::Display for DisplayLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayLayout {
    type Err = ParseSettingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "vertical" => Ok(DisplayLayout::Vertical),
            "horizontal" => Ok(DisplayLayout::Horizontal),
            _ => Err(ParseSettingError {
                kind: "display layout",
                value: value.to_string(),
                supported: "vertical, horizontal",
            }),
        }
    }
}

/// Read a setting through its `FromStr`, falling back to the default for
/// values this build does not recognize.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text.parse().unwrap_or_default(),
        Raw::Other(_) => T::default(),
    })
}

/// Persisted settings of one widget instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub title: String,
    pub city: String,
    #[serde(deserialize_with = "lenient")]
    pub unit: Unit,
    #[serde(deserialize_with = "lenient")]
    pub display_style: DisplayStyle,
    #[serde(deserialize_with = "lenient")]
    pub display_layout: DisplayLayout,
}

impl WidgetConfig {
    /// Normalize values submitted through the save path.
    pub fn sanitize(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            city: self.city.trim().to_string(),
            ..self
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() { DEFAULT_TITLE } else { self.title.trim() }
    }

    pub fn has_city(&self) -> bool {
        !self.city.trim().is_empty()
    }
}

/// Weather condition used to pick an icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub icon: String,
    pub description: String,
}

impl Default for Condition {
    fn default() -> Self {
        Self { icon: String::new(), description: "Unknown".to_string() }
    }
}

/// One fetched-and-validated weather result, in the units it was requested in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location_name: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_pct: u8,
    pub pressure_hpa: f64,
    pub wind_speed: f64,
    /// Metres; the upstream omits it for some stations.
    pub visibility_m: Option<u32>,
    pub condition: Condition,
}

impl WeatherSnapshot {
    pub fn icon_url(&self) -> Option<String> {
        if self.condition.icon.is_empty() {
            None
        } else {
            Some(format!("https://openweathermap.org/img/wn/{}@2x.png", self.condition.icon))
        }
    }

    pub fn visibility_km(&self) -> Option<f64> {
        self.visibility_m.map(|m| f64::from(m) / 1000.0)
    }
}
