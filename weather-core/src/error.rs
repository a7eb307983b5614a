//! Error taxonomy shared by the vault, the fetcher and the refresh controller.

use thiserror::Error;

/// Fallback text when a non-200 upstream response carries no `message`.
pub const UNKNOWN_API_ERROR: &str = "Unknown API error.";

#[derive(Error, Debug)]
pub enum WidgetError {
    #[error("Empty input")]
    EmptyInput,

    #[error("No API key configured")]
    NotConfigured,

    #[error("Unable to decrypt API key: {0}")]
    Decryption(String),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("OpenWeather API error ({status}): {message}")]
    UpstreamApi { status: u16, message: String },

    #[error("Failed to parse weather data: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Store(String),
}

impl WidgetError {
    /// Short text safe to show to an end user. Never includes the credential
    /// or the request URL.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "No new key entered; existing API key remains unchanged.".to_string(),
            Self::NotConfigured => {
                "No API key configured. Please enter it on the Settings page.".to_string()
            }
            Self::Decryption(_) => {
                "Unable to decrypt API key. Please re-enter it on the Settings page.".to_string()
            }
            Self::Network(_) => "Network error: Could not connect to OpenWeather API.".to_string(),
            Self::UpstreamApi { status, message } => {
                format!("OpenWeather API error ({status}): {message}")
            }
            Self::Parse(_) => "Failed to parse weather data from API.".to_string(),
            Self::Store(_) => "Weather data is temporarily unavailable.".to_string(),
        }
    }

    /// Whether the error came from reading the credential rather than from
    /// the upstream call.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::NotConfigured | Self::Decryption(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_message_carries_status_and_text() {
        let err = WidgetError::UpstreamApi { status: 404, message: "city not found".into() };
        assert_eq!(err.user_message(), "OpenWeather API error (404): city not found");
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn credential_errors_are_classified() {
        assert!(WidgetError::NotConfigured.is_credential_error());
        assert!(WidgetError::Decryption("bad padding".into()).is_credential_error());
        assert!(!WidgetError::Parse("eof".into()).is_credential_error());
    }

    #[test]
    fn decryption_message_hides_details() {
        let err = WidgetError::Decryption("internal detail".into());
        assert!(!err.user_message().contains("internal detail"));
        assert!(err.user_message().contains("re-enter"));
    }
}
