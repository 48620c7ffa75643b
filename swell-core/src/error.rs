use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("coordinates must be finite numbers")]
    NotFinite,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("hours {0} is outside [1, 240]")]
pub struct ForecastHoursError(pub u32);

/// Deployment defects detected while wiring providers together.
///
/// These are kept apart from upstream failures so operators can tell
/// "source temporarily down" from "source misconfigured".
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "provider '{provider}' requires '{field}' but none is configured.\n\
         Hint: run `swell configure {provider}` and enter your credentials."
    )]
    MissingCredential {
        provider: &'static str,
        field: &'static str,
    },

    #[error("invalid listen address '{0}'")]
    ListenAddress(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("invalid database URL: {0}")]
    Database(#[from] sqlx::Error),
}
