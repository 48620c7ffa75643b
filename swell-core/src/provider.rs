//! Upstream data providers.
//!
//! Every source implements [`ForecastProvider`]. Adapters only describe how to query and decode
//! their upstream (`fetch_upstream`); the provided [`ForecastProvider::fetch`] wraps that in the
//! grid cache, the per-source deadline and failure capture, so a broken upstream always surfaces
//! as an `available = false` reading instead of an error.

use std::{fmt::Debug, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    Config,
    cache::GridCache,
    error::ConfigError,
    model::{Coordinate, ProviderReading, ServiceHealth},
};

pub mod copernicus;
pub mod era5;
pub mod metno;
pub mod noaa_erddap;
pub mod noaa_gfs;
pub mod openmeteo;
pub mod openweather;
pub mod stormglass;
pub mod worldtides;

pub use copernicus::CopernicusMarineProvider;
pub use era5::Era5Provider;
pub use metno::MetNoProvider;
pub use noaa_erddap::NoaaErddapProvider;
pub use noaa_gfs::NoaaGfsProvider;
pub use openmeteo::OpenMeteoProvider;
pub use openweather::OpenWeatherProvider;
pub use stormglass::StormglassProvider;
pub use worldtides::WorldTidesProvider;

/// Health probes use this open-ocean point to stay clear of coastal edge cases.
pub const PROBE_COORDINATE: (f64, f64) = (20.0, -160.0);

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub const USER_AGENT: &str = concat!("SwellSense/", env!("CARGO_PKG_VERSION"), " (surf forecasting)");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    Stormglass,
    OpenWeather,
    WorldTides,
    MetNo,
    OpenMeteo,
    NoaaGfs,
    NoaaErddap,
    Era5,
    CopernicusMarine,
}

/// What a provider needs before it can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    None,
    ApiKey,
    Login,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Stormglass => "stormglass",
            ProviderId::OpenWeather => "openweather",
            ProviderId::WorldTides => "worldtides",
            ProviderId::MetNo => "metno",
            ProviderId::OpenMeteo => "openmeteo",
            ProviderId::NoaaGfs => "noaa_gfs",
            ProviderId::NoaaErddap => "noaa_erddap",
            ProviderId::Era5 => "era5",
            ProviderId::CopernicusMarine => "copernicus_marine",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::Stormglass,
            ProviderId::OpenWeather,
            ProviderId::WorldTides,
            ProviderId::MetNo,
            ProviderId::OpenMeteo,
            ProviderId::NoaaGfs,
            ProviderId::NoaaErddap,
            ProviderId::Era5,
            ProviderId::CopernicusMarine,
        ]
    }

    pub fn credential(&self) -> Credential {
        match self {
            ProviderId::Stormglass | ProviderId::OpenWeather | ProviderId::WorldTides => {
                Credential::ApiKey
            }
            ProviderId::CopernicusMarine => Credential::Login,
            _ => Credential::None,
        }
    }

    /// Native grid resolution in degrees; also the cache cell size.
    pub fn resolution_deg(&self) -> f64 {
        match self {
            ProviderId::NoaaGfs | ProviderId::NoaaErddap => 0.5,
            ProviderId::Era5 | ProviderId::CopernicusMarine => 0.25,
            _ => 0.1,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            ProviderId::Era5 => Duration::from_secs(20),
            ProviderId::NoaaGfs | ProviderId::CopernicusMarine => Duration::from_secs(15),
            _ => Duration::from_secs(10),
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        ProviderId::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == lower)
            .ok_or_else(|| {
                let supported: Vec<_> = ProviderId::all().iter().map(|id| id.as_str()).collect();
                anyhow!("Unknown provider '{value}'. Supported providers: {}.", supported.join(", "))
            })
    }
}

#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    fn cache(&self) -> &GridCache;

    fn timeout(&self) -> Duration;

    /// Why the adapter cannot be used, when its configuration is incomplete.
    fn misconfiguration(&self) -> Option<String> {
        None
    }

    /// Query and decode the upstream for one grid cell.
    async fn fetch_upstream(&self, cell: Coordinate) -> anyhow::Result<ProviderReading>;

    fn probe_timeout(&self) -> Duration {
        PROBE_TIMEOUT.min(self.timeout())
    }

    /// Minimal upstream request used by the health monitor. Bypasses the cache.
    async fn probe_upstream(&self) -> anyhow::Result<()> {
        let (lat, lon) = PROBE_COORDINATE;
        let cell = Coordinate::new(lat, lon)?.snap(self.cache().resolution());
        self.fetch_upstream(cell).await.map(|_| ())
    }

    /// Cached, deadline-bounded fetch. Never fails: upstream problems become
    /// `available = false` readings.
    async fn fetch(&self, coordinate: Coordinate) -> ProviderReading {
        let source = self.id().as_str();

        if let Some(reason) = self.misconfiguration() {
            return ProviderReading::unavailable(source, format!("not configured: {reason}"));
        }

        if let Some(hit) = self.cache().get(coordinate) {
            debug!(source, key = %self.cache().key(coordinate), "cache hit");
            return hit;
        }

        let cell = self.cache().cell(coordinate);
        let started = Instant::now();

        match tokio::time::timeout(self.timeout(), self.fetch_upstream(cell)).await {
            Ok(Ok(reading)) => {
                let reading = reading.normalized();
                let elapsed = started.elapsed().as_secs_f64();

                if !reading.has_data() {
                    warn!(source, elapsed_s = elapsed, "upstream returned no data for cell");
                    return ProviderReading::unavailable(source, "no data for this location");
                }

                info!(source, elapsed_s = elapsed, "upstream fetch succeeded");
                self.cache().put(coordinate, reading.clone());
                reading
            }
            Ok(Err(err)) => {
                warn!(source, elapsed_s = started.elapsed().as_secs_f64(), error = %format!("{err:#}"), "upstream fetch failed");
                ProviderReading::unavailable(source, short_error(&err))
            }
            Err(_) => {
                warn!(source, timeout_s = self.timeout().as_secs_f64(), "upstream fetch timed out");
                ProviderReading::unavailable(source, format!("timed out after {:?}", self.timeout()))
            }
        }
    }

    async fn health_probe(&self) -> ServiceHealth {
        if let Some(reason) = self.misconfiguration() {
            return ServiceHealth {
                ok: false,
                latency_ms: 0,
                error: None,
                note: Some(format!("not configured: {reason}")),
            };
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout(), self.probe_upstream()).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(())) => ServiceHealth { ok: true, latency_ms, error: None, note: None },
            Ok(Err(err)) => ServiceHealth {
                ok: false,
                latency_ms,
                error: Some(short_error(&err)),
                note: None,
            },
            Err(_) => ServiceHealth {
                ok: false,
                latency_ms,
                error: Some(format!("timed out after {:?}", self.probe_timeout())),
                note: None,
            },
        }
    }
}

/// Connection settings shared by every adapter.
#[derive(Debug)]
pub struct Upstream {
    pub http: Client,
    pub base_url: String,
    pub timeout: Duration,
    pub cache: GridCache,
}

impl Upstream {
    pub fn new(id: ProviderId, http: Client, default_base_url: &str) -> Self {
        Self {
            http,
            base_url: default_base_url.trim_end_matches('/').to_string(),
            timeout: id.default_timeout(),
            cache: GridCache::new(id.resolution_deg()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: GridCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Build the shared HTTP client used by all adapters.
pub fn http_client() -> Result<Client, ConfigError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Construct every provider from config.
///
/// A paid provider without credentials is a hard error when `strict_credentials` is set.
/// Otherwise it is built in a misconfigured state that reports itself as such.
pub fn providers_from_config(
    config: &Config,
    http: &Client,
) -> Result<Vec<Arc<dyn ForecastProvider>>, ConfigError> {
    let mut providers: Vec<Arc<dyn ForecastProvider>> = Vec::with_capacity(ProviderId::all().len());

    for &id in ProviderId::all() {
        if !config.is_provider_configured(id) {
            let field = match id.credential() {
                Credential::Login => "username/password",
                _ => "api_key",
            };
            if config.strict_credentials {
                return Err(ConfigError::MissingCredential { provider: id.as_str(), field });
            }
            warn!(provider = %id, field, "provider is missing credentials and will report as not configured");
        }

        let settings = config.provider_config(id).cloned().unwrap_or_default();
        let configure = |upstream: Upstream| {
            let upstream = match &settings.base_url {
                Some(url) => upstream.with_base_url(url.clone()),
                None => upstream,
            };
            match settings.timeout_secs {
                Some(secs) => upstream.with_timeout(Duration::from_secs(secs)),
                None => upstream,
            }
        };
        let api_key = settings.api_key.clone();
        let http = http.clone();

        let provider: Arc<dyn ForecastProvider> = match id {
            ProviderId::Stormglass => Arc::new(StormglassProvider::new(
                configure(StormglassProvider::upstream(http)),
                api_key,
            )),
            ProviderId::OpenWeather => Arc::new(OpenWeatherProvider::new(
                configure(OpenWeatherProvider::upstream(http)),
                api_key,
            )),
            ProviderId::WorldTides => Arc::new(WorldTidesProvider::new(
                configure(WorldTidesProvider::upstream(http)),
                api_key,
            )),
            ProviderId::MetNo => Arc::new(MetNoProvider::new(configure(MetNoProvider::upstream(http)))),
            ProviderId::OpenMeteo => {
                Arc::new(OpenMeteoProvider::new(configure(OpenMeteoProvider::upstream(http))))
            }
            ProviderId::NoaaGfs => {
                Arc::new(NoaaGfsProvider::new(configure(NoaaGfsProvider::upstream(http))))
            }
            ProviderId::NoaaErddap => {
                Arc::new(NoaaErddapProvider::new(configure(NoaaErddapProvider::upstream(http))))
            }
            ProviderId::Era5 => Arc::new(Era5Provider::new(configure(Era5Provider::upstream(http)))),
            ProviderId::CopernicusMarine => Arc::new(CopernicusMarineProvider::new(
                configure(CopernicusMarineProvider::upstream(http)),
                config.provider_login(id).map(|(u, p)| (u.to_string(), p.to_string())),
            )),
        };
        providers.push(provider);
    }

    Ok(providers)
}

/// Send a request and return the body, failing on non-2xx statuses.
pub(crate) async fn send_text(request: RequestBuilder, what: &str) -> anyhow::Result<String> {
    let res = request
        .send()
        .await
        .with_context(|| format!("Failed to send request to {what}"))?;

    let status = res.status();
    let body = res
        .text()
        .await
        .with_context(|| format!("Failed to read {what} response body"))?;

    if !status.is_success() {
        return Err(anyhow!(
            "{what} request failed with status {}: {}",
            status,
            truncate_body(&body),
        ));
    }

    Ok(body)
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    what: &str,
) -> anyhow::Result<T> {
    let body = send_text(request, what).await?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse {what} JSON"))
}

/// Pick the item whose timestamp is closest to `target`.
pub(crate) fn nearest_in_time<T>(
    items: impl IntoIterator<Item = T>,
    target: DateTime<Utc>,
    time_of: impl Fn(&T) -> Option<DateTime<Utc>>,
) -> Option<(DateTime<Utc>, T)> {
    items
        .into_iter()
        .filter_map(|item| time_of(&item).map(|t| (t, item)))
        .min_by_key(|(t, _)| (*t - target).num_seconds().abs())
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

/// Parse `2026-10-19T12:00` style timestamps that carry no zone (Open-Meteo with `timezone=GMT`).
pub(crate) fn parse_naive_utc(value: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|ndt| ndt.and_utc())
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    truncate_chars(body, MAX)
}

/// One-line error description kept short enough for API responses.
pub(crate) fn short_error(err: &anyhow::Error) -> String {
    const MAX: usize = 100;
    truncate_chars(&format!("{err:#}"), MAX)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
