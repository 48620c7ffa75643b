use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, parse_naive_utc, send_json},
};

/// ERA5 reanalysis through the Open-Meteo archive. Lags real time by several days, so the
/// request covers the last week and the newest populated hour wins.
#[derive(Debug)]
pub struct Era5Provider {
    upstream: Upstream,
}

impl Era5Provider {
    pub const BASE_URL: &'static str = "https://archive-api.open-meteo.com";

    const LOOKBACK_DAYS: i64 = 7;

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::Era5, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ArchiveHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    wind_direction_10m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    hourly: ArchiveHourly,
}

/// The archive reports wind in km/h.
fn kmh_to_ms(kmh: f64) -> f64 {
    kmh / 3.6
}

fn decode(response: ArchiveResponse) -> Result<ProviderReading> {
    let hourly = response.hourly;

    let idx = (0..hourly.time.len())
        .rev()
        .find(|&i| hourly.wind_speed_10m.get(i).copied().flatten().is_some())
        .ok_or_else(|| anyhow!("ERA5 archive has no populated hours in the last week"))?;

    let timestamp = parse_naive_utc(&hourly.time[idx])
        .ok_or_else(|| anyhow!("ERA5 archive returned an unparsable time '{}'", hourly.time[idx]))?;

    let mut reading = ProviderReading::new(ProviderId::Era5.as_str(), timestamp);
    reading.wind_speed_ms = hourly.wind_speed_10m.get(idx).copied().flatten().map(kmh_to_ms);
    reading.wind_direction_deg = hourly.wind_direction_10m.get(idx).copied().flatten();
    Ok(reading)
}

#[async_trait]
impl ForecastProvider for Era5Provider {
    fn id(&self) -> ProviderId {
        ProviderId::Era5
    }

    fn cache(&self) -> &GridCache {
        &self.upstream.cache
    }

    fn timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    /// The archive is slow even for tiny requests.
    fn probe_timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    async fn fetch_upstream(&self, cell: Coordinate) -> Result<ProviderReading> {
        let today = Utc::now().date_naive();
        let start = today - Duration::days(Self::LOOKBACK_DAYS);

        let req = self.upstream.http.get(self.upstream.url("/v1/archive")).query(&[
            ("latitude", cell.latitude().to_string()),
            ("longitude", cell.longitude().to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", today.format("%Y-%m-%d").to_string()),
            ("hourly", "wind_speed_10m,wind_direction_10m".to_string()),
            ("models", "era5".to_string()),
            ("timezone", "GMT".to_string()),
        ]);

        let parsed: ArchiveResponse = send_json(req, "ERA5 archive").await?;
        decode(parsed)
    }
}
