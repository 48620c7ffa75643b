use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, PROBE_COORDINATE, ProviderId, Upstream, nearest_in_time, send_json},
};

const FULL_PARAMS: &str =
    "waveHeight,wavePeriod,waveDirection,waterTemperature,windSpeed,windDirection";

/// Storm Glass point forecast (paid, API key in the `Authorization` header).
#[derive(Debug)]
pub struct StormglassProvider {
    upstream: Upstream,
    api_key: Option<String>,
}

impl StormglassProvider {
    pub const BASE_URL: &'static str = "https://api.stormglass.io";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::Stormglass, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream, api_key: Option<String>) -> Self {
        Self { upstream, api_key }
    }

    async fn request(&self, cell: Coordinate, params: &str) -> Result<SgResponse> {
        let api_key = self.api_key.as_deref().ok_or_else(|| anyhow!("missing api_key"))?;
        let now = Utc::now();

        let req = self
            .upstream
            .http
            .get(self.upstream.url("/v2/weather/point"))
            .header("Authorization", api_key)
            .query(&[
                ("lat", cell.latitude().to_string()),
                ("lng", cell.longitude().to_string()),
                ("params", params.to_string()),
                ("source", "sg".to_string()),
                ("start", now.timestamp().to_string()),
                ("end", (now + Duration::hours(3)).timestamp().to_string()),
            ]);

        send_json(req, "Storm Glass").await
    }
}

#[derive(Debug, Default, Deserialize)]
struct SgValue {
    sg: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SgHour {
    time: DateTime<Utc>,
    #[serde(default)]
    wave_height: SgValue,
    #[serde(default)]
    wave_period: SgValue,
    #[serde(default)]
    wave_direction: SgValue,
    #[serde(default)]
    water_temperature: SgValue,
    #[serde(default)]
    wind_speed: SgValue,
    #[serde(default)]
    wind_direction: SgValue,
}

#[derive(Debug, Deserialize)]
struct SgResponse {
    #[serde(default)]
    hours: Vec<SgHour>,
}

fn decode(response: SgResponse, now: DateTime<Utc>) -> Result<ProviderReading> {
    let (timestamp, hour) = nearest_in_time(response.hours, now, |h| Some(h.time))
        .ok_or_else(|| anyhow!("Storm Glass response contained no hourly data"))?;

    let mut reading = ProviderReading::new(ProviderId::Stormglass.as_str(), timestamp);
    reading.wave_height_m = hour.wave_height.sg;
    reading.wave_period_s = hour.wave_period.sg;
    reading.wave_direction_deg = hour.wave_direction.sg;
    reading.water_temp_c = hour.water_temperature.sg;
    reading.wind_speed_ms = hour.wind_speed.sg;
    reading.wind_direction_deg = hour.wind_direction.sg;
    Ok(reading)
}

#[async_trait]
impl ForecastProvider for StormglassProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Stormglass
    }

    fn cache(&self) -> &GridCache {
        &self.upstream.cache
    }

    fn timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    fn misconfiguration(&self) -> Option<String> {
        self.api_key.is_none().then(|| "missing api_key".to_string())
    }

    async fn fetch_upstream(&self, cell: Coordinate) -> Result<ProviderReading> {
        let response = self.request(cell, FULL_PARAMS).await?;
        decode(response, Utc::now())
    }

    /// Requests a single parameter to keep quota usage low.
    async fn probe_upstream(&self) -> Result<()> {
        let (lat, lon) = PROBE_COORDINATE;
        self.request(Coordinate::new(lat, lon)?, "waveHeight").await.map(|_| ())
    }
}
