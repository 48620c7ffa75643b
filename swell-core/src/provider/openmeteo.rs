use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, parse_naive_utc, send_json},
};

/// Open-Meteo marine forecast. Free, no key; the usual backup when paid sources fail.
#[derive(Debug)]
pub struct OpenMeteoProvider {
    upstream: Upstream,
}

impl OpenMeteoProvider {
    pub const BASE_URL: &'static str = "https://marine-api.open-meteo.com";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::OpenMeteo, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[derive(Debug, Default, Deserialize)]
struct OmHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    wave_height: Vec<Option<f64>>,
    #[serde(default)]
    wave_period: Vec<Option<f64>>,
    #[serde(default)]
    wave_direction: Vec<Option<f64>>,
    #[serde(default)]
    sea_surface_temperature: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    #[serde(default)]
    hourly: OmHourly,
}

fn first(values: &[Option<f64>]) -> Option<f64> {
    values.first().copied().flatten()
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    fn cache(&self) -> &GridCache {
        &self.upstream.cache
    }

    fn timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    async fn fetch_upstream(&self, cell: Coordinate) -> Result<ProviderReading> {
        let req = self.upstream.http.get(self.upstream.url("/v1/marine")).query(&[
            ("latitude", cell.latitude().to_string()),
            ("longitude", cell.longitude().to_string()),
            (
                "hourly",
                "wave_height,wave_direction,wave_period,sea_surface_temperature".to_string(),
            ),
            ("forecast_hours", "1".to_string()),
            ("timezone", "GMT".to_string()),
        ]);

        let parsed: OmResponse = send_json(req, "Open-Meteo").await?;
        let hourly = parsed.hourly;

        let timestamp = hourly
            .time
            .first()
            .and_then(|t| parse_naive_utc(t))
            .ok_or_else(|| anyhow!("Open-Meteo response contained no hourly timestamps"))?;

        let mut reading = ProviderReading::new(ProviderId::OpenMeteo.as_str(), timestamp);
        reading.wave_height_m = first(&hourly.wave_height);
        reading.wave_period_s = first(&hourly.wave_period);
        reading.wave_direction_deg = first(&hourly.wave_direction);
        reading.water_temp_c = first(&hourly.sea_surface_temperature);
        Ok(reading)
    }
}
