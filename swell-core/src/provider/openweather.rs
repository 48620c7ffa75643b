use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, send_json, unix_to_utc},
};

/// OpenWeatherMap current conditions. Contributes wind only.
#[derive(Debug)]
pub struct OpenWeatherProvider {
    upstream: Upstream,
    api_key: Option<String>,
}

impl OpenWeatherProvider {
    pub const BASE_URL: &'static str = "https://api.openweathermap.org";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::OpenWeather, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream, api_key: Option<String>) -> Self {
        Self { upstream, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: i64,
    wind: Option<OwWind>,
}

#[async_trait]
impl ForecastProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
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
        let api_key = self.api_key.as_deref().ok_or_else(|| anyhow!("missing api_key"))?;

        // `units=metric` pins wind speed to m/s (imperial would be mph).
        let req = self.upstream.http.get(self.upstream.url("/data/2.5/weather")).query(&[
            ("lat", cell.latitude().to_string()),
            ("lon", cell.longitude().to_string()),
            ("appid", api_key.to_string()),
            ("units", "metric".to_string()),
        ]);

        let parsed: OwCurrentResponse = send_json(req, "OpenWeather").await?;

        let observation_time = unix_to_utc(parsed.dt).unwrap_or_else(Utc::now);
        let mut reading = ProviderReading::new(ProviderId::OpenWeather.as_str(), observation_time);
        if let Some(wind) = parsed.wind {
            reading.wind_speed_ms = wind.speed;
            reading.wind_direction_deg = wind.deg;
        }
        Ok(reading)
    }
}
