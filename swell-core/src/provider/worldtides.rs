use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, nearest_in_time, send_json, unix_to_utc},
};

/// WorldTides tide heights. Contributes tide height only.
#[derive(Debug)]
pub struct WorldTidesProvider {
    upstream: Upstream,
    api_key: Option<String>,
}

impl WorldTidesProvider {
    pub const BASE_URL: &'static str = "https://www.worldtides.info";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::WorldTides, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream, api_key: Option<String>) -> Self {
        Self { upstream, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct WtHeight {
    dt: i64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct WtResponse {
    status: u16,
    error: Option<String>,
    #[serde(default)]
    heights: Vec<WtHeight>,
}

#[async_trait]
impl ForecastProvider for WorldTidesProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WorldTides
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
        let now = Utc::now();

        let req = self.upstream.http.get(self.upstream.url("/api/v3")).query(&[
            ("heights", String::new()),
            ("lat", cell.latitude().to_string()),
            ("lon", cell.longitude().to_string()),
            ("start", (now.timestamp() - 1800).to_string()),
            ("length", "7200".to_string()),
            ("key", api_key.to_string()),
        ]);

        let parsed: WtResponse = send_json(req, "WorldTides").await?;

        // WorldTides reports API-level errors inside a 200 body.
        if parsed.status != 200 {
            bail!(
                "WorldTides returned status {}: {}",
                parsed.status,
                parsed.error.as_deref().unwrap_or("unknown error")
            );
        }

        let (timestamp, height) = nearest_in_time(parsed.heights, now, |h| unix_to_utc(h.dt))
            .ok_or_else(|| anyhow!("WorldTides response contained no heights"))?;

        let mut reading = ProviderReading::new(ProviderId::WorldTides.as_str(), timestamp);
        reading.tide_height_m = Some(height.height);
        Ok(reading)
    }
}
