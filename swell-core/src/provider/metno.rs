use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, nearest_in_time, send_json},
};

/// MET Norway ocean forecast. Free, but requires an identifying User-Agent.
#[derive(Debug)]
pub struct MetNoProvider {
    upstream: Upstream,
}

impl MetNoProvider {
    pub const BASE_URL: &'static str = "https://api.met.no";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::MetNo, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MetDetails {
    sea_surface_wave_height: Option<f64>,
    sea_surface_wave_from_direction: Option<f64>,
    sea_surface_wave_period_at_variance_spectral_density_maximum: Option<f64>,
    sea_water_temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MetInstant {
    #[serde(default)]
    details: MetDetails,
}

#[derive(Debug, Deserialize)]
struct MetData {
    instant: MetInstant,
}

#[derive(Debug, Deserialize)]
struct MetStep {
    time: DateTime<Utc>,
    data: MetData,
}

#[derive(Debug, Deserialize)]
struct MetProperties {
    #[serde(default)]
    timeseries: Vec<MetStep>,
}

#[derive(Debug, Deserialize)]
struct MetResponse {
    properties: MetProperties,
}

#[async_trait]
impl ForecastProvider for MetNoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::MetNo
    }

    fn cache(&self) -> &GridCache {
        &self.upstream.cache
    }

    fn timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    async fn fetch_upstream(&self, cell: Coordinate) -> Result<ProviderReading> {
        let req = self
            .upstream
            .http
            .get(self.upstream.url("/weatherapi/oceanforecast/2.0/complete"))
            .query(&[("lat", cell.latitude()), ("lon", cell.longitude())]);

        let parsed: MetResponse = send_json(req, "Met.no").await?;

        let (timestamp, step) =
            nearest_in_time(parsed.properties.timeseries, Utc::now(), |s| Some(s.time))
                .ok_or_else(|| anyhow!("Met.no response contained no timeseries"))?;

        let details = step.data.instant.details;
        let mut reading = ProviderReading::new(ProviderId::MetNo.as_str(), timestamp);
        reading.wave_height_m = details.sea_surface_wave_height;
        reading.wave_direction_deg = details.sea_surface_wave_from_direction;
        reading.wave_period_s = details.sea_surface_wave_period_at_variance_spectral_density_maximum;
        reading.water_temp_c = details.sea_water_temperature;
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> MetNoProvider {
        let http = Client::builder()
            .user_agent(crate::provider::USER_AGENT)
            .build()
            .unwrap();
        MetNoProvider::new(MetNoProvider::upstream(http).with_base_url(server.uri()))
    }

    #[tokio::test]
    async fn fetch_decodes_ocean_forecast() {
        let server = MockServer::start().await;
        let now = Utc::now();

        Mock::given(method("GET"))
            .and(path("/weatherapi/oceanforecast/2.0/complete"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "Feature",
                "properties": {
                    "timeseries": [{
                        "time": now.to_rfc3339(),
                        "data": {"instant": {"details": {
                            "sea_surface_wave_height": 2.1,
                            "sea_surface_wave_from_direction": 310.0,
                            "sea_water_temperature": 9.4,
                            "sea_water_speed": 0.3
                        }}}
                    }]
                }
            })))
            .mount(&server)
            .await;

        let reading = provider(&server).fetch(Coordinate::new(60.4, 4.9).unwrap()).await;

        assert!(reading.available);
        assert_eq!(reading.wave_height_m, Some(2.1));
        assert_eq!(reading.wave_direction_deg, Some(310.0));
        assert_eq!(reading.water_temp_c, Some(9.4));
        assert_eq!(reading.wave_period_s, None);
    }

    #[tokio::test]
    async fn outside_coverage_becomes_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(422).set_body_string("Coordinates outside domain"))
            .mount(&server)
            .await;

        let reading = provider(&server).fetch(Coordinate::new(-40.0, 170.0).unwrap()).await;

        assert!(!reading.available);
        assert!(reading.error.unwrap().contains("422"));
    }
}
