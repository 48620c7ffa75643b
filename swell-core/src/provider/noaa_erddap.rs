use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, send_json},
};

/// WaveWatch III through an ERDDAP griddap endpoint.
#[derive(Debug)]
pub struct NoaaErddapProvider {
    upstream: Upstream,
    dataset: String,
}

impl NoaaErddapProvider {
    pub const BASE_URL: &'static str = "https://coastwatch.pfeg.noaa.gov/erddap";
    pub const DATASET: &'static str = "NWW3_Global_Best";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::NoaaErddap, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream) -> Self {
        Self { upstream, dataset: Self::DATASET.to_string() }
    }

    /// griddap query for the latest time step at one grid point (depth 0, 0..360 longitude).
    fn query(cell: Coordinate) -> String {
        let selector = format!("[(last)][(0.0)][({})][({})]", cell.latitude(), cell.longitude_360());
        ["Thgt", "Tper", "Tdir"]
            .iter()
            .map(|var| format!("{var}{selector}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErddapTable {
    column_names: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ErddapResponse {
    table: ErddapTable,
}

fn decode(response: ErddapResponse) -> Result<ProviderReading> {
    let table = response.table;
    let row = table
        .rows
        .first()
        .ok_or_else(|| anyhow!("ERDDAP response contained no rows"))?;

    let column = |name: &str| {
        table
            .column_names
            .iter()
            .position(|c| c == name)
            .and_then(|idx| row.get(idx))
    };
    let number = |name: &str| column(name).and_then(serde_json::Value::as_f64);

    let timestamp = column("time")
        .and_then(serde_json::Value::as_str)
        .and_then(|t| t.parse::<DateTime<Utc>>().ok())
        .ok_or_else(|| anyhow!("ERDDAP response has no parsable time column"))?;

    let mut reading = ProviderReading::new(ProviderId::NoaaErddap.as_str(), timestamp);
    reading.wave_height_m = number("Thgt");
    reading.wave_period_s = number("Tper");
    reading.wave_direction_deg = number("Tdir");
    Ok(reading)
}

#[async_trait]
impl ForecastProvider for NoaaErddapProvider {
    fn id(&self) -> ProviderId {
        ProviderId::NoaaErddap
    }

    fn cache(&self) -> &GridCache {
        &self.upstream.cache
    }

    fn timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    async fn fetch_upstream(&self, cell: Coordinate) -> Result<ProviderReading> {
        let url = format!(
            "{}?{}",
            self.upstream.url(&format!("/griddap/{}.json", self.dataset)),
            Self::query(cell)
        );
        let parsed: ErddapResponse = send_json(self.upstream.http.get(url), "NOAA ERDDAP").await?;
        decode(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn query_uses_0_360_longitude() {
        let q = NoaaErddapProvider::query(Coordinate::new(33.5, -118.0).unwrap());
        assert_eq!(
            q,
            "Thgt[(last)][(0.0)][(33.5)][(242)],Tper[(last)][(0.0)][(33.5)][(242)],Tdir[(last)][(0.0)][(33.5)][(242)]"
        );
    }

    #[tokio::test]
    async fn fetch_decodes_griddap_table() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/griddap/NWW3_Global_Best.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "table": {
                    "columnNames": ["time", "depth", "latitude", "longitude", "Thgt", "Tper", "Tdir"],
                    "columnTypes": ["String", "float", "float", "float", "float", "float", "float"],
                    "columnUnits": ["UTC", "m", "degrees_north", "degrees_east", "meters", "second", "degrees"],
                    "rows": [["2026-10-19T12:00:00Z", 0.0, 33.5, 242.0, 1.6, 13.2, -90.0]]
                }
            })))
            .mount(&server)
            .await;

        let provider = NoaaErddapProvider::new(
            NoaaErddapProvider::upstream(Client::new()).with_base_url(server.uri()),
        );
        let reading = provider.fetch(Coordinate::new(33.6, -118.1).unwrap()).await;

        assert!(reading.available, "{:?}", reading.error);
        assert_eq!(reading.wave_height_m, Some(1.6));
        assert_eq!(reading.wave_period_s, Some(13.2));
        assert_eq!(reading.wave_direction_deg, Some(270.0));
        assert_eq!(reading.timestamp.to_rfc3339(), "2026-10-19T12:00:00+00:00");
    }

    #[test]
    fn land_points_decode_to_nulls() {
        let response: ErddapResponse = serde_json::from_value(serde_json::json!({
            "table": {
                "columnNames": ["time", "depth", "latitude", "longitude", "Thgt", "Tper", "Tdir"],
                "rows": [["2026-10-19T12:00:00Z", 0.0, 39.5, 255.0, null, null, null]]
            }
        }))
        .unwrap();

        let reading = decode(response).unwrap();
        assert!(!reading.has_data());
    }
}
