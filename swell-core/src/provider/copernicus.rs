use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, nearest_in_time, send_text},
};

/// Copernicus Marine (CMEMS) physics analysis through a THREDDS NetCDF Subset Service point
/// query. Only sea water potential temperature is used.
#[derive(Debug)]
pub struct CopernicusMarineProvider {
    upstream: Upstream,
    login: Option<(String, String)>,
}

impl CopernicusMarineProvider {
    pub const BASE_URL: &'static str =
        "https://nrt.cmems-du.eu/thredds/ncss/global-analysis-forecast-phy-001-024-hourly";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::CopernicusMarine, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream, login: Option<(String, String)>) -> Self {
        Self { upstream, login }
    }
}

/// Decode an NCSS point CSV. Headers carry units (`thetao[unit="degC"]`), so columns are
/// matched by prefix. Missing values arrive as `NaN`.
fn decode(body: &str) -> Result<ProviderReading> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(body.as_bytes());

    let headers = reader.headers().context("Copernicus CSV has no header row")?.clone();
    let column = |prefix: &str| headers.iter().position(|h| h.starts_with(prefix));
    let time_col = column("time").ok_or_else(|| anyhow!("Copernicus CSV has no time column"))?;
    let temp_col = column("thetao").ok_or_else(|| anyhow!("Copernicus CSV has no thetao column"))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed Copernicus CSV row")?;
        let Some(time) = record.get(time_col).and_then(|t| t.parse::<DateTime<Utc>>().ok()) else {
            continue;
        };
        let temp = record
            .get(temp_col)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite());
        rows.push((time, temp));
    }

    let (timestamp, (_, temp)) = nearest_in_time(rows, Utc::now(), |(t, _)| Some(*t))
        .ok_or_else(|| anyhow!("Copernicus CSV contained no rows"))?;

    let mut reading = ProviderReading::new(ProviderId::CopernicusMarine.as_str(), timestamp);
    reading.water_temp_c = temp;
    Ok(reading)
}

#[async_trait]
impl ForecastProvider for CopernicusMarineProvider {
    fn id(&self) -> ProviderId {
        ProviderId::CopernicusMarine
    }

    fn cache(&self) -> &GridCache {
        &self.upstream.cache
    }

    fn timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    fn misconfiguration(&self) -> Option<String> {
        self.login.is_none().then(|| "missing username/password".to_string())
    }

    async fn fetch_upstream(&self, cell: Coordinate) -> Result<ProviderReading> {
        let (username, password) = self
            .login
            .as_ref()
            .ok_or_else(|| anyhow!("Copernicus Marine login is not configured"))?;

        let req = self
            .upstream
            .http
            .get(self.upstream.url(""))
            .basic_auth(username, Some(password))
            .query(&[
                ("var", "thetao".to_string()),
                ("latitude", cell.latitude().to_string()),
                ("longitude", cell.longitude().to_string()),
                ("time", "present".to_string()),
                ("accept", "csv".to_string()),
            ]);

        let body = send_text(req, "Copernicus Marine").await?;
        decode(&body)
    }
}
