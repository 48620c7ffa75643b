//! NOAA GFS-Wave (WaveWatch III) via the NOMADS GRIB2 filter.
//!
//! The filter returns a GRIB2 subset for a one-degree box around the cell. Decoding is delegated
//! to the `grib` crate; this module only maps GRIB2 parameter codes onto reading fields and
//! averages the box.

use std::io::Cursor;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use reqwest::{Client, header::CONTENT_TYPE};
use tracing::warn;

use crate::{
    cache::GridCache,
    model::{Coordinate, ProviderReading},
    provider::{ForecastProvider, ProviderId, Upstream, truncate_body},
};

/// Forecast steps tried in order when the newest one is not published yet.
const FORECAST_HOURS: [i64; 3] = [0, 3, 6];

/// A cycle younger than this may still be uploading.
const CYCLE_READY_AFTER_HOURS: i64 = 3;

const MIN_GRIB_BYTES: usize = 100;

#[derive(Debug)]
pub struct NoaaGfsProvider {
    upstream: Upstream,
}

impl NoaaGfsProvider {
    pub const BASE_URL: &'static str = "https://nomads.ncep.noaa.gov";

    pub fn upstream(http: Client) -> Upstream {
        Upstream::new(ProviderId::NoaaGfs, http, Self::BASE_URL)
    }

    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    async fn download(&self, cell: Coordinate, cycle: DateTime<Utc>, hour: i64) -> Result<Vec<u8>> {
        let lon = cell.longitude_360();
        let cycle_hour = format!("{:02}", cycle.hour());

        let req = self
            .upstream
            .http
            .get(self.upstream.url("/cgi-bin/filter_gfswave.pl"))
            .query(&[
                ("file", format!("gfswave.t{cycle_hour}z.global.0p25.f{hour:03}.grib2")),
                ("lev_surface", "on".to_string()),
                ("var_HTSGW", "on".to_string()),
                ("var_PERPW", "on".to_string()),
                ("var_DIRPW", "on".to_string()),
                ("var_WIND", "on".to_string()),
                ("var_WDIR", "on".to_string()),
                ("subregion", String::new()),
                ("leftlon", (lon - 1.0).max(0.0).to_string()),
                ("rightlon", (lon + 1.0).min(360.0).to_string()),
                ("toplat", (cell.latitude() + 1.0).min(90.0).to_string()),
                ("bottomlat", (cell.latitude() - 1.0).max(-90.0).to_string()),
                (
                    "dir",
                    format!("/gfs.{}/{cycle_hour}/wave/gridded", cycle.format("%Y%m%d")),
                ),
            ]);

        let res = req.send().await.context("Failed to send request to NOAA GFS")?;
        let status = res.status();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = res.bytes().await.context("Failed to read NOAA GFS response body")?;

        if !status.is_success() {
            bail!(
                "NOAA GFS request failed with status {}: {}",
                status,
                truncate_body(&String::from_utf8_lossy(&body)),
            );
        }
        // NOMADS answers missing files with an HTML page and a 200.
        if content_type.contains("text/html") || body.len() < MIN_GRIB_BYTES {
            bail!("NOAA GFS returned no GRIB2 data for f{hour:03}");
        }

        Ok(body.to_vec())
    }
}

/// Newest 6-hourly cycle that should be fully published at `now`.
fn latest_cycle(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let cycle_hour = now.hour() / 6 * 6;
    let cycle = now
        .date_naive()
        .and_hms_opt(cycle_hour, 0, 0)
        .ok_or_else(|| anyhow!("invalid cycle hour {cycle_hour}"))?
        .and_utc();

    if now - cycle < Duration::hours(CYCLE_READY_AFTER_HOURS) {
        Ok(cycle - Duration::hours(6))
    } else {
        Ok(cycle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GribField {
    WaveHeight,
    WavePeriod,
    WaveDirection,
    WindSpeed,
    WindDirection,
}

impl GribField {
    /// GRIB2 code table 4.2 (discipline, category, number).
    fn from_code(discipline: u8, category: u8, number: u8) -> Option<Self> {
        match (discipline, category, number) {
            (10, 0, 3) => Some(Self::WaveHeight),
            (10, 0, 10) => Some(Self::WaveDirection),
            (10, 0, 11) => Some(Self::WavePeriod),
            (0, 2, 0) => Some(Self::WindDirection),
            (0, 2, 1) => Some(Self::WindSpeed),
            _ => None,
        }
    }

    fn is_direction(&self) -> bool {
        matches!(self, Self::WaveDirection | Self::WindDirection)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct GribSample {
    wave_height: Option<f64>,
    wave_period: Option<f64>,
    wave_direction: Option<f64>,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
}

impl GribSample {
    fn set(&mut self, field: GribField, value: f64) {
        let slot = match field {
            GribField::WaveHeight => &mut self.wave_height,
            GribField::WavePeriod => &mut self.wave_period,
            GribField::WaveDirection => &mut self.wave_direction,
            GribField::WindSpeed => &mut self.wind_speed,
            GribField::WindDirection => &mut self.wind_direction,
        };
        *slot = Some(value);
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean of angles in degrees; plain averaging breaks across north (350° and 10° → 180°).
fn circular_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let (sin, cos) = values.iter().fold((0.0, 0.0), |(s, c), deg: &f64| {
        let rad = deg.to_radians();
        (s + rad.sin(), c + rad.cos())
    });
    Some(sin.atan2(cos).to_degrees().rem_euclid(360.0))
}

/// Decode a GRIB2 subset into box-averaged values. Land and missing points (NaN) are skipped.
fn decode_grib(bytes: &[u8]) -> Result<GribSample> {
    let grib = grib::from_reader(Cursor::new(bytes))
        .map_err(|e| anyhow!("invalid GRIB2 payload: {e}"))?;

    let mut sample = GribSample::default();
    for (_index, submessage) in grib.iter() {
        let discipline = submessage.indicator().discipline;
        let prod_def = submessage.prod_def();
        let (Some(category), Some(number)) =
            (prod_def.parameter_category(), prod_def.parameter_number())
        else {
            continue;
        };
        let Some(field) = GribField::from_code(discipline, category, number) else {
            continue;
        };

        let decoder = grib::Grib2SubmessageDecoder::from(submessage)
            .map_err(|e| anyhow!("cannot decode GRIB2 field {field:?}: {e}"))?;
        let values: Vec<f64> = decoder
            .dispatch()
            .map_err(|e| anyhow!("cannot unpack GRIB2 field {field:?}: {e}"))?
            .map(f64::from)
            .filter(|v| v.is_finite())
            .collect();

        let value = if field.is_direction() { circular_mean(&values) } else { mean(&values) };
        if let Some(value) = value {
            sample.set(field, value);
        }
    }

    Ok(sample)
}

#[async_trait]
impl ForecastProvider for NoaaGfsProvider {
    fn id(&self) -> ProviderId {
        ProviderId::NoaaGfs
    }

    fn cache(&self) -> &GridCache {
        &self.upstream.cache
    }

    fn timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    /// A probe is a real GRIB2 download, so it gets the full fetch budget.
    fn probe_timeout(&self) -> std::time::Duration {
        self.upstream.timeout
    }

    async fn fetch_upstream(&self, cell: Coordinate) -> Result<ProviderReading> {
        let cycle = latest_cycle(Utc::now())?;
        let mut last_error = None;

        for hour in FORECAST_HOURS {
            let sample = match self.download(cell, cycle, hour).await.and_then(|b| decode_grib(&b)) {
                Ok(sample) => sample,
                Err(err) => {
                    warn!(forecast_hour = hour, error = %format!("{err:#}"), "NOAA GFS forecast hour unusable");
                    last_error = Some(err);
                    continue;
                }
            };

            let mut reading =
                ProviderReading::new(ProviderId::NoaaGfs.as_str(), cycle + Duration::hours(hour));
            reading.wave_height_m = sample.wave_height;
            reading.wave_period_s = sample.wave_period;
            reading.wave_direction_deg = sample.wave_direction;
            reading.wind_speed_ms = sample.wind_speed;
            reading.wind_direction_deg = sample.wind_direction;
            return Ok(reading);
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("no forecast hours attempted"))
            .context("all NOAA GFS forecast hours failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn latest_cycle_steps_back_when_too_fresh() {
        let at = |h, m| Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap();

        assert_eq!(latest_cycle(at(13, 0)).unwrap(), at(6, 0));
        assert_eq!(latest_cycle(at(15, 30)).unwrap(), at(12, 0));
        assert_eq!(
            latest_cycle(at(1, 0)).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 18, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn parameter_codes_map_to_fields() {
        assert_eq!(GribField::from_code(10, 0, 3), Some(GribField::WaveHeight));
        assert_eq!(GribField::from_code(10, 0, 11), Some(GribField::WavePeriod));
        assert_eq!(GribField::from_code(0, 2, 1), Some(GribField::WindSpeed));
        assert_eq!(GribField::from_code(0, 0, 0), None);
    }

    #[test]
    fn circular_mean_handles_north_wraparound() {
        let m = circular_mean(&[350.0, 10.0]).unwrap();
        assert!(m < 1e-9 || (360.0 - m) < 1e-9, "got {m}");
        assert!((circular_mean(&[80.0, 100.0]).unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(circular_mean(&[]), None);
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        let err = decode_grib(b"definitely not grib").unwrap_err();
        assert!(err.to_string().contains("GRIB2"));
    }

    #[tokio::test]
    async fn html_answers_fall_through_every_forecast_hour() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/cgi-bin/filter_gfswave.pl"))
            .and(query_param("var_HTSGW", "on"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>data file is not present</html>"),
            )
            .expect(3)
            .mount(&server)
            .await;

        let provider =
            NoaaGfsProvider::new(NoaaGfsProvider::upstream(Client::new()).with_base_url(server.uri()));
        let reading = provider.fetch(Coordinate::new(20.0, -160.0).unwrap()).await;

        assert!(!reading.available);
        assert!(reading.error.unwrap().contains("all NOAA GFS forecast hours failed"));
    }
}
