use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoordinateError, ForecastHoursError};

/// A validated point on the globe.
///
/// Fields are private so that every `Coordinate` in the system has passed range validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }

        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Round both axes to the nearest multiple of `resolution` degrees.
    ///
    /// The result is trimmed to four decimals so that float noise (`0.30000000000000004`)
    /// never leaks into cache keys or upstream query strings.
    pub fn snap(&self, resolution: f64) -> Coordinate {
        let snap_axis = |value: f64| {
            let snapped = (value / resolution).round() * resolution;
            // `+ 0.0` turns -0.0 into 0.0 so cells on the equator and meridian key identically.
            (snapped * 1e4).round() / 1e4 + 0.0
        };

        Coordinate {
            latitude: snap_axis(self.latitude).clamp(-90.0, 90.0),
            longitude: snap_axis(self.longitude).clamp(-180.0, 180.0),
        }
    }

    /// Longitude in the 0..360 convention used by NOAA wave grids.
    pub fn longitude_360(&self) -> f64 {
        if self.longitude < 0.0 {
            self.longitude + 360.0
        } else {
            self.longitude
        }
    }
}

/// Requested forecast horizon in hours, `1..=240`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ForecastHours(u32);

impl ForecastHours {
    pub const MAX: u32 = 240;

    pub fn new(hours: u32) -> Result<Self, ForecastHoursError> {
        if (1..=Self::MAX).contains(&hours) {
            Ok(Self(hours))
        } else {
            Err(ForecastHoursError(hours))
        }
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for ForecastHours {
    fn default() -> Self {
        Self(24)
    }
}

/// Canonical per-source reading every adapter produces.
///
/// All quantities are SI: metres, seconds, metres per second, degrees Celsius, and
/// meteorological degrees-from-North.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReading {
    pub source: String,
    pub wave_height_m: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub wave_direction_deg: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub water_temp_c: Option<f64>,
    pub tide_height_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderReading {
    /// A successful reading with no quantities filled in yet.
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            wave_height_m: None,
            wave_period_s: None,
            wave_direction_deg: None,
            wind_speed_ms: None,
            wind_direction_deg: None,
            water_temp_c: None,
            tide_height_m: None,
            timestamp,
            available: true,
            error: None,
        }
    }

    /// A handled failure.
    pub fn unavailable(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            available: false,
            error: Some(error.into()),
            ..Self::new(source, Utc::now())
        }
    }

    pub fn has_data(&self) -> bool {
        [
            self.wave_height_m,
            self.wave_period_s,
            self.wave_direction_deg,
            self.wind_speed_ms,
            self.wind_direction_deg,
            self.water_temp_c,
            self.tide_height_m,
        ]
        .iter()
        .any(Option::is_some)
    }

    /// Drop non-finite values and fold directions into `[0, 360)`.
    pub fn normalized(mut self) -> Self {
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
        let direction = |v: Option<f64>| finite(v).map(|d| d.rem_euclid(360.0));

        self.wave_height_m = finite(self.wave_height_m);
        self.wave_period_s = finite(self.wave_period_s);
        self.wave_direction_deg = direction(self.wave_direction_deg);
        self.wind_speed_ms = finite(self.wind_speed_ms);
        self.wind_direction_deg = direction(self.wind_direction_deg);
        self.water_temp_c = finite(self.water_temp_c);
        self.tide_height_m = finite(self.tide_height_m);
        self
    }
}

/// Cross-source summary produced by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub wave_height_m: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub temperature_c: Option<f64>,
    pub tide_height_m: Option<f64>,
    pub conditions: String,
}

/// Response of a forecast request.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedForecast {
    pub timestamp: DateTime<Utc>,
    pub location: Coordinate,
    /// Every provider appears here; failed providers map to `null`.
    pub sources: BTreeMap<String, Option<ProviderReading>>,
    pub summary: Summary,
    pub partial: bool,
    pub sources_available: Vec<String>,
    pub sources_failed: Option<Vec<String>>,
    /// Failure reason per failed provider.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    pub forecast_hours: ForecastHours,
    pub response_time_s: f64,
}

/// Static description of one provider, as listed by `GET /providers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub resolution_deg: f64,
    pub timeout_s: f64,
    pub configured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Composite status of every upstream plus the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub services: BTreeMap<String, ServiceHealth>,
    pub database: DatabaseHealth,
    pub failed_services: Option<Vec<String>>,
    pub checked_at: DateTime<Utc>,
}
