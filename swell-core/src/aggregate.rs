//! Cross-source summary: per-quantity means and a human-readable conditions label.

use std::collections::BTreeMap;

use crate::model::{ProviderReading, Summary};

const FEET_PER_METRE: f64 = 3.28084;
const KNOTS_PER_MS: f64 = 1.94384;

/// Summarise the available readings. Failed sources (`None` or `available = false`) are ignored.
pub fn summarize(readings: &BTreeMap<String, Option<ProviderReading>>) -> Summary {
    let available: Vec<&ProviderReading> =
        readings.values().flatten().filter(|r| r.available).collect();

    let average = |field: fn(&ProviderReading) -> Option<f64>| {
        mean(available.iter().filter_map(|r| field(r))).map(round1)
    };

    let wave_height_m = average(|r| r.wave_height_m);
    let wind_speed_ms = average(|r| r.wind_speed_ms);

    Summary {
        wave_height_m,
        wave_period_s: average(|r| r.wave_period_s),
        wind_speed_ms,
        temperature_c: average(|r| r.water_temp_c),
        tide_height_m: average(|r| r.tide_height_m),
        conditions: conditions(wave_height_m, wind_speed_ms),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn wave_bucket(height_m: f64) -> String {
    let feet = height_m * FEET_PER_METRE;
    match feet {
        f if f < 2.0 => "Small".to_string(),
        f if f < 4.0 => "2-3ft".to_string(),
        f if f < 6.0 => "4-5ft".to_string(),
        f if f < 8.0 => "6-7ft".to_string(),
        f => format!("{}ft+", f.floor() as i64),
    }
}

fn wind_bucket(speed_ms: f64) -> &'static str {
    match speed_ms * KNOTS_PER_MS {
        k if k < 5.0 => "calm",
        k if k < 10.0 => "light wind",
        k if k < 15.0 => "moderate wind",
        _ => "strong wind",
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn conditions(wave_height_m: Option<f64>, wind_speed_ms: Option<f64>) -> String {
    match (wave_height_m, wind_speed_ms) {
        (Some(wave), Some(wind)) => format!("{} waves, {}", wave_bucket(wave), wind_bucket(wind)),
        (Some(wave), None) => format!("{} waves", wave_bucket(wave)),
        (None, Some(wind)) => capitalize(wind_bucket(wind)),
        (None, None) => "No data available".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reading(source: &str, wave: Option<f64>, wind: Option<f64>) -> ProviderReading {
        let mut r = ProviderReading::new(source, Utc::now());
        r.wave_height_m = wave;
        r.wind_speed_ms = wind;
        r
    }

    fn map(readings: Vec<(&str, Option<ProviderReading>)>) -> BTreeMap<String, Option<ProviderReading>> {
        readings.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn labels_match_reference_case() {
        assert_eq!(conditions(Some(1.3), Some(3.0)), "4-5ft waves, light wind");
    }

    #[test]
    fn wave_buckets() {
        assert_eq!(wave_bucket(0.5), "Small");
        assert_eq!(wave_bucket(1.0), "2-3ft");
        assert_eq!(wave_bucket(2.0), "6-7ft");
        assert_eq!(wave_bucket(3.0), "9ft+");
    }

    #[test]
    fn one_sided_and_empty_labels() {
        assert_eq!(conditions(Some(0.3), None), "Small waves");
        assert_eq!(conditions(None, Some(6.0)), "Moderate wind");
        assert_eq!(conditions(None, Some(1.0)), "Calm");
        assert_eq!(conditions(None, None), "No data available");
    }

    #[test]
    fn means_skip_failed_and_missing_values() {
        let readings = map(vec![
            ("a", Some(reading("a", Some(1.0), Some(4.0)))),
            ("b", Some(reading("b", Some(2.0), None))),
            ("c", Some(ProviderReading::unavailable("c", "timed out"))),
            ("d", None),
        ]);

        let summary = summarize(&readings);

        assert_eq!(summary.wave_height_m, Some(1.5));
        assert_eq!(summary.wind_speed_ms, Some(4.0));
        assert_eq!(summary.temperature_c, None);
        assert_eq!(summary.conditions, "4-5ft waves, light wind");
    }

    #[test]
    fn means_are_rounded_to_one_decimal() {
        let readings = map(vec![
            ("a", Some(reading("a", Some(1.04), None))),
            ("b", Some(reading("b", Some(1.07), None))),
            ("c", Some(reading("c", Some(1.11), None))),
        ]);

        assert_eq!(summarize(&readings).wave_height_m, Some(1.1));
    }

    #[test]
    fn total_failure_yields_nulls() {
        let readings = map(vec![("a", None), ("b", None)]);
        let summary = summarize(&readings);

        assert_eq!(summary.wave_height_m, None);
        assert_eq!(summary.wind_speed_ms, None);
        assert_eq!(summary.conditions, "No data available");
    }
}
