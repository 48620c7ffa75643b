//! Plain-text rendering for terminal output.

use std::fmt::Write;

use swell_core::{
    AggregatedForecast, HealthStatus,
    model::{HealthState, ProviderInfo},
};

fn value(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(v) => format!("{v:.1} {unit}"),
        None => "-".to_string(),
    }
}

pub fn forecast(f: &AggregatedForecast) -> String {
    let mut out = String::new();
    let s = &f.summary;

    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "Forecast for {:.4}, {:.4} (next {}h)",
        f.location.latitude(),
        f.location.longitude(),
        f.forecast_hours.get()
    );
    let _ = writeln!(out, "  Conditions:  {}", s.conditions);
    let _ = writeln!(out, "  Waves:       {} @ {}", value(s.wave_height_m, "m"), value(s.wave_period_s, "s"));
    let _ = writeln!(out, "  Wind:        {}", value(s.wind_speed_ms, "m/s"));
    let _ = writeln!(out, "  Water temp:  {}", value(s.temperature_c, "°C"));
    let _ = writeln!(out, "  Tide:        {}", value(s.tide_height_m, "m"));

    let _ = writeln!(
        out,
        "Sources: {}/{} available{}",
        f.sources_available.len(),
        f.sources.len(),
        if f.partial { " (partial)" } else { "" }
    );
    for name in &f.sources_available {
        let _ = writeln!(out, "  ok    {name}");
    }
    for name in f.sources_failed.iter().flatten() {
        let reason = f.errors.get(name).map(String::as_str).unwrap_or("unavailable");
        let _ = writeln!(out, "  fail  {name}: {reason}");
    }
    let _ = writeln!(out, "Response time: {:.2}s", f.response_time_s);
    out
}

pub fn health(h: &HealthStatus) -> String {
    let mut out = String::new();
    let label = match h.status {
        HealthState::Ok => "ok",
        HealthState::Degraded => "DEGRADED",
    };
    let _ = writeln!(out, "Status: {label} (checked {})", h.checked_at.format("%Y-%m-%d %H:%M:%S UTC"));

    for (name, svc) in &h.services {
        let mark = if svc.ok { "ok  " } else { "fail" };
        let detail = svc.error.as_deref().or(svc.note.as_deref()).unwrap_or("");
        let _ = writeln!(out, "  {mark}  {name:<18} {:>6} ms  {detail}", svc.latency_ms);
    }

    let db = &h.database;
    let db_line = match (db.configured, db.connected) {
        (false, _) => "not configured".to_string(),
        (true, true) => "connected".to_string(),
        (true, false) => format!("unreachable: {}", db.error.as_deref().unwrap_or("unknown error")),
    };
    let _ = writeln!(out, "  database: {db_line}");
    out
}

pub fn providers(list: &[ProviderInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<18} {:>6} {:>8}  configured", "provider", "grid", "timeout");
    for p in list {
        let _ = writeln!(
            out,
            "{:<18} {:>5}° {:>7}s  {}",
            p.name,
            p.resolution_deg,
            p.timeout_s,
            if p.configured { "yes" } else { "no" }
        );
    }
    out
}
