//! Concurrent fan-out over every provider and assembly of the aggregated forecast.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{error, info};

use crate::{
    aggregate::summarize,
    model::{AggregatedForecast, Coordinate, ForecastHours, ProviderReading},
    provider::ForecastProvider,
};

#[derive(Debug, Clone)]
pub struct Coordinator {
    providers: Vec<Arc<dyn ForecastProvider>>,
}

impl Coordinator {
    pub fn new(providers: Vec<Arc<dyn ForecastProvider>>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Arc<dyn ForecastProvider>] {
        &self.providers
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id().as_str()).collect()
    }

    /// Fetch from every provider concurrently, one task each.
    ///
    /// There is no outer deadline: each adapter is bounded by its own timeout, so the slowest
    /// adapter bounds the whole call. A panicking adapter is reported as unavailable.
    pub async fn collect(&self, coordinate: Coordinate) -> Vec<ProviderReading> {
        let handles = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            tokio::spawn(async move { provider.fetch(coordinate).await })
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(&self.providers)
            .map(|(joined, provider)| {
                joined.unwrap_or_else(|err| {
                    error!(source = %provider.id(), error = %err, "adapter task panicked");
                    ProviderReading::unavailable(provider.id().as_str(), "adapter task panicked")
                })
            })
            .collect()
    }

    pub async fn aggregate(&self, coordinate: Coordinate, hours: ForecastHours) -> AggregatedForecast {
        let started = Instant::now();
        let readings = self.collect(coordinate).await;

        let mut sources = BTreeMap::new();
        let mut sources_available = Vec::new();
        let mut sources_failed = Vec::new();
        let mut errors = BTreeMap::new();

        for reading in readings {
            let name = reading.source.clone();
            if reading.available {
                sources_available.push(name.clone());
                sources.insert(name, Some(reading));
            } else {
                if let Some(reason) = reading.error {
                    errors.insert(name.clone(), reason);
                }
                sources_failed.push(name.clone());
                sources.insert(name, None);
            }
        }

        let summary = summarize(&sources);
        let response_time_s = started.elapsed().as_secs_f64();

        info!(
            lat = coordinate.latitude(),
            lon = coordinate.longitude(),
            available = sources_available.len(),
            failed = sources_failed.len(),
            response_time_s,
            "forecast aggregated"
        );

        AggregatedForecast {
            timestamp: Utc::now(),
            location: coordinate,
            sources,
            summary,
            partial: !sources_failed.is_empty(),
            sources_available,
            sources_failed: (!sources_failed.is_empty()).then_some(sources_failed),
            errors,
            forecast_hours: hours,
            response_time_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::GridCache, provider::ProviderId};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy)]
    enum Behaviour {
        Wave(f64),
        Fail,
        Panic,
    }

    #[derive(Debug)]
    struct FakeProvider {
        id: ProviderId,
        delay: Duration,
        timeout: Duration,
        behaviour: Behaviour,
        cache: GridCache,
    }

    impl FakeProvider {
        fn new(id: ProviderId, behaviour: Behaviour) -> Self {
            Self {
                id,
                delay: Duration::ZERO,
                timeout: Duration::from_secs(10),
                behaviour,
                cache: GridCache::new(0.1),
            }
        }

        fn slow(mut self, delay: Duration, timeout: Duration) -> Self {
            self.delay = delay;
            self.timeout = timeout;
            self
        }
    }

    #[async_trait]
    impl ForecastProvider for FakeProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn cache(&self) -> &GridCache {
            &self.cache
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn fetch_upstream(&self, _cell: Coordinate) -> Result<ProviderReading> {
            tokio::time::sleep(self.delay).await;
            match self.behaviour {
                Behaviour::Wave(height) => {
                    let mut r = ProviderReading::new(self.id.as_str(), Utc::now());
                    r.wave_height_m = Some(height);
                    Ok(r)
                }
                Behaviour::Fail => bail!("upstream returned 503"),
                Behaviour::Panic => panic!("decoder bug"),
            }
        }
    }

    fn coordinator(fakes: Vec<FakeProvider>) -> Coordinator {
        Coordinator::new(
            fakes
                .into_iter()
                .map(|f| Arc::new(f) as Arc<dyn ForecastProvider>)
                .collect(),
        )
    }

    fn here() -> Coordinate {
        Coordinate::new(33.6, -118.0).unwrap()
    }

    #[tokio::test]
    async fn available_and_failed_partition_every_provider() {
        let c = coordinator(vec![
            FakeProvider::new(ProviderId::OpenMeteo, Behaviour::Wave(1.0)),
            FakeProvider::new(ProviderId::MetNo, Behaviour::Wave(2.0)),
            FakeProvider::new(ProviderId::NoaaErddap, Behaviour::Fail),
        ]);

        let forecast = c.aggregate(here(), ForecastHours::default()).await;

        assert_eq!(forecast.sources.len(), 3);
        assert_eq!(forecast.sources_available, vec!["openmeteo", "metno"]);
        assert_eq!(forecast.sources_failed, Some(vec!["noaa_erddap".to_string()]));
        assert!(forecast.partial);
        assert_eq!(forecast.sources["noaa_erddap"], None);
        assert!(forecast.errors["noaa_erddap"].contains("503"));
        assert_eq!(forecast.summary.wave_height_m, Some(1.5));
    }

    #[tokio::test]
    async fn full_success_is_not_partial() {
        let c = coordinator(vec![FakeProvider::new(ProviderId::OpenMeteo, Behaviour::Wave(1.0))]);

        let forecast = c.aggregate(here(), ForecastHours::new(48).unwrap()).await;

        assert!(!forecast.partial);
        assert_eq!(forecast.sources_failed, None);
        assert!(forecast.errors.is_empty());
        assert_eq!(forecast.forecast_hours.get(), 48);
    }

    #[tokio::test]
    async fn panicking_adapter_is_reported_as_failed() {
        let c = coordinator(vec![
            FakeProvider::new(ProviderId::Stormglass, Behaviour::Panic),
            FakeProvider::new(ProviderId::OpenMeteo, Behaviour::Wave(1.2)),
        ]);

        let forecast = c.aggregate(here(), ForecastHours::default()).await;

        assert_eq!(forecast.sources_available, vec!["openmeteo"]);
        assert_eq!(forecast.errors["stormglass"], "adapter task panicked");
    }

    #[tokio::test]
    async fn total_failure_still_produces_a_forecast() {
        let c = coordinator(vec![
            FakeProvider::new(ProviderId::OpenMeteo, Behaviour::Fail),
            FakeProvider::new(ProviderId::MetNo, Behaviour::Fail),
        ]);

        let forecast = c.aggregate(here(), ForecastHours::default()).await;

        assert!(forecast.sources_available.is_empty());
        assert_eq!(forecast.summary.wave_height_m, None);
        assert_eq!(forecast.summary.conditions, "No data available");
    }

    #[tokio::test]
    async fn configured_provider_set_is_partitioned_without_overlap() {
        use crate::config::{Config, ProviderConfig};
        use crate::provider::{http_client, providers_from_config};
        use std::collections::BTreeSet;

        // Point every keyless source at a closed local port so nothing leaves the host.
        let mut config = Config::default();
        for id in ProviderId::all() {
            config.providers.insert(
                id.as_str().to_string(),
                ProviderConfig {
                    base_url: Some("http://127.0.0.1:9".into()),
                    timeout_secs: Some(2),
                    ..Default::default()
                },
            );
        }
        let providers = providers_from_config(&config, &http_client().unwrap()).unwrap();

        let forecast = Coordinator::new(providers).aggregate(here(), ForecastHours::default()).await;

        let available: BTreeSet<_> = forecast.sources_available.iter().cloned().collect();
        let failed: BTreeSet<_> = forecast.sources_failed.clone().unwrap_or_default().into_iter().collect();
        let all: BTreeSet<_> = ProviderId::all().iter().map(|id| id.as_str().to_string()).collect();

        assert!(available.is_disjoint(&failed));
        assert_eq!(available.union(&failed).cloned().collect::<BTreeSet<_>>(), all);
        assert_eq!(forecast.sources.len(), all.len());
        for paid in ["stormglass", "openweather", "worldtides", "copernicus_marine"] {
            assert!(forecast.errors[paid].starts_with("not configured"), "{paid}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_bounded_by_the_slowest_adapter_not_the_sum() {
        let c = coordinator(vec![
            FakeProvider::new(ProviderId::OpenMeteo, Behaviour::Wave(1.0))
                .slow(Duration::from_secs(3), Duration::from_secs(10)),
            FakeProvider::new(ProviderId::MetNo, Behaviour::Wave(1.0))
                .slow(Duration::from_secs(4), Duration::from_secs(10)),
            // Hangs past its own deadline.
            FakeProvider::new(ProviderId::Era5, Behaviour::Wave(1.0))
                .slow(Duration::from_secs(60), Duration::from_secs(5)),
        ]);

        let started = Instant::now();
        let forecast = c.aggregate(here(), ForecastHours::default()).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6), "took {elapsed:?}");
        assert_eq!(forecast.sources_failed, Some(vec!["era5".to_string()]));
        assert!(forecast.errors["era5"].starts_with("timed out"));
    }
}
