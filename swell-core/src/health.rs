//! Cached composite health of every provider and the database.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use tokio::{sync::Mutex, time::Instant};
use tracing::{error, info, warn};

use crate::{
    db::DatabaseProbe,
    model::{DatabaseHealth, HealthState, HealthStatus, ServiceHealth},
    provider::ForecastProvider,
};

pub const HEALTH_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct Cached {
    status: HealthStatus,
    refreshed_at: Instant,
}

/// Probes are expensive (one real upstream request each), so results are shared for
/// [`HEALTH_CACHE_TTL`]. The lock is held across a refresh: callers arriving meanwhile wait for
/// that refresh and reuse its result.
#[derive(Debug)]
pub struct HealthMonitor {
    providers: Vec<Arc<dyn ForecastProvider>>,
    database: Option<Arc<dyn DatabaseProbe>>,
    ttl: Duration,
    cached: Mutex<Option<Cached>>,
}

impl HealthMonitor {
    pub fn new(
        providers: Vec<Arc<dyn ForecastProvider>>,
        database: Option<Arc<dyn DatabaseProbe>>,
    ) -> Self {
        Self::with_ttl(providers, database, HEALTH_CACHE_TTL)
    }

    pub fn with_ttl(
        providers: Vec<Arc<dyn ForecastProvider>>,
        database: Option<Arc<dyn DatabaseProbe>>,
        ttl: Duration,
    ) -> Self {
        Self { providers, database, ttl, cached: Mutex::new(None) }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.refreshed_at.elapsed() < self.ttl {
                return entry.status.clone();
            }
        }

        let status = self.probe_all().await;
        *cached = Some(Cached { status: status.clone(), refreshed_at: Instant::now() });
        status
    }

    async fn probe_all(&self) -> HealthStatus {
        let handles = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            tokio::spawn(async move { provider.health_probe().await })
        });
        let (joined, database) = tokio::join!(join_all(handles), self.probe_database());

        let services: BTreeMap<_, _> = joined
            .into_iter()
            .zip(&self.providers)
            .map(|(joined, provider)| {
                let health = joined.unwrap_or_else(|err| {
                    error!(source = %provider.id(), error = %err, "health check panicked");
                    ServiceHealth {
                        ok: false,
                        latency_ms: 0,
                        error: Some("health check panicked".to_string()),
                        note: None,
                    }
                });
                (provider.id().as_str().to_string(), health)
            })
            .collect();
        let failed: Vec<String> =
            services.iter().filter(|(_, h)| !h.ok).map(|(name, _)| name.clone()).collect();

        let db_down = database.configured && !database.connected;
        let status = if failed.is_empty() && !db_down {
            HealthState::Ok
        } else {
            HealthState::Degraded
        };

        match status {
            HealthState::Ok => info!(services = services.len(), "health check passed"),
            HealthState::Degraded => {
                warn!(failed = ?failed, database_down = db_down, "health check degraded")
            }
        }

        HealthStatus {
            status,
            services,
            database,
            failed_services: (!failed.is_empty()).then_some(failed),
            checked_at: Utc::now(),
        }
    }

    async fn probe_database(&self) -> DatabaseHealth {
        let Some(db) = &self.database else {
            return DatabaseHealth { connected: false, configured: false, error: None };
        };

        match db.ping().await {
            Ok(()) => DatabaseHealth { connected: true, configured: true, error: None },
            Err(error) => DatabaseHealth { connected: false, configured: true, error: Some(error) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::GridCache,
        model::{Coordinate, ProviderReading},
        provider::ProviderId,
    };
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingProvider {
        id: ProviderId,
        healthy: bool,
        panics: bool,
        probes: AtomicUsize,
        cache: GridCache,
    }

    impl CountingProvider {
        fn new(id: ProviderId, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                healthy,
                panics: false,
                probes: AtomicUsize::new(0),
                cache: GridCache::new(0.1),
            })
        }

        fn panicking(id: ProviderId) -> Arc<Self> {
            Arc::new(Self {
                id,
                healthy: false,
                panics: true,
                probes: AtomicUsize::new(0),
                cache: GridCache::new(0.1),
            })
        }
    }

    #[async_trait]
    impl ForecastProvider for CountingProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn cache(&self) -> &GridCache {
            &self.cache
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn fetch_upstream(&self, _cell: Coordinate) -> Result<ProviderReading> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.panics {
                panic!("decoder bug");
            }
            if !self.healthy {
                bail!("upstream returned 500");
            }
            let mut r = ProviderReading::new(self.id.as_str(), Utc::now());
            r.wave_height_m = Some(1.0);
            Ok(r)
        }
    }

    fn monitor(
        providers: &[Arc<CountingProvider>],
        database: Option<Arc<dyn DatabaseProbe>>,
    ) -> HealthMonitor {
        let providers =
            providers.iter().map(|p| Arc::clone(p) as Arc<dyn ForecastProvider>).collect();
        HealthMonitor::new(providers, database)
    }

    #[derive(Debug)]
    struct DownDatabase;

    #[async_trait]
    impl DatabaseProbe for DownDatabase {
        async fn ping(&self) -> Result<(), String> {
            Err("connection refused".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cached_status_is_reused_within_ttl() {
        let provider = CountingProvider::new(ProviderId::OpenMeteo, true);
        let monitor = monitor(&[provider.clone()], None);

        let first = monitor.check_health().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        let second = monitor.check_health().await;

        assert_eq!(first.checked_at, second.checked_at);
        assert_eq!(provider.probes.load(Ordering::SeqCst), 1);
        assert_eq!(first.status, HealthState::Ok);
        assert!(!first.database.configured);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_status_triggers_fresh_probe() {
        let provider = CountingProvider::new(ProviderId::OpenMeteo, true);
        let monitor = monitor(&[provider.clone()], None);

        monitor.check_health().await;
        tokio::time::advance(HEALTH_CACHE_TTL + Duration::from_secs(1)).await;
        monitor.check_health().await;

        assert_eq!(provider.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let provider = CountingProvider::new(ProviderId::OpenMeteo, true);
        let monitor = monitor(&[provider.clone()], None);

        let (a, b) = tokio::join!(monitor.check_health(), monitor.check_health());

        assert_eq!(a, b);
        assert_eq!(provider.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_provider_degrades_status() {
        let monitor = monitor(
            &[
                CountingProvider::new(ProviderId::OpenMeteo, true),
                CountingProvider::new(ProviderId::MetNo, false),
            ],
            None,
        );

        let status = monitor.check_health().await;

        assert_eq!(status.status, HealthState::Degraded);
        assert_eq!(status.failed_services, Some(vec!["metno".to_string()]));
        assert!(status.services["metno"].error.as_ref().unwrap().contains("500"));
        assert!(status.services["openmeteo"].ok);
    }

    #[tokio::test]
    async fn panicking_adapter_is_reported_as_failed_service() {
        let monitor = monitor(
            &[
                CountingProvider::new(ProviderId::OpenMeteo, true),
                CountingProvider::panicking(ProviderId::Era5),
            ],
            None,
        );

        let status = monitor.check_health().await;

        assert_eq!(status.status, HealthState::Degraded);
        assert_eq!(status.failed_services, Some(vec!["era5".to_string()]));
        assert!(!status.services["era5"].ok);
        assert_eq!(status.services["era5"].error.as_deref(), Some("health check panicked"));
        assert!(status.services["openmeteo"].ok);
    }

    #[tokio::test]
    async fn unreachable_configured_database_degrades_status() {
        let monitor = monitor(
            &[CountingProvider::new(ProviderId::OpenMeteo, true)],
            Some(Arc::new(DownDatabase)),
        );

        let status = monitor.check_health().await;

        assert_eq!(status.status, HealthState::Degraded);
        assert_eq!(status.failed_services, None);
        assert!(status.database.configured);
        assert!(!status.database.connected);
        assert_eq!(status.database.error.as_deref(), Some("connection refused"));
    }
}
