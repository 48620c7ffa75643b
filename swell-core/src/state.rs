use std::sync::Arc;

use tracing::info;

use crate::{
    Config,
    db::{DatabaseProbe, PgProbe},
    error::ConfigError,
    fanout::Coordinator,
    health::HealthMonitor,
    model::ProviderInfo,
    provider::{ForecastProvider, http_client, providers_from_config},
};

/// Everything the HTTP handlers and CLI commands share. Built once at startup.
#[derive(Debug)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub health: HealthMonitor,
}

impl AppState {
    pub fn new(
        providers: Vec<Arc<dyn ForecastProvider>>,
        database: Option<Arc<dyn DatabaseProbe>>,
    ) -> Self {
        Self {
            health: HealthMonitor::new(providers.clone(), database),
            coordinator: Coordinator::new(providers),
        }
    }

    /// Wire providers, caches and the database probe from configuration.
    ///
    /// Must run inside a tokio runtime: the database pool is created lazily but registers its
    /// maintenance tasks immediately.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let http = http_client()?;
        let providers = providers_from_config(config, &http)?;

        let database = match &config.database_url {
            Some(url) => Some(Arc::new(PgProbe::connect_lazy(url)?) as Arc<dyn DatabaseProbe>),
            None => None,
        };

        info!(
            providers = providers.len(),
            database = database.is_some(),
            "application state initialised"
        );

        Ok(Self::new(providers, database))
    }

    pub fn provider_info(&self) -> Vec<ProviderInfo> {
        self.coordinator
            .providers()
            .iter()
            .map(|p| ProviderInfo {
                name: p.id().as_str().to_string(),
                resolution_deg: p.cache().resolution(),
                timeout_s: p.timeout().as_secs_f64(),
                configured: p.misconfiguration().is_none(),
            })
            .collect()
    }
}
