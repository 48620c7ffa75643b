use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use inquire::{Password, Text};
use swell_core::{
    AppState, Config, ConfigError, Coordinate, ForecastHours, ProviderId, api,
    provider::Credential,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "swell", version, about = "Multi-source surf forecast aggregator")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true, env = "SWELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API.
    Serve {
        /// Listen address; overrides `server.listen` from the config file.
        #[arg(long, env = "SWELL_LISTEN")]
        listen: Option<String>,
    },

    /// Aggregate a forecast for one point and print it.
    Forecast {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Forecast horizon in hours (1-240).
        #[arg(long, default_value_t = 24)]
        hours: u32,

        /// Print raw JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Probe every provider and the database.
    Health {
        #[arg(long)]
        json: bool,
    },

    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "stormglass" or "copernicus_marine".
        provider: String,
    },

    /// List providers and whether they are configured.
    Providers,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        self.init_tracing();

        match &self.command {
            Command::Serve { listen } => self.serve(listen.as_deref()).await,
            Command::Forecast { lat, lon, hours, json } => {
                let coordinate = Coordinate::new(*lat, *lon)?;
                let hours = ForecastHours::new(*hours)?;
                let state = self.state()?;

                let forecast = state.coordinator.aggregate(coordinate, hours).await;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&forecast)?);
                } else {
                    print!("{}", output::forecast(&forecast));
                }
                Ok(())
            }
            Command::Health { json } => {
                let status = self.state()?.health.check_health().await;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    print!("{}", output::health(&status));
                }
                Ok(())
            }
            Command::Configure { provider } => self.configure(provider),
            Command::Providers => {
                print!("{}", output::providers(&self.state()?.provider_info()));
                Ok(())
            }
        }
    }

    fn init_tracing(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

        // A second init (e.g. in tests) is harmless; keep the first subscriber.
        let _ = match self.log_format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.with_target(false).try_init(),
        };
    }

    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Config::config_file_path(),
        }
    }

    /// Config file plus environment overrides.
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_from(&self.config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    fn state(&self) -> Result<AppState> {
        let config = self.load_config()?;
        Ok(AppState::from_config(&config)?)
    }

    async fn serve(&self, listen: Option<&str>) -> Result<()> {
        let config = self.load_config()?;
        let listen = listen.unwrap_or(&config.server.listen).to_string();
        let addr: SocketAddr =
            listen.parse().map_err(|_| ConfigError::ListenAddress(listen.clone()))?;

        let state = Arc::new(AppState::from_config(&config)?);
        let app = api::router(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(%addr, "swell API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server failed")?;

        info!("server stopped");
        Ok(())
    }

    fn configure(&self, provider: &str) -> Result<()> {
        let id = ProviderId::try_from(provider)?;
        let path = self.config_path()?;
        // No env overlay: secrets from the environment must not be written to the file.
        let mut config = Config::load_from(&path)?;

        match id.credential() {
            Credential::None => {
                println!("{id} needs no credentials.");
                return Ok(());
            }
            Credential::ApiKey => {
                let key = Password::new(&format!("{id} API key:"))
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;
                config.upsert_provider_api_key(id, key.trim().to_string());
            }
            Credential::Login => {
                let username = Text::new(&format!("{id} username:"))
                    .prompt()
                    .context("Failed to read username")?;
                let password = Password::new(&format!("{id} password:"))
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read password")?;
                config.upsert_provider_login(id, username.trim().to_string(), password);
            }
        }

        config.save_to(&path)?;
        println!("Saved credentials for {id} to {}", path.display());
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
