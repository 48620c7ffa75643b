//! Core library for the `swell` surf forecast service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The nine upstream forecast providers behind one trait, each with its own grid cache
//! - Concurrent fan-out and cross-source aggregation
//! - Cached health monitoring of providers and the database
//! - The HTTP router
//!
//! It is used by `swell-cli`, but can also be embedded in other binaries or services.

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod health;
pub mod model;
pub mod provider;
pub mod state;

pub use config::{Config, ProviderConfig};
pub use error::{ConfigError, CoordinateError};
pub use fanout::Coordinator;
pub use health::HealthMonitor;
pub use model::{AggregatedForecast, Coordinate, ForecastHours, HealthStatus, ProviderReading};
pub use provider::{ForecastProvider, ProviderId};
pub use state::AppState;
