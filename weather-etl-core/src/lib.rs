//! Core library for the `weather-etl` job.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Weather provider clients behind a common trait
//! - The batch collector that tolerates per-city failures
//! - The SQLite sink and the run pipeline tying them together
//! - Retry/interval scheduling and the dashboard read model
//!
//! It is used by `weather-etl-cli`, but the pipeline can be driven by any
//! other scheduler through [`pipeline::run`].

pub mod collector;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod schedule;
pub mod sink;

pub use collector::{Batch, FetchFailure, collect};
pub use config::{Config, ProviderConfig};
pub use dashboard::{DashboardView, Metric, SeriesSummary};
pub use error::{ProviderError, RunError, SinkError};
pub use model::{CityList, RunResult, StoredObservation, Units, WeatherRecord};
pub use pipeline::{run, run_with};
pub use provider::{ProviderId, WeatherProvider};
pub use schedule::{RetryPolicy, run_every};
pub use sink::{Sink, SqliteSink};
