use anyhow::{Context, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select, Text};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::info;
use weather_etl_core::{
    CityList, Config, DashboardView, ProviderId, RetryPolicy, Sink, SqliteSink,
    dashboard::DEFAULT_WINDOW_DAYS, pipeline, run_every,
};

use crate::render;

const MAX_WINDOW_DAYS: i64 = 36_500;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Hourly weather ETL job and dashboard")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the provider, API key, cities and database.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: Option<String>,
    },

    /// Fetch every city once and append the results.
    Run {
        /// Fail on the first error instead of applying the configured retries.
        #[arg(long)]
        no_retry: bool,
    },

    /// Run now and then on the configured interval until Ctrl-C.
    Schedule,

    /// Show recent observations.
    Dashboard {
        /// Size of the trailing window, in days (at most a century).
        #[arg(
            long,
            default_value_t = DEFAULT_WINDOW_DAYS,
            value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_DAYS),
        )]
        days: i64,

        /// Only show these cities (repeatable). Shows all cities when absent.
        #[arg(long = "city")]
        cities: Vec<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Configure { provider } => configure(&path, provider.as_deref()),
            Command::Run { no_retry } => {
                let config = Config::load_from(&path)?;
                let policy = if no_retry {
                    RetryPolicy::NONE
                } else {
                    RetryPolicy::from_config(&config)
                };

                let result = policy.run(|| pipeline::run(&config)).await?;
                println!("{result}");
                Ok(())
            }
            Command::Schedule => {
                let config = Config::load_from(&path)?;
                // Surface configuration mistakes now rather than once per interval.
                config.city_list()?;
                config.default_provider_id()?;

                let (tx, rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("received Ctrl-C");
                        let _ = tx.send(true);
                    }
                });

                run_every(&config, rx).await;
                Ok(())
            }
            Command::Dashboard { days, cities } => {
                let config = Config::load_from(&path)?;
                let mut sink = SqliteSink::open(&config.database_path()?)?;
                sink.ensure_schema()?;

                let view = DashboardView::load(&sink, days, &cities, Utc::now())?;
                print!("{}", render::dashboard(&view, days));
                Ok(())
            }
        }
    }
}

fn configure(path: &Path, provider: Option<&str>) -> anyhow::Result<()> {
    // No environment overrides here; they must never be written to the file.
    let mut config = Config::read(path)?;

    let id = match provider {
        Some(name) => name.parse::<ProviderId>()?,
        None => Select::new("Weather provider:", ProviderId::ALL.to_vec()).prompt()?,
    };

    let prompt = format!("{id} API key:");
    let api_key = Password::new(&prompt)
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()?;
    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty."));
    }
    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.set_default_provider(id);

    let current = config.cities.join(", ");
    let cities = Text::new("Cities (comma-separated):").with_default(&current).prompt()?;
    config.cities = CityList::parse(&cities)?.iter().map(String::from).collect();

    let db_default = config.database_path()?.display().to_string();
    let db = Text::new("Database file:").with_default(&db_default).prompt()?;
    config.database_path = Some(PathBuf::from(db));

    config
        .save_to(path)
        .with_context(|| format!("Failed to save configuration for provider '{id}'"))?;
    println!("Saved configuration to {}", path.display());

    Ok(())
}
