use crate::{
    Config, ProviderError, WeatherRecord,
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::{
    fmt::{self, Debug},
    str::FromStr,
};

pub mod openweather;
pub mod weatherapi;

/// A supported weather API, named by its key under `[providers]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::OpenWeather, ProviderId::WeatherApi];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; surrounding whitespace (as left by env vars or
/// hand-edited config) is ignored.
impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.trim();

        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(|id| id.as_str()).collect();
                anyhow!(
                    "Unknown provider '{name}'. Supported providers: {}.",
                    supported.join(", ")
                )
            })
    }
}

/// Fetches the current conditions for one city.
///
/// Implementations make exactly one outbound request per call and never
/// retry; retrying is the scheduler's job.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, city: &str) -> Result<WeatherRecord, ProviderError>;
}

/// Construct the configured default provider with a fresh HTTP client.
///
/// The client carries the configured request timeout and lives as long as the
/// returned provider, i.e. for one run.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let id = config.default_provider_id()?;
    let provider = config.provider_config(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weather-etl-cli configure {id}` and enter your API key."
        )
    })?;

    let http = Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let api_key = provider.api_key.clone();
    let base_url = provider.base_url.as_deref();

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => {
            let mut p = OpenWeatherProvider::new(api_key, http, config.units);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
        ProviderId::WeatherApi => {
            let mut p = WeatherApiProvider::new(api_key, http, config.units);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
    };

    Ok(boxed)
}

/// Read the body of `res`, turning a non-success status into an error.
async fn success_body(res: Response) -> Result<String, ProviderError> {
    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            status,
            body: truncate_body(&body),
        });
    }

    Ok(body)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
