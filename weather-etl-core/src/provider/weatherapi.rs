use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

use crate::{
    error::ProviderError,
    model::{Units, WeatherRecord},
    provider::success_body,
};

use super::WeatherProvider;

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

/// Client for WeatherAPI.com's `current.json` endpoint.
///
/// WeatherAPI always answers in both unit systems, so `units` only picks which
/// fields are read. Values are normalised to OpenWeather's conventions: m/s
/// wind in metric, mph in imperial, hPa pressure in both.
#[derive(Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
    units: Units,
    base_url: String,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, http: Client, units: Units) -> Self {
        Self {
            api_key,
            http,
            units,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl fmt::Debug for WeatherApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherApiProvider")
            .field("base_url", &self.base_url)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    temp_f: f64,
    humidity: f64,
    pressure_mb: f64,
    wind_kph: f64,
    wind_mph: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherRecord, ProviderError> {
        let url = format!("{}/v1/current.json", self.base_url);
        tracing::debug!(%city, provider = "weatherapi", "requesting current weather");

        let res = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .send()
            .await?;

        let body = success_body(res).await?;
        let current = serde_json::from_str::<WaResponse>(&body)?.current;

        if current.condition.text.is_empty() {
            return Err(ProviderError::MissingField("current.condition.text"));
        }

        let (temperature, wind_speed) = match self.units {
            Units::Metric => (current.temp_c, current.wind_kph / 3.6),
            Units::Imperial => (current.temp_f, current.wind_mph),
        };

        Ok(WeatherRecord::new(
            city,
            Utc::now(),
            temperature,
            current.humidity,
            current.pressure_mb,
            wind_speed,
            current.condition.text,
        ))
    }
}
