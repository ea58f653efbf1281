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

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// Client for OpenWeatherMap's current-weather endpoint.
#[derive(Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    units: Units,
    base_url: String,
}

impl OpenWeatherProvider {
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

impl fmt::Debug for OpenWeatherProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenWeatherProvider")
            .field("base_url", &self.base_url)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherRecord, ProviderError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        tracing::debug!(%city, provider = "openweather", "requesting current weather");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
            ])
            .send()
            .await?;

        let body = success_body(res).await?;
        let parsed: OwCurrentResponse = serde_json::from_str(&body)?;

        let description = parsed
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .filter(|d| !d.is_empty())
            .ok_or(ProviderError::MissingField("weather[0].description"))?;

        Ok(WeatherRecord::new(
            city,
            Utc::now(),
            parsed.main.temp,
            parsed.main.humidity,
            parsed.main.pressure,
            parsed.wind.speed,
            description,
        ))
    }
}
