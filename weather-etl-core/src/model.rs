use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observation for one city, stamped at collection time.
///
/// Fields are private so a record cannot change after the provider built it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherRecord {
    city: String,
    observed_at: DateTime<Utc>,
    temperature: f64,
    humidity: f64,
    pressure: f64,
    wind_speed: f64,
    description: String,
}

impl WeatherRecord {
    pub fn new(
        city: impl Into<String>,
        observed_at: DateTime<Utc>,
        temperature: f64,
        humidity: f64,
        pressure: f64,
        wind_speed: f64,
        description: impl Into<String>,
    ) -> Self {
        let city = city.into();
        debug_assert!(!city.is_empty(), "weather record without a city");

        Self {
            city,
            observed_at,
            temperature,
            humidity,
            pressure,
            wind_speed,
            description: description.into(),
        }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    pub fn wind_speed(&self) -> f64 {
        self.wind_speed
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A record read back from the store, with its surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObservation {
    pub id: i64,
    pub record: WeatherRecord,
}

/// Ordered set of city names fetched on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityList(Vec<String>);

impl CityList {
    /// Names are trimmed; blanks and duplicates are rejected.
    pub fn new<I, S>(cities: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();

        for city in cities {
            let city = city.as_ref().trim();
            if city.is_empty() {
                return Err(anyhow!("City names must not be empty."));
            }
            if out.iter().any(|c| c == city) {
                return Err(anyhow!("City '{city}' is listed more than once."));
            }
            out.push(city.to_string());
        }

        Ok(Self(out))
    }

    /// Parse a comma-separated list, e.g. `London, New York, Tokyo`.
    pub fn parse(list: &str) -> Result<Self> {
        Self::new(list.split(',').filter(|c| !c.trim().is_empty()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Unit system requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Celsius, m/s, hPa.
    #[default]
    Metric,
    /// Fahrenheit, mph, hPa.
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts reported after each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "succeeded={} failed={}", self.succeeded, self.failed)
    }
}
